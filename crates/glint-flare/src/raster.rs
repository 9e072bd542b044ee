//! CPU-side 2D image buffers used by the reference renderer.

use std::ops::{Add, Mul};

use glam::Vec2;

/// A row-major 2D grid of texels.
///
/// Dimensions are clamped to at least 1×1.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T> {
    width: u32,
    height: u32,
    texels: Vec<T>,
}

impl<T: Copy> Raster<T> {
    pub fn new(width: u32, height: u32, fill: T) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        Self {
            width,
            height,
            texels: vec![fill; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn texels(&self) -> &[T] {
        &self.texels
    }

    pub fn texels_mut(&mut self) -> &mut [T] {
        &mut self.texels
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y as usize * self.width as usize + x as usize
    }

    pub fn get(&self, x: u32, y: u32) -> T {
        self.texels[self.offset(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: T) {
        let offset = self.offset(x, y);
        self.texels[offset] = value;
    }

    pub fn fill(&mut self, value: T) {
        self.texels.fill(value);
    }

    /// Change dimensions and refill, reusing the allocation when possible.
    pub fn reset(&mut self, width: u32, height: u32, fill: T) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.texels.clear();
        self.texels
            .resize(self.width as usize * self.height as usize, fill);
    }

    /// Texel fetch with clamp-to-edge addressing.
    pub fn load_clamped(&self, x: i64, y: i64) -> T {
        let x = x.clamp(0, self.width as i64 - 1) as u32;
        let y = y.clamp(0, self.height as i64 - 1) as u32;
        self.get(x, y)
    }

    /// Nearest-texel fetch at normalized coordinates.
    pub fn sample_nearest(&self, uv: Vec2) -> T {
        let x = (uv.x * self.width as f32).floor() as i64;
        let y = (uv.y * self.height as f32).floor() as i64;
        self.load_clamped(x, y)
    }

    /// Normalized coordinates of the center of texel `(x, y)`.
    pub fn texel_center(&self, x: u32, y: u32) -> Vec2 {
        Vec2::new(
            (x as f32 + 0.5) / self.width as f32,
            (y as f32 + 0.5) / self.height as f32,
        )
    }
}

impl<T> Raster<T>
where
    T: Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    /// Bilinear fetch at normalized coordinates with clamp-to-edge addressing.
    pub fn sample_bilinear(&self, uv: Vec2) -> T {
        let x = uv.x * self.width as f32 - 0.5;
        let y = uv.y * self.height as f32 - 0.5;
        let (x0, y0) = (x.floor(), y.floor());
        let (fx, fy) = (x - x0, y - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = self.load_clamped(x0, y0) * (1.0 - fx) + self.load_clamped(x0 + 1, y0) * fx;
        let bottom =
            self.load_clamped(x0, y0 + 1) * (1.0 - fx) + self.load_clamped(x0 + 1, y0 + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_zero_size_is_clamped() {
        let raster = Raster::new(0, 0, 0.0f32);
        assert_eq!((raster.width(), raster.height()), (1, 1));
        assert_eq!(raster.texels().len(), 1);
    }

    #[test]
    fn test_get_set_row_major() {
        let mut raster = Raster::new(3, 2, 0u8);
        raster.set(2, 1, 7);
        assert_eq!(raster.get(2, 1), 7);
        assert_eq!(raster.texels()[5], 7);
    }

    #[test]
    fn test_load_clamped_edges() {
        let mut raster = Raster::new(2, 2, 0.0f32);
        raster.set(1, 1, 4.0);
        assert_eq!(raster.load_clamped(5, 9), 4.0);
        assert_eq!(raster.load_clamped(-3, -3), 0.0);
    }

    #[test]
    fn test_bilinear_midpoint_averages() {
        let mut raster = Raster::new(2, 1, Vec4::ZERO);
        raster.set(1, 0, Vec4::ONE);
        let mid = raster.sample_bilinear(Vec2::new(0.5, 0.5));
        assert!((mid - Vec4::splat(0.5)).abs().max_element() < 1e-6);
    }

    #[test]
    fn test_bilinear_at_texel_center_is_exact() {
        let mut raster = Raster::new(4, 4, 0.0f32);
        raster.set(2, 1, 3.0);
        let uv = raster.texel_center(2, 1);
        assert!((raster.sample_bilinear(uv) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_reset_reuses_and_refills() {
        let mut raster = Raster::new(4, 4, 1.0f32);
        raster.reset(2, 3, 5.0);
        assert_eq!((raster.width(), raster.height()), (2, 3));
        assert!(raster.texels().iter().all(|&t| t == 5.0));
    }
}
