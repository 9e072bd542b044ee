//! Box-filter mip chains for averaging per-texel samples.

use glam::Vec4;

use crate::raster::Raster;

/// Calculate the number of mip levels for a texture of the given dimensions.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// A full mip chain whose levels are preallocated once.
#[derive(Debug, Clone)]
pub struct MipChain {
    levels: Vec<Raster<Vec4>>,
}

impl MipChain {
    pub fn new(width: u32, height: u32) -> Self {
        let levels = (0..mip_level_count(width, height))
            .map(|level| Raster::new(width >> level, height >> level, Vec4::ZERO))
            .collect();
        Self { levels }
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &Raster<Vec4> {
        &self.levels[level]
    }

    /// The full-resolution level written by callers before [`generate`](Self::generate).
    pub fn base_mut(&mut self) -> &mut Raster<Vec4> {
        &mut self.levels[0]
    }

    /// Rebuild every level above the base from the one below it.
    pub fn generate(&mut self) {
        for level in 1..self.levels.len() {
            let (lower, upper) = self.levels.split_at_mut(level);
            downsample(&lower[level - 1], &mut upper[0]);
        }
    }

    /// The single texel of the smallest level.
    pub fn top(&self) -> Vec4 {
        self.levels[self.levels.len() - 1].get(0, 0)
    }
}

/// Average each 2×2 footprint of `src` into one texel of `dst`.
fn downsample(src: &Raster<Vec4>, dst: &mut Raster<Vec4>) {
    for y in 0..dst.height() {
        for x in 0..dst.width() {
            let (sx, sy) = (x as i64 * 2, y as i64 * 2);
            let sum = src.load_clamped(sx, sy)
                + src.load_clamped(sx + 1, sy)
                + src.load_clamped(sx, sy + 1)
                + src.load_clamped(sx + 1, sy + 1);
            dst.set(x, y, sum * 0.25);
        }
    }
}
