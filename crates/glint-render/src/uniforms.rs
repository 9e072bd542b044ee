//! GPU-side uniform layouts shared by every lens flare pass.

use bytemuck::{Pod, Zeroable};
use glint_flare::{BATCH_WIDTH, CameraFrame, DepthConvention, Flare, FlareBatch, OcclusionSettings};

/// Flag bits of [`GpuFlare::flags`].
pub mod flags {
    pub const ANAMORPHIC: u32 = 1 << 0;
    pub const SECONDARY_GHOSTS: u32 = 1 << 1;
    pub const ADDITIONAL_STREAKS: u32 = 1 << 2;
    pub const STAR_BURST: u32 = 1 << 3;
    pub const ANIMATED: u32 = 1 << 4;
}

/// Per-frame camera and estimator parameters.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FrameUniform {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub view_projection: [[f32; 4]; 4],
    /// xyz = camera world position.
    pub camera_position: [f32; 4],
    /// coverage radius, transparency aware (0/1), reverse depth (0/1), time.
    pub params: [f32; 4],
    /// Flare buffer width, height and their reciprocals.
    pub flare_resolution: [f32; 4],
}

static_assertions::assert_eq_size!(FrameUniform, [u8; 240]);

impl FrameUniform {
    pub fn new(
        camera: &CameraFrame,
        settings: &OcclusionSettings,
        flare_size: (u32, u32),
        time: f32,
    ) -> Self {
        let (w, h) = (flare_size.0.max(1) as f32, flare_size.1.max(1) as f32);
        let bool_f32 = |b: bool| if b { 1.0 } else { 0.0 };
        Self {
            view: camera.view.to_cols_array_2d(),
            projection: camera.projection.to_cols_array_2d(),
            view_projection: camera.view_projection.to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).to_array(),
            params: [
                settings.coverage_radius,
                bool_f32(settings.transparency_aware),
                bool_f32(camera.depth == DepthConvention::Reverse),
                time,
            ],
            flare_resolution: [w, h, 1.0 / w, 1.0 / h],
        }
    }
}

/// One flare as the coverage and shading shaders read it.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GpuFlare {
    /// xyz = world position, w = opacity.
    pub position: [f32; 4],
    /// xyz = screen position, w unused.
    pub screen: [f32; 4],
    /// rgb = color gain, w = star points.
    pub color_gain: [f32; 4],
    /// glare size, flare size, flare speed, flare shape.
    pub shape: [f32; 4],
    /// halo scale, ghost scale, unused, unused.
    pub scales: [f32; 4],
    /// x = [`flags`] bits.
    pub flags: [u32; 4],
}

static_assertions::assert_eq_size!(GpuFlare, [u8; 96]);

impl GpuFlare {
    pub fn from_flare(flare: &Flare) -> Self {
        let mut bits = 0;
        for (set, bit) in [
            (flare.anamorphic, flags::ANAMORPHIC),
            (flare.secondary_ghosts, flags::SECONDARY_GHOSTS),
            (flare.additional_streaks, flags::ADDITIONAL_STREAKS),
            (flare.star_burst, flags::STAR_BURST),
            (flare.animated, flags::ANIMATED),
        ] {
            if set {
                bits |= bit;
            }
        }
        Self {
            position: flare.position.extend(flare.opacity).to_array(),
            screen: flare.screen_position().extend(0.0).to_array(),
            color_gain: flare.color_gain.extend(flare.star_points).to_array(),
            shape: [
                flare.glare_size,
                flare.flare_size,
                flare.flare_speed,
                flare.flare_shape,
            ],
            scales: [flare.halo_scale, flare.ghost_scale, 0.0, 0.0],
            flags: [bits, 0, 0, 0],
        }
    }
}

/// The four slots of one batch plus its live count.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct BatchUniform {
    pub flares: [GpuFlare; BATCH_WIDTH],
    /// x = live slot count.
    pub live: [u32; 4],
}

static_assertions::assert_eq_size!(BatchUniform, [u8; 400]);

impl BatchUniform {
    pub fn from_batch(batch: &FlareBatch<'_>) -> Self {
        let mut uniform = Self::zeroed();
        for (slot, flare) in batch.live().enumerate() {
            uniform.flares[slot] = GpuFlare::from_flare(flare);
        }
        uniform.live[0] = batch.live_count() as u32;
        uniform
    }
}

/// Round `size` up to the device's dynamic uniform offset alignment.
pub fn aligned_stride(size: u64, alignment: u32) -> u64 {
    let alignment = u64::from(alignment.max(1));
    size.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use glint_flare::{Camera, batches};

    #[test]
    fn test_uniform_sizes_are_16_byte_multiples() {
        assert_eq!(std::mem::size_of::<FrameUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<GpuFlare>() % 16, 0);
        assert_eq!(std::mem::size_of::<BatchUniform>() % 16, 0);
    }

    #[test]
    fn test_aligned_stride() {
        assert_eq!(aligned_stride(400, 256), 512);
        assert_eq!(aligned_stride(256, 256), 256);
        assert_eq!(aligned_stride(400, 0), 400);
    }

    #[test]
    fn test_flag_bits() {
        let mut flare = Flare::new(Vec3::ZERO);
        flare.anamorphic = true;
        flare.secondary_ghosts = false;
        flare.animated = false;
        let gpu = GpuFlare::from_flare(&flare);
        assert_eq!(
            gpu.flags[0],
            flags::ANAMORPHIC | flags::ADDITIONAL_STREAKS | flags::STAR_BURST
        );
        assert_eq!(gpu.position[3], flare.opacity);
        assert_eq!(gpu.color_gain[3], flare.star_points);
    }

    #[test]
    fn test_batch_uniform_zeroes_padding() {
        let flares = [Flare::new(Vec3::ZERO), Flare::new(Vec3::X)];
        let batch = batches(&flares).next().expect("one batch");
        let uniform = BatchUniform::from_batch(&batch);
        assert_eq!(uniform.live[0], 2);
        assert_eq!(uniform.flares[2].position, [0.0; 4]);
        assert_eq!(uniform.flares[1].position[0], 1.0);
    }

    #[test]
    fn test_frame_uniform_flags() {
        let mut camera = Camera::default();
        camera.depth = DepthConvention::Reverse;
        let settings = OcclusionSettings {
            transparency_aware: false,
            ..Default::default()
        };
        let uniform = FrameUniform::new(&camera.frame(), &settings, (640, 360), 2.5);
        assert_eq!(uniform.params, [settings.coverage_radius, 0.0, 1.0, 2.5]);
        assert_eq!(uniform.flare_resolution[0], 640.0);
    }
}
