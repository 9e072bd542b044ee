//! Stochastic occlusion estimation.
//!
//! Every texel of a small square target draws one hashed offset inside the
//! coverage disc, applies it around each flare of a batch in view space and
//! tests the result against the scene depth and the transparency buffers. A
//! box-filtered mip chain then averages all texels, so the smallest level holds
//! the blocked fraction of each flare's samples.

use glam::{Vec2, Vec3, Vec4};

use crate::batch::{BATCH_WIDTH, FlareBatch};
use crate::camera::CameraFrame;
use crate::mip::MipChain;
use crate::raster::Raster;
use crate::transparency::TransparencyBuffers;

/// Side length of the occlusion target.
pub const DEFAULT_TARGET_SIZE: u32 = 32;

/// Jitter radius of occlusion samples, in world units.
pub const DEFAULT_COVERAGE_RADIUS: f32 = 2.0;

/// Invalid [`OcclusionSettings`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("coverage radius must be finite and positive, got {0}")]
    InvalidCoverageRadius(f32),

    #[error("occlusion target size must be a non-zero power of two, got {0}")]
    InvalidTargetSize(u32),
}

/// Tunables of the occlusion estimator.
///
/// The number of samples per flare is `target_size²`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OcclusionSettings {
    pub coverage_radius: f32,
    /// Let translucent occluders block partially instead of completely.
    pub transparency_aware: bool,
    pub target_size: u32,
}

impl Default for OcclusionSettings {
    fn default() -> Self {
        Self {
            coverage_radius: DEFAULT_COVERAGE_RADIUS,
            transparency_aware: true,
            target_size: DEFAULT_TARGET_SIZE,
        }
    }
}

impl OcclusionSettings {
    /// A power-of-two target keeps every mip level an exact 2×2 average.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.coverage_radius.is_finite() || self.coverage_radius <= 0.0 {
            return Err(SettingsError::InvalidCoverageRadius(self.coverage_radius));
        }
        if !self.target_size.is_power_of_two() {
            return Err(SettingsError::InvalidTargetSize(self.target_size));
        }
        Ok(())
    }

    pub fn sample_count(&self) -> u32 {
        self.target_size * self.target_size
    }
}

fn fract(x: f32) -> f32 {
    x - x.floor()
}

/// Repeatable hash of a pixel coordinate into `[0, 1)`.
pub fn screen_hash(coord: Vec2) -> f32 {
    fract((coord.dot(Vec2::new(12.9898, 4.1414))).sin() * 43758.5453)
}

/// View-space offset of the sample owned by the pixel at `frag_coord`.
///
/// Lies in the unit disc of the view plane (`z = 0`).
pub fn sample_offset(frag_coord: Vec2) -> Vec3 {
    let radius = screen_hash(frag_coord);
    let angle = screen_hash(frag_coord + 1000.0) * std::f32::consts::TAU;
    let (sin, cos) = angle.sin_cos();
    Vec3::new(radius * cos, radius * sin, 0.0)
}

/// Per-frame buffers the estimator tests samples against.
#[derive(Debug, Clone, Copy)]
pub struct OcclusionInputs<'a> {
    /// Scene depth, including depth-writing translucent surfaces.
    pub depth: &'a Raster<f32>,
    pub transparency: Option<&'a TransparencyBuffers>,
}

/// Occlusion of one sample at `view_position + offset * radius`.
pub fn occlusion_sample(
    view_position: Vec3,
    offset: Vec3,
    camera: &CameraFrame,
    inputs: &OcclusionInputs<'_>,
    settings: &OcclusionSettings,
) -> f32 {
    let sample = view_position + offset * settings.coverage_radius;
    let clip = camera.projection * sample.extend(1.0);
    if clip.w <= f32::EPSILON {
        return 1.0;
    }
    let ndc = clip.truncate() / clip.w;
    let uv = Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    if !(0.0..=1.0).contains(&uv.x) || !(0.0..=1.0).contains(&uv.y) {
        return 1.0;
    }

    let transparency = inputs.transparency.filter(|_| settings.transparency_aware);
    let scene_depth = inputs.depth.sample_nearest(uv);

    let mut occlusion = 0.0;
    if camera.depth.is_nearer(scene_depth, ndc.z) {
        occlusion = match transparency {
            Some(buffers) => buffers.depth_writing_occlusion(uv, scene_depth),
            None => 1.0,
        };
    }
    if let Some(buffers) = transparency {
        occlusion = f32::max(occlusion, buffers.non_depth_writing_alpha(uv));
    }
    occlusion
}

/// Blocked fraction per batch slot; 1.0 means fully occluded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OcclusionReadout([f32; BATCH_WIDTH]);

impl OcclusionReadout {
    pub const FULLY_OCCLUDED: Self = Self([1.0; BATCH_WIDTH]);

    pub fn new(channels: [f32; BATCH_WIDTH]) -> Self {
        Self(channels)
    }

    pub fn from_vec4(v: Vec4) -> Self {
        Self(v.to_array())
    }

    pub fn channel(&self, slot: usize) -> f32 {
        self.0[slot]
    }

    pub fn channels(&self) -> [f32; BATCH_WIDTH] {
        self.0
    }

    pub fn is_fully_occluded(&self, slot: usize) -> bool {
        self.0[slot] >= 1.0
    }
}

/// CPU occlusion estimator with a preallocated sample target and mip chain.
#[derive(Debug, Clone)]
pub struct OcclusionEstimator {
    chain: MipChain,
    size: u32,
}

impl OcclusionEstimator {
    pub fn new(target_size: u32) -> Self {
        let size = target_size.max(1);
        Self {
            chain: MipChain::new(size, size),
            size,
        }
    }

    pub fn target_size(&self) -> u32 {
        self.size
    }

    /// The sample target of the most recent estimate.
    pub fn samples(&self) -> &Raster<Vec4> {
        self.chain.level(0)
    }

    /// Estimate the occlusion of every slot of `batch`. Padding slots read 1.0.
    pub fn estimate(
        &mut self,
        batch: &FlareBatch<'_>,
        camera: &CameraFrame,
        inputs: &OcclusionInputs<'_>,
        settings: &OcclusionSettings,
    ) -> OcclusionReadout {
        let view_positions = batch
            .slots()
            .map(|flare| camera.view.transform_point3(flare.position));

        let target = self.chain.base_mut();
        for y in 0..target.height() {
            for x in 0..target.width() {
                let offset = sample_offset(Vec2::new(x as f32 + 0.5, y as f32 + 0.5));
                let mut texel = [1.0; BATCH_WIDTH];
                for (slot, value) in texel.iter_mut().enumerate().take(batch.live_count()) {
                    *value =
                        occlusion_sample(view_positions[slot], offset, camera, inputs, settings);
                }
                target.set(x, y, Vec4::from_array(texel));
            }
        }

        self.chain.generate();
        let readout = OcclusionReadout::from_vec4(self.chain.top());
        log::trace!("batch {} occlusion {:?}", batch.index(), readout.channels());
        readout
    }
}
