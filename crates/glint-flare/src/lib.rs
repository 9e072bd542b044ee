//! Screen-space lens flares with stochastic, transparency-aware occlusion.
//!
//! This crate holds everything that does not need a GPU: the flare data model
//! and registry, projection, batching, the occlusion estimator with its mip
//! reduction, the transparency-capture state guard, the procedural flare
//! field, bicubic compositing and a CPU reference renderer that runs a whole
//! frame. `glint-render` drives the same algorithms through wgpu.

pub mod batch;
pub mod camera;
pub mod composite;
pub mod flare;
pub mod mip;
pub mod occlusion;
pub mod raster;
pub mod reference;
pub mod shading;
pub mod software;
pub mod transparency;

pub use batch::{BATCH_WIDTH, Batches, FlareBatch, batch_count, batches};
pub use camera::{Camera, CameraFrame, DepthConvention, Projection};
pub use composite::{composite, sample_bicubic};
pub use flare::{BEHIND_CAMERA, Flare, FlareRegistry, project_to_screen};
pub use mip::{MipChain, mip_level_count};
pub use occlusion::{
    OcclusionEstimator, OcclusionInputs, OcclusionReadout, OcclusionSettings, SettingsError,
};
pub use raster::Raster;
pub use reference::{RasterScene, ReferenceRenderer, SceneBuffers, flare_buffer_size};
pub use shading::{FLARE_INTENSITY, STREAK_COUNT, ShadingParams, shade_flare};
pub use software::{Quad, Ray, SoftwareScene};
pub use transparency::{
    CaptureGuard, CaptureLayer, CaptureScene, ObjectFlags, ProxyDisc, RenderState,
    TransparencyBuffers,
};
