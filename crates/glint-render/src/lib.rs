//! wgpu implementation of the lens flare frame: transparency capture,
//! stochastic coverage with mip reduction, procedural flare shading and the
//! bicubic composite.

pub mod bindings;
pub mod capture;
pub mod coverage;
pub mod fullscreen;
pub mod gpu;
pub mod lens_flare;
pub mod shaders;
pub mod targets;
pub mod uniforms;

pub use bindings::FrameBindings;
pub use capture::{CapturePass, HostScene, PROXY_SEGMENTS};
pub use coverage::CoveragePass;
pub use gpu::{
    GpuContext, GpuContextError, init_headless_blocking, read_texture, with_error_scope,
};
pub use lens_flare::{FrameTargets, LensFlareError, LensFlarePass, check_adapter_support};
pub use targets::{
    CAPTURE_COLOR_FORMAT, CAPTURE_DEPTH_FORMAT, COVERAGE_FORMAT, FLARE_FORMAT, RenderTargets,
};
pub use uniforms::{BatchUniform, FrameUniform, GpuFlare};
