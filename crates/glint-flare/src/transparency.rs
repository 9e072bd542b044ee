//! Transparency capture: render-state guard, layer selection, capture buffers
//! and the flare disc proxies drawn as extra occluders.
//!
//! Once per frame the host's translucent geometry is rasterized into two
//! targets that share a depth seed copied from the scene depth buffer:
//!
//! - target A holds transparent surfaces that do not write depth,
//! - target B holds transparent surfaces that write depth, plus its depth.
//!
//! [`CaptureGuard`] overrides the host's render state for the duration of the
//! capture and restores it in `Drop`, so every exit path leaves the host as it
//! was found.

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

use crate::camera::DepthConvention;
use crate::flare::Flare;
use crate::raster::Raster;

/// Offset applied to the seeded depth so coincident surfaces still pass the
/// depth test.
pub const DEPTH_SEED_EPSILON: f32 = 1e-5;

/// Captured depth within this distance of the scene depth counts as equal.
pub const DEPTH_MATCH_TOLERANCE: f32 = 1e-6;

/// Disc proxy radius relative to the coverage radius.
pub const PROXY_RADIUS_SCALE: f32 = 1.25;

/// Host render state touched by the capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    pub background_enabled: bool,
    pub clear_color: [f32; 4],
    pub auto_clear_depth: bool,
}

impl RenderState {
    /// State in force while capturing: no background, transparent clear, and
    /// no automatic depth clear.
    pub const CAPTURE: Self = Self {
        background_enabled: false,
        clear_color: [0.0; 4],
        auto_clear_depth: false,
    };
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            background_enabled: true,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            auto_clear_depth: true,
        }
    }
}

/// Per-object flags the capture reads from the host scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObjectFlags {
    pub visible: bool,
    /// Material is alpha blended.
    pub transparent: bool,
    /// Material writes depth.
    pub depth_write: bool,
    /// Application override: only ever occlude, never blend.
    pub treat_as_opaque: bool,
}

impl ObjectFlags {
    pub fn opaque() -> Self {
        Self {
            visible: true,
            transparent: false,
            depth_write: true,
            treat_as_opaque: false,
        }
    }

    pub fn translucent(depth_write: bool) -> Self {
        Self {
            visible: true,
            transparent: true,
            depth_write,
            treat_as_opaque: false,
        }
    }

    /// Whether the main scene pass writes this object into the depth buffer.
    pub fn writes_scene_depth(&self) -> bool {
        self.visible && self.depth_write
    }
}

/// Which capture target a pass renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureLayer {
    /// Target A: transparent surfaces without depth writes.
    NonDepthWriting,
    /// Target B: transparent surfaces with depth writes.
    DepthWriting,
}

impl CaptureLayer {
    pub const ALL: [CaptureLayer; 2] = [CaptureLayer::NonDepthWriting, CaptureLayer::DepthWriting];

    /// Whether an object belongs to this layer, ignoring its visibility.
    pub fn admits(self, flags: ObjectFlags) -> bool {
        let wants_depth_write = self == CaptureLayer::DepthWriting;
        flags.transparent && !flags.treat_as_opaque && flags.depth_write == wants_depth_write
    }
}

/// The host scene as seen by the transparency capture.
pub trait CaptureScene {
    fn render_state(&self) -> RenderState;
    fn set_render_state(&mut self, state: RenderState);
    fn object_count(&self) -> usize;
    fn object_flags(&self, index: usize) -> ObjectFlags;
    fn set_object_visible(&mut self, index: usize, visible: bool);
}

/// Scoped override of the host's render state and object visibility.
///
/// `snapshot` is caller-owned scratch space so repeated captures do not
/// allocate once it has grown to the scene's object count.
pub struct CaptureGuard<'a, S: CaptureScene + ?Sized> {
    scene: &'a mut S,
    saved_state: RenderState,
    saved_visibility: &'a mut Vec<bool>,
}

impl<'a, S: CaptureScene + ?Sized> CaptureGuard<'a, S> {
    /// Snapshot the scene and switch it to [`RenderState::CAPTURE`].
    pub fn begin(scene: &'a mut S, snapshot: &'a mut Vec<bool>) -> Self {
        let saved_state = scene.render_state();
        snapshot.clear();
        snapshot.extend((0..scene.object_count()).map(|i| scene.object_flags(i).visible));
        scene.set_render_state(RenderState::CAPTURE);
        Self {
            scene,
            saved_state,
            saved_visibility: snapshot,
        }
    }

    /// Show only the objects of `layer` that were visible before the capture.
    pub fn isolate(&mut self, layer: CaptureLayer) {
        for (index, &was_visible) in self.saved_visibility.iter().enumerate() {
            let flags = self.scene.object_flags(index);
            self.scene
                .set_object_visible(index, was_visible && layer.admits(flags));
        }
    }

    /// Render state that was in force before the capture began.
    pub fn saved_state(&self) -> RenderState {
        self.saved_state
    }

    pub fn scene(&self) -> &S {
        &*self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut *self.scene
    }
}

impl<S: CaptureScene + ?Sized> Drop for CaptureGuard<'_, S> {
    fn drop(&mut self) {
        let count = self.scene.object_count().min(self.saved_visibility.len());
        for (index, &visible) in self.saved_visibility[..count].iter().enumerate() {
            self.scene.set_object_visible(index, visible);
        }
        self.scene.set_render_state(self.saved_state);
    }
}

/// CPU copies of the two capture targets.
#[derive(Debug, Clone)]
pub struct TransparencyBuffers {
    /// Target A color.
    pub non_depth_writing: Raster<Vec4>,
    /// Target B color.
    pub depth_writing: Raster<Vec4>,
    /// Target B depth.
    pub depth_writing_depth: Raster<f32>,
}

impl TransparencyBuffers {
    pub fn new(width: u32, height: u32, depth: DepthConvention) -> Self {
        Self {
            non_depth_writing: Raster::new(width, height, Vec4::ZERO),
            depth_writing: Raster::new(width, height, Vec4::ZERO),
            depth_writing_depth: Raster::new(width, height, depth.far_value()),
        }
    }

    pub fn reset(&mut self, width: u32, height: u32, depth: DepthConvention) {
        self.non_depth_writing.reset(width, height, Vec4::ZERO);
        self.depth_writing.reset(width, height, Vec4::ZERO);
        self.depth_writing_depth
            .reset(width, height, depth.far_value());
    }

    /// Coverage of non-depth-writing translucent surfaces at `uv`.
    pub fn non_depth_writing_alpha(&self, uv: Vec2) -> f32 {
        self.non_depth_writing.sample_nearest(uv).w
    }

    /// Occlusion contributed by whatever lies in front of a failed depth test.
    ///
    /// A captured depth equal to the scene depth means the nearest surface is
    /// a depth-writing translucent one, so its alpha is used. Anything else
    /// (an opaque surface or a flare proxy) blocks completely.
    pub fn depth_writing_occlusion(&self, uv: Vec2, scene_depth: f32) -> f32 {
        let captured = self.depth_writing_depth.sample_nearest(uv);
        if (captured - scene_depth).abs() <= DEPTH_MATCH_TOLERANCE {
            self.depth_writing.sample_nearest(uv).w
        } else {
            1.0
        }
    }
}

/// Camera-facing disc that stands in for a flare as an occluder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProxyDisc {
    pub center: Vec3,
    /// Unit normal pointing at the camera.
    pub normal: Vec3,
    /// Zero for inactive flares.
    pub radius: f32,
}

impl ProxyDisc {
    pub fn for_flare(flare: &Flare, camera_position: Vec3, coverage_radius: f32) -> Self {
        let to_camera = (camera_position - flare.position).normalize_or_zero();
        let normal = if to_camera == Vec3::ZERO {
            Vec3::Z
        } else {
            to_camera
        };
        let radius = if flare.is_active() {
            PROXY_RADIUS_SCALE * coverage_radius
        } else {
            0.0
        };
        Self {
            center: flare.position,
            normal,
            radius,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.radius <= 0.0
    }

    /// Model matrix mapping the unit disc in the local XY plane onto this proxy.
    pub fn transform(&self) -> Mat4 {
        let rotation = Quat::from_rotation_arc(Vec3::Z, self.normal);
        Mat4::from_scale_rotation_translation(Vec3::splat(self.radius), rotation, self.center)
    }
}
