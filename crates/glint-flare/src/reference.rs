//! CPU implementation of the full lens-flare frame.
//!
//! Runs the same sequence as the GPU pass (projection, transparency capture,
//! then occlusion and shading per batch, then compositing) against
//! [`Raster`] buffers. Used by the preview tool and as a test oracle.

use glam::{Vec2, Vec4};

use crate::batch::batches;
use crate::camera::{CameraFrame, DepthConvention};
use crate::composite::composite;
use crate::flare::{FlareRegistry, project_to_screen};
use crate::occlusion::{
    OcclusionEstimator, OcclusionInputs, OcclusionReadout, OcclusionSettings, SettingsError,
};
use crate::raster::Raster;
use crate::shading::{ShadingParams, shade_batch};
use crate::software::Ray;
use crate::transparency::{
    CaptureGuard, CaptureLayer, CaptureScene, DEPTH_SEED_EPSILON, ProxyDisc, TransparencyBuffers,
};

/// A host scene that can rasterize its visible objects on the CPU.
pub trait RasterScene: CaptureScene {
    /// Draw every currently visible object over `color` and `depth`, using a
    /// strict depth test against the existing depth values.
    fn draw_visible(&self, camera: &CameraFrame, color: &mut Raster<Vec4>, depth: &mut Raster<f32>);
}

/// The host's rendered frame.
#[derive(Debug, Clone, Copy)]
pub struct SceneBuffers<'a> {
    pub color: &'a Raster<Vec4>,
    /// Depth of everything the main pass wrote, including depth-writing
    /// translucent surfaces.
    pub depth: &'a Raster<f32>,
}

/// Half-resolution flare buffer size for an output size.
pub fn flare_buffer_size(width: u32, height: u32) -> (u32, u32) {
    ((width / 2).max(1), (height / 2).max(1))
}

pub struct ReferenceRenderer {
    settings: OcclusionSettings,
    width: u32,
    height: u32,
    estimator: OcclusionEstimator,
    flare_buffer: Raster<Vec4>,
    output: Raster<Vec4>,
    transparency: TransparencyBuffers,
    /// Depth attachment of target A.
    non_depth_writing_depth: Raster<f32>,
    proxies: Vec<ProxyDisc>,
    visibility: Vec<bool>,
    readouts: Vec<OcclusionReadout>,
}

impl ReferenceRenderer {
    pub fn new(width: u32, height: u32, settings: OcclusionSettings) -> Result<Self, SettingsError> {
        settings.validate()?;
        let (width, height) = (width.max(1), height.max(1));
        let (flare_width, flare_height) = flare_buffer_size(width, height);
        log::info!(
            "Reference renderer {}x{} (flare buffer {}x{}, {} samples per flare)",
            width,
            height,
            flare_width,
            flare_height,
            settings.sample_count()
        );
        Ok(Self {
            settings,
            width,
            height,
            estimator: OcclusionEstimator::new(settings.target_size),
            flare_buffer: Raster::new(flare_width, flare_height, Vec4::ZERO),
            output: Raster::new(width, height, Vec4::ZERO),
            transparency: TransparencyBuffers::new(width, height, DepthConvention::Standard),
            non_depth_writing_depth: Raster::new(width, height, 1.0),
            proxies: Vec::new(),
            visibility: Vec::new(),
            readouts: Vec::new(),
        })
    }

    pub fn settings(&self) -> &OcclusionSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: OcclusionSettings) -> Result<(), SettingsError> {
        settings.validate()?;
        if settings.target_size != self.estimator.target_size() {
            self.estimator = OcclusionEstimator::new(settings.target_size);
        }
        self.settings = settings;
        Ok(())
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resize every owned buffer. Zero dimensions clamp to 1.
    pub fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        let (flare_width, flare_height) = flare_buffer_size(width, height);
        self.flare_buffer.reset(flare_width, flare_height, Vec4::ZERO);
        self.output.reset(width, height, Vec4::ZERO);
        log::info!("Reference renderer resized to {}x{}", width, height);
    }

    /// Per-batch occlusion of the most recent frame, in batch order.
    pub fn readouts(&self) -> &[OcclusionReadout] {
        &self.readouts
    }

    pub fn flare_buffer(&self) -> &Raster<Vec4> {
        &self.flare_buffer
    }

    /// Capture targets of the most recent transparency-aware frame.
    pub fn transparency(&self) -> &TransparencyBuffers {
        &self.transparency
    }

    /// Render one frame and return the composited color.
    ///
    /// Writes each flare's screen position; nothing else in `registry` or
    /// `scene` is changed once this returns.
    pub fn render<S: RasterScene + ?Sized>(
        &mut self,
        registry: &mut FlareRegistry,
        scene: &mut S,
        camera: &CameraFrame,
        frame: SceneBuffers<'_>,
        time: f32,
    ) -> &Raster<Vec4> {
        registry.project(camera);

        if self.settings.transparency_aware {
            self.capture(registry, scene, camera, frame.depth);
        }

        self.flare_buffer.fill(Vec4::ZERO);
        self.readouts.clear();

        let params = ShadingParams {
            resolution: Vec2::new(
                self.flare_buffer.width() as f32,
                self.flare_buffer.height() as f32,
            ),
            time,
        };
        let inputs = OcclusionInputs {
            depth: frame.depth,
            transparency: self
                .settings
                .transparency_aware
                .then_some(&self.transparency),
        };
        for batch in batches(registry.as_slice()) {
            let readout = self
                .estimator
                .estimate(&batch, camera, &inputs, &self.settings);
            shade_batch(&batch, &readout, &params, &mut self.flare_buffer);
            self.readouts.push(readout);
        }
        log::debug!(
            "{} flares in {} batches",
            registry.active_count(),
            self.readouts.len()
        );

        composite(frame.color, &self.flare_buffer, &mut self.output);
        &self.output
    }

    fn capture<S: RasterScene + ?Sized>(
        &mut self,
        registry: &FlareRegistry,
        scene: &mut S,
        camera: &CameraFrame,
        scene_depth: &Raster<f32>,
    ) {
        let convention = camera.depth;
        self.transparency
            .reset(self.width, self.height, convention);
        self.non_depth_writing_depth
            .reset(self.width, self.height, convention.far_value());
        let radius = self.settings.coverage_radius;
        self.proxies.clear();
        self.proxies.extend(
            registry
                .iter()
                .map(|flare| ProxyDisc::for_flare(flare, camera.position, radius)),
        );

        let mut guard = CaptureGuard::begin(scene, &mut self.visibility);
        let clear = Vec4::from_array(guard.scene().render_state().clear_color);
        for layer in CaptureLayer::ALL {
            let (color, depth) = match layer {
                CaptureLayer::NonDepthWriting => (
                    &mut self.transparency.non_depth_writing,
                    &mut self.non_depth_writing_depth,
                ),
                CaptureLayer::DepthWriting => (
                    &mut self.transparency.depth_writing,
                    &mut self.transparency.depth_writing_depth,
                ),
            };
            color.fill(clear);
            seed_depth(scene_depth, convention, depth);
            draw_proxies(&self.proxies, camera, depth);
            guard.isolate(layer);
            guard.scene().draw_visible(camera, color, depth);
        }
    }
}

/// Copy `scene_depth` into `target`, pushed slightly away from the viewer.
fn seed_depth(scene_depth: &Raster<f32>, convention: DepthConvention, target: &mut Raster<f32>) {
    for y in 0..target.height() {
        for x in 0..target.width() {
            let depth = scene_depth.sample_nearest(target.texel_center(x, y));
            target.set(x, y, convention.push_farther(depth, DEPTH_SEED_EPSILON));
        }
    }
}

/// Depth-only rasterization of the flare proxies.
fn draw_proxies(proxies: &[ProxyDisc], camera: &CameraFrame, depth: &mut Raster<f32>) {
    if proxies.iter().all(ProxyDisc::is_empty) {
        return;
    }
    for y in 0..depth.height() {
        for x in 0..depth.width() {
            let ray = Ray::through_pixel(camera, depth.texel_center(x, y));
            let mut nearest = depth.get(x, y);
            for proxy in proxies {
                if let Some(t) = ray.hit_disc(proxy) {
                    let hit = project_to_screen(camera.view_projection, ray.at(t)).z;
                    if camera.depth.is_nearer(hit, nearest) {
                        nearest = hit;
                    }
                }
            }
            depth.set(x, y, nearest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::flare::Flare;
    use crate::software::{Quad, SoftwareScene};
    use crate::transparency::{ObjectFlags, RenderState};
    use glam::Vec3;

    const SIZE: u32 = 32;

    fn camera() -> CameraFrame {
        Camera::looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y, 1.0, 1.0).frame()
    }

    fn settings() -> OcclusionSettings {
        OcclusionSettings {
            coverage_radius: 0.5,
            transparency_aware: true,
            target_size: 16,
        }
    }

    fn render_scene(
        renderer: &mut ReferenceRenderer,
        registry: &mut FlareRegistry,
        scene: &mut SoftwareScene,
    ) -> Raster<Vec4> {
        let frame = camera();
        let mut color = Raster::new(SIZE, SIZE, Vec4::ZERO);
        let mut depth = Raster::new(SIZE, SIZE, 1.0);
        scene.render(&frame, &mut color, &mut depth);
        renderer
            .render(
                registry,
                scene,
                &frame,
                SceneBuffers {
                    color: &color,
                    depth: &depth,
                },
                0.0,
            )
            .clone()
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let bad = OcclusionSettings {
            target_size: 3,
            ..settings()
        };
        assert!(ReferenceRenderer::new(SIZE, SIZE, bad).is_err());
    }

    #[test]
    fn test_empty_registry_passes_scene_through() {
        let mut renderer = ReferenceRenderer::new(SIZE, SIZE, settings()).expect("valid settings");
        let mut registry = FlareRegistry::new();
        let mut scene = SoftwareScene::new(Vec4::new(0.1, 0.2, 0.3, 1.0));
        let output = render_scene(&mut renderer, &mut registry, &mut scene);
        assert!(output.texels().iter().all(|&c| c == Vec4::new(0.1, 0.2, 0.3, 1.0)));
        assert!(renderer.readouts().is_empty());
    }

    #[test]
    fn test_render_restores_host_state() {
        let mut renderer = ReferenceRenderer::new(SIZE, SIZE, settings()).expect("valid settings");
        let mut registry: FlareRegistry = [Flare::new(Vec3::ZERO)].into_iter().collect();
        let mut scene = SoftwareScene::new(Vec4::ZERO);
        scene.push(Quad::facing(
            Vec3::new(3.0, 0.0, 0.0),
            Vec3::Z,
            Vec2::splat(1.0),
            Vec4::ONE,
        ));
        let panel = scene.push(
            Quad::facing(
                Vec3::new(-3.0, 0.0, 1.0),
                Vec3::Z,
                Vec2::splat(1.0),
                Vec4::new(0.0, 1.0, 0.0, 0.5),
            )
            .with_flags(ObjectFlags::translucent(false)),
        );
        let before: Vec<_> = scene.objects().iter().map(|q| q.flags).collect();

        render_scene(&mut renderer, &mut registry, &mut scene);

        let after: Vec<_> = scene.objects().iter().map(|q| q.flags).collect();
        assert_eq!(before, after);
        assert_eq!(scene.render_state(), RenderState::default());
        assert!(
            renderer.transparency().non_depth_writing.texels()[..]
                .iter()
                .any(|c| c.w > 0.0),
            "panel {panel} should land in the non-depth-writing target"
        );
    }

    #[test]
    fn test_proxy_seeds_depth_writing_target() {
        let mut renderer = ReferenceRenderer::new(SIZE, SIZE, settings()).expect("valid settings");
        let mut registry: FlareRegistry = [Flare::new(Vec3::ZERO)].into_iter().collect();
        let mut scene = SoftwareScene::new(Vec4::ZERO);
        render_scene(&mut renderer, &mut registry, &mut scene);

        let center = renderer
            .transparency()
            .depth_writing_depth
            .get(SIZE / 2, SIZE / 2);
        assert!(center < 1.0, "flare disc should occlude the sky, got {center}");
        let corner = renderer.transparency().depth_writing_depth.get(0, 0);
        assert!((corner - (1.0 + DEPTH_SEED_EPSILON)).abs() < 1e-6);
    }

    #[test]
    fn test_resize_clamps_and_halves() {
        let mut renderer = ReferenceRenderer::new(SIZE, SIZE, settings()).expect("valid settings");
        renderer.resize(0, 7);
        assert_eq!(renderer.size(), (1, 7));
        assert_eq!(
            (renderer.flare_buffer().width(), renderer.flare_buffer().height()),
            (1, 3)
        );
    }
}
