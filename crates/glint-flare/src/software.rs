//! A ray-cast scene of flat quads.
//!
//! Stands in for a host renderer when running the reference pipeline on the
//! CPU: it renders its own color and depth buffers and can redraw any subset
//! of its objects into the transparency capture targets.

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

use crate::camera::CameraFrame;
use crate::flare::project_to_screen;
use crate::raster::Raster;
use crate::reference::RasterScene;
use crate::transparency::{CaptureScene, ObjectFlags, ProxyDisc, RenderState};

/// A ray leaving the near plane through one pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit length.
    pub direction: Vec3,
}

impl Ray {
    /// Ray through the texture-space coordinate `uv` (origin top-left).
    pub fn through_pixel(camera: &CameraFrame, uv: Vec2) -> Self {
        let ndc = Vec2::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0);
        let far_z = camera.depth.far_value();
        let near_z = 1.0 - far_z;
        let near = camera
            .inverse_view_projection
            .project_point3(ndc.extend(near_z));
        let far = camera
            .inverse_view_projection
            .project_point3(ndc.extend(far_z));
        Self {
            origin: near,
            direction: (far - near).normalize_or_zero(),
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Distance along the ray to the plane through `point` with `normal`.
    pub fn plane_distance(&self, point: Vec3, normal: Vec3) -> Option<f32> {
        let denom = normal.dot(self.direction);
        if denom.abs() <= 1e-8 {
            return None;
        }
        let t = normal.dot(point - self.origin) / denom;
        (t >= 0.0).then_some(t)
    }

    pub fn hit_disc(&self, disc: &ProxyDisc) -> Option<f32> {
        if disc.is_empty() {
            return None;
        }
        let t = self.plane_distance(disc.center, disc.normal)?;
        ((self.at(t) - disc.center).length_squared() <= disc.radius * disc.radius).then_some(t)
    }
}

/// A flat parallelogram with a material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub center: Vec3,
    /// Half extent along the first edge.
    pub half_u: Vec3,
    /// Half extent along the second edge, perpendicular to `half_u`.
    pub half_v: Vec3,
    /// Straight (non-premultiplied) color; `w` is the blend alpha.
    pub color: Vec4,
    pub flags: ObjectFlags,
}

impl Quad {
    /// An opaque quad facing along `normal`.
    pub fn facing(center: Vec3, normal: Vec3, half_extent: Vec2, color: Vec4) -> Self {
        let (u, v) = normal.normalize_or_zero().any_orthonormal_pair();
        Self {
            center,
            half_u: u * half_extent.x,
            half_v: v * half_extent.y,
            color,
            flags: ObjectFlags::opaque(),
        }
    }

    pub fn with_flags(mut self, flags: ObjectFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn normal(&self) -> Vec3 {
        self.half_u.cross(self.half_v).normalize_or_zero()
    }

    pub fn hit(&self, ray: &Ray) -> Option<f32> {
        let t = ray.plane_distance(self.center, self.normal())?;
        let local = ray.at(t) - self.center;
        let inside = |axis: Vec3| {
            let len2 = axis.length_squared();
            len2 > 0.0 && local.dot(axis).abs() <= len2
        };
        (inside(self.half_u) && inside(self.half_v)).then_some(t)
    }
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    distance: f32,
    depth: f32,
    object: usize,
}

/// Host scene made of [`Quad`]s.
#[derive(Debug, Clone)]
pub struct SoftwareScene {
    objects: Vec<Quad>,
    state: RenderState,
    background: Vec4,
}

impl SoftwareScene {
    pub fn new(background: Vec4) -> Self {
        Self {
            objects: Vec::new(),
            state: RenderState::default(),
            background,
        }
    }

    pub fn push(&mut self, quad: Quad) -> usize {
        self.objects.push(quad);
        self.objects.len() - 1
    }

    pub fn objects(&self) -> &[Quad] {
        &self.objects
    }

    pub fn object_mut(&mut self, index: usize) -> Option<&mut Quad> {
        self.objects.get_mut(index)
    }

    /// Main scene pass: clear according to the current render state, then
    /// draw every visible object.
    pub fn render(&self, camera: &CameraFrame, color: &mut Raster<Vec4>, depth: &mut Raster<f32>) {
        let clear = if self.state.background_enabled {
            self.background
        } else {
            Vec4::from_array(self.state.clear_color)
        };
        color.fill(clear);
        if self.state.auto_clear_depth {
            depth.reset(color.width(), color.height(), camera.depth.far_value());
        }
        self.draw(camera, color, depth);
    }

    /// Draw visible objects with a strict depth test: opaque surfaces first,
    /// then translucent surfaces back to front.
    fn draw(&self, camera: &CameraFrame, color: &mut Raster<Vec4>, depth: &mut Raster<f32>) {
        debug_assert_eq!(
            (color.width(), color.height()),
            (depth.width(), depth.height())
        );
        let mut hits = Vec::with_capacity(self.objects.len());
        for y in 0..color.height() {
            for x in 0..color.width() {
                let ray = Ray::through_pixel(camera, color.texel_center(x, y));
                hits.clear();
                hits.extend(self.objects.iter().enumerate().filter_map(|(object, quad)| {
                    if !quad.flags.visible {
                        return None;
                    }
                    let distance = quad.hit(&ray)?;
                    let depth = project_to_screen(camera.view_projection, ray.at(distance)).z;
                    Some(Hit {
                        distance,
                        depth,
                        object,
                    })
                }));
                // Opaque first, then translucent farthest to nearest.
                hits.sort_by(|a, b| {
                    let (qa, qb) = (&self.objects[a.object], &self.objects[b.object]);
                    qa.flags
                        .transparent
                        .cmp(&qb.flags.transparent)
                        .then(b.distance.total_cmp(&a.distance))
                });

                let mut dst = color.get(x, y);
                let mut dst_depth = depth.get(x, y);
                for hit in &hits {
                    if !camera.depth.is_nearer(hit.depth, dst_depth) {
                        continue;
                    }
                    let quad = &self.objects[hit.object];
                    dst = if quad.flags.transparent {
                        blend_over(quad.color, dst)
                    } else {
                        quad.color.xyz().extend(1.0)
                    };
                    if quad.flags.depth_write {
                        dst_depth = hit.depth;
                    }
                }
                color.set(x, y, dst);
                depth.set(x, y, dst_depth);
            }
        }
    }
}

/// Straight-alpha "over": rgb is lerped, coverage accumulates.
fn blend_over(src: Vec4, dst: Vec4) -> Vec4 {
    let a = src.w;
    (src.xyz() * a + dst.xyz() * (1.0 - a)).extend(a + dst.w * (1.0 - a))
}

impl CaptureScene for SoftwareScene {
    fn render_state(&self) -> RenderState {
        self.state
    }

    fn set_render_state(&mut self, state: RenderState) {
        self.state = state;
    }

    fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn object_flags(&self, index: usize) -> ObjectFlags {
        self.objects[index].flags
    }

    fn set_object_visible(&mut self, index: usize, visible: bool) {
        self.objects[index].flags.visible = visible;
    }
}

impl RasterScene for SoftwareScene {
    fn draw_visible(&self, camera: &CameraFrame, color: &mut Raster<Vec4>, depth: &mut Raster<f32>) {
        self.draw(camera, color, depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;

    fn camera() -> CameraFrame {
        Camera::looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y, 1.0, 1.0).frame()
    }

    fn buffers(size: u32) -> (Raster<Vec4>, Raster<f32>) {
        (Raster::new(size, size, Vec4::ZERO), Raster::new(size, size, 1.0))
    }

    #[test]
    fn test_center_ray_points_forward() {
        let frame = camera();
        let ray = Ray::through_pixel(&frame, Vec2::splat(0.5));
        assert!((ray.direction - Vec3::NEG_Z).length() < 1e-4, "{:?}", ray.direction);
        assert!(ray.origin.z < 10.0 && ray.origin.z > 9.0);
    }

    #[test]
    fn test_quad_hit_respects_extent() {
        let quad = Quad::facing(Vec3::ZERO, Vec3::Z, Vec2::splat(1.0), Vec4::ONE);
        let inside = Ray {
            origin: Vec3::new(0.5, -0.5, 5.0),
            direction: Vec3::NEG_Z,
        };
        let outside = Ray {
            origin: Vec3::new(1.5, 0.0, 5.0),
            direction: Vec3::NEG_Z,
        };
        assert!((quad.hit(&inside).unwrap_or_default() - 5.0).abs() < 1e-5);
        assert_eq!(quad.hit(&outside), None);
    }

    #[test]
    fn test_opaque_quad_writes_color_and_depth() {
        let mut scene = SoftwareScene::new(Vec4::new(0.0, 0.0, 0.1, 1.0));
        scene.push(Quad::facing(
            Vec3::ZERO,
            Vec3::Z,
            Vec2::splat(100.0),
            Vec4::new(0.5, 0.5, 0.5, 1.0),
        ));
        let frame = camera();
        let (mut color, mut depth) = buffers(8);
        scene.render(&frame, &mut color, &mut depth);

        let expected = project_to_screen(frame.view_projection, Vec3::ZERO).z;
        assert_eq!(color.get(4, 4), Vec4::new(0.5, 0.5, 0.5, 1.0));
        assert!((depth.get(4, 4) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_translucent_in_front_blends_without_depth() {
        let mut scene = SoftwareScene::new(Vec4::new(0.0, 0.0, 0.0, 1.0));
        scene.push(
            Quad::facing(
                Vec3::new(0.0, 0.0, 2.0),
                Vec3::Z,
                Vec2::splat(100.0),
                Vec4::new(1.0, 0.0, 0.0, 0.25),
            )
            .with_flags(ObjectFlags::translucent(false)),
        );
        let frame = camera();
        let (mut color, mut depth) = buffers(4);
        scene.render(&frame, &mut color, &mut depth);

        let texel = color.get(1, 1);
        assert!((texel.x - 0.25).abs() < 1e-6);
        assert_eq!(depth.get(1, 1), 1.0, "non-depth-writing surfaces leave depth alone");
    }

    #[test]
    fn test_hidden_wall_blocks_nothing() {
        let mut scene = SoftwareScene::new(Vec4::ONE);
        let wall = scene.push(Quad::facing(Vec3::ZERO, Vec3::Z, Vec2::splat(100.0), Vec4::ZERO));
        scene.set_object_visible(wall, false);
        let (mut color, mut depth) = buffers(4);
        scene.render(&camera(), &mut color, &mut depth);
        assert!(color.texels().iter().all(|&c| c == Vec4::ONE));
        assert!(depth.texels().iter().all(|&d| d == 1.0));
    }

    #[test]
    fn test_capture_state_clears_transparent() {
        let mut scene = SoftwareScene::new(Vec4::ONE);
        scene.set_render_state(RenderState::CAPTURE);
        let (mut color, mut depth) = buffers(2);
        depth.fill(0.25);
        scene.render(&camera(), &mut color, &mut depth);
        assert!(color.texels().iter().all(|&c| c == Vec4::ZERO));
        assert!(
            depth.texels().iter().all(|&d| d == 0.25),
            "automatic depth clear is disabled while capturing"
        );
    }

    #[test]
    fn test_disc_hit_within_radius() {
        let disc = ProxyDisc {
            center: Vec3::ZERO,
            normal: Vec3::Z,
            radius: 1.0,
        };
        let near = Ray {
            origin: Vec3::new(0.5, 0.0, 3.0),
            direction: Vec3::NEG_Z,
        };
        let far = Ray {
            origin: Vec3::new(1.5, 0.0, 3.0),
            direction: Vec3::NEG_Z,
        };
        assert!(near.hit_disc(&disc).is_some());
        assert!(far.hit_disc(&disc).is_none());
        let empty = ProxyDisc { radius: 0.0, ..disc };
        assert!(near.hit_disc(&empty).is_none());
    }
}
