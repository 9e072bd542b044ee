//! The synthetic preview scene: a few panels with different materials and
//! flares orbiting on two rings around them.

use std::f32::consts::TAU;

use glam::{Vec2, Vec3, Vec4};
use glint_config::Config;
use glint_flare::{Camera, CameraFrame, Flare, FlareRegistry, ObjectFlags, Quad, SoftwareScene};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const SKY: Vec4 = Vec4::new(0.015, 0.02, 0.05, 1.0);
const INNER_RING: f32 = 3.0;
const OUTER_RING: f32 = 6.5;
/// Radians per second the rings turn.
const ORBIT_SPEED: f32 = 0.25;

pub fn camera(config: &Config) -> CameraFrame {
    let aspect = config.output.width.max(1) as f32 / config.output.height.max(1) as f32;
    let mut camera = Camera::looking_at(Vec3::new(0.0, 1.5, 14.0), Vec3::ZERO, Vec3::Y, 0.9, aspect);
    camera.depth = config.occlusion.depth_convention();
    camera.frame()
}

/// Four panels between the camera and the rings, one per occluder kind.
pub fn build_scene() -> SoftwareScene {
    let mut scene = SoftwareScene::new(SKY);

    scene.push(
        Quad::facing(
            Vec3::new(-4.5, -1.0, 0.5),
            Vec3::Z,
            Vec2::new(2.5, 3.5),
            Vec4::new(0.18, 0.16, 0.14, 1.0),
        )
        .with_flags(ObjectFlags::opaque()),
    );
    scene.push(
        Quad::facing(
            Vec3::new(3.5, 2.0, 1.5),
            Vec3::Z,
            Vec2::new(2.0, 1.5),
            Vec4::new(0.2, 0.5, 0.9, 0.5),
        )
        .with_flags(ObjectFlags::translucent(true)),
    );
    scene.push(
        Quad::facing(
            Vec3::new(3.5, -2.5, 1.5),
            Vec3::Z,
            Vec2::new(2.0, 1.5),
            Vec4::new(0.9, 0.6, 0.2, 0.35),
        )
        .with_flags(ObjectFlags::translucent(false)),
    );
    scene.push(
        Quad::facing(
            Vec3::new(0.0, 4.0, 2.0),
            Vec3::Z,
            Vec2::new(1.5, 0.75),
            Vec4::new(0.4, 0.9, 0.4, 0.6),
        )
        .with_flags(ObjectFlags {
            treat_as_opaque: true,
            ..ObjectFlags::translucent(false)
        }),
    );

    scene
}

/// `flare_count` flares alternating between the inner and outer ring, each
/// styled from the config with a seeded random tint.
pub fn build_flares(config: &Config) -> FlareRegistry {
    let count = config.preview.flare_count;
    let mut rng = ChaCha8Rng::seed_from_u64(config.preview.seed);
    let phase = config.preview.time * ORBIT_SPEED;

    (0..count)
        .map(|i| {
            let (radius, depth) = if i % 2 == 0 {
                (INNER_RING, -1.0)
            } else {
                (OUTER_RING, -3.0)
            };
            let angle = i as f32 / count as f32 * TAU + phase;
            let position = Vec3::new(radius * angle.cos(), radius * angle.sin(), depth);

            let mut flare = Flare::new(position);
            config.style.apply(&mut flare);
            let tint = Vec3::new(
                rng.random_range(0.3..1.0),
                rng.random_range(0.1..0.8),
                rng.random_range(0.1..1.0),
            );
            flare.color_gain *= tint;
            flare
        })
        .collect()
}
