//! Whole-frame scenarios through the CPU reference renderer.

use glam::{Vec2, Vec3, Vec4};
use glint_flare::{
    BATCH_WIDTH, Camera, CameraFrame, CaptureScene, DepthConvention, Flare, FlareRegistry,
    ObjectFlags, OcclusionSettings, Quad, Raster, ReferenceRenderer, RenderState, SceneBuffers,
    ShadingParams, SoftwareScene, shade_flare,
};

const SIZE: u32 = 32;

struct Frame {
    camera: CameraFrame,
    color: Raster<Vec4>,
    depth: Raster<f32>,
}

fn camera(depth: DepthConvention) -> CameraFrame {
    let mut camera = Camera::looking_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y, 1.0, 1.0);
    camera.depth = depth;
    camera.frame()
}

fn settings(transparency_aware: bool) -> OcclusionSettings {
    OcclusionSettings {
        coverage_radius: 0.5,
        transparency_aware,
        target_size: 16,
    }
}

fn sky() -> SoftwareScene {
    SoftwareScene::new(Vec4::new(0.02, 0.03, 0.08, 1.0))
}

/// A panel filling the whole view at `z`.
fn panel(z: f32, color: Vec4, flags: ObjectFlags) -> Quad {
    Quad::facing(Vec3::new(0.0, 0.0, z), Vec3::Z, Vec2::splat(50.0), color).with_flags(flags)
}

fn render_main(scene: &SoftwareScene, depth: DepthConvention, (width, height): (u32, u32)) -> Frame {
    let camera = camera(depth);
    let mut color = Raster::new(width, height, Vec4::ZERO);
    let mut depth = Raster::new(width, height, depth.far_value());
    scene.render(&camera, &mut color, &mut depth);
    Frame {
        camera,
        color,
        depth,
    }
}

fn run(
    renderer: &mut ReferenceRenderer,
    registry: &mut FlareRegistry,
    scene: &mut SoftwareScene,
    depth: DepthConvention,
) -> (Frame, Raster<Vec4>) {
    let frame = render_main(scene, depth, renderer.size());
    let output = renderer
        .render(
            registry,
            scene,
            &frame.camera,
            SceneBuffers {
                color: &frame.color,
                depth: &frame.depth,
            },
            0.0,
        )
        .clone();
    (frame, output)
}

fn single_flare() -> FlareRegistry {
    [Flare::new(Vec3::ZERO)].into_iter().collect()
}

fn channel_sums(raster: &Raster<Vec4>) -> Vec4 {
    raster.texels().iter().copied().sum()
}

#[test]
fn unobstructed_flare_glows_warm() {
    let mut renderer = ReferenceRenderer::new(SIZE, SIZE, settings(true)).expect("valid settings");
    let mut registry = single_flare();
    let mut scene = sky();
    let (frame, output) = run(&mut renderer, &mut registry, &mut scene, DepthConvention::Standard);

    assert_eq!(renderer.readouts().len(), 1);
    assert!(
        renderer.readouts()[0].channel(0) < 0.05,
        "open sky should be visible, got {}",
        renderer.readouts()[0].channel(0)
    );

    let added = channel_sums(&output) - channel_sums(&frame.color);
    assert!(added.x > 0.0, "flare should add light, added {added:?}");
    assert!(added.x > added.z, "red gain should dominate, added {added:?}");
    assert_eq!(added.w, 0.0, "scene alpha is kept");
}

#[test]
fn opaque_wall_hides_flare_completely() {
    for aware in [true, false] {
        for convention in [DepthConvention::Standard, DepthConvention::Reverse] {
            let mut renderer =
                ReferenceRenderer::new(SIZE, SIZE, settings(aware)).expect("valid settings");
            let mut registry = single_flare();
            let mut scene = sky();
            scene.push(panel(3.0, Vec4::new(0.4, 0.4, 0.4, 1.0), ObjectFlags::opaque()));
            let (frame, output) = run(&mut renderer, &mut registry, &mut scene, convention);

            assert_eq!(
                renderer.readouts()[0].channel(0),
                1.0,
                "aware={aware} {convention:?}"
            );
            assert_eq!(
                output, frame.color,
                "aware={aware} {convention:?}: nothing may leak through"
            );
        }
    }
}

#[test]
fn open_sky_is_visible_with_reverse_depth() {
    let mut renderer = ReferenceRenderer::new(SIZE, SIZE, settings(true)).expect("valid settings");
    let mut registry = single_flare();
    let mut scene = sky();
    run(&mut renderer, &mut registry, &mut scene, DepthConvention::Reverse);
    assert!(renderer.readouts()[0].channel(0) < 0.05);
}

#[test]
fn depth_writing_glass_occludes_by_its_alpha() {
    let glass = || {
        let mut scene = sky();
        scene.push(panel(
            3.0,
            Vec4::new(0.2, 0.6, 0.9, 0.4),
            ObjectFlags::translucent(true),
        ));
        scene
    };

    let mut aware = ReferenceRenderer::new(SIZE, SIZE, settings(true)).expect("valid settings");
    let mut registry = single_flare();
    run(&mut aware, &mut registry, &mut glass(), DepthConvention::Standard);
    let occ = aware.readouts()[0].channel(0);
    assert!((occ - 0.4).abs() < 1e-4, "aware occlusion should be the alpha, got {occ}");

    let mut unaware = ReferenceRenderer::new(SIZE, SIZE, settings(false)).expect("valid settings");
    run(&mut unaware, &mut registry, &mut glass(), DepthConvention::Standard);
    assert_eq!(unaware.readouts()[0].channel(0), 1.0);
}

#[test]
fn non_depth_writing_glass_dims_only_when_aware() {
    let glass = || {
        let mut scene = sky();
        scene.push(panel(
            3.0,
            Vec4::new(0.9, 0.9, 0.2, 0.3),
            ObjectFlags::translucent(false),
        ));
        scene
    };

    let mut aware = ReferenceRenderer::new(SIZE, SIZE, settings(true)).expect("valid settings");
    let mut registry = single_flare();
    run(&mut aware, &mut registry, &mut glass(), DepthConvention::Standard);
    let occ = aware.readouts()[0].channel(0);
    assert!((occ - 0.3).abs() < 1e-4, "got {occ}");

    let mut unaware = ReferenceRenderer::new(SIZE, SIZE, settings(false)).expect("valid settings");
    run(&mut unaware, &mut registry, &mut glass(), DepthConvention::Standard);
    assert_eq!(unaware.readouts()[0].channel(0), 0.0);
}

#[test]
fn treat_as_opaque_glass_blocks_fully() {
    let mut flags = ObjectFlags::translucent(true);
    flags.treat_as_opaque = true;
    let mut scene = sky();
    scene.push(panel(3.0, Vec4::new(0.2, 0.6, 0.9, 0.4), flags));

    let mut renderer = ReferenceRenderer::new(SIZE, SIZE, settings(true)).expect("valid settings");
    let mut registry = single_flare();
    run(&mut renderer, &mut registry, &mut scene, DepthConvention::Standard);
    assert_eq!(renderer.readouts()[0].channel(0), 1.0);
}

#[test]
fn glass_behind_the_flare_does_not_dim_it() {
    let mut scene = sky();
    scene.push(panel(
        -3.0,
        Vec4::new(0.9, 0.9, 0.2, 0.6),
        ObjectFlags::translucent(false),
    ));
    // Fine enough that every sample texel lies inside the proxy's margin.
    let mut renderer = ReferenceRenderer::new(128, 128, settings(true)).expect("valid settings");
    let mut registry = single_flare();
    run(&mut renderer, &mut registry, &mut scene, DepthConvention::Standard);
    assert_eq!(
        renderer.readouts()[0].channel(0),
        0.0,
        "the flare's own proxy disc must mask glass behind it"
    );
}

#[test]
fn ten_flares_make_three_batches_with_padding() {
    let mut registry = FlareRegistry::new();
    for i in 0..10 {
        let x = i as f32 * 0.3 - 1.5;
        registry.push(Flare::new(Vec3::new(x, 0.0, 0.0)));
    }
    let mut renderer = ReferenceRenderer::new(SIZE, SIZE, settings(true)).expect("valid settings");
    let mut scene = sky();
    run(&mut renderer, &mut registry, &mut scene, DepthConvention::Standard);

    let readouts = renderer.readouts();
    assert_eq!(readouts.len(), 3);
    assert!(readouts[2].is_fully_occluded(2) && readouts[2].is_fully_occluded(3));
    for flare in registry.iter() {
        assert!(flare.is_within_depth_range(), "every flare is projected");
    }

    // The flare buffer holds the ten live flares and nothing from padding.
    let buffer = renderer.flare_buffer();
    let params = ShadingParams {
        resolution: Vec2::new(buffer.width() as f32, buffer.height() as f32),
        time: 0.0,
    };
    let mut lit = 0;
    for y in 0..buffer.height() {
        for x in 0..buffer.width() {
            let uv = buffer.texel_center(x, y);
            let expected: Vec3 = registry
                .iter()
                .enumerate()
                .map(|(i, flare)| {
                    let occlusion = readouts[i / BATCH_WIDTH].channel(i % BATCH_WIDTH);
                    shade_flare(flare, occlusion, uv, &params)
                })
                .sum();
            let actual = buffer.get(x, y).truncate();
            assert!(
                (actual - expected).abs().max_element() < 1e-4,
                "texel ({x}, {y}): {actual} vs {expected}"
            );
            if actual.x > 0.0 {
                lit += 1;
            }
        }
    }
    assert!(lit > 0, "live flares should light the buffer");
}

#[test]
fn inactive_and_behind_camera_flares_add_nothing() {
    let mut registry = FlareRegistry::new();
    registry.push(Flare::new(Vec3::new(0.0, 0.0, 20.0)));
    registry.push(Flare::new(Vec3::ZERO).with_opacity(0.0));
    let mut hidden = Flare::new(Vec3::new(1.0, 0.0, 0.0));
    hidden.visible = false;
    registry.push(hidden);

    let mut renderer = ReferenceRenderer::new(SIZE, SIZE, settings(true)).expect("valid settings");
    let mut scene = sky();
    let (frame, output) = run(&mut renderer, &mut registry, &mut scene, DepthConvention::Standard);

    assert_eq!(renderer.readouts().len(), 1);
    assert!(!registry.get(0).expect("first flare").is_within_depth_range());
    assert_eq!(output, frame.color);
}

#[test]
fn frame_leaves_host_scene_untouched() {
    let mut scene = sky();
    scene.push(panel(3.0, Vec4::new(0.2, 0.6, 0.9, 0.4), ObjectFlags::translucent(true)));
    let mut hidden = ObjectFlags::translucent(false);
    hidden.visible = false;
    scene.push(panel(2.0, Vec4::ONE, hidden));
    scene.set_render_state(RenderState {
        background_enabled: true,
        clear_color: [0.1, 0.2, 0.3, 1.0],
        auto_clear_depth: true,
    });
    let before = scene.clone();

    let mut renderer = ReferenceRenderer::new(SIZE, SIZE, settings(true)).expect("valid settings");
    let mut registry = single_flare();
    let appearance = registry.get(0).expect("flare").color_gain;
    run(&mut renderer, &mut registry, &mut scene, DepthConvention::Standard);

    assert_eq!(scene.objects(), before.objects());
    assert_eq!(scene.render_state(), before.render_state());
    assert_eq!(registry.get(0).expect("flare").color_gain, appearance);
}
