//! Bicubic upsampling of the flare buffer and additive compositing.

use glam::{Vec2, Vec4, Vec4Swizzles};

use crate::raster::Raster;

// Cubic B-spline basis.
fn w0(a: f32) -> f32 {
    (1.0 / 6.0) * (a * (a * (-a + 3.0) - 3.0) + 1.0)
}

fn w1(a: f32) -> f32 {
    (1.0 / 6.0) * (a * a * (3.0 * a - 6.0) + 4.0)
}

fn w2(a: f32) -> f32 {
    (1.0 / 6.0) * (a * (a * (-3.0 * a + 3.0) + 3.0) + 1.0)
}

fn w3(a: f32) -> f32 {
    (1.0 / 6.0) * (a * a * a)
}

/// Amplitudes of the two bilinear taps per axis.
fn amplitudes(a: f32) -> (f32, f32) {
    (w0(a) + w1(a), w2(a) + w3(a))
}

/// Texel offsets of the two bilinear taps per axis.
fn offsets(a: f32) -> (f32, f32) {
    (
        -1.0 + w1(a) / (w0(a) + w1(a)),
        1.0 + w3(a) / (w2(a) + w3(a)),
    )
}

/// Cubic B-spline reconstruction from four bilinear taps.
pub fn sample_bicubic(texture: &Raster<Vec4>, uv: Vec2) -> Vec4 {
    let size = Vec2::new(texture.width() as f32, texture.height() as f32);
    let texel = size.recip();

    let st = uv * size + 0.5;
    let base = st.floor();
    let frac = st - base;

    let (g0x, g1x) = amplitudes(frac.x);
    let (g0y, g1y) = amplitudes(frac.y);
    let (h0x, h1x) = offsets(frac.x);
    let (h0y, h1y) = offsets(frac.y);

    let tap = |hx: f32, hy: f32| {
        let p = (Vec2::new(base.x + hx, base.y + hy) - 0.5) * texel;
        texture.sample_bilinear(p)
    };

    (tap(h0x, h0y) * g0x + tap(h1x, h0y) * g1x) * g0y
        + (tap(h0x, h1y) * g0x + tap(h1x, h1y) * g1x) * g1y
}

/// `output = scene + bicubic(flare)`; the scene alpha is kept.
///
/// `output` takes the scene's dimensions.
pub fn composite(scene: &Raster<Vec4>, flare: &Raster<Vec4>, output: &mut Raster<Vec4>) {
    output.reset(scene.width(), scene.height(), Vec4::ZERO);
    for y in 0..scene.height() {
        for x in 0..scene.width() {
            let glow = sample_bicubic(flare, scene.texel_center(x, y));
            let base = scene.get(x, y);
            output.set(x, y, (base.xyz() + glow.xyz()).extend(base.w));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_scene(width: u32, height: u32) -> Raster<Vec4> {
        let mut scene = Raster::new(width, height, Vec4::ZERO);
        for y in 0..height {
            for x in 0..width {
                scene.set(
                    x,
                    y,
                    Vec4::new(x as f32 / width as f32, y as f32 / height as f32, 0.25, 0.5),
                );
            }
        }
        scene
    }

    #[test]
    fn test_weights_partition_unity() {
        for i in 0..=10 {
            let a = i as f32 / 10.0;
            let sum = w0(a) + w1(a) + w2(a) + w3(a);
            assert!((sum - 1.0).abs() < 1e-6, "weights at {a} sum to {sum}");
        }
    }

    #[test]
    fn test_zero_flare_is_additive_identity() {
        let scene = gradient_scene(17, 9);
        let flare = Raster::new(8, 4, Vec4::ZERO);
        let mut output = Raster::new(1, 1, Vec4::ZERO);
        composite(&scene, &flare, &mut output);
        assert_eq!(output, scene);
    }

    #[test]
    fn test_constant_flare_adds_constant() {
        let scene = gradient_scene(16, 16);
        let flare = Raster::new(8, 8, Vec4::new(0.1, 0.2, 0.3, 1.0));
        let mut output = Raster::new(1, 1, Vec4::ZERO);
        composite(&scene, &flare, &mut output);
        for y in 0..16 {
            for x in 0..16 {
                let diff = output.get(x, y) - scene.get(x, y);
                assert!(
                    (diff - Vec4::new(0.1, 0.2, 0.3, 0.0)).abs().max_element() < 1e-5,
                    "({x}, {y}) added {diff}"
                );
            }
        }
    }

    #[test]
    fn test_bicubic_spreads_single_texel_smoothly() {
        let mut flare = Raster::new(8, 8, Vec4::ZERO);
        flare.set(4, 4, Vec4::ONE);
        let center = sample_bicubic(&flare, flare.texel_center(4, 4));
        let neighbour = sample_bicubic(&flare, flare.texel_center(5, 4));
        let far = sample_bicubic(&flare, flare.texel_center(7, 4));
        assert!((center.x - 4.0 / 9.0).abs() < 1e-4, "center {}", center.x);
        assert!(neighbour.x > 0.0 && neighbour.x < center.x);
        assert!(far.x.abs() < 1e-6);
    }
}
