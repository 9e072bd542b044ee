//! Procedural flare field: glare disc, starburst blades, ghost spots, halo
//! rings, hexagonal ghosts and streak highlights.
//!
//! Coordinates follow the flare buffer: `uv` is centered on the screen with
//! `y` scaled by the aspect ratio, and `pos` is the flare in the same space.

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

use crate::batch::{BATCH_WIDTH, FlareBatch};
use crate::flare::Flare;
use crate::occlusion::OcclusionReadout;
use crate::raster::Raster;

/// Gain applied to the procedural field before tinting.
pub const FLARE_INTENSITY: f32 = 5.0;

/// Number of streak highlights along the flare axis.
pub const STREAK_COUNT: usize = 10;

/// Hue offset of the single blade layer.
const BLADE_HUE_OFFSET: f32 = (1.0 / 32.0) * 0.1;

/// Radial decay rate of the blade gradient.
const BLADE_FALLOFF: f32 = 0.1 * 0.66 + 0.33;

struct GhostSpot {
    offset: f32,
    exponent: f32,
    threshold: f32,
    gain: f32,
}

const fn spot(offset: f32, exponent: f32, threshold: f32, gain: f32) -> GhostSpot {
    GhostSpot {
        offset,
        exponent,
        threshold,
        gain,
    }
}

/// Ghost spots grouped by lens warp, one spot per RGB channel.
const GHOST_SPOTS: [(f32, [GhostSpot; 3]); 3] = [
    (
        0.1,
        [
            spot(0.4, 2.9, 0.01, 4.02),
            spot(0.45, 2.9, 0.0, 4.1),
            spot(0.5, 2.9, 0.01, 4.6),
        ],
    ),
    (
        -0.4,
        [
            spot(0.1, 5.5, 0.01, 2.0),
            spot(0.2, 5.5, 0.01, 2.0),
            spot(0.1, 5.5, 0.01, 2.0),
        ],
    ),
    (
        2.1,
        [
            spot(-0.3, 1.61, 0.01, 3.159),
            spot(-0.325, 1.614, 0.01, 3.14),
            spot(-0.389, 1.623, 0.01, 3.12),
        ],
    ),
];

/// Chromatic halo rings per RGB channel: (falloff base, offset, gain).
const HALO_RINGS: [(f32, f32, f32); 3] = [(10.0, 0.99, 0.35), (11.0, 0.85, 0.23), (12.0, 0.95, 0.6)];

/// Hexagonal ghosts: (position along the flare axis in NDC, size factor).
const HEX_GHOSTS: [(f32, f32); 6] = [
    (-0.25, 1.4),
    (0.25, 0.5),
    (0.1, 1.6),
    (1.8, 2.0),
    (1.25, 0.8),
    (-1.25, 5.0),
];

/// Per-pass inputs of the flare shader.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadingParams {
    /// Flare buffer size in pixels.
    pub resolution: Vec2,
    /// Seconds, drives the hue rotation of animated flares.
    pub time: f32,
}

fn fract(x: f32) -> f32 {
    x - x.floor()
}

fn fract3(v: Vec3) -> Vec3 {
    v - v.floor()
}

fn saturate(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = saturate((x - edge0) / (edge1 - edge0));
    t * t * (3.0 - 2.0 * t)
}

/// Scalar hash in `[0, 1)`.
pub(crate) fn hash1(n: f32) -> f32 {
    fract(n.sin() * 43758.545_312_3)
}

fn value_noise(p: f32) -> f32 {
    let cell = p.floor();
    let t = fract(p);
    hash1(cell) + (hash1(cell + 1.0) - hash1(cell)) * t
}

fn hsv_to_rgb(c: Vec3) -> Vec3 {
    let k = Vec4::new(1.0, 2.0 / 3.0, 1.0 / 3.0, 3.0);
    let p = (fract3(Vec3::splat(c.x) + k.xyz()) * 6.0 - Vec3::splat(k.w)).abs();
    c.z * Vec3::ONE.lerp((p - Vec3::ONE).clamp(Vec3::ZERO, Vec3::ONE), c.y)
}

fn rotate(uv: Vec2, angle: f32) -> Vec2 {
    let (sin, cos) = angle.sin_cos();
    Vec2::new(cos * uv.x + sin * uv.y, cos * uv.y - sin * uv.x)
}

/// Soft `x^n` stand-in: zero below `k`, quadratic ramp above.
fn soft_pow(x: f32, k: f32) -> f32 {
    if x > k {
        ((x - k) / (1.0 - k)).powi(2)
    } else {
        0.0
    }
}

fn hex_distance(p: Vec2) -> f32 {
    let p = p.abs();
    let q = Vec2::new(p.x * 2.0 * 0.577_350_3, p.y + p.x * 0.577_350_3);
    let step_x = if q.y >= q.x { 1.0 } else { 0.0 };
    let step_y = if q.x >= q.y { 1.0 } else { 0.0 };
    step_x * (1.0 - q.y) + step_y * (1.0 - q.x)
}

fn hex_ghost(uv: Vec2, center: Vec2, size: f32, color: Vec3) -> Vec3 {
    let local = uv - center;
    let half_extent = 0.2 * size;
    if local.x.abs() >= half_extent || local.y.abs() >= half_extent {
        return Vec3::ZERO;
    }
    let body = 0.1 + soft_pow((local / size).length(), 0.1) * 10.0;
    color * body * smoothstep(0.0, 0.1, hex_distance(local * 20.0 / size))
}

fn glare(flare: &Flare, uv: Vec2, pos: Vec2) -> f32 {
    let main = uv - pos;
    let lobes = if flare.anamorphic {
        1.0
    } else {
        flare.star_points
    };
    let angle = main.y.atan2(main.x) * lobes;
    let size = flare.glare_size.max(1e-4);
    let f0 = 1.0 / (main.length() * (16.0 / size) + 0.2);
    f0 + f0 * (angle.sin() * 0.2 + 0.3)
}

fn blades(flare: &Flare, p: Vec2, intensity: f32, hue_shift: f32) -> Vec3 {
    let expgrad = (-p.length() * BLADE_FALLOFF).exp();
    let gradient = hsv_to_rgb(Vec3::new(
        fract(expgrad * 8.0 + hue_shift * flare.flare_speed + BLADE_HUE_OFFSET),
        (1.0 - (expgrad * 2.0 - 1.0).abs()).powf(0.45),
        20.0 * expgrad * intensity,
    ));

    let (points, sharpness) = if flare.anamorphic {
        (1.0, 100.0)
    } else {
        (flare.star_points, 12.0)
    };
    let blade = p.length() * (flare.flare_shape * (points * p.x.atan2(p.y)).sin()).abs();

    let mut comp = (1.0 - saturate(blade)).powf(sharpness);
    comp += saturate(expgrad - 0.9) * 3.0;
    comp = (comp * expgrad).powf(8.0 + (1.0 - intensity) * 5.0);

    if flare.flare_speed > 0.0 {
        gradient * comp
    } else {
        Vec3::splat(comp * flare.flare_size * 15.0)
    }
}

/// Untinted field of one flare at `uv`.
pub fn flare_field(flare: &Flare, uv: Vec2, pos: Vec2, time: f32) -> Vec3 {
    let main = uv - pos;
    let uvd = uv * uv.length();
    let angle = main.x.atan2(main.y);

    let f0 = 0.3 / (main.length() * 16.0 + 1.0)
        * ((value_noise((angle * 3.9).sin() * flare.star_points)).sin() * 0.2);
    let f1 = (0.01 - (uv + 1.2 * pos).length().powf(1.9)).max(0.0) * 7.0;

    let mut c = Vec3::splat(glare(flare, uv, pos));

    if flare.star_burst {
        let (p, size) = if flare.anamorphic {
            (rotate(main, std::f32::consts::FRAC_PI_2), flare.flare_size * 10.0)
        } else {
            (main, flare.flare_size)
        };
        let hue_shift = if flare.animated { time } else { 0.0 };
        c += blades(flare, p, size, hue_shift);
    }

    let mut ghosts = Vec3::splat(f1);
    for (channel, &(base, offset, gain)) in HALO_RINGS.iter().enumerate() {
        ghosts[channel] += (0.9 / (base + 32.0 * (uvd + offset * pos).length_squared())).max(0.0) * gain;
    }
    for (warp, spots) in &GHOST_SPOTS {
        let uvx = uv.lerp(uvd, *warp);
        for (channel, spot) in spots.iter().enumerate() {
            ghosts[channel] += (spot.threshold
                - (uvx + spot.offset * pos).length().powf(spot.exponent))
            .max(0.0)
                * spot.gain;
        }
    }
    c += ghosts;

    c * 1.3 * (uvd.length() + 0.09) + Vec3::splat(f0)
}

/// Full tinted contribution of one flare at buffer coordinate `uv`, before
/// occlusion and opacity.
pub fn flare_color(flare: &Flare, screen: Vec3, uv: Vec2, params: &ShadingParams) -> Vec3 {
    let aspect = params.resolution.y / params.resolution.x.max(1.0);
    let mut centered = uv - 0.5;
    centered.y *= aspect;
    let mut pos = screen.truncate() - 0.5;
    pos.y *= aspect;

    let mut color = flare_field(flare, centered, pos, params.time) * FLARE_INTENSITY * flare.color_gain;
    let ndc = screen.truncate() * 2.0 - 1.0;

    if flare.additional_streaks {
        let tint = flare.color_gain.lerp(Vec3::ONE, 0.3);
        for j in 0..STREAK_COUNT {
            let j = j as f32;
            let center = pos * 0.5 * (j - 5.0 + hash1(j + 10.0));
            let falloff = (1.0 / (1.0 + centered.distance(center))).powf(512.0);
            color += tint * falloff * hash1(j + 100.0);
        }
    }

    if flare.secondary_ghosts {
        let mut ghosts = Vec3::splat(0.1);
        for &(along, size) in &HEX_GHOSTS {
            ghosts += hex_ghost(centered, ndc * along, flare.ghost_scale * size, flare.color_gain);
        }
        let halo = flare.halo_scale * 2.0;
        ghosts += Vec3::splat(0.1)
            * soft_pow(1.0 - ((ndc * 0.8).distance(centered) - 0.5 * halo).abs(), 0.985);
        ghosts += Vec3::splat(0.05)
            * soft_pow(1.0 - ((ndc * 0.4).distance(centered) - 0.2 * halo).abs(), 0.994);
        color += ghosts;
    }

    color
}

/// Occlusion- and opacity-weighted contribution of one flare, clamped to `[0, 1]`.
///
/// Zero when the flare is fully occluded or its depth lies outside the view
/// volume. The attenuated colour is scaled by `0.5 * red - 0.075` of the raw
/// colour, so flares without enough red in them add nothing.
pub fn shade_flare(flare: &Flare, occlusion: f32, uv: Vec2, params: &ShadingParams) -> Vec3 {
    let screen = flare.screen_position();
    if occlusion >= 1.0 || !flare.is_within_depth_range() {
        return Vec3::ZERO;
    }
    let color = flare_color(flare, screen, uv, params);
    let gate = 0.5 * color.x - 0.075;
    (color * (1.0 - occlusion) * gate).clamp(Vec3::ZERO, Vec3::ONE) * flare.opacity
}

/// Sum of the live flares of `batch` at `uv`.
pub fn shade_pixel(
    batch: &FlareBatch<'_>,
    readout: &OcclusionReadout,
    uv: Vec2,
    params: &ShadingParams,
) -> Vec3 {
    (0..BATCH_WIDTH)
        .filter(|&slot| !batch.is_padding(slot))
        .map(|slot| shade_flare(batch.slots()[slot], readout.channel(slot), uv, params))
        .sum()
}

/// Additively accumulate one batch into `target`; alpha is set to 1.
pub fn shade_batch(
    batch: &FlareBatch<'_>,
    readout: &OcclusionReadout,
    params: &ShadingParams,
    target: &mut Raster<Vec4>,
) {
    for y in 0..target.height() {
        for x in 0..target.width() {
            let uv = target.texel_center(x, y);
            let added = shade_pixel(batch, readout, uv, params);
            let previous = target.get(x, y);
            target.set(x, y, (previous.xyz() + added).extend(1.0));
        }
    }
}
