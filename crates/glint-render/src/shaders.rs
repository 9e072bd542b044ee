//! WGSL sources of every lens flare pass.
//!
//! Each pass module is compiled as [`COMMON_SHADER_SOURCE`] followed by its own
//! source, so the uniform layouts and the fullscreen vertex stage are written
//! once. The math mirrors `glint_flare::{occlusion, shading, composite}`.

/// Uniform layouts, depth helpers and the fullscreen triangle.
pub const COMMON_SHADER_SOURCE: &str = r#"
struct FrameUniform {
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    view_projection: mat4x4<f32>,
    camera_position: vec4<f32>,
    // coverage radius, transparency aware, reverse depth, time
    params: vec4<f32>,
    flare_resolution: vec4<f32>,
};

struct GpuFlare {
    position: vec4<f32>,
    screen: vec4<f32>,
    color_gain: vec4<f32>,
    shape: vec4<f32>,
    scales: vec4<f32>,
    flags: vec4<u32>,
};

struct BatchUniform {
    flares: array<GpuFlare, 4>,
    live: vec4<u32>,
};

@group(0) @binding(0) var<uniform> frame: FrameUniform;
@group(0) @binding(1) var<uniform> batch: BatchUniform;

struct FullscreenOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_fullscreen(@builtin(vertex_index) idx: u32) -> FullscreenOutput {
    let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
    var out: FullscreenOutput;
    out.position = vec4<f32>(uv * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(uv.x, 1.0 - uv.y);
    return out;
}

fn is_reverse_depth() -> bool {
    return frame.params.z > 0.5;
}

fn is_nearer(depth: f32, reference: f32) -> bool {
    if is_reverse_depth() {
        return depth > reference;
    }
    return depth < reference;
}

fn push_farther(depth: f32, epsilon: f32) -> f32 {
    if is_reverse_depth() {
        return depth - epsilon;
    }
    return depth + epsilon;
}

// Texel of `uv` in a texture of `dims`, clamped to the edge.
fn texel_of(uv: vec2<f32>, dims: vec2<u32>) -> vec2<i32> {
    let size = vec2<i32>(dims);
    return clamp(vec2<i32>(floor(uv * vec2<f32>(dims))), vec2<i32>(0), size - 1);
}
"#;

/// Depth seed and flare proxy discs of the transparency capture.
pub const CAPTURE_SHADER_SOURCE: &str = r#"
const DEPTH_SEED_EPSILON: f32 = 1e-5;
const PROXY_SEGMENTS: u32 = 32u;
const TAU: f32 = 6.283185307;

@group(1) @binding(0) var scene_depth: texture_depth_2d;
@group(1) @binding(1) var<storage, read> proxies: array<mat4x4<f32>>;

struct SeedOutput {
    @location(0) color: vec4<f32>,
    @builtin(frag_depth) depth: f32,
};

@fragment
fn fs_seed_depth(in: FullscreenOutput) -> SeedOutput {
    let coord = texel_of(in.uv, textureDimensions(scene_depth));
    let depth = textureLoad(scene_depth, coord, 0);
    var out: SeedOutput;
    out.color = vec4<f32>(0.0);
    out.depth = clamp(push_farther(depth, DEPTH_SEED_EPSILON), 0.0, 1.0);
    return out;
}

// Triangle fan of a unit disc in the local XY plane, one instance per proxy.
@vertex
fn vs_proxy(@builtin(vertex_index) vid: u32, @builtin(instance_index) iid: u32) -> @builtin(position) vec4<f32> {
    let segment = vid / 3u;
    let corner = vid % 3u;
    var disc = vec2<f32>(0.0);
    if corner != 0u {
        let angle = f32(segment + corner - 1u) * (TAU / f32(PROXY_SEGMENTS));
        disc = vec2<f32>(cos(angle), sin(angle));
    }
    let world = proxies[iid] * vec4<f32>(disc, 0.0, 1.0);
    return frame.view_projection * world;
}

@fragment
fn fs_proxy() -> @location(0) vec4<f32> {
    return vec4<f32>(0.0);
}
"#;

/// One stochastic occlusion sample per texel and per batch slot.
pub const COVERAGE_SHADER_SOURCE: &str = r#"
const DEPTH_MATCH_TOLERANCE: f32 = 1e-6;
const TAU: f32 = 6.283185307;

@group(1) @binding(0) var scene_depth: texture_depth_2d;
@group(1) @binding(1) var non_depth_writing: texture_2d<f32>;
@group(1) @binding(2) var depth_writing: texture_2d<f32>;
@group(1) @binding(3) var depth_writing_depth: texture_depth_2d;

fn screen_hash(coord: vec2<f32>) -> f32 {
    return fract(sin(dot(coord, vec2<f32>(12.9898, 4.1414))) * 43758.5453);
}

fn sample_offset(frag_coord: vec2<f32>) -> vec3<f32> {
    let radius = screen_hash(frag_coord);
    let angle = screen_hash(frag_coord + 1000.0) * TAU;
    return vec3<f32>(radius * cos(angle), radius * sin(angle), 0.0);
}

fn occlusion_sample(view_position: vec3<f32>, offset: vec3<f32>) -> f32 {
    let jittered = view_position + offset * frame.params.x;
    let clip = frame.projection * vec4<f32>(jittered, 1.0);
    if clip.w <= 1.1920929e-7 {
        return 1.0;
    }
    let ndc = clip.xyz / clip.w;
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    if any(uv < vec2<f32>(0.0)) || any(uv > vec2<f32>(1.0)) {
        return 1.0;
    }

    let aware = frame.params.y > 0.5;
    let scene = textureLoad(scene_depth, texel_of(uv, textureDimensions(scene_depth)), 0);

    var occlusion = 0.0;
    if is_nearer(scene, ndc.z) {
        occlusion = 1.0;
        if aware {
            let coord = texel_of(uv, textureDimensions(depth_writing_depth));
            let captured = textureLoad(depth_writing_depth, coord, 0);
            if abs(captured - scene) <= DEPTH_MATCH_TOLERANCE {
                occlusion = textureLoad(depth_writing, coord, 0).a;
            }
        }
    }
    if aware {
        let coord = texel_of(uv, textureDimensions(non_depth_writing));
        occlusion = max(occlusion, textureLoad(non_depth_writing, coord, 0).a);
    }
    return occlusion;
}

@fragment
fn fs_coverage(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let offset = sample_offset(in.position.xy);
    var result = vec4<f32>(1.0);
    for (var slot = 0u; slot < 4u; slot++) {
        if slot < batch.live.x {
            let view_position = (frame.view * vec4<f32>(batch.flares[slot].position.xyz, 1.0)).xyz;
            result[slot] = occlusion_sample(view_position, offset);
        }
    }
    return result;
}
"#;

/// 2×2 box filter from one mip level of the coverage target to the next.
pub const DOWNSAMPLE_SHADER_SOURCE: &str = r#"
@group(1) @binding(0) var source: texture_2d<f32>;

@fragment
fn fs_downsample(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let last = vec2<i32>(textureDimensions(source)) - 1;
    let base = vec2<i32>(in.position.xy) * 2;
    var sum = vec4<f32>(0.0);
    for (var dy = 0; dy < 2; dy++) {
        for (var dx = 0; dx < 2; dx++) {
            sum += textureLoad(source, min(base + vec2<i32>(dx, dy), last), 0);
        }
    }
    return sum * 0.25;
}
"#;

/// Procedural flare field of one batch, attenuated by its occlusion readout.
pub const FLARE_SHADER_SOURCE: &str = r#"
const FLARE_INTENSITY: f32 = 5.0;
const STREAK_COUNT: u32 = 10u;
const BLADE_HUE_OFFSET: f32 = 0.003125;
const BLADE_FALLOFF: f32 = 0.396;
const HALF_PI: f32 = 1.5707963;

const ANAMORPHIC: u32 = 1u;
const SECONDARY_GHOSTS: u32 = 2u;
const ADDITIONAL_STREAKS: u32 = 4u;
const STAR_BURST: u32 = 8u;
const ANIMATED: u32 = 16u;

// Smallest mip of the coverage target: one texel holding the batch readout.
@group(1) @binding(0) var coverage: texture_2d<f32>;

fn has_flag(flare: GpuFlare, bit: u32) -> bool {
    return (flare.flags.x & bit) != 0u;
}

fn hash1(n: f32) -> f32 {
    return fract(sin(n) * 43758.5453123);
}

fn value_noise(p: f32) -> f32 {
    let cell = floor(p);
    let t = fract(p);
    return hash1(cell) + (hash1(cell + 1.0) - hash1(cell)) * t;
}

fn hsv_to_rgb(c: vec3<f32>) -> vec3<f32> {
    let k = vec4<f32>(1.0, 2.0 / 3.0, 1.0 / 3.0, 3.0);
    let p = abs(fract(c.xxx + k.xyz) * 6.0 - k.www);
    return c.z * mix(vec3<f32>(1.0), clamp(p - vec3<f32>(1.0), vec3<f32>(0.0), vec3<f32>(1.0)), c.y);
}

fn rotate(uv: vec2<f32>, angle: f32) -> vec2<f32> {
    let s = sin(angle);
    let c = cos(angle);
    return vec2<f32>(c * uv.x + s * uv.y, c * uv.y - s * uv.x);
}

fn soft_pow(x: f32, k: f32) -> f32 {
    if x > k {
        let t = (x - k) / (1.0 - k);
        return t * t;
    }
    return 0.0;
}

fn hex_distance(p_in: vec2<f32>) -> f32 {
    let p = abs(p_in);
    let q = vec2<f32>(p.x * 2.0 * 0.5773503, p.y + p.x * 0.5773503);
    let step_x = select(0.0, 1.0, q.y >= q.x);
    let step_y = select(0.0, 1.0, q.x >= q.y);
    return step_x * (1.0 - q.y) + step_y * (1.0 - q.x);
}

fn hex_ghost(uv: vec2<f32>, center: vec2<f32>, size: f32, color: vec3<f32>) -> vec3<f32> {
    let offset = uv - center;
    let half_extent = 0.2 * size;
    if abs(offset.x) >= half_extent || abs(offset.y) >= half_extent {
        return vec3<f32>(0.0);
    }
    let body = 0.1 + soft_pow(length(offset / size), 0.1) * 10.0;
    return color * body * smoothstep(0.0, 0.1, hex_distance(offset * 20.0 / size));
}

fn glare(flare: GpuFlare, uv: vec2<f32>, pos: vec2<f32>) -> f32 {
    let main = uv - pos;
    var lobes = flare.color_gain.w;
    if has_flag(flare, ANAMORPHIC) {
        lobes = 1.0;
    }
    let angle = atan2(main.y, main.x) * lobes;
    let size = max(flare.shape.x, 1e-4);
    let f0 = 1.0 / (length(main) * (16.0 / size) + 0.2);
    return f0 + f0 * (sin(angle) * 0.2 + 0.3);
}

fn blades(flare: GpuFlare, p: vec2<f32>, intensity: f32, hue_shift: f32) -> vec3<f32> {
    let speed = flare.shape.z;
    let expgrad = exp(-length(p) * BLADE_FALLOFF);
    let gradient = hsv_to_rgb(vec3<f32>(
        fract(expgrad * 8.0 + hue_shift * speed + BLADE_HUE_OFFSET),
        pow(1.0 - abs(expgrad * 2.0 - 1.0), 0.45),
        20.0 * expgrad * intensity,
    ));

    var points = flare.color_gain.w;
    var sharpness = 12.0;
    if has_flag(flare, ANAMORPHIC) {
        points = 1.0;
        sharpness = 100.0;
    }
    let blade = length(p) * abs(flare.shape.w * sin(points * atan2(p.x, p.y)));

    var comp = pow(1.0 - saturate(blade), sharpness);
    comp += saturate(expgrad - 0.9) * 3.0;
    comp = pow(comp * expgrad, 8.0 + (1.0 - intensity) * 5.0);

    if speed > 0.0 {
        return gradient * comp;
    }
    return vec3<f32>(comp * flare.shape.y * 15.0);
}

fn ghost_spot(uvx: vec2<f32>, pos: vec2<f32>, offset: f32, exponent: f32, threshold: f32, gain: f32) -> f32 {
    return max(threshold - pow(length(uvx + offset * pos), exponent), 0.0) * gain;
}

fn halo_ring(uvd: vec2<f32>, pos: vec2<f32>, base: f32, offset: f32, gain: f32) -> f32 {
    let v = uvd + offset * pos;
    return max(0.9 / (base + 32.0 * dot(v, v)), 0.0) * gain;
}

fn flare_field(flare: GpuFlare, uv: vec2<f32>, pos: vec2<f32>, time: f32) -> vec3<f32> {
    let main = uv - pos;
    let uvd = uv * length(uv);
    let angle = atan2(main.x, main.y);

    let f0 = 0.3 / (length(main) * 16.0 + 1.0)
        * (sin(value_noise(sin(angle * 3.9) * flare.color_gain.w)) * 0.2);
    let f1 = max(0.01 - pow(length(uv + 1.2 * pos), 1.9), 0.0) * 7.0;

    var c = vec3<f32>(glare(flare, uv, pos));

    if has_flag(flare, STAR_BURST) {
        var p = main;
        var size = flare.shape.y;
        if has_flag(flare, ANAMORPHIC) {
            p = rotate(main, HALF_PI);
            size = flare.shape.y * 10.0;
        }
        var hue_shift = 0.0;
        if has_flag(flare, ANIMATED) {
            hue_shift = time;
        }
        c += blades(flare, p, size, hue_shift);
    }

    var ghosts = vec3<f32>(f1);
    ghosts += vec3<f32>(
        halo_ring(uvd, pos, 10.0, 0.99, 0.35),
        halo_ring(uvd, pos, 11.0, 0.85, 0.23),
        halo_ring(uvd, pos, 12.0, 0.95, 0.6),
    );

    let uvx0 = mix(uv, uvd, 0.1);
    ghosts += vec3<f32>(
        ghost_spot(uvx0, pos, 0.4, 2.9, 0.01, 4.02),
        ghost_spot(uvx0, pos, 0.45, 2.9, 0.0, 4.1),
        ghost_spot(uvx0, pos, 0.5, 2.9, 0.01, 4.6),
    );
    let uvx1 = mix(uv, uvd, -0.4);
    ghosts += vec3<f32>(
        ghost_spot(uvx1, pos, 0.1, 5.5, 0.01, 2.0),
        ghost_spot(uvx1, pos, 0.2, 5.5, 0.01, 2.0),
        ghost_spot(uvx1, pos, 0.1, 5.5, 0.01, 2.0),
    );
    let uvx2 = mix(uv, uvd, 2.1);
    ghosts += vec3<f32>(
        ghost_spot(uvx2, pos, -0.3, 1.61, 0.01, 3.159),
        ghost_spot(uvx2, pos, -0.325, 1.614, 0.01, 3.14),
        ghost_spot(uvx2, pos, -0.389, 1.623, 0.01, 3.12),
    );
    c += ghosts;

    return c * 1.3 * (length(uvd) + 0.09) + vec3<f32>(f0);
}

fn flare_color(flare: GpuFlare, uv: vec2<f32>) -> vec3<f32> {
    let resolution = frame.flare_resolution.xy;
    let aspect = resolution.y / max(resolution.x, 1.0);
    var centered = uv - 0.5;
    centered.y *= aspect;
    var pos = flare.screen.xy - 0.5;
    pos.y *= aspect;

    let gain = flare.color_gain.rgb;
    var color = flare_field(flare, centered, pos, frame.params.w) * FLARE_INTENSITY * gain;
    let ndc = flare.screen.xy * 2.0 - 1.0;

    if has_flag(flare, ADDITIONAL_STREAKS) {
        let tint = mix(gain, vec3<f32>(1.0), 0.3);
        for (var i = 0u; i < STREAK_COUNT; i++) {
            let j = f32(i);
            let center = pos * 0.5 * (j - 5.0 + hash1(j + 10.0));
            let falloff = pow(1.0 / (1.0 + distance(centered, center)), 512.0);
            color += tint * falloff * hash1(j + 100.0);
        }
    }

    if has_flag(flare, SECONDARY_GHOSTS) {
        let scale = flare.scales.y;
        var ghosts = vec3<f32>(0.1);
        ghosts += hex_ghost(centered, ndc * -0.25, scale * 1.4, gain);
        ghosts += hex_ghost(centered, ndc * 0.25, scale * 0.5, gain);
        ghosts += hex_ghost(centered, ndc * 0.1, scale * 1.6, gain);
        ghosts += hex_ghost(centered, ndc * 1.8, scale * 2.0, gain);
        ghosts += hex_ghost(centered, ndc * 1.25, scale * 0.8, gain);
        ghosts += hex_ghost(centered, ndc * -1.25, scale * 5.0, gain);
        let halo = flare.scales.x * 2.0;
        ghosts += vec3<f32>(0.1) * soft_pow(1.0 - abs(distance(ndc * 0.8, centered) - 0.5 * halo), 0.985);
        ghosts += vec3<f32>(0.05) * soft_pow(1.0 - abs(distance(ndc * 0.4, centered) - 0.2 * halo), 0.994);
        color += ghosts;
    }

    return color;
}

fn shade_flare(flare: GpuFlare, occlusion: f32, uv: vec2<f32>) -> vec3<f32> {
    let depth = flare.screen.z;
    if occlusion >= 1.0 || depth < 0.0 || depth > 1.0 {
        return vec3<f32>(0.0);
    }
    let color = flare_color(flare, uv);
    let gate = 0.5 * color.r - 0.075;
    return clamp(color * (1.0 - occlusion) * gate, vec3<f32>(0.0), vec3<f32>(1.0)) * flare.position.w;
}

@fragment
fn fs_flare(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let readout = textureLoad(coverage, vec2<i32>(0), 0);
    var color = vec3<f32>(0.0);
    for (var slot = 0u; slot < 4u; slot++) {
        if slot < batch.live.x {
            color += shade_flare(batch.flares[slot], readout[slot], in.uv);
        }
    }
    return vec4<f32>(color, 1.0);
}
"#;

/// Scene color plus the B-spline upsampled flare buffer.
pub const COMPOSITE_SHADER_SOURCE: &str = r#"
@group(1) @binding(0) var scene_color: texture_2d<f32>;
@group(1) @binding(1) var flare_buffer: texture_2d<f32>;
@group(1) @binding(2) var flare_sampler: sampler;

fn w0(a: f32) -> f32 { return (1.0 / 6.0) * (a * (a * (-a + 3.0) - 3.0) + 1.0); }
fn w1(a: f32) -> f32 { return (1.0 / 6.0) * (a * a * (3.0 * a - 6.0) + 4.0); }
fn w2(a: f32) -> f32 { return (1.0 / 6.0) * (a * (a * (-3.0 * a + 3.0) + 3.0) + 1.0); }
fn w3(a: f32) -> f32 { return (1.0 / 6.0) * (a * a * a); }

fn sample_bicubic(uv: vec2<f32>) -> vec4<f32> {
    let size = vec2<f32>(textureDimensions(flare_buffer));
    let texel = 1.0 / size;

    let st = uv * size + 0.5;
    let base = floor(st);
    let f = st - base;

    let g0 = vec2<f32>(w0(f.x) + w1(f.x), w0(f.y) + w1(f.y));
    let g1 = vec2<f32>(w2(f.x) + w3(f.x), w2(f.y) + w3(f.y));
    let h0 = vec2<f32>(-1.0 + w1(f.x) / g0.x, -1.0 + w1(f.y) / g0.y);
    let h1 = vec2<f32>(1.0 + w3(f.x) / g1.x, 1.0 + w3(f.y) / g1.y);

    let p00 = (base + vec2<f32>(h0.x, h0.y) - 0.5) * texel;
    let p10 = (base + vec2<f32>(h1.x, h0.y) - 0.5) * texel;
    let p01 = (base + vec2<f32>(h0.x, h1.y) - 0.5) * texel;
    let p11 = (base + vec2<f32>(h1.x, h1.y) - 0.5) * texel;

    let top = textureSampleLevel(flare_buffer, flare_sampler, p00, 0.0) * g0.x
        + textureSampleLevel(flare_buffer, flare_sampler, p10, 0.0) * g1.x;
    let bottom = textureSampleLevel(flare_buffer, flare_sampler, p01, 0.0) * g0.x
        + textureSampleLevel(flare_buffer, flare_sampler, p11, 0.0) * g1.x;
    return top * g0.y + bottom * g1.y;
}

@fragment
fn fs_composite(in: FullscreenOutput) -> @location(0) vec4<f32> {
    let base = textureLoad(scene_color, texel_of(in.uv, textureDimensions(scene_color)), 0);
    let glow = sample_bicubic(in.uv);
    return vec4<f32>(base.rgb + glow.rgb, base.a);
}
"#;

/// Full source of one pass module.
pub fn pass_source(body: &str) -> String {
    let mut source = String::with_capacity(COMMON_SHADER_SOURCE.len() + body.len());
    source.push_str(COMMON_SHADER_SOURCE);
    source.push_str(body);
    source
}

pub(crate) fn create_pass_module(
    device: &wgpu::Device,
    label: &str,
    body: &str,
) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(pass_source(body).into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSES: [(&str, &str); 5] = [
        ("capture", CAPTURE_SHADER_SOURCE),
        ("coverage", COVERAGE_SHADER_SOURCE),
        ("downsample", DOWNSAMPLE_SHADER_SOURCE),
        ("flare", FLARE_SHADER_SOURCE),
        ("composite", COMPOSITE_SHADER_SOURCE),
    ];

    #[test]
    fn test_pass_sources_start_with_common_block() {
        for (name, body) in PASSES {
            let source = pass_source(body);
            assert!(source.starts_with(COMMON_SHADER_SOURCE), "{name}");
            assert!(source.ends_with(body), "{name}");
        }
    }

    #[test]
    fn test_entry_points_present() {
        assert!(COMMON_SHADER_SOURCE.contains("fn vs_fullscreen"));
        assert!(CAPTURE_SHADER_SOURCE.contains("fn fs_seed_depth"));
        assert!(CAPTURE_SHADER_SOURCE.contains("fn vs_proxy"));
        assert!(COVERAGE_SHADER_SOURCE.contains("fn fs_coverage"));
        assert!(DOWNSAMPLE_SHADER_SOURCE.contains("fn fs_downsample"));
        assert!(FLARE_SHADER_SOURCE.contains("fn fs_flare"));
        assert!(COMPOSITE_SHADER_SOURCE.contains("fn fs_composite"));
    }

    #[test]
    fn test_shader_constants_match_core() {
        let intensity = format!("FLARE_INTENSITY: f32 = {:.1};", glint_flare::FLARE_INTENSITY);
        assert!(FLARE_SHADER_SOURCE.contains(&intensity));
        let streaks = format!("STREAK_COUNT: u32 = {}u;", glint_flare::STREAK_COUNT);
        assert!(FLARE_SHADER_SOURCE.contains(&streaks));
    }

    #[test]
    fn test_flare_gate_uses_red_channel() {
        assert!(FLARE_SHADER_SOURCE.contains("let gate = 0.5 * color.r - 0.075;"));
    }

    #[test]
    fn test_flag_bits_match_uniforms() {
        use crate::uniforms::flags;
        for (name, bit) in [
            ("ANAMORPHIC", flags::ANAMORPHIC),
            ("SECONDARY_GHOSTS", flags::SECONDARY_GHOSTS),
            ("ADDITIONAL_STREAKS", flags::ADDITIONAL_STREAKS),
            ("STAR_BURST", flags::STAR_BURST),
            ("ANIMATED", flags::ANIMATED),
        ] {
            let decl = format!("const {name}: u32 = {bit}u;");
            assert!(FLARE_SHADER_SOURCE.contains(&decl), "missing {decl}");
        }
    }
}
