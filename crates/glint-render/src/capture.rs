//! GPU transparency capture.
//!
//! Each layer is one render pass over a capture target: the scene depth is
//! seeded a hair farther than it was, the flare proxy discs are drawn depth
//! only, and then the host draws the translucent objects of that layer while a
//! [`CaptureGuard`] holds its render state.

use glint_flare::{
    CameraFrame, CaptureGuard, CaptureLayer, CaptureScene, DepthConvention, FlareRegistry,
    ProxyDisc,
};

use crate::bindings::FrameBindings;
use crate::fullscreen::create_fullscreen_pipeline;
use crate::shaders::{CAPTURE_SHADER_SOURCE, create_pass_module};
use crate::targets::{CAPTURE_COLOR_FORMAT, CAPTURE_DEPTH_FORMAT, CaptureTarget, RenderTargets};

/// Triangles in the fan of one proxy disc.
pub const PROXY_SEGMENTS: u32 = 32;

const PROXY_MATRIX_SIZE: u64 = std::mem::size_of::<[[f32; 4]; 4]>() as u64;

/// A host scene that can record its visible objects into a capture pass.
///
/// Host pipelines used here must target [`CAPTURE_COLOR_FORMAT`] and
/// [`CAPTURE_DEPTH_FORMAT`] with one sample, test depth with the camera's
/// convention and honor each object's visibility flag.
pub trait HostScene: CaptureScene {
    fn draw_visible(&self, pass: &mut wgpu::RenderPass<'_>, camera: &CameraFrame);
}

/// Color attachment state: nothing is written, the host blends its own.
fn depth_only_target() -> wgpu::ColorTargetState {
    wgpu::ColorTargetState {
        format: CAPTURE_COLOR_FORMAT,
        blend: None,
        write_mask: wgpu::ColorWrites::empty(),
    }
}

fn depth_state(compare: wgpu::CompareFunction) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: CAPTURE_DEPTH_FORMAT,
        depth_write_enabled: true,
        depth_compare: compare,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

/// Depth test that keeps the nearer fragment under `convention`.
pub fn nearer_compare(convention: DepthConvention) -> wgpu::CompareFunction {
    match convention {
        DepthConvention::Standard => wgpu::CompareFunction::Less,
        DepthConvention::Reverse => wgpu::CompareFunction::Greater,
    }
}

pub struct CapturePass {
    bind_group_layout: wgpu::BindGroupLayout,
    seed_pipeline: wgpu::RenderPipeline,
    proxy_pipeline_standard: wgpu::RenderPipeline,
    proxy_pipeline_reverse: wgpu::RenderPipeline,
    proxy_buffer: wgpu::Buffer,
    proxy_capacity: usize,
    proxy_matrices: Vec<[[f32; 4]; 4]>,
    visibility: Vec<bool>,
}

impl CapturePass {
    pub fn new(device: &wgpu::Device, frame_bindings: &FrameBindings) -> Self {
        let shader = create_pass_module(device, "glint-capture-shader", CAPTURE_SHADER_SOURCE);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glint-capture-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: std::num::NonZeroU64::new(PROXY_MATRIX_SIZE),
                    },
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("glint-capture-layout"),
            bind_group_layouts: &[frame_bindings.layout(), &bind_group_layout],
            immediate_size: 0,
        });

        let seed_pipeline = create_fullscreen_pipeline(
            device,
            &shader,
            &layout,
            "fs_seed_depth",
            depth_only_target(),
            Some(depth_state(wgpu::CompareFunction::Always)),
            "glint-capture-seed",
        );
        let proxy_pipeline_standard = create_proxy_pipeline(
            device,
            &shader,
            &layout,
            nearer_compare(DepthConvention::Standard),
        );
        let proxy_pipeline_reverse = create_proxy_pipeline(
            device,
            &shader,
            &layout,
            nearer_compare(DepthConvention::Reverse),
        );

        let proxy_capacity = 16;
        let proxy_buffer = create_proxy_buffer(device, proxy_capacity);

        Self {
            bind_group_layout,
            seed_pipeline,
            proxy_pipeline_standard,
            proxy_pipeline_reverse,
            proxy_buffer,
            proxy_capacity,
            proxy_matrices: Vec::new(),
            visibility: Vec::new(),
        }
    }

    /// Record both capture layers into `targets`.
    #[allow(clippy::too_many_arguments)]
    pub fn record<S: HostScene + ?Sized>(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        frame_bindings: &FrameBindings,
        targets: &RenderTargets,
        scene_depth: &wgpu::TextureView,
        registry: &FlareRegistry,
        scene: &mut S,
        camera: &CameraFrame,
        coverage_radius: f32,
    ) {
        let proxy_count = self.upload_proxies(device, queue, registry, camera, coverage_radius);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("glint-capture-bg"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(scene_depth),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.proxy_buffer.as_entire_binding(),
                },
            ],
        });
        let proxy_pipeline = match camera.depth {
            DepthConvention::Standard => &self.proxy_pipeline_standard,
            DepthConvention::Reverse => &self.proxy_pipeline_reverse,
        };

        let mut guard = CaptureGuard::begin(scene, &mut self.visibility);
        let [r, g, b, a] = guard.scene().render_state().clear_color.map(f64::from);
        let clear = wgpu::Color { r, g, b, a };

        for layer in CaptureLayer::ALL {
            let target: &CaptureTarget = match layer {
                CaptureLayer::NonDepthWriting => &targets.non_depth_writing,
                CaptureLayer::DepthWriting => &targets.depth_writing,
            };
            guard.isolate(layer);

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(match layer {
                    CaptureLayer::NonDepthWriting => "glint-capture-a",
                    CaptureLayer::DepthWriting => "glint-capture-b",
                }),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(camera.depth.far_value()),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            pass.set_pipeline(&self.seed_pipeline);
            pass.set_bind_group(0, frame_bindings.bind_group(), &[0]);
            pass.set_bind_group(1, &bind_group, &[]);
            pass.draw(0..3, 0..1);

            if proxy_count > 0 {
                pass.set_pipeline(proxy_pipeline);
                pass.draw(0..PROXY_SEGMENTS * 3, 0..proxy_count);
            }

            guard.scene().draw_visible(&mut pass, camera);
        }
    }

    /// Write one disc transform per registered flare; returns the instance
    /// count, zero when every disc is empty.
    fn upload_proxies(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        registry: &FlareRegistry,
        camera: &CameraFrame,
        coverage_radius: f32,
    ) -> u32 {
        self.proxy_matrices.clear();
        let mut any_active = false;
        for flare in registry.iter() {
            let disc = ProxyDisc::for_flare(flare, camera.position, coverage_radius);
            any_active |= !disc.is_empty();
            self.proxy_matrices.push(disc.transform().to_cols_array_2d());
        }
        if !any_active {
            return 0;
        }

        if self.proxy_matrices.len() > self.proxy_capacity {
            self.proxy_capacity = self.proxy_matrices.len().next_power_of_two();
            self.proxy_buffer = create_proxy_buffer(device, self.proxy_capacity);
            log::debug!("Proxy buffer grown to {} discs", self.proxy_capacity);
        }
        queue.write_buffer(
            &self.proxy_buffer,
            0,
            bytemuck::cast_slice(&self.proxy_matrices),
        );
        self.proxy_matrices.len() as u32
    }
}

fn create_proxy_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("glint-proxy-discs"),
        size: PROXY_MATRIX_SIZE * capacity.max(1) as u64,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn create_proxy_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    layout: &wgpu::PipelineLayout,
    compare: wgpu::CompareFunction,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("glint-capture-proxies"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_proxy"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: Some(depth_state(compare)),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_proxy"),
            targets: &[Some(depth_only_target())],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearer_compare_follows_convention() {
        assert_eq!(
            nearer_compare(DepthConvention::Standard),
            wgpu::CompareFunction::Less
        );
        assert_eq!(
            nearer_compare(DepthConvention::Reverse),
            wgpu::CompareFunction::Greater
        );
    }

    #[test]
    fn test_capture_writes_no_color_of_its_own() {
        assert!(depth_only_target().write_mask.is_empty());
        assert_eq!(depth_only_target().format, CAPTURE_COLOR_FORMAT);
    }

    #[test]
    fn test_seed_overwrites_every_texel() {
        let state = depth_state(wgpu::CompareFunction::Always);
        assert!(state.depth_write_enabled);
        assert_eq!(state.format, CAPTURE_DEPTH_FORMAT);
    }

    #[test]
    fn test_shader_fan_matches_draw_count() {
        let declared = format!("const PROXY_SEGMENTS: u32 = {PROXY_SEGMENTS}u;");
        assert!(CAPTURE_SHADER_SOURCE.contains(&declared));
    }
}
