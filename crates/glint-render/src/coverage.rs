//! Coverage pass: one stochastic occlusion sample per texel of the coverage
//! target, followed by a 2×2 box-filter reduction down to a single texel.

use crate::bindings::FrameBindings;
use crate::fullscreen::{color_target, create_fullscreen_pipeline, run_fullscreen_pass};
use crate::shaders::{COVERAGE_SHADER_SOURCE, DOWNSAMPLE_SHADER_SOURCE, create_pass_module};
use crate::targets::{COVERAGE_FORMAT, CoverageTarget, RenderTargets};

fn unfilterable_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn depth_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Depth,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

pub struct CoveragePass {
    inputs_bgl: wgpu::BindGroupLayout,
    level_bgl: wgpu::BindGroupLayout,
    sample_pipeline: wgpu::RenderPipeline,
    downsample_pipeline: wgpu::RenderPipeline,
    target: CoverageTarget,
    /// `level_bind_groups[i]` reads mip level `i`.
    level_bind_groups: Vec<wgpu::BindGroup>,
}

impl CoveragePass {
    pub fn new(device: &wgpu::Device, frame_bindings: &FrameBindings, target_size: u32) -> Self {
        let sample_shader =
            create_pass_module(device, "glint-coverage-shader", COVERAGE_SHADER_SOURCE);
        let downsample_shader =
            create_pass_module(device, "glint-downsample-shader", DOWNSAMPLE_SHADER_SOURCE);

        let inputs_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glint-coverage-inputs-bgl"),
            entries: &[
                depth_texture_entry(0),
                unfilterable_texture_entry(1),
                unfilterable_texture_entry(2),
                depth_texture_entry(3),
            ],
        });
        let level_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glint-coverage-level-bgl"),
            entries: &[unfilterable_texture_entry(0)],
        });

        let sample_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("glint-coverage-layout"),
            bind_group_layouts: &[frame_bindings.layout(), &inputs_bgl],
            immediate_size: 0,
        });
        let downsample_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("glint-downsample-layout"),
            bind_group_layouts: &[frame_bindings.layout(), &level_bgl],
            immediate_size: 0,
        });

        let sample_pipeline = create_fullscreen_pipeline(
            device,
            &sample_shader,
            &sample_layout,
            "fs_coverage",
            color_target(COVERAGE_FORMAT, None),
            None,
            "glint-coverage",
        );
        let downsample_pipeline = create_fullscreen_pipeline(
            device,
            &downsample_shader,
            &downsample_layout,
            "fs_downsample",
            color_target(COVERAGE_FORMAT, None),
            None,
            "glint-coverage-downsample",
        );

        let target = CoverageTarget::new(device, target_size);
        let level_bind_groups = create_level_bind_groups(device, &level_bgl, &target);

        Self {
            inputs_bgl,
            level_bgl,
            sample_pipeline,
            downsample_pipeline,
            target,
            level_bind_groups,
        }
    }

    pub fn target(&self) -> &CoverageTarget {
        &self.target
    }

    /// Replace the coverage target when the sample grid size changes.
    pub fn set_target_size(&mut self, device: &wgpu::Device, target_size: u32) {
        if self.target.size() == target_size {
            return;
        }
        self.target = CoverageTarget::new(device, target_size);
        self.level_bind_groups = create_level_bind_groups(device, &self.level_bgl, &self.target);
    }

    /// Bind the scene depth and both capture targets for the sampling shader.
    pub fn bind_inputs(
        &self,
        device: &wgpu::Device,
        scene_depth: &wgpu::TextureView,
        targets: &RenderTargets,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("glint-coverage-inputs-bg"),
            layout: &self.inputs_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(scene_depth),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(
                        &targets.non_depth_writing.color_view,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&targets.depth_writing.color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&targets.depth_writing.depth_view),
                },
            ],
        })
    }

    /// Sample batch `batch_offset` into the base level and reduce the chain.
    pub fn record(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        frame_bindings: &FrameBindings,
        batch_offset: u32,
        inputs: &wgpu::BindGroup,
    ) {
        run_fullscreen_pass(
            encoder,
            &self.sample_pipeline,
            frame_bindings.bind_group(),
            batch_offset,
            inputs,
            self.target.base_view(),
            wgpu::LoadOp::Clear(wgpu::Color::WHITE),
            "glint-coverage",
        );

        for level in 1..self.target.level_views.len() {
            run_fullscreen_pass(
                encoder,
                &self.downsample_pipeline,
                frame_bindings.bind_group(),
                batch_offset,
                &self.level_bind_groups[level - 1],
                &self.target.level_views[level],
                wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                "glint-coverage-downsample",
            );
        }
    }
}

fn create_level_bind_groups(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    target: &CoverageTarget,
) -> Vec<wgpu::BindGroup> {
    target
        .level_views
        .iter()
        .map(|view| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("glint-coverage-level-bg"),
                layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                }],
            })
        })
        .collect()
}
