//! Screen-space lens flares with stochastic, transparency-aware occlusion.
//!
//! [`LensFlarePass`] records one frame into a caller-owned encoder:
//!
//! 1. transparency capture into targets A and B (when enabled),
//! 2. for each batch of four flares: the coverage pass and its mip reduction,
//!    then the flare shading pass reading the reduced readout,
//! 3. the bicubic composite of the half-resolution flare buffer over the
//!    scene color into the output view.
//!
//! Nothing is read back to the CPU.

use glint_flare::{
    BATCH_WIDTH, CameraFrame, FlareRegistry, OcclusionReadout, OcclusionSettings, SettingsError,
    batches,
};

use crate::bindings::FrameBindings;
use crate::capture::{CapturePass, HostScene};
use crate::coverage::CoveragePass;
use crate::fullscreen::{
    ADDITIVE_BLEND, clear_target, color_target, create_fullscreen_pipeline, run_fullscreen_pass,
};
use crate::gpu::{read_texture, with_error_scope};
use crate::shaders::{COMPOSITE_SHADER_SOURCE, FLARE_SHADER_SOURCE, create_pass_module};
use crate::targets::{
    CAPTURE_COLOR_FORMAT, CAPTURE_DEPTH_FORMAT, COVERAGE_FORMAT, FLARE_FORMAT, RenderTargets,
};
use crate::uniforms::{BatchUniform, FrameUniform};

/// Construction and resize failures of [`LensFlarePass`].
#[derive(Debug, thiserror::Error)]
pub enum LensFlareError {
    #[error("render target {width}x{height} exceeds the device limit of {max}")]
    TargetTooLarge { width: u32, height: u32, max: u32 },

    #[error("invalid occlusion settings: {0}")]
    InvalidSettings(#[from] SettingsError),

    #[error("output format {0:?} cannot be rendered to")]
    UnsupportedFormat(wgpu::TextureFormat),

    #[error("adapter {adapter} cannot run the lens flare pass: {reason}")]
    UnsupportedAdapter {
        adapter: String,
        reason: &'static str,
    },

    #[error("device rejected lens flare resources: {0}")]
    Device(#[from] wgpu::Error),
}

/// Check that `adapter` offers everything the pass needs before any pipeline
/// is built.
///
/// GLSL cannot load depth textures texel by texel, so the GL backend is
/// refused outright.
pub fn check_adapter_support(
    adapter: &wgpu::Adapter,
    output_format: wgpu::TextureFormat,
) -> Result<(), LensFlareError> {
    if output_format.is_depth_stencil_format() {
        return Err(LensFlareError::UnsupportedFormat(output_format));
    }
    let info = adapter.get_info();
    let unsupported = |reason: &'static str| LensFlareError::UnsupportedAdapter {
        adapter: format!("{} ({:?})", info.name, info.backend),
        reason,
    };
    if info.backend == wgpu::Backend::Gl {
        return Err(unsupported("depth textures cannot be loaded per texel in GLSL"));
    }
    let downlevel = adapter.get_downlevel_capabilities();
    if !downlevel.flags.contains(wgpu::DownlevelFlags::VERTEX_STORAGE)
        || adapter.limits().max_storage_buffers_per_shader_stage == 0
    {
        return Err(unsupported("vertex shaders cannot read storage buffers"));
    }

    let attachment = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
    let required = [
        (FLARE_FORMAT, attachment),
        (COVERAGE_FORMAT, attachment | wgpu::TextureUsages::COPY_SRC),
        (CAPTURE_COLOR_FORMAT, attachment),
        (CAPTURE_DEPTH_FORMAT, attachment),
        (output_format, wgpu::TextureUsages::RENDER_ATTACHMENT),
    ];
    for (format, usages) in required {
        if !adapter
            .get_texture_format_features(format)
            .allowed_usages
            .contains(usages)
        {
            return Err(LensFlareError::UnsupportedFormat(format));
        }
    }
    if !adapter
        .get_texture_format_features(FLARE_FORMAT)
        .flags
        .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE)
    {
        return Err(LensFlareError::UnsupportedFormat(FLARE_FORMAT));
    }
    Ok(())
}

/// Views the host supplies each frame.
///
/// `scene_color` and `output` must have the output resolution; `output` must
/// not be a view of the scene color texture. `scene_depth` must be a
/// `TEXTURE_BINDING` depth view of the opaque pass.
#[derive(Clone, Copy)]
pub struct FrameTargets<'a> {
    pub scene_color: &'a wgpu::TextureView,
    pub scene_depth: &'a wgpu::TextureView,
    pub output: &'a wgpu::TextureView,
}

fn float_texture_entry(binding: u32, filterable: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// GPU lens flare renderer.
pub struct LensFlarePass {
    settings: OcclusionSettings,
    output_format: wgpu::TextureFormat,
    frame_bindings: FrameBindings,
    capture: CapturePass,
    coverage: CoveragePass,
    targets: RenderTargets,
    flare_bgl: wgpu::BindGroupLayout,
    flare_pipeline: wgpu::RenderPipeline,
    flare_bind_group: wgpu::BindGroup,
    composite_bgl: wgpu::BindGroupLayout,
    composite_pipeline: wgpu::RenderPipeline,
    sampler: wgpu::Sampler,
    batch_data: Vec<BatchUniform>,
}

impl LensFlarePass {
    /// Build every pipeline and target.
    ///
    /// `output_format` is the format of [`FrameTargets::output`]. Anything
    /// the adapter or device refuses is returned as an error.
    pub fn new(
        adapter: &wgpu::Adapter,
        device: &wgpu::Device,
        output_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        settings: OcclusionSettings,
    ) -> Result<Self, LensFlareError> {
        settings.validate()?;
        check_adapter_support(adapter, output_format)?;

        with_error_scope(device, || {
            Self::build(device, output_format, width, height, settings)
        })?
    }

    fn build(
        device: &wgpu::Device,
        output_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        settings: OcclusionSettings,
    ) -> Result<Self, LensFlareError> {
        let targets = RenderTargets::new(device, width, height)?;
        let frame_bindings = FrameBindings::new(device);
        let capture = CapturePass::new(device, &frame_bindings);
        let coverage = CoveragePass::new(device, &frame_bindings, settings.target_size);

        let flare_shader = create_pass_module(device, "glint-flare-shader", FLARE_SHADER_SOURCE);
        let flare_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glint-flare-bgl"),
            entries: &[float_texture_entry(0, false)],
        });
        let flare_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("glint-flare-layout"),
            bind_group_layouts: &[frame_bindings.layout(), &flare_bgl],
            immediate_size: 0,
        });
        let flare_pipeline = create_fullscreen_pipeline(
            device,
            &flare_shader,
            &flare_layout,
            "fs_flare",
            color_target(FLARE_FORMAT, Some(ADDITIVE_BLEND)),
            None,
            "glint-flare",
        );
        let flare_bind_group = create_flare_bind_group(device, &flare_bgl, &coverage);

        let composite_shader =
            create_pass_module(device, "glint-composite-shader", COMPOSITE_SHADER_SOURCE);
        let composite_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("glint-composite-bgl"),
            entries: &[
                float_texture_entry(0, false),
                float_texture_entry(1, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let composite_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("glint-composite-layout"),
            bind_group_layouts: &[frame_bindings.layout(), &composite_bgl],
            immediate_size: 0,
        });
        let composite_pipeline = create_fullscreen_pipeline(
            device,
            &composite_shader,
            &composite_layout,
            "fs_composite",
            color_target(output_format, None),
            None,
            "glint-composite",
        );

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("glint-flare-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let (width, height) = targets.size();
        let (flare_width, flare_height) = targets.flare_size();
        log::info!(
            "Lens flare pass initialized: {}x{} output ({:?}), {}x{} flare buffer, {} samples per flare",
            width,
            height,
            output_format,
            flare_width,
            flare_height,
            settings.sample_count()
        );

        Ok(Self {
            settings,
            output_format,
            frame_bindings,
            capture,
            coverage,
            targets,
            flare_bgl,
            flare_pipeline,
            flare_bind_group,
            composite_bgl,
            composite_pipeline,
            sampler,
            batch_data: Vec::new(),
        })
    }

    pub fn settings(&self) -> &OcclusionSettings {
        &self.settings
    }

    /// Apply new settings, rebuilding the coverage target if its size changed.
    pub fn set_settings(
        &mut self,
        device: &wgpu::Device,
        settings: OcclusionSettings,
    ) -> Result<(), LensFlareError> {
        settings.validate()?;
        if settings.target_size != self.coverage.target().size() {
            with_error_scope(device, || {
                self.coverage.set_target_size(device, settings.target_size);
                self.flare_bind_group =
                    create_flare_bind_group(device, &self.flare_bgl, &self.coverage);
            })?;
            log::info!(
                "Coverage target resized to {0}x{0}",
                settings.target_size
            );
        }
        self.settings = settings;
        Ok(())
    }

    pub fn output_format(&self) -> wgpu::TextureFormat {
        self.output_format
    }

    pub fn size(&self) -> (u32, u32) {
        self.targets.size()
    }

    pub fn targets(&self) -> &RenderTargets {
        &self.targets
    }

    /// Recreate every resolution-dependent target. Zero dimensions clamp to 1.
    pub fn resize(
        &mut self,
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> Result<(), LensFlareError> {
        if (width.max(1), height.max(1)) == self.targets.size() {
            return Ok(());
        }
        self.targets = with_error_scope(device, || RenderTargets::new(device, width, height))??;
        let (width, height) = self.targets.size();
        log::info!("Lens flare pass resized to {}x{}", width, height);
        Ok(())
    }

    /// Number of batches recorded by the most recent [`render`](Self::render).
    pub fn batch_count(&self) -> usize {
        self.batch_data.len()
    }

    /// Record one frame.
    ///
    /// Projects every flare of `registry` (its only mutation), captures the
    /// host's translucent objects when transparency-aware occlusion is on, and
    /// leaves `scene` in the render state it had on entry. Frame and batch
    /// uniforms are queued with `queue.write_buffer`, so submit `encoder`
    /// before recording the next frame.
    #[allow(clippy::too_many_arguments)]
    pub fn render<S: HostScene + ?Sized>(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        registry: &mut FlareRegistry,
        scene: &mut S,
        camera: &CameraFrame,
        frame: &FrameTargets<'_>,
        time: f32,
    ) {
        registry.project(camera);

        self.batch_data.clear();
        self.batch_data
            .extend(batches(registry.as_slice()).map(|batch| BatchUniform::from_batch(&batch)));
        let uniform = FrameUniform::new(camera, &self.settings, self.targets.flare_size(), time);
        self.frame_bindings
            .upload(device, queue, &uniform, &self.batch_data);

        if self.settings.transparency_aware {
            self.capture.record(
                device,
                queue,
                encoder,
                &self.frame_bindings,
                &self.targets,
                frame.scene_depth,
                registry,
                scene,
                camera,
                self.settings.coverage_radius,
            );
        }

        clear_target(
            encoder,
            &self.targets.flare_view,
            wgpu::Color::TRANSPARENT,
            "glint-flare-clear",
        );

        if !self.batch_data.is_empty() {
            let inputs = self
                .coverage
                .bind_inputs(device, frame.scene_depth, &self.targets);
            for index in 0..self.batch_data.len() {
                let offset = self.frame_bindings.batch_offset(index);
                self.coverage
                    .record(encoder, &self.frame_bindings, offset, &inputs);
                run_fullscreen_pass(
                    encoder,
                    &self.flare_pipeline,
                    self.frame_bindings.bind_group(),
                    offset,
                    &self.flare_bind_group,
                    &self.targets.flare_view,
                    wgpu::LoadOp::Load,
                    "glint-flare",
                );
                log::trace!("Recorded flare batch {index}");
            }
        }
        log::debug!(
            "Lens flare frame: {} flares in {} batches of {}",
            registry.active_count(),
            self.batch_data.len(),
            BATCH_WIDTH
        );

        let composite_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("glint-composite-bg"),
            layout: &self.composite_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(frame.scene_color),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&self.targets.flare_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        run_fullscreen_pass(
            encoder,
            &self.composite_pipeline,
            self.frame_bindings.bind_group(),
            0,
            &composite_bind_group,
            frame.output,
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
            "glint-composite",
        );
    }

    /// Read back the readout of the last batch of the most recent frame.
    ///
    /// Blocks on the GPU; meant for tests and tooling.
    pub fn read_last_readout(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Option<OcclusionReadout> {
        let target = self.coverage.target();
        let bytes = read_texture(device, queue, &target.texture, target.level_count() - 1, 8)?;
        let channels: [half::f16; BATCH_WIDTH] = bytemuck::pod_read_unaligned(bytes.get(..8)?);
        Some(OcclusionReadout::new(channels.map(half::f16::to_f32)))
    }
}

fn create_flare_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    coverage: &CoveragePass,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("glint-flare-bg"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::TextureView(coverage.target().top_view()),
        }],
    })
}
