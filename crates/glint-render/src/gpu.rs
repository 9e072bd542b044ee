//! Headless GPU device initialization.
//!
//! Provides [`GpuContext`], which owns the wgpu device and queue used by the
//! lens flare passes when no window surface is involved, and
//! [`GpuContextError`] for clear diagnostics when initialization fails.

/// Error type for GPU context initialization failures.
#[derive(Debug, thiserror::Error)]
pub enum GpuContextError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
}

/// Owns the instance, adapter, device and queue of an offscreen renderer.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Initialize a device without a surface.
    pub async fn headless() -> Result<Self, GpuContextError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| GpuContextError::NoAdapter)?;

        Self::from_adapter(instance, adapter).await
    }

    /// Open a device on a specific adapter, e.g. one from
    /// [`wgpu::Instance::enumerate_adapters`].
    pub async fn from_adapter(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
    ) -> Result<Self, GpuContextError> {
        let info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?}, {:?})",
            info.name,
            info.backend,
            info.device_type
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("glint-device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Largest square 2D texture the device accepts.
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

/// Initialize a headless GPU context synchronously using `pollster`.
pub fn init_headless_blocking() -> Result<GpuContext, GpuContextError> {
    pollster::block_on(GpuContext::headless())
}

/// Run `build` with device errors captured, so validation, internal and
/// out-of-memory failures come back as a value instead of reaching the
/// uncaptured-error handler.
pub fn with_error_scope<T>(
    device: &wgpu::Device,
    build: impl FnOnce() -> T,
) -> Result<T, wgpu::Error> {
    let out_of_memory = device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let internal = device.push_error_scope(wgpu::ErrorFilter::Internal);
    let validation = device.push_error_scope(wgpu::ErrorFilter::Validation);

    let value = build();

    // Innermost scope first.
    let popped = [validation.pop(), internal.pop(), out_of_memory.pop()];
    for error in popped {
        if let Some(error) = pollster::block_on(error) {
            return Err(error);
        }
    }
    Ok(value)
}

/// Copy a single-level texture into CPU memory as tightly packed rows.
///
/// `bytes_per_texel` must match the texture format. Blocks until the GPU has
/// finished all submitted work.
pub fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    mip_level: u32,
    bytes_per_texel: u32,
) -> Option<Vec<u8>> {
    let size = texture
        .size()
        .mip_level_size(mip_level, wgpu::TextureDimension::D2);
    let (width, height) = (size.width, size.height);
    let unpadded = width * bytes_per_texel;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded = unpadded.div_ceil(align) * align;

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("glint-readback"),
        size: u64::from(padded * height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("glint-readback-encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit([encoder.finish()]);

    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = device.poll(wgpu::PollType::Wait {
        submission_index: None,
        timeout: None,
    });
    rx.recv().ok()?.ok()?;

    let mapped = slice.get_mapped_range();
    let mut texels = Vec::with_capacity((unpadded * height) as usize);
    for row in 0..height {
        let start = (row * padded) as usize;
        texels.extend_from_slice(&mapped[start..start + unpadded as usize]);
    }
    drop(mapped);
    buffer.unmap();
    Some(texels)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify that GpuContext has all required public fields.
    #[test]
    fn test_gpu_context_fields_exist() {
        #[allow(dead_code)]
        fn assert_fields(ctx: &GpuContext) {
            let _: &wgpu::Instance = &ctx.instance;
            let _: &wgpu::Adapter = &ctx.adapter;
            let _: &wgpu::Device = &ctx.device;
            let _: &wgpu::Queue = &ctx.queue;
        }
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            GpuContextError::NoAdapter.to_string(),
            "no compatible GPU adapter found"
        );
    }

    #[test]
    fn test_error_scope_returns_validation_error() {
        let Ok(ctx) = init_headless_blocking() else {
            return;
        };
        let result = with_error_scope(&ctx.device, || {
            ctx.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("zero-sized"),
                size: wgpu::Extent3d {
                    width: 0,
                    height: 0,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
        });
        assert!(matches!(result, Err(wgpu::Error::Validation { .. })));

        let clean = with_error_scope(&ctx.device, || 7);
        assert_eq!(clean.ok(), Some(7));
    }

    #[test]
    fn test_headless_context_or_skip() {
        let Ok(ctx) = init_headless_blocking() else {
            return;
        };
        assert!(ctx.max_texture_dimension() >= 2048);
    }
}
