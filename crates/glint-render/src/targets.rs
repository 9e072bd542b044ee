//! Render targets owned by the lens flare pass.
//!
//! - the half-resolution flare buffer the batches accumulate into,
//! - the square coverage target with its full mip chain,
//! - the two transparency capture targets at output resolution.

use glint_flare::{flare_buffer_size, mip_level_count};

use crate::lens_flare::LensFlareError;

/// Flare buffer format; filterable for the bicubic composite.
pub const FLARE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Coverage target format; one occlusion sample per channel. Half floats
/// are renderable on every adapter the pass accepts.
pub const COVERAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Color format of both capture targets. Host pipelines drawing translucent
/// objects into the capture must target this format.
pub const CAPTURE_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Depth format of both capture targets.
pub const CAPTURE_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Clamp to at least 1×1 and check against the device limit.
pub fn validate_dimensions(
    device: &wgpu::Device,
    width: u32,
    height: u32,
) -> Result<(u32, u32), LensFlareError> {
    let (width, height) = (width.max(1), height.max(1));
    let max = device.limits().max_texture_dimension_2d;
    if width > max || height > max {
        return Err(LensFlareError::TargetTooLarge { width, height, max });
    }
    Ok((width, height))
}

fn create_texture(
    device: &wgpu::Device,
    label: &str,
    (width, height): (u32, u32),
    mip_level_count: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    })
}

/// Color and depth attachment of one capture layer.
pub struct CaptureTarget {
    pub color: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    pub depth: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
}

impl CaptureTarget {
    fn new(device: &wgpu::Device, label: &str, size: (u32, u32)) -> Self {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;
        let color = create_texture(
            device,
            &format!("{label}-color"),
            size,
            1,
            CAPTURE_COLOR_FORMAT,
            usage,
        );
        let depth = create_texture(
            device,
            &format!("{label}-depth"),
            size,
            1,
            CAPTURE_DEPTH_FORMAT,
            usage,
        );
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            color,
            color_view,
            depth,
            depth_view,
        }
    }
}

/// Square occlusion target whose last mip level holds the batch readout.
pub struct CoverageTarget {
    pub texture: wgpu::Texture,
    /// One single-level view per mip level, base level first.
    pub level_views: Vec<wgpu::TextureView>,
    size: u32,
}

impl CoverageTarget {
    pub fn new(device: &wgpu::Device, size: u32) -> Self {
        let size = size.max(1);
        let levels = mip_level_count(size, size);
        let texture = create_texture(
            device,
            "glint-coverage",
            (size, size),
            levels,
            COVERAGE_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );
        let level_views = (0..levels)
            .map(|level| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("glint-coverage-level"),
                    base_mip_level: level,
                    mip_level_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();
        log::trace!("Coverage target {size}x{size} with {levels} mip levels");
        Self {
            texture,
            level_views,
            size,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn level_count(&self) -> u32 {
        self.level_views.len() as u32
    }

    pub fn base_view(&self) -> &wgpu::TextureView {
        &self.level_views[0]
    }

    /// View of the 1×1 level.
    pub fn top_view(&self) -> &wgpu::TextureView {
        &self.level_views[self.level_views.len() - 1]
    }
}

/// Every resolution-dependent target of the pass.
pub struct RenderTargets {
    width: u32,
    height: u32,
    pub flare: wgpu::Texture,
    pub flare_view: wgpu::TextureView,
    /// Target A.
    pub non_depth_writing: CaptureTarget,
    /// Target B.
    pub depth_writing: CaptureTarget,
}

impl RenderTargets {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Result<Self, LensFlareError> {
        let (width, height) = validate_dimensions(device, width, height)?;
        let flare = create_texture(
            device,
            "glint-flare-buffer",
            flare_buffer_size(width, height),
            1,
            FLARE_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );
        let flare_view = flare.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self {
            width,
            height,
            flare,
            flare_view,
            non_depth_writing: CaptureTarget::new(device, "glint-capture-a", (width, height)),
            depth_writing: CaptureTarget::new(device, "glint-capture-b", (width, height)),
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn flare_size(&self) -> (u32, u32) {
        flare_buffer_size(self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::init_headless_blocking;

    #[test]
    fn test_targets_have_expected_sizes() {
        let Ok(ctx) = init_headless_blocking() else {
            return;
        };
        let targets = RenderTargets::new(&ctx.device, 0, 101).expect("targets");
        assert_eq!(targets.size(), (1, 101), "zero width clamps to one");
        assert_eq!(targets.flare_size(), (1, 50));
        assert_eq!(targets.flare.size().height, 50);
        assert_eq!(targets.depth_writing.depth.format(), CAPTURE_DEPTH_FORMAT);
    }

    #[test]
    fn test_oversized_target_is_rejected() {
        let Ok(ctx) = init_headless_blocking() else {
            return;
        };
        let max = ctx.max_texture_dimension();
        let result = RenderTargets::new(&ctx.device, max + 1, 16);
        assert!(matches!(
            result,
            Err(LensFlareError::TargetTooLarge { width, .. }) if width == max + 1
        ));
    }

    #[test]
    fn test_coverage_chain_ends_in_one_texel() {
        let Ok(ctx) = init_headless_blocking() else {
            return;
        };
        let coverage = CoverageTarget::new(&ctx.device, 32);
        assert_eq!(coverage.level_count(), 6);
        assert_eq!(coverage.texture.mip_level_count(), 6);
        assert_eq!(coverage.size(), 32);
    }

    #[test]
    fn test_coverage_target_is_half_float() {
        assert_eq!(COVERAGE_FORMAT, wgpu::TextureFormat::Rgba16Float);
        assert_eq!(COVERAGE_FORMAT.block_copy_size(None), Some(8));
    }
}
