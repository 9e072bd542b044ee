//! Renders the synthetic flare scene on the CPU and writes it as a PNG.

mod scene;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use glam::Vec4;
use glint_config::{CliArgs, Config};
use glint_flare::{
    BATCH_WIDTH, FlareRegistry, OcclusionReadout, Raster, ReferenceRenderer, SceneBuffers,
    SettingsError, batches,
};
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
enum PreviewError {
    #[error("invalid occlusion settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("failed to write {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(glint_config::default_config_dir)
        .unwrap_or_else(|| PathBuf::from(".glint"));

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    glint_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    match render(&config) {
        Ok(path) => {
            info!("Wrote {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn render(config: &Config) -> Result<PathBuf, PreviewError> {
    let width = config.output.width.max(1);
    let height = config.output.height.max(1);
    let settings = config.occlusion.settings();

    info!(
        "Preview {}x{} | {} flares | radius={} target={} aware={} reverse_z={}",
        width,
        height,
        config.preview.flare_count,
        settings.coverage_radius,
        settings.target_size,
        settings.transparency_aware,
        config.occlusion.reverse_z,
    );

    let mut renderer = ReferenceRenderer::new(width, height, settings)?;
    let mut registry = scene::build_flares(config);
    let mut scene = scene::build_scene();
    let camera = scene::camera(config);

    let mut color = Raster::new(width, height, Vec4::ZERO);
    let mut depth = Raster::new(width, height, camera.depth.far_value());
    scene.render(&camera, &mut color, &mut depth);

    let frame = to_rgba8(renderer.render(
        &mut registry,
        &mut scene,
        &camera,
        SceneBuffers {
            color: &color,
            depth: &depth,
        },
        config.preview.time,
    ));

    let hidden = fully_occluded_count(&registry, renderer.readouts());
    info!(
        "{} of {} active flares fully occluded",
        hidden,
        registry.active_count()
    );

    let path = config.preview.output_path.clone();
    frame.save(&path).map_err(|source| PreviewError::Image {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Active flares whose readout channel reports full occlusion. Padding slots
/// always read 1.0 and are skipped.
fn fully_occluded_count(registry: &FlareRegistry, readouts: &[OcclusionReadout]) -> usize {
    batches(registry.as_slice())
        .zip(readouts)
        .map(|(batch, readout)| {
            (0..BATCH_WIDTH)
                .filter(|&slot| !batch.is_padding(slot) && readout.is_fully_occluded(slot))
                .count()
        })
        .sum()
}

/// Gamma-encode a linear HDR raster, clamping to the displayable range.
fn to_rgba8(raster: &Raster<Vec4>) -> image::RgbaImage {
    let encode = |c: f32| (c.clamp(0.0, 1.0).powf(1.0 / 2.2) * 255.0).round() as u8;
    image::RgbaImage::from_fn(raster.width(), raster.height(), |x, y| {
        let texel = raster.get(x, y);
        image::Rgba([encode(texel.x), encode(texel.y), encode(texel.z), 255])
    })
}
