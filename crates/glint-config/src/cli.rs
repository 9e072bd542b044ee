//! Command-line flags layered over `config.ron`.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "glint-preview", about = "Render a synthetic lens flare scene to PNG")]
pub struct CliArgs {
    /// Output width in pixels.
    #[arg(long)]
    pub width: Option<u32>,

    /// Output height in pixels.
    #[arg(long)]
    pub height: Option<u32>,

    /// World-space radius of the occlusion sampling disc.
    #[arg(long)]
    pub coverage_radius: Option<f32>,

    /// Let translucent surfaces dim flares partially.
    #[arg(long)]
    pub transparency_aware: Option<bool>,

    /// Side of the coverage target (power of two).
    #[arg(long)]
    pub target_size: Option<u32>,

    /// Use a reverse-Z depth buffer.
    #[arg(long)]
    pub reverse_z: Option<bool>,

    /// Number of flares in the preview scene.
    #[arg(long)]
    pub flares: Option<u32>,

    /// Seed for flare colors.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Animation time in seconds.
    #[arg(long)]
    pub time: Option<f32>,

    /// PNG file to write.
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.output.width = w;
        }
        if let Some(h) = args.height {
            self.output.height = h;
        }
        if let Some(radius) = args.coverage_radius {
            self.occlusion.coverage_radius = radius;
        }
        if let Some(aware) = args.transparency_aware {
            self.occlusion.transparency_aware = aware;
        }
        if let Some(size) = args.target_size {
            self.occlusion.target_size = size;
        }
        if let Some(reverse) = args.reverse_z {
            self.occlusion.reverse_z = reverse;
        }
        if let Some(count) = args.flares {
            self.preview.flare_count = count;
        }
        if let Some(seed) = args.seed {
            self.preview.seed = seed;
        }
        if let Some(time) = args.time {
            self.preview.time = time;
        }
        if let Some(ref path) = args.output {
            self.preview.output_path = path.clone();
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
