//! Configuration sections with their defaults and RON persistence.

use std::path::{Path, PathBuf};

use glam::Vec3;
use glint_flare::{DepthConvention, Flare, OcclusionSettings};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub occlusion: OcclusionConfig,
    pub style: StyleConfig,
    pub preview: PreviewConfig,
    pub debug: DebugConfig,
}

/// Size of the rendered frame in pixels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcclusionConfig {
    /// World-space radius of the sampling disc around each flare.
    pub coverage_radius: f32,
    pub transparency_aware: bool,
    /// Side of the square coverage target; must be a power of two.
    pub target_size: u32,
    /// Near plane at depth 1.0 instead of 0.0.
    pub reverse_z: bool,
}

/// Appearance given to every flare the tools create.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StyleConfig {
    pub opacity: f32,
    pub color_gain: [f32; 3],
    pub star_points: f32,
    pub glare_size: f32,
    pub flare_size: f32,
    pub flare_speed: f32,
    pub flare_shape: f32,
    pub halo_scale: f32,
    pub ghost_scale: f32,
    pub anamorphic: bool,
    pub secondary_ghosts: bool,
    pub additional_streaks: bool,
    pub star_burst: bool,
    pub animated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PreviewConfig {
    pub flare_count: u32,
    pub seed: u64,
    /// Animation time in seconds.
    pub time: f32,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Filter directive, e.g. `info` or `debug,glint_render=trace`.
    pub log_level: String,
}

// --- Default implementations ---

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            coverage_radius: glint_flare::occlusion::DEFAULT_COVERAGE_RADIUS,
            transparency_aware: true,
            target_size: 32,
            reverse_z: false,
        }
    }
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            opacity: 0.8,
            color_gain: [1.0, 0.1, 0.1],
            star_points: 5.0,
            glare_size: 0.55,
            flare_size: 0.004,
            flare_speed: 0.4,
            flare_shape: 1.2,
            halo_scale: 0.5,
            ghost_scale: 0.3,
            anamorphic: false,
            secondary_ghosts: true,
            additional_streaks: true,
            star_burst: true,
            animated: true,
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            flare_count: 64,
            seed: 42,
            time: 0.0,
            output_path: PathBuf::from("glint-preview.png"),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl OcclusionConfig {
    pub fn settings(&self) -> OcclusionSettings {
        OcclusionSettings {
            coverage_radius: self.coverage_radius,
            transparency_aware: self.transparency_aware,
            target_size: self.target_size,
        }
    }

    pub fn depth_convention(&self) -> DepthConvention {
        if self.reverse_z {
            DepthConvention::Reverse
        } else {
            DepthConvention::Standard
        }
    }
}

impl StyleConfig {
    /// Copy this style onto `flare`, leaving its position and flags untouched.
    pub fn apply(&self, flare: &mut Flare) {
        flare.opacity = self.opacity;
        flare.color_gain = Vec3::from_array(self.color_gain);
        flare.star_points = self.star_points;
        flare.glare_size = self.glare_size;
        flare.flare_size = self.flare_size;
        flare.flare_speed = self.flare_speed;
        flare.flare_shape = self.flare_shape;
        flare.halo_scale = self.halo_scale;
        flare.ghost_scale = self.ghost_scale;
        flare.anamorphic = self.anamorphic;
        flare.secondary_ghosts = self.secondary_ghosts;
        flare.additional_streaks = self.additional_streaks;
        flare.star_burst = self.star_burst;
        flare.animated = self.animated;
    }
}

/// Platform config directory for the tools, e.g. `~/.config/glint`.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("glint"))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load `config.ron` from `config_dir`, writing the defaults there first
    /// if it does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)
    }

    /// Re-read the file; `Some` only when its contents differ from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        ron::from_str(&contents).map_err(ConfigError::ParseError)
    }
}
