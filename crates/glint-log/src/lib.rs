//! Logging setup for the lens flare tools.
//!
//! Library crates log through the `log` facade; binaries call
//! [`init_logging`] once, which installs a `tracing` subscriber that also
//! receives those records.

use std::fs::File;
use std::path::{Path, PathBuf};

use glint_config::Config;
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
};

/// Filter used when neither `RUST_LOG` nor the config names one.
pub const DEFAULT_FILTER: &str = "info,wgpu=warn,naga=warn";

/// File written next to the config in debug builds.
pub const LOG_FILE_NAME: &str = "glint.log";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.debug.log_level`, which wins over
/// [`DEFAULT_FILTER`]. With `debug_build` set and a usable `log_dir`, records
/// are also written as JSON to [`LOG_FILE_NAME`].
///
/// ```no_run
/// use glint_config::Config;
///
/// let config = Config::default();
/// glint_log::init_logging(None, false, Some(&config));
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let filter_str = filter_directive(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_str));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && let Ok((log_file, path)) = open_log_file(log_dir)
    {
        subscriber.with(json_file_layer(log_file)).init();
        tracing::debug!("Logging to {}", path.display());
        return;
    }

    subscriber.init();
}

/// Create `log_dir` if needed and truncate [`LOG_FILE_NAME`] inside it.
pub fn open_log_file(log_dir: &Path) -> std::io::Result<(File, PathBuf)> {
    std::fs::create_dir_all(log_dir)?;
    let path = log_dir.join(LOG_FILE_NAME);
    let file = File::create(&path)?;
    Ok((file, path))
}

/// One JSON object per line, no ANSI colours.
fn json_file_layer<S>(log_file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_timer(fmt::time::uptime())
        .json()
}

/// The configured filter directive, or [`DEFAULT_FILTER`] when unset.
pub fn filter_directive(config: Option<&Config>) -> &str {
    match config {
        Some(config) if !config.debug.log_level.trim().is_empty() => &config.debug.log_level,
        _ => DEFAULT_FILTER,
    }
}

pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_quiets_gpu_stack() {
        let filter_str = default_env_filter().to_string();
        assert!(filter_str.contains("wgpu=warn"));
        assert!(filter_str.contains("naga=warn"));
        assert!(filter_str.contains("info"));
    }

    #[test]
    fn test_directive_without_config_is_default() {
        assert_eq!(filter_directive(None), DEFAULT_FILTER);
    }

    #[test]
    fn test_directive_from_config() {
        let mut config = Config::default();
        config.debug.log_level = "debug,glint_render=trace".to_string();
        assert_eq!(filter_directive(Some(&config)), "debug,glint_render=trace");
    }

    #[test]
    fn test_blank_config_level_falls_back() {
        let mut config = Config::default();
        config.debug.log_level = "  ".to_string();
        assert_eq!(filter_directive(Some(&config)), DEFAULT_FILTER);
    }

    #[test]
    fn test_subsystem_filters_parse() {
        for filter_str in [
            "info",
            "debug,glint_render=trace",
            "warn,glint_flare=debug,wgpu=error",
            "error",
        ] {
            assert!(
                EnvFilter::try_new(filter_str).is_ok(),
                "Failed to parse filter: {filter_str}"
            );
        }
    }

    #[test]
    fn test_events_reach_json_log_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_dir = temp_dir.path().join("logs");
        let (log_file, path) = open_log_file(&log_dir).unwrap();
        assert_eq!(path, log_dir.join("glint.log"));

        let subscriber = tracing_subscriber::registry().with(json_file_layer(log_file));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(batches = 3, "frame recorded");
        });

        let contents = std::fs::read_to_string(&path).unwrap();
        let line = contents.lines().next().expect("one record");
        assert!(line.starts_with('{') && line.ends_with('}'), "not JSON: {line}");
        assert!(line.contains("\"frame recorded\""), "{line}");
        assert!(line.contains("\"batches\":3"), "{line}");
        assert!(line.contains("\"level\":\"INFO\""), "{line}");
    }

    #[test]
    fn test_reopening_truncates_log_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (_, path) = open_log_file(temp_dir.path()).unwrap();
        std::fs::write(&path, "stale").unwrap();
        open_log_file(temp_dir.path()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
