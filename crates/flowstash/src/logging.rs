//! Logging initialization and configuration.
//!
//! Uses the `tracing` ecosystem for structured logging with support for
//! both human-readable and JSON output formats.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging subsystem.
///
/// # Arguments
///
/// * `default_level` - Filter used when `RUST_LOG` is unset (e.g. "info").
/// * `json_format` - If true, outputs structured JSON logs; otherwise pretty-printed.
///
/// # Notes
///
/// - Log output goes to stderr (stdout is reserved for data output)
/// - The RUST_LOG environment variable overrides the level
pub fn init(default_level: &str, json_format: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json_format {
        // JSON format for log shippers
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Resolve the effective level and format from config and CLI overrides.
fn resolve(
    config: &flowstash_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) -> (String, bool) {
    let level = if verbose_override {
        "debug".to_string()
    } else {
        match config.logging.level.trim().to_lowercase().as_str() {
            "" => "info".to_string(),
            level => level.to_string(),
        }
    };
    let json_format = json_logs_override || config.logging.format.eq_ignore_ascii_case("json");
    (level, json_format)
}

/// Initialize logging with settings from the flowstash config.
pub fn init_from_config(
    config: &flowstash_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) {
    let (level, json_format) = resolve(config, verbose_override, json_logs_override);
    init(&level, json_format);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_overrides_config_level() {
        let config = flowstash_core::Config::default();
        assert_eq!(resolve(&config, true, false), ("debug".to_string(), false));
        assert_eq!(resolve(&config, false, false), ("info".to_string(), false));
    }

    #[test]
    fn test_config_format_and_level() {
        let mut config = flowstash_core::Config::default();
        config.logging.level = "WARN".into();
        config.logging.format = "json".into();
        assert_eq!(resolve(&config, false, false), ("warn".to_string(), true));
    }
}
