use crate::config::TelemetryConfig;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Targets that follow the configured level; everything else stays at `warn`.
const ENGINE_TARGETS: [&str; 2] = ["slot_allocator", "slot_allocator_api"];

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log level/filter '{value}': unable to build EnvFilter")]
    EnvFilter {
        value: String,
        #[source]
        source: ParseError,
    },
    #[error("telemetry error: {0}")]
    Subscriber(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Expands a bare level such as `debug` into per-target directives for the engine crates.
///
/// Values that already carry directives (`target=level` or a comma list) pass through as-is.
pub fn filter_directives(log_level: &str) -> String {
    let level = log_level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let level = if level.is_empty() { "info" } else { level };

    let mut directives = String::from("warn");
    for target in ENGINE_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

pub fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(filter_directives(&config.log_level)).map_err(|source| {
        TelemetryError::EnvFilter {
            value: config.log_level.clone(),
            source,
        }
    })
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(config)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    fn config(log_level: &str) -> TelemetryConfig {
        TelemetryConfig {
            log_level: log_level.to_string(),
        }
    }

    #[test]
    fn bare_level_applies_to_engine_targets_only() {
        assert_eq!(
            filter_directives("debug"),
            "warn,slot_allocator=debug,slot_allocator_api=debug"
        );
        assert_eq!(
            filter_directives("  "),
            "warn,slot_allocator=info,slot_allocator_api=info"
        );

        let filter = build_filter(&config("debug")).expect("valid filter");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn explicit_directives_pass_through() {
        assert_eq!(
            filter_directives("slot_allocator::allocation=trace"),
            "slot_allocator::allocation=trace"
        );
        assert_eq!(filter_directives("info,axum=debug"), "info,axum=debug");
    }

    #[test]
    fn rejects_unparseable_level() {
        for value in ["slot_allocator=loud", "loud"] {
            match build_filter(&config(value)) {
                Err(TelemetryError::EnvFilter { value: reported, .. }) => {
                    assert_eq!(reported, value)
                }
                other => panic!("expected env filter error, got {other:?}"),
            }
        }
    }
}
