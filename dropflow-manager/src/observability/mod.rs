//! Logging setup for manager processes.
//!
//! The output format is picked with `DROPFLOW_LOG_FORMAT`:
//! - `json` - one JSON object per event
//! - `pretty` - multi-line, human-readable
//! - `compact` - single line per event
//!
//! When it is unset, [`TracingConfig::from_env`] picks `pretty` for a
//! terminal and `json` for anything else. [`TracingConfig::default`] does
//! not read the environment and uses `compact`.
//!
//! # Example
//!
//! ```ignore
//! use dropflow_manager::observability::{TracingConfig, init_tracing};
//!
//! let _guard = init_tracing(TracingConfig::from_env())?;
//! ```

mod config;
mod tracing_setup;

pub use config::{LogFormat, TracingConfig, TracingConfigBuilder};
pub use tracing_setup::{TracingGuard, init_tracing};

/// Span for one manager operation on one session.
#[macro_export]
macro_rules! manager_span {
    ($manager:expr, $operation:expr, $session_id:expr) => {
        tracing::info_span!(
            "manager_operation",
            manager = %$manager,
            operation = $operation,
            session_id = %$session_id
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.log_format(), LogFormat::Compact);
    }

    #[test]
    fn test_from_env_without_format_never_compact() {
        if std::env::var_os("DROPFLOW_LOG_FORMAT").is_none() {
            let format = TracingConfig::from_env().log_format();
            assert!(matches!(format, LogFormat::Pretty | LogFormat::Json));
        }
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::builder()
            .log_format(LogFormat::Json)
            .log_filter("debug,dropflow_core=trace")
            .include_location(true)
            .build();

        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.log_filter(), "debug,dropflow_core=trace");
        assert!(config.include_location());
        assert!(config.include_target());
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("other".parse::<LogFormat>().unwrap(), LogFormat::Compact);
    }
}
