//! Daemon configuration.
//!
//! CLI が組み立てて渡し、起動時に `validate()` で一度だけ検証します。

use std::path::PathBuf;

use tracing::level_filters::LevelFilter;

/// What the dispatch loop does with a request it cannot turn into a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Answer `{"status": false}` on the request's service-out (if any),
    /// close its descriptors, keep serving.
    #[default]
    Lenient,
    /// Stop the loop on any decode failure or rejected request.
    Strict,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Storlet to serve, looked up in the registry at build time.
    pub storlet_name: String,
    /// Path of the bus socket to bind.
    pub sbus_path: PathBuf,
    /// Level name as the gateway passes it (`DEBUG`, `WARNING`, ...).
    pub log_level: String,
    pub pool_size: usize,
    /// Tenant/container this daemon serves; tagged on every log line.
    pub container_id: String,
    pub failure_policy: FailurePolicy,
}

impl DaemonConfig {
    pub fn new(storlet_name: impl Into<String>, sbus_path: impl Into<PathBuf>) -> Self {
        Self {
            storlet_name: storlet_name.into(),
            sbus_path: sbus_path.into(),
            log_level: "INFO".to_string(),
            pool_size: 5,
            container_id: String::new(),
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storlet_name.trim().is_empty() {
            return Err(ConfigError::Invalid("storlet_name", "must not be empty"));
        }
        if self.sbus_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("sbus_path", "must not be empty"));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size", "must be at least 1"));
        }
        parse_log_level(&self.log_level)?;
        Ok(())
    }

    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        parse_log_level(&self.log_level)
    }
}

/// Map a gateway log level name onto a tracing filter.
///
/// Accepts `TRACE`, `DEBUG`, `INFO`, `WARNING`/`WARN`, `ERROR`, `CRITICAL`
/// and `OFF`, case-insensitively.
pub fn parse_log_level(raw: &str) -> Result<LevelFilter, ConfigError> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Ok(LevelFilter::TRACE),
        "DEBUG" => Ok(LevelFilter::DEBUG),
        "INFO" => Ok(LevelFilter::INFO),
        "WARNING" | "WARN" => Ok(LevelFilter::WARN),
        "ERROR" | "CRITICAL" => Ok(LevelFilter::ERROR),
        "OFF" => Ok(LevelFilter::OFF),
        _ => Err(ConfigError::UnknownLogLevel(raw.to_string())),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),

    #[error("unknown log level '{0}'")]
    UnknownLogLevel(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("DEBUG", LevelFilter::DEBUG)]
    #[case("warning", LevelFilter::WARN)]
    #[case("WARN", LevelFilter::WARN)]
    #[case("CRITICAL", LevelFilter::ERROR)]
    #[case(" info ", LevelFilter::INFO)]
    #[case("OFF", LevelFilter::OFF)]
    fn gateway_level_names_map_to_filters(#[case] raw: &str, #[case] expected: LevelFilter) {
        assert_eq!(parse_log_level(raw).unwrap(), expected);
    }

    #[test]
    fn unknown_level_is_rejected() {
        assert!(matches!(
            parse_log_level("LOUD"),
            Err(ConfigError::UnknownLogLevel(l)) if l == "LOUD"
        ));
    }

    #[test]
    fn defaults_validate() {
        let config = DaemonConfig::new("identity", "/tmp/sbus");
        assert!(config.validate().is_ok());
        assert_eq!(config.failure_policy, FailurePolicy::Lenient);
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let mut config = DaemonConfig::new("identity", "/tmp/sbus");
        config.pool_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pool_size"));
    }

    #[test]
    fn empty_storlet_name_is_rejected() {
        let config = DaemonConfig::new("  ", "/tmp/sbus");
        assert!(config.validate().is_err());
    }
}
