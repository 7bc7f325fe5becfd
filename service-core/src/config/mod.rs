use crate::error::AppError;
use config::{Config as Cfg, Environment, File};
use serde::Deserialize;

/// Settings shared by every service in the workspace.
///
/// Read from an optional `configuration.*` file and `APP__*` environment
/// variables, e.g. `APP__PORT=9000`, `APP__LOG_LEVEL=debug`.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// OTLP collector endpoint; trace export is disabled when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        Self::from_builder(
            Cfg::builder()
                .add_source(File::with_name("configuration").required(false))
                .add_source(Environment::with_prefix("APP").separator("__")),
        )
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, AppError> {
        Ok(builder.build()?.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sources_fall_back_to_defaults() {
        let config = Config::from_builder(Cfg::builder()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "info");
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let builder = Cfg::builder()
            .set_override("port", 9123)
            .unwrap()
            .set_override("otlp_endpoint", "http://collector:4317")
            .unwrap();

        let config = Config::from_builder(builder).unwrap();
        assert_eq!(config.port, 9123);
        assert_eq!(config.otlp_endpoint.as_deref(), Some("http://collector:4317"));
    }

    #[test]
    fn invalid_port_is_a_config_error() {
        let builder = Cfg::builder().set_override("port", "not-a-port").unwrap();
        assert!(matches!(
            Config::from_builder(builder),
            Err(AppError::ConfigError(_))
        ));
    }
}
