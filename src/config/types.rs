use std::path::Path;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::api::ApiConfig;
use super::logging::LoggingConfig;
use super::upload::UploadConfig;

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "TAXTRACKER_CONFIG";
const ENV_PREFIX: &str = "TAXTRACKER_";
const DEFAULT_CONFIG_PATH: &str = "./config.yaml";

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0: service endpoints, upload tuning and logging.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ConfigV1 {
    pub api: ApiConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    // handle configuration migration between versions here when necessary
    pub fn into_current(self) -> ConfigV1 {
        match self {
            Config::ConfigV1(c) => c,
        }
    }
}

/// Load config from `$TAXTRACKER_CONFIG` (or `./config.yaml`), with
/// `TAXTRACKER_`-prefixed environment variables layered on top.
pub fn load_config() -> Result<ConfigV1, figment::Error> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_config_from(path)
}

/// Load config from an explicit YAML path plus environment overrides.
/// Nested keys are separated by `__`, e.g. `TAXTRACKER_API__BASE_URL`.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<ConfigV1, figment::Error> {
    let figment = Figment::new().merge(Yaml::file(path.as_ref())).merge(
        Env::prefixed(ENV_PREFIX)
            .ignore(&["CONFIG", "ACCESS_TOKEN"])
            .split("__"),
    );
    figment.extract::<Config>().map(Config::into_current)
}

/// Parse config from an inline YAML document (no environment layering).
pub fn config_from_yaml(yaml: &str) -> Result<ConfigV1, figment::Error> {
    Figment::new()
        .merge(Yaml::string(yaml))
        .extract::<Config>()
        .map(Config::into_current)
}

/// Render the JSON schema for the configuration.
pub fn config_schema() -> Result<String, serde_json::Error> {
    let schema = schema_for!(Config);
    serde_json::to_string_pretty(&schema)
}
