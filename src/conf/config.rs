use crate::{
    backoff::Backoff,
    conf::{BackendConfig, RunConfig},
    core::BenchError::{self, ConfigParsingError},
};
use config::builder::DefaultState;
use config::{Config as CConfig, ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// Unprefixed variables accepted for compatibility, mapped onto run keys.
const LEGACY_ENV: [(&str, &str); 3] = [
    ("INITIAL_ROWS_COUNT", "run.rows_count"),
    ("STRESS_TESTS_WPS", "run.wps"),
    ("READERS_COUNT", "run.readers_count"),
];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub backoff: Backoff,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

impl Config {
    pub fn from_str(toml_str: &str) -> Result<Config, BenchError> {
        let builder =
            CConfig::builder().add_source(File::from_str(toml_str, FileFormat::Toml));
        Self::build(builder)
    }

    /// Loads the optional TOML file, then `UGCBENCH_*` variables, then the legacy ones.
    pub fn load(path: Option<&str>) -> Result<Config, BenchError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    pub fn load_with<F>(path: Option<&str>, lookup: F) -> Result<Config, BenchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = CConfig::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("UGCBENCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        for (var, key) in LEGACY_ENV {
            builder = builder.set_override_option(key, lookup(var))?;
        }
        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Config, BenchError> {
        let config = builder
            .build()
            .map_err(|e| ConfigParsingError(e.to_string()))?
            .try_deserialize::<Config>()
            .map_err(|e| ConfigParsingError(e.to_string()))?;
        config.run.validate()?;
        return Ok(config);
    }
}
