use ::config::{Config, ConfigError, Environment, File};
use log::info;
use serde::Deserialize;

use crate::execution::Judge0Config;
use crate::interview::{EngineOptions, StdinSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub bind_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub backend: Backend,
    #[serde(default)]
    pub url: Option<String>,
    /// JSON catalog of users, questions and test cases loaded at startup.
    #[serde(default)]
    pub seed_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    pub default_language: String,
    pub broadcast_capacity: usize,
    pub stdin: StdinSource,
}

impl From<&EngineSettings> for EngineOptions {
    fn from(settings: &EngineSettings) -> Self {
        EngineOptions {
            default_language: settings.default_language.clone(),
            broadcast_capacity: settings.broadcast_capacity,
            stdin: settings.stdin,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub judge0: Judge0Config,
    pub engine: EngineSettings,
}

impl Settings {
    /// Built-in defaults, then `livecode.toml` if present, then
    /// `LIVECODE__SECTION__KEY` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Some("livecode"))
    }

    pub fn load_from(file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("server.bind_address", "127.0.0.1:8080")?
            .set_default("database.backend", "memory")?
            .set_default("judge0.base_url", "https://judge0-ce.p.rapidapi.com")?
            .set_default("engine.default_language", "javascript")?
            .set_default("engine.broadcast_capacity", 256)?
            .set_default("engine.stdin", "empty")?;

        if let Some(file) = file {
            builder = builder.add_source(File::with_name(file).required(false));
        }

        let settings: Settings = builder
            .add_source(Environment::with_prefix("LIVECODE").separator("__"))
            .build()?
            .try_deserialize()?;

        if settings.database.backend == Backend::Postgres && settings.database.url.is_none() {
            return Err(ConfigError::Message(
                "database.url is required when database.backend = \"postgres\"".to_string(),
            ));
        }
        if settings.engine.broadcast_capacity == 0 {
            return Err(ConfigError::Message("engine.broadcast_capacity must be positive".to_string()));
        }

        info!(
            "🔧 Configuration loaded (bind: {}, backend: {:?}, judge0: {})",
            settings.server.bind_address, settings.database.backend, settings.judge0.base_url
        );
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::load_from(None).unwrap();
        assert_eq!(settings.database.backend, Backend::Memory);
        assert_eq!(settings.engine.stdin, StdinSource::Empty);
        assert_eq!(settings.engine.default_language, "javascript");
        assert!(settings.judge0.api_key.is_none());

        let options = EngineOptions::from(&settings.engine);
        assert_eq!(options.broadcast_capacity, settings.engine.broadcast_capacity);
    }

    #[test]
    fn test_stdin_source_names() {
        let parsed: StdinSource = serde_json::from_str("\"test_input\"").unwrap();
        assert_eq!(parsed, StdinSource::TestInput);
        let parsed: Backend = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(parsed, Backend::Postgres);
    }
}
