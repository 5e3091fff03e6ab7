use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::tree::DEFAULT_MAX_LINK_HOPS;

pub const DEFAULT_LOG_FILTER: &str = "layerscope=debug,info";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub resolve: ResolveConfig,
    pub content: ContentConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    pub max_link_depth: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Directory for spooled file content. Content stays in memory when unset.
    pub spool_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Config {
    /// Load from an optional `layerscope.{toml,yaml,json}` file, then
    /// `LAYERSCOPE_` environment variables (`LAYERSCOPE_RESOLVE__MAX_LINK_DEPTH`).
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("layerscope").required(false))
            .add_source(config::Environment::with_prefix("LAYERSCOPE").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self { max_link_depth: DEFAULT_MAX_LINK_HOPS }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: DEFAULT_LOG_FILTER.to_string(), json: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.resolve.max_link_depth, 40);
        assert!(config.content.spool_dir.is_none());
        assert_eq!(config.logging.filter, "layerscope=debug,info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config);
        assert!(json.is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let json = r#"{
            "resolve": { "max_link_depth": 12 },
            "content": { "spool_dir": "/var/cache/layerscope" },
            "logging": { "filter": "layerscope=trace", "json": true }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.resolve.max_link_depth, 12);
        assert_eq!(config.content.spool_dir, Some(PathBuf::from("/var/cache/layerscope")));
        assert_eq!(config.logging.filter, "layerscope=trace");
        assert!(config.logging.json);
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let config: Config = serde_json::from_str(r#"{ "logging": { "json": true } }"#).unwrap();

        assert_eq!(config.resolve.max_link_depth, 40);
        assert_eq!(config.logging.filter, DEFAULT_LOG_FILTER);
        assert!(config.logging.json);
    }

    #[test]
    fn test_config_builder_source() {
        let config: Config = config::Config::builder()
            .set_override("resolve.max_link_depth", 5)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.resolve.max_link_depth, 5);
        assert!(config.content.spool_dir.is_none());
    }
}
