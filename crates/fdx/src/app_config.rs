// ai
//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment: `FDX_*` environment variables first, an optional TOML
//! file on top. Nested keys use a double underscore, so `FDX_ELASTICSEARCH__URL`
//! lands in `[elasticsearch] url`. When both speak, the file wins.
//!
//! ```toml
//! plugin_name = "netflow"
//!
//! [input]
//! file = "/var/spool/pmacct/$PluginName.json"
//!
//! [elasticsearch]
//! url = "http://localhost:9200"
//! index_name = "flows-$PluginName-%Y.%m.%d"
//!
//! [runtime]
//! flush_size = 5000
//!
//! [[transformations]]
//! conditions = [{ bytes = 50, __op__ = ">=" }]
//! actions = [{ type = "AddField", name = "tag", value = "high" }]
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;

use crate::backends::ElasticsearchConfig;
use crate::errors::ConfigError;
use crate::rules::{RuleDefinition, load_definitions_file};

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 🏷️ `$PluginName`. The CLI positional argument overrides it.
    #[serde(default = "default_plugin_name")]
    pub plugin_name: String,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 📜 Rules written straight into the config file. Run first.
    #[serde(default)]
    pub transformations: Vec<RuleDefinition>,
    /// 📂 JSON file with more rules. Run after the inline ones.
    #[serde(default)]
    pub transformations_file: Option<PathBuf>,
}

/// 🚰 Where flow records come from.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InputConfig {
    /// Static macros allowed. Unset means stdin.
    #[serde(default)]
    pub file: Option<String>,
}

/// 🎛️ Knobs for the pipeline loop.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// Documents per bulk request. 0 means one request at the end of input.
    #[serde(default = "default_flush_size")]
    pub flush_size: usize,
    /// Field stamped with the run's start time on every record.
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_size: default_flush_size(),
            timestamp_field: default_timestamp_field(),
        }
    }
}

/// 📝 Where the logs go and how chatty they are.
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive. `RUST_LOG` beats it.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Static macros allowed. Unset means stderr.
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_plugin_name() -> String {
    "default".to_string()
}

fn default_flush_size() -> usize {
    5000
}

fn default_timestamp_field() -> String {
    "@timestamp".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            plugin_name: default_plugin_name(),
            input: InputConfig::default(),
            elasticsearch: ElasticsearchConfig::default(),
            runtime: RuntimeConfig::default(),
            logging: LoggingConfig::default(),
            transformations: Vec::new(),
            transformations_file: None,
        }
    }
}

impl AppConfig {
    /// 📜 Inline transformations followed by the ones in `transformations_file`.
    ///
    /// A relative file path is taken relative to `base_dir` (the config file's directory).
    pub fn rule_definitions(
        &self,
        base_dir: Option<&Path>,
    ) -> Result<Vec<RuleDefinition>, ConfigError> {
        let mut definitions = self.transformations.clone();
        if let Some(file) = &self.transformations_file {
            let path = match base_dir {
                Some(dir) if file.is_relative() => dir.join(file),
                _ => file.clone(),
            };
            definitions.extend(load_definitions_file(&path)?);
        }
        Ok(definitions)
    }
}

/// 🚀 Load the config from env vars (`FDX_*`) and, if given, a TOML file. TOML wins.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = Figment::new().merge(Env::prefixed("FDX_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (FDX_*). \
             The file exists in our hearts, but apparently not in a shape serde likes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (FDX_*). \
                 No file was provided, this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}
