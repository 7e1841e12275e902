// ai
//! 📡 fdx: flow records in, Elasticsearch documents out.
//!
//! pmacct (or anything else that speaks NDJSON) writes one flow per line. fdx
//! reads them, runs them through an ordered list of transformation rules
//! (conditions + AddField / AddFieldLookup / DelField actions), stamps them,
//! and ships them to the `_bulk` API in batches. Every batch gets a grade, and
//! the run gets the worst grade any batch earned.
//!
//! 🧠 Knowledge graph:
//! - `app_config` → what the operator asked for
//! - `conditions`, `lookups`, `macros`, `rules` → the rule engine
//! - `pipeline` → the loop; `batcher` → flushing and grading
//! - `backends` → stdin/file sources, Elasticsearch/in-memory sinks
//! - `transforms` → the bulk wire format
//!
//! 🦆

pub mod app_config;
pub mod backends;
pub mod batcher;
pub mod common;
pub mod conditions;
pub mod errors;
pub mod lookups;
pub mod macros;
pub mod pipeline;
pub mod rules;
pub mod transforms;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

pub use app_config::{AppConfig, load_config};
pub use batcher::{RunOutcome, RunStats};
pub use common::Record;
pub use conditions::Condition;
pub use errors::{ConfigError, ConfigErrors};
pub use pipeline::{Pipeline, RunReport};
pub use rules::RuleSet;

use crate::backends::{ElasticsearchSink, LineSource, SinkBackend, SourceBackend};

/// 🏗️ Validate `config` into a [`Pipeline`], timestamped now.
///
/// `config_dir` anchors relative rule/lookup/template paths.
pub fn prepare(
    config: &AppConfig,
    plugin_name: Option<&str>,
    config_dir: Option<&Path>,
) -> Result<Pipeline, ConfigErrors> {
    Pipeline::from_config(config, plugin_name, Utc::now(), config_dir)
}

/// 🚀 The whole show: bootstrap the index, open the input, run the pipeline.
pub async fn run(config: &AppConfig, pipeline: &Pipeline, config_dir: Option<&Path>) -> Result<RunReport> {
    let sink = ElasticsearchSink::new(config.elasticsearch.clone(), pipeline.index_name())?;

    if config.elasticsearch.create_index {
        let template = match &config.elasticsearch.index_template_file {
            Some(file) => {
                let path = resolve_path(&pipeline.macros().expand(&file.to_string_lossy()), config_dir);
                let body = tokio::fs::read_to_string(&path).await.with_context(|| {
                    format!("💀 Could not read the index template '{}'", path.display())
                })?;
                Some(body)
            }
            None => None,
        };
        sink.ensure_index(template)
            .await
            .context("💀 Failed to make sure the target index exists")?;
    }

    let mut source = match &config.input.file {
        Some(file) => {
            let path = resolve_path(&pipeline.macros().expand(file), config_dir);
            info!("📂 reading flows from '{}'", path.display());
            SourceBackend::Lines(LineSource::open(&path).await?)
        }
        None => {
            info!("🚰 reading flows from stdin");
            SourceBackend::Lines(LineSource::stdin())
        }
    };

    Ok(pipeline
        .run(&mut source, SinkBackend::Elasticsearch(sink))
        .await)
}

fn resolve_path(path: &str, base_dir: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(path);
    match base_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn the_one_where_the_whole_show_runs_against_a_mock_cluster() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/flows-netflow"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/flows-netflow"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"acknowledged":true}"#))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/flows-netflow/_bulk"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"errors":false,"items":[]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir()?;
        let mut spool = std::fs::File::create(dir.path().join("netflow.json"))?;
        writeln!(spool, r#"{{"src":"1.1.1.1","bytes":100}}"#)?;
        writeln!(spool, r#"{{"src":"2.2.2.2","bytes":10}}"#)?;
        std::fs::write(dir.path().join("template.json"), r#"{"settings":{}}"#)?;

        let mut config = AppConfig::default();
        config.plugin_name = "netflow".into();
        config.input.file = Some("$PluginName.json".into());
        config.elasticsearch.url = server.uri();
        config.elasticsearch.index_name = "flows-$PluginName".into();
        config.elasticsearch.index_template_file = Some("template.json".into());

        let pipeline = prepare(&config, None, Some(dir.path())).map_err(|e| anyhow::anyhow!("{e}"))?;
        let report = run(&config, &pipeline, Some(dir.path())).await?;

        assert_eq!(report.outcome, RunOutcome::AllSucceeded);
        assert_eq!(report.stats.records_shipped, 2);
        Ok(())
    }
}
