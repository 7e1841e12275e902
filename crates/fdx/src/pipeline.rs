// ai
//! 🚀 The Pipeline: one line in, one bulk fragment out, forever (or until EOF).
//!
//! 🎬 COLD OPEN: INT. FLOW COLLECTOR, THE SMALL HOURS
//!
//! A line arrives. It might be a flow record. It might be a half-written line
//! from a collector that got SIGKILLed. It might be blank, because someone's
//! script prints an empty line between every record "for readability".
//!
//! ```text
//!   Source ──line──▶ parse ──Record──▶ RuleSet ──▶ @timestamp ──▶ bulk fragment ──▶ Batcher ──▶ Sink
//!                      │                  │                                            │
//!                      ▼                  ▼                                            ▼
//!                halt input,        skip record,                              rejections: partial
//!                flush, fatal       warn, carry on                            transport: fatal, stop
//! ```
//!
//! 🧠 Knowledge graph:
//! - Strictly sequential. Each line and each bulk request is awaited before the next.
//! - [`Pipeline::from_config`] does all the validating up front and reports every
//!   configuration problem at once. Once it hands back a `Pipeline`, the only
//!   things left that can go wrong are the records and the network.
//! - The timestamp is taken once, at startup, and stamped on every record. A run
//!   is one moment in time as far as Kibana is concerned.
//!
//! 🦆 The duck watches the pipe. The pipe does not watch the duck.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use crate::app_config::AppConfig;
use crate::backends::{Sink, Source};
use crate::batcher::{Batcher, RunOutcome, RunStats, TransportFailure};
use crate::common::Record;
use crate::errors::ConfigErrors;
use crate::macros::MacroContext;
use crate::rules::{RuleError, RuleSet};
use crate::transforms::{EgressTransform, ElasticsearchBulk};

/// 🕰️ How the run's start time is written into records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// 💀 Why a run stopped being a success story.
#[derive(Debug, Error)]
pub enum FatalCause {
    #[error("input line {line} is not a JSON object: {reason}")]
    RecordParse { line: u64, reason: String },
    #[error("reading input failed: {0}")]
    Input(String),
    #[error(transparent)]
    Transport(#[from] TransportFailure),
}

/// 🏁 What a run amounted to.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub stats: RunStats,
    pub fatal: Vec<FatalCause>,
}

/// 🚀 A validated, ready-to-run pipeline.
#[derive(Debug)]
pub struct Pipeline {
    macros: MacroContext,
    index_name: String,
    rules: RuleSet,
    timestamp_field: String,
    timestamp: String,
    flush_size: usize,
}

impl Pipeline {
    /// 🏗️ Resolve the index name, load and compile every rule, fix the timestamp.
    ///
    /// `plugin_name` overrides the configured one. `base_dir` anchors relative
    /// rule and lookup table paths (normally the config file's directory).
    pub fn from_config(
        config: &AppConfig,
        plugin_name: Option<&str>,
        now: DateTime<Utc>,
        base_dir: Option<&Path>,
    ) -> Result<Self, ConfigErrors> {
        let plugin_name = plugin_name.unwrap_or(&config.plugin_name);
        let mut macros = MacroContext::new(
            plugin_name,
            config.elasticsearch.doc_type.clone().unwrap_or_default(),
        );
        let mut errors = ConfigErrors::default();

        let index_name = match macros.resolve_index_name(&config.elasticsearch.index_name, now) {
            Ok(name) => name.to_string(),
            Err(err) => {
                errors.push(err);
                String::new()
            }
        };

        let rules = match config.rule_definitions(base_dir) {
            Ok(definitions) => match RuleSet::compile(&definitions, base_dir) {
                Ok(rules) => rules,
                Err(compile_errors) => {
                    errors.0.extend(compile_errors.0);
                    RuleSet::default()
                }
            },
            Err(err) => {
                errors.push(err);
                RuleSet::default()
            }
        };

        errors.into_result(Self {
            macros,
            index_name,
            rules,
            timestamp_field: config.runtime.timestamp_field.clone(),
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            flush_size: config.runtime.flush_size,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// 🪄 Static macros for this run, `$IndexName` included.
    pub fn macros(&self) -> &MacroContext {
        &self.macros
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn flush_size(&self) -> usize {
        self.flush_size
    }

    /// 🔄 Run the rules, then stamp the run's timestamp (overwriting any existing value).
    ///
    /// Returns how many rules fired.
    pub fn transform(&self, record: &mut Record) -> Result<usize, RuleError> {
        let fired = self.rules.apply(record)?;
        trace!("🔄 {} transformation(s) fired", fired);
        if !self.timestamp_field.is_empty() {
            record.insert(self.timestamp_field.clone(), Value::String(self.timestamp.clone()));
        }
        Ok(fired)
    }

    /// 🏃 Drain `source` into `sink`.
    ///
    /// A line that isn't a JSON object stops the reading, but what was already
    /// batched still goes out. A transport failure stops everything on the spot.
    pub async fn run<Src, Snk>(&self, source: &mut Src, sink: Snk) -> RunReport
    where
        Src: Source,
        Snk: Sink,
    {
        info!(
            "🚀 shipping flows to index '{}' ({} transformation(s), flush every {})",
            self.index_name,
            self.rules.len(),
            match self.flush_size {
                0 => "end of input".to_string(),
                n => format!("{n} records"),
            }
        );

        let mut batcher = Batcher::new(sink, self.flush_size);
        let mut fatal = Vec::new();
        let mut line_number: u64 = 0;

        loop {
            let line = match source.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    error!("💀 input failed after line {}: {:#}", line_number, err);
                    fatal.push(FatalCause::Input(format!("{err:#}")));
                    batcher.escalate(RunOutcome::FatalError);
                    break;
                }
            };
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            batcher.stats_mut().records_read += 1;

            let mut record = match Record::parse(&line) {
                Ok(record) => record,
                Err(err) => {
                    error!("💀 line {} is not a flow record, no more input will be read: {}", line_number, err);
                    fatal.push(FatalCause::RecordParse {
                        line: line_number,
                        reason: err.to_string(),
                    });
                    batcher.escalate(RunOutcome::FatalError);
                    break;
                }
            };

            match self.transform(&mut record) {
                Ok(0) => {}
                Ok(_) => batcher.stats_mut().records_transformed += 1,
                Err(err) => {
                    warn!("⚠️ skipping line {}: {}", line_number, err);
                    batcher.stats_mut().records_skipped += 1;
                    continue;
                }
            }

            let fragment = match ElasticsearchBulk::transform_record(&record) {
                Ok(fragment) => fragment,
                Err(err) => {
                    warn!("⚠️ skipping line {}: {:#}", line_number, err);
                    batcher.stats_mut().records_skipped += 1;
                    continue;
                }
            };

            if let Err(failure) = batcher.append(fragment).await {
                error!("💀 {}; stopping at line {}", failure, line_number);
                fatal.push(FatalCause::Transport(failure));
                break;
            }
        }

        let (outcome, stats, failure) = batcher.finish().await;
        if let Some(failure) = failure {
            error!("💀 {}", failure);
            fatal.push(FatalCause::Transport(failure));
        }

        debug!("📊 run stats: {:?}", stats);
        info!(
            "🏁 run finished: {} ({} read, {} shipped, {} skipped, {} rejected)",
            outcome, stats.records_read, stats.records_shipped, stats.records_skipped, stats.documents_rejected
        );
        RunReport {
            outcome,
            stats,
            fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{
        BulkResponse, ElasticsearchConfig, ElasticsearchSink, InMemorySink, InMemorySource, LineSource, SinkBackend,
        SourceBackend,
    };
    use crate::errors::ConfigError;
    use crate::rules::RuleDefinition;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn launch_day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 13, 37, 0)
            .single()
            .expect("💀 a real date")
    }

    fn rule(conditions: Value, actions: Value) -> RuleDefinition {
        serde_json::from_value(json!({ "conditions": conditions, "actions": actions }))
            .expect("💀 test rule should deserialize")
    }

    fn high_volume_config() -> AppConfig {
        AppConfig {
            plugin_name: "netflow".into(),
            elasticsearch: ElasticsearchConfig {
                index_name: "flows-$PluginName-%Y.%m.%d".into(),
                ..ElasticsearchConfig::default()
            },
            transformations: vec![rule(
                json!([{"bytes": 50, "__op__": ">="}]),
                json!([{"type": "AddField", "name": "tag", "value": "high"}]),
            )],
            ..AppConfig::default()
        }
    }

    fn pipeline(config: &AppConfig) -> Pipeline {
        Pipeline::from_config(config, None, launch_day(), None).expect("💀 config should compile")
    }

    /// Every document source line of every body, parsed.
    async fn shipped_documents(sink: &InMemorySink) -> Vec<Value> {
        sink.bodies()
            .await
            .iter()
            .flat_map(|body| {
                body.lines()
                    .filter(|line| !line.is_empty() && *line != r#"{"index":{}}"#)
                    .map(|line| serde_json::from_str(line).expect("💀 shipped line is JSON"))
                    .collect::<Vec<Value>>()
            })
            .collect()
    }

    #[tokio::test]
    async fn the_one_where_big_flows_get_tagged_and_small_ones_dont() {
        let pipeline = pipeline(&high_volume_config());
        assert_eq!(pipeline.index_name(), "flows-netflow-2026.10.16");

        let sink = InMemorySink::new();
        let mut source = InMemorySource::new([
            r#"{"src":"1.1.1.1","bytes":100}"#,
            r#"{"src":"2.2.2.2","bytes":10}"#,
        ]);
        let report = pipeline.run(&mut source, sink.clone()).await;

        assert_eq!(report.outcome, RunOutcome::AllSucceeded);
        assert_eq!(report.stats.records_read, 2);
        assert_eq!(report.stats.records_transformed, 1);
        assert_eq!(report.stats.records_shipped, 2);
        assert!(report.fatal.is_empty());
        let documents = shipped_documents(&sink).await;
        assert_eq!(
            documents,
            vec![
                json!({"src":"1.1.1.1","bytes":100,"tag":"high","@timestamp":"2026-10-16T13:37:00Z"}),
                json!({"src":"2.2.2.2","bytes":10,"@timestamp":"2026-10-16T13:37:00Z"}),
            ]
        );
    }

    #[tokio::test]
    async fn the_one_where_no_rules_means_only_the_timestamp_changes() {
        let config = AppConfig {
            runtime: crate::app_config::RuntimeConfig {
                timestamp_field: "ts".into(),
                ..Default::default()
            },
            ..AppConfig::default()
        };
        let pipeline = pipeline(&config);
        let original = json!({"src":"10.0.0.1","dst":"10.0.0.2","ts":"yesterday","nested":{"a":[1,2]}});

        let sink = InMemorySink::new();
        let mut source = InMemorySource::new([original.to_string()]);
        pipeline.run(&mut source, sink.clone()).await;

        let mut expected = original.clone();
        expected["ts"] = json!("2026-10-16T13:37:00Z");
        assert_eq!(shipped_documents(&sink).await, vec![expected]);
    }

    #[tokio::test]
    async fn the_one_where_blank_lines_are_politely_ignored() {
        let pipeline = pipeline(&AppConfig::default());
        let sink = InMemorySink::new();
        let mut source = InMemorySource::new(["", r#"{"a":1}"#, "   ", r#"{"a":2}"#, ""]);
        let report = pipeline.run(&mut source, sink.clone()).await;

        assert_eq!(report.outcome, RunOutcome::AllSucceeded);
        assert_eq!(report.stats.records_read, 2);
        assert_eq!(shipped_documents(&sink).await.len(), 2);
    }

    #[tokio::test]
    async fn the_one_where_a_broken_line_stops_reading_but_still_ships() {
        let pipeline = pipeline(&AppConfig::default());
        let sink = InMemorySink::new();
        let mut source = InMemorySource::new([r#"{"a":1}"#, r#"{"a":2"#, r#"{"a":3}"#]);
        let report = pipeline.run(&mut source, sink.clone()).await;

        assert_eq!(report.outcome, RunOutcome::FatalError);
        assert!(matches!(report.fatal.as_slice(), [FatalCause::RecordParse { line: 2, .. }]));
        let documents = shipped_documents(&sink).await;
        assert_eq!(documents.len(), 1, "only the record before the bad line ships");
        assert_eq!(documents[0]["a"], 1);
    }

    #[tokio::test]
    async fn the_one_where_a_json_array_is_not_a_flow_record() {
        let pipeline = pipeline(&AppConfig::default());
        let mut source = InMemorySource::new(["[1,2,3]"]);
        let report = pipeline.run(&mut source, InMemorySink::new()).await;
        assert_eq!(report.outcome, RunOutcome::FatalError);
    }

    #[tokio::test]
    async fn the_one_where_a_misbehaving_record_is_skipped_not_fatal() {
        let config = AppConfig {
            transformations: vec![
                rule(
                    json!([{"bytes": 50, "__op__": ">="}]),
                    json!([{"type": "AddField", "name": "tag", "value": "high"}]),
                ),
                rule(
                    json!([{"bytes": 0, "__op__": ">="}]),
                    json!([{"type": "AddFieldLookup", "name": "site", "lookup_field_name": "tags",
                            "lookup_table": {"*": "anywhere"}}]),
                ),
            ],
            ..AppConfig::default()
        };
        let pipeline = pipeline(&config);
        let sink = InMemorySink::new();
        let mut source = InMemorySource::new([
            r#"{"bytes":"lots"}"#,
            r#"{"bytes":1,"tags":["a","b"]}"#,
            r#"{"bytes":100,"tags":"edge"}"#,
        ]);
        let report = pipeline.run(&mut source, sink.clone()).await;

        assert_eq!(report.outcome, RunOutcome::AllSucceeded);
        assert_eq!(report.stats.records_skipped, 2);
        assert_eq!(report.stats.records_shipped, 1);
        let documents = shipped_documents(&sink).await;
        assert_eq!(documents[0]["tag"], "high");
        assert_eq!(documents[0]["site"], "anywhere");
    }

    #[tokio::test]
    async fn the_one_where_a_dead_cluster_stops_everything() {
        let config = AppConfig {
            runtime: crate::app_config::RuntimeConfig {
                flush_size: 1,
                ..Default::default()
            },
            ..AppConfig::default()
        };
        let pipeline = pipeline(&config);
        let sink = InMemorySink::with_script([Err("connection refused".to_string())]);
        let mut source = InMemorySource::new([r#"{"a":1}"#, r#"{"a":2}"#, r#"{"a":3}"#]);
        let report = pipeline.run(&mut source, sink.clone()).await;

        assert_eq!(report.outcome, RunOutcome::FatalError);
        assert_eq!(sink.bodies().await.len(), 1, "no further batches after a transport failure");
        assert!(matches!(report.fatal.as_slice(), [FatalCause::Transport(_)]));
        assert!(sink.is_closed().await);
    }

    #[tokio::test]
    async fn the_one_where_one_rejection_makes_the_run_partial() {
        let config = AppConfig {
            runtime: crate::app_config::RuntimeConfig {
                flush_size: 2,
                ..Default::default()
            },
            ..AppConfig::default()
        };
        let pipeline = pipeline(&config);
        let sink = InMemorySink::with_script([Ok(BulkResponse::new(
            200,
            r#"{"errors":true,"items":[{"index":{"status":201}},{"index":{"status":429,"error":{"type":"es_rejected_execution_exception"}}}]}"#,
        ))]);
        // -- through the backend enums, the same way `fdx::run` hands them over
        let mut source = SourceBackend::InMemory(InMemorySource::new([r#"{"a":1}"#, r#"{"a":2}"#, r#"{"a":3}"#]));
        let report = pipeline.run(&mut source, SinkBackend::InMemory(sink.clone())).await;

        assert_eq!(report.outcome, RunOutcome::PartialFailure);
        assert_eq!(report.stats.batches_sent, 2, "a rejection does not stop the run");
        assert_eq!(report.stats.documents_rejected, 1);
        assert_eq!(report.stats.records_shipped, 2);
        assert!(report.fatal.is_empty());
        assert!(sink.is_closed().await);
    }

    #[tokio::test]
    async fn the_one_where_the_input_turns_to_garbage_mid_stream() {
        let pipeline = pipeline(&AppConfig::default());
        let sink = InMemorySink::new();
        let bytes: &[u8] = b"{\"a\":1}\n\xff\xfe\n{\"a\":2}\n";
        let mut source = SourceBackend::Lines(LineSource::from_reader("corrupt spool", bytes));
        let report = pipeline.run(&mut source, sink.clone()).await;

        assert_eq!(report.outcome, RunOutcome::FatalError);
        assert!(matches!(report.fatal.as_slice(), [FatalCause::Input(_)]));
        assert_eq!(report.stats.records_read, 1);
        let documents = shipped_documents(&sink).await;
        assert_eq!(documents.len(), 1, "what was read before the bad bytes still ships");
        assert_eq!(documents[0]["a"], 1);
    }

    #[test]
    fn the_one_where_every_config_problem_is_reported_at_once() {
        let config = AppConfig {
            elasticsearch: ElasticsearchConfig {
                index_name: "flows-%Q".into(),
                ..ElasticsearchConfig::default()
            },
            transformations: vec![
                rule(json!([{"bytes": 1, "__op__": "~="}]), json!([])),
                rule(json!([{"proto": "tcp"}]), json!([{"type": "Teleport"}])),
            ],
            ..AppConfig::default()
        };
        let errors = Pipeline::from_config(&config, None, launch_day(), None)
            .expect_err("💀 three problems, zero pipelines");

        assert_eq!(errors.len(), 3);
        assert!(matches!(errors.0[0], ConfigError::IndexNamePattern(_)));
        assert!(matches!(errors.0[1], ConfigError::Condition { rule: 1, .. }));
        assert!(matches!(errors.0[2], ConfigError::Action { rule: 2, action: 1, .. }));
    }

    #[test]
    fn the_one_where_the_cli_plugin_name_wins() {
        let pipeline = Pipeline::from_config(&high_volume_config(), Some("sflow"), launch_day(), None)
            .expect("💀 config should compile");
        assert_eq!(pipeline.index_name(), "flows-sflow-2026.10.16");
        assert_eq!(pipeline.macros().expand("/var/log/$PluginName.log"), "/var/log/sflow.log");
    }

    #[tokio::test]
    async fn the_one_where_flows_travel_all_the_way_to_a_mock_cluster() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/flows-netflow-2026.10.16/_bulk"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"took":2,"errors":false,"items":[{"index":{"status":201}},{"index":{"status":201}}]}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut config = high_volume_config();
        config.elasticsearch.url = server.uri();
        let pipeline = pipeline(&config);
        let sink = ElasticsearchSink::new(config.elasticsearch.clone(), pipeline.index_name())?;
        let mut source = InMemorySource::new([
            r#"{"src":"1.1.1.1","bytes":100}"#,
            r#"{"src":"2.2.2.2","bytes":10}"#,
        ]);
        let report = pipeline.run(&mut source, sink).await;
        assert_eq!(report.outcome, RunOutcome::AllSucceeded);

        let requests = server.received_requests().await.unwrap_or_default();
        let body = String::from_utf8(requests[0].body.clone())?;
        assert!(body.starts_with("{\"index\":{}}\n{\"src\":\"1.1.1.1\",\"bytes\":100,\"tag\":\"high\""));
        assert!(body.ends_with("}\n\n"));
        Ok(())
    }
}
