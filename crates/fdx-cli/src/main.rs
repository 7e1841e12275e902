// ai
//! 🚀 fdx-cli: the front door, the bouncer, the maitre d' of fdx.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that loads config, sets up
//! logging, and then lets the real code do the heavy lifting. Like a manager.
//!
//! Three moods:
//! - `fdx [PLUGIN_NAME]`: ship flows, print a summary, exit 0 / 1 / 2.
//! - `fdx --test-config`: validate everything, run nothing.
//! - `fdx --test-condition '<condition>' '<record>'`: does this rule match this flow? 🦆

mod summary;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use fdx::{AppConfig, Condition, Pipeline, Record};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "fdx.toml";

/// 📡 Ship pmacct-style NDJSON flow records to Elasticsearch, transformed on the way.
#[derive(Debug, Parser)]
#[command(name = "fdx", version)]
struct Cli {
    /// Configuration file (defaults to fdx.toml when it exists)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Overrides `plugin_name` from the configuration ($PluginName)
    #[arg(value_name = "PLUGIN_NAME")]
    plugin_name: Option<String>,

    /// Load and validate everything, print what would run, then exit
    #[arg(long, conflicts_with = "test_condition")]
    test_config: bool,

    /// Compile a condition, evaluate it against a record, print the answer, exit
    #[arg(long, num_args = 2, value_names = ["CONDITION_JSON", "RECORD_JSON"])]
    test_condition: Option<Vec<String>>,
}

/// 🚀 main(): where it all begins. The "I pressed F5 and held my breath" moment.
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Some(args) = &cli.test_condition {
        init_tracing("warn", None);
        let code = match test_condition(&args[0], &args[1]) {
            Ok(matched) => {
                println!("{matched}");
                0
            }
            Err(err) => {
                eprintln!("💀 {err:#}");
                1
            }
        };
        std::process::exit(code);
    }

    let config_file = match resolve_config_file(cli.config.as_deref()) {
        Ok(file) => file,
        Err(err) => bail_out(err),
    };
    let config_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf);

    // 🔧 the moment where we find out if someone put a tab where a space should be
    let app_config = match fdx::load_config(config_file.as_deref()) {
        Ok(config) => config,
        Err(err) => bail_out(err),
    };

    let pipeline = match fdx::prepare(&app_config, cli.plugin_name.as_deref(), config_dir.as_deref()) {
        Ok(pipeline) => pipeline,
        Err(errors) => {
            init_tracing(&app_config.logging.level, None);
            error!("💀 {}", errors);
            std::process::exit(1);
        }
    };

    let log_file = app_config
        .logging
        .file
        .as_deref()
        .map(|file| PathBuf::from(pipeline.macros().expand(file).as_ref()));
    init_tracing(&app_config.logging.level, log_file.as_deref());
    info!("🔧 configuration loaded from {}", config_source(config_file.as_deref()));

    if cli.test_config {
        print!("{}", describe(&app_config, &pipeline));
        std::process::exit(0);
    }

    match fdx::run(&app_config, &pipeline, config_dir.as_deref()).await {
        Ok(report) => {
            eprintln!("{}", summary::render(&report));
            for cause in &report.fatal {
                error!("💀 {}", cause);
            }
            info!("🏁 exiting with {}", report.outcome.exit_code());
            std::process::exit(report.outcome.exit_code());
        }
        Err(err) => bail_out(err),
    }
}

/// 📝 `RUST_LOG` wins; otherwise the configured level. Stderr unless a log file is set.
fn init_tracing(level: &str, log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file = log_file.and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(file),
            Err(err) => {
                eprintln!("⚠️ could not open log file '{}' ({err}), logging to stderr", path.display());
                None
            }
        }
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    // -- try_init: a second call (prepare failed, then we log) must not panic
    let _ = match file {
        Some(file) => builder.with_ansi(false).with_writer(Mutex::new(file)).try_init(),
        None => builder.with_writer(std::io::stderr).try_init(),
    };
}

/// 🔒 Explicit path must exist. No path: `fdx.toml` if it's there, env vars only otherwise.
fn resolve_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) => {
            let exists = path.try_exists().with_context(|| {
                format!("💀 Couldn't check whether configuration file '{}' exists", path.display())
            })?;
            if !exists {
                anyhow::bail!(
                    "💀 Configuration file '{}' does not exist. Double check the path, or use an \
                     absolute one to be absolutely certain.",
                    path.display()
                );
            }
            Ok(Some(path.to_path_buf()))
        }
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            Ok(default.is_file().then_some(default))
        }
    }
}

fn config_source(config_file: Option<&Path>) -> String {
    match config_file {
        Some(path) => format!("'{}' and FDX_* environment variables", path.display()),
        None => "FDX_* environment variables only".to_string(),
    }
}

fn test_condition(condition_json: &str, record_json: &str) -> Result<bool> {
    let raw: serde_json::Value =
        serde_json::from_str(condition_json).context("💀 The condition is not valid JSON")?;
    let condition = Condition::compile(&raw).context("💀 The condition does not compile")?;
    let record = Record::parse(record_json).context("💀 The record is not a JSON object")?;
    info!("🔍 evaluating {}", condition);
    condition
        .evaluate(&record)
        .context("💀 The condition could not be evaluated against this record")
}

fn describe(config: &AppConfig, pipeline: &Pipeline) -> String {
    let mut out = String::new();
    out.push_str("✅ configuration OK\n");
    out.push_str(&format!("  elasticsearch: {}\n", config.elasticsearch.url));
    out.push_str(&format!("  index:         {}\n", pipeline.index_name()));
    out.push_str(&format!(
        "  input:         {}\n",
        config
            .input
            .file
            .as_deref()
            .map_or_else(|| "<stdin>".to_string(), |file| pipeline.macros().expand(file).into_owned())
    ));
    out.push_str(&format!(
        "  flush size:    {}\n",
        match pipeline.flush_size() {
            0 => "end of input".to_string(),
            n => n.to_string(),
        }
    ));
    out.push_str(&format!("  transformations: {}\n", pipeline.rules().len()));
    for (index, rule) in pipeline.rules().rules().iter().enumerate() {
        out.push_str(&format!(
            "    #{} if {} → {} action(s)\n",
            index + 1,
            rule.condition(),
            rule.actions().len()
        ));
    }
    out
}

/// 💀 Print the error chain (plus a hint if it smells like a network problem) and exit 1.
fn bail_out(err: anyhow::Error) -> ! {
    init_tracing("info", None);
    error!("💀 error: {}", err);
    // -- 🧅 peel the onion of sadness, one layer at a time
    let mut the_vibes_are_giving_connection_issues = false;
    for cause in err.chain().skip(1) {
        error!("⚠️  cause: {}", cause);
        let cause_str = cause.to_string();
        if cause_str.contains("error sending request")
            || cause_str.contains("connection refused")
            || cause_str.contains("Connection refused")
            || cause_str.contains("tcp connect error")
            || cause_str.contains("dns error")
        {
            the_vibes_are_giving_connection_issues = true;
        }
    }

    if the_vibes_are_giving_connection_issues {
        error!(
            "🔧 hint: looks like Elasticsearch isn't reachable. Double-check that it is \
             actually running and that `elasticsearch.url` points at it. If you're using \
             Docker, try `docker ps` to see what's up. ☕"
        );
    }

    std::process::exit(1);
}
