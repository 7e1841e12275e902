// ai
//! 🔌 Backends: where the real I/O happens.
//!
//! 🚰 Source backends pour NDJSON lines in, Sink backends ship bulk bodies out.
//! And in between, we panic! (kidding, we use anyhow)
//!
//! 🎭 This module is the casting agency. Flows arriving on stdin from a pmacct
//! pipe? A spool file? A handful of strings a test typed by hand? We've got a
//! source for that. Need the batches to land in Elasticsearch, or in a Vec a test
//! can poke at afterwards? We've got a sink for that too.
//!
//! 🧠 Knowledge graph:
//! - `Source::next_line` yields raw lines. Parsing is the pipeline's job.
//! - `Sink::send` POSTs one finished bulk body and hands back the raw
//!   [`BulkResponse`]. Deciding whether that response was good news is the
//!   batcher's job, not ours. Sinks are I/O-only.
//! - Enum dispatch (`SourceBackend`, `SinkBackend`) instead of `Box<dyn ...>`:
//!   the set of backends is closed and known at compile time.
//!
//! 🦆 The duck is here because every file must have one. This is law. Do not question the duck.

use anyhow::Result;
use async_trait::async_trait;

pub mod elasticsearch;
pub mod in_mem;
pub mod line_source;

pub use elasticsearch::{Compression, ElasticsearchConfig, ElasticsearchSink, IndexBootstrap};
pub use in_mem::{InMemorySink, InMemorySource};
pub use line_source::LineSource;

// ===== Source Trait and Backend Enum =====

/// 🚰 A source that produces raw NDJSON lines.
///
/// # Contract
/// - `next_line` returns `Ok(Some(line))` while data flows, `Ok(None)` at end of input.
/// - Lines come back without their trailing newline. Blank lines are passed through;
///   skipping them is a pipeline decision.
/// - `&mut self` because sources have state. And feelings. Mostly state.
#[async_trait]
pub trait Source: std::fmt::Debug + Send {
    /// 📖 Fetch the next line from wherever the flows live.
    async fn next_line(&mut self) -> Result<Option<String>>;
}

/// 🎭 The many faces of a Source.
#[derive(Debug)]
pub enum SourceBackend {
    Lines(LineSource),
    InMemory(InMemorySource),
}

#[async_trait]
impl Source for SourceBackend {
    async fn next_line(&mut self) -> Result<Option<String>> {
        match self {
            SourceBackend::Lines(source) => source.next_line().await,
            SourceBackend::InMemory(source) => source.next_line().await,
        }
    }
}

// ===== Sink Trait and Backend Enum =====

/// 📬 What came back from the cluster after a bulk POST. Raw, unjudged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkResponse {
    pub status: u16,
    pub body: String,
}

impl BulkResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// 🕳️ A sink that accepts finished bulk bodies.
///
/// # Contract
/// - `send` delivers one body and returns whatever the other side said.
///   `Err` means the request never got an answer (connection refused, timeout,
///   unreadable response). Any HTTP status, even a 500, is an `Ok`.
/// - `close` releases whatever the sink holds. MUST be called. Skipping it is rude.
#[async_trait]
pub trait Sink: std::fmt::Debug + Send {
    /// 📡 Ship one `_bulk` request body.
    async fn send(&mut self, payload: String) -> Result<BulkResponse>;
    /// 🗑️ Flush, finalize, and release.
    async fn close(&mut self) -> Result<()>;
}

/// 🎭 The many faces of a Sink.
#[derive(Debug)]
pub enum SinkBackend {
    Elasticsearch(ElasticsearchSink),
    InMemory(InMemorySink),
}

#[async_trait]
impl Sink for SinkBackend {
    async fn send(&mut self, payload: String) -> Result<BulkResponse> {
        match self {
            SinkBackend::Elasticsearch(sink) => sink.send(payload).await,
            SinkBackend::InMemory(sink) => sink.send(payload).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            SinkBackend::Elasticsearch(sink) => sink.close().await,
            SinkBackend::InMemory(sink) => sink.close().await,
        }
    }
}
