// ai
//! 📦 The Batcher: collects bulk fragments, ships them, grades the result.
//!
//! 🎬 COLD OPEN: INT. SORTING OFFICE, NIGHT SHIFT
//!
//! Postcards arrive one at a time. Nobody drives to the cluster for one postcard.
//! They go in the bin until the bin holds `flush_size` of them, then the whole
//! bin goes out in one truck. When the shift ends, whatever is left goes out too.
//! A `flush_size` of 0 means the bin has no bottom: one truck, at the very end.
//!
//! Every truck that comes back gets graded ([`classify`]):
//!
//! | what came back                                   | grade                         |
//! |--------------------------------------------------|-------------------------------|
//! | no answer at all                                 | `TransportFailure`            |
//! | status other than 200                            | `TransportFailure`            |
//! | 200, but no JSON / no boolean `errors`           | `TransportFailure`            |
//! | 200, `"errors": true`                            | `DeliveredWithRejections`     |
//! | 200, `"errors": false`                           | `Delivered`                   |
//!
//! The run keeps the worst grade it has seen ([`RunOutcome`]). A transport failure
//! is the end of the shift: the batcher reports it as an error and the pipeline
//! stops on the spot. No retries. Ever. 🦆

use std::fmt;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::backends::{BulkResponse, Sink};
use crate::transforms::compose_bulk_body;

/// 📬 The grade of one flushed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Delivered,
    DeliveredWithRejections { rejected: usize },
    TransportFailure(String),
}

/// 🏁 The grade of a whole run. Ordered from best to worst so `max` keeps the worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum RunOutcome {
    AllSucceeded,
    PartialFailure,
    FatalError,
}

impl RunOutcome {
    /// 🚪 Process exit code: 0 all good, 1 fatal, 2 partial.
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::AllSucceeded => 0,
            RunOutcome::FatalError => 1,
            RunOutcome::PartialFailure => 2,
        }
    }

    /// Keep whichever of the two is worse.
    pub fn escalate(&mut self, other: RunOutcome) {
        *self = (*self).max(other);
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunOutcome::AllSucceeded => "all succeeded",
            RunOutcome::PartialFailure => "partial failure",
            RunOutcome::FatalError => "fatal error",
        };
        f.write_str(label)
    }
}

/// 📊 Counters for the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub records_read: u64,
    pub records_transformed: u64,
    pub records_skipped: u64,
    /// Accepted by the cluster; rejected items are in `documents_rejected` instead.
    pub records_shipped: u64,
    pub batches_sent: u64,
    pub batches_with_rejections: u64,
    pub documents_rejected: u64,
}

/// 💀 A batch that never made it. Fatal for the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("bulk request of {documents} document(s) failed: {reason}")]
pub struct TransportFailure {
    pub documents: usize,
    pub reason: String,
}

/// 🔍 Grade a sink's answer to one bulk request.
pub fn classify(response: Result<BulkResponse>) -> FlushOutcome {
    let response = match response {
        Ok(response) => response,
        Err(err) => return FlushOutcome::TransportFailure(format!("{err:#}")),
    };
    if response.status != 200 {
        return FlushOutcome::TransportFailure(format!(
            "HTTP {}: {}",
            response.status,
            snippet(&response.body)
        ));
    }
    let parsed: Value = match serde_json::from_str(&response.body) {
        Ok(parsed) => parsed,
        Err(err) => {
            return FlushOutcome::TransportFailure(format!(
                "bulk response is not JSON ({err}): {}",
                snippet(&response.body)
            ));
        }
    };
    match parsed.get("errors").and_then(Value::as_bool) {
        Some(false) => FlushOutcome::Delivered,
        Some(true) => FlushOutcome::DeliveredWithRejections {
            rejected: count_rejected_items(&parsed),
        },
        None => FlushOutcome::TransportFailure(format!(
            "bulk response has no boolean 'errors' field: {}",
            snippet(&response.body)
        )),
    }
}

/// Items look like `{"index": {"status": 400, "error": {...}}}`: one action key, one result.
fn count_rejected_items(response: &Value) -> usize {
    let Some(items) = response.get("items").and_then(Value::as_array) else {
        return 0;
    };
    items
        .iter()
        .filter_map(|item| item.as_object()?.values().next())
        .filter(|result| {
            result.get("error").is_some_and(|error| !error.is_null())
                || result
                    .get("status")
                    .and_then(Value::as_u64)
                    .is_some_and(|status| status >= 300)
        })
        .count()
}

// -- error bodies can be megabytes of shard stack traces
fn snippet(body: &str) -> &str {
    const LIMIT: usize = 512;
    if body.len() <= LIMIT {
        return body;
    }
    let mut end = LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// 📦 Accumulates fragments and flushes them to a sink at the threshold.
#[derive(Debug)]
pub struct Batcher<S: Sink> {
    sink: S,
    flush_size: usize,
    fragments: Vec<String>,
    outcome: RunOutcome,
    stats: RunStats,
}

impl<S: Sink> Batcher<S> {
    /// `flush_size == 0` buffers everything until [`Batcher::finish`].
    pub fn new(sink: S, flush_size: usize) -> Self {
        Self {
            sink,
            flush_size,
            fragments: Vec::with_capacity(flush_size.min(64 * 1024)),
            outcome: RunOutcome::AllSucceeded,
            stats: RunStats::default(),
        }
    }

    pub fn pending(&self) -> usize {
        self.fragments.len()
    }

    pub fn outcome(&self) -> RunOutcome {
        self.outcome
    }

    pub fn stats_mut(&mut self) -> &mut RunStats {
        &mut self.stats
    }

    /// Worsen the run outcome from the outside (a bad input line, for one).
    pub fn escalate(&mut self, outcome: RunOutcome) {
        self.outcome.escalate(outcome);
    }

    /// ➕ Buffer one fragment; flush when the threshold is reached.
    pub async fn append(&mut self, fragment: String) -> Result<(), TransportFailure> {
        self.fragments.push(fragment);
        if self.flush_size > 0 && self.fragments.len() >= self.flush_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// 🚚 Ship whatever is buffered. The buffer is emptied whatever the grade.
    ///
    /// `Ok(None)` when there was nothing to ship: no request goes out.
    pub async fn flush(&mut self) -> Result<Option<FlushOutcome>, TransportFailure> {
        if self.fragments.is_empty() {
            return Ok(None);
        }
        let documents = self.fragments.len();
        let body = compose_bulk_body(&self.fragments);
        self.fragments.clear();

        debug!("🚚 flushing {} document(s), {} bytes", documents, body.len());
        self.stats.batches_sent += 1;
        let outcome = classify(self.sink.send(body).await);
        match &outcome {
            FlushOutcome::Delivered => {
                self.stats.records_shipped += documents as u64;
            }
            FlushOutcome::DeliveredWithRejections { rejected } => {
                warn!(
                    "⚠️ Elasticsearch rejected {} of {} document(s) in this batch",
                    rejected, documents
                );
                // -- shipped means indexed; the rejected ones never made it in
                self.stats.records_shipped += documents.saturating_sub(*rejected) as u64;
                self.stats.batches_with_rejections += 1;
                self.stats.documents_rejected += *rejected as u64;
                self.outcome.escalate(RunOutcome::PartialFailure);
            }
            FlushOutcome::TransportFailure(reason) => {
                self.outcome.escalate(RunOutcome::FatalError);
                return Err(TransportFailure {
                    documents,
                    reason: reason.clone(),
                });
            }
        }
        Ok(Some(outcome))
    }

    /// 🏁 Final flush, close the sink, report the grade.
    pub async fn finish(mut self) -> (RunOutcome, RunStats, Option<TransportFailure>) {
        let failure = self.flush().await.err();
        if let Err(err) = self.sink.close().await {
            warn!("⚠️ sink did not close cleanly: {err:#}");
        }
        (self.outcome, self.stats, failure)
    }
}
