// ai
//! # Previously, on fdx...
//!
//! 🎬 The cluster was down for maintenance. Or it was never up. Or it was a CI
//! box with no cluster at all. Someone still had to prove that flows went in one
//! end and bulk bodies came out the other. That someone was this module.
//!
//! [`InMemorySource`] hands out a fixed list of lines, then nothing.
//! [`InMemorySink`] hoards every body it receives behind an `Arc<Mutex<...>>`
//! so callers can inspect what arrived, and answers each one from a script of
//! canned responses. Default answer: a clean `{"errors":false}`.
//!
//! ⚠️ This is NOT for production. This is for tests. If you're deploying this
//! to prod, please also deploy a therapist. 🦆

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backends::{BulkResponse, Sink, Source};

/// 📦 Lines from RAM. Once they're gone, they're gone.
#[derive(Debug, Default)]
pub struct InMemorySource {
    lines: VecDeque<String>,
}

impl InMemorySource {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Source for InMemorySource {
    async fn next_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

/// 🎭 One canned answer: a response, or a transport error with a message.
pub type ScriptedResponse = Result<BulkResponse, String>;

/// The response an unscripted sink gives: accepted, no complaints.
pub const ACCEPTED_BODY: &str = r#"{"took":1,"errors":false,"items":[]}"#;

/// 📦 A sink that never forgets.
///
/// Clone-able because tests need to peek inside after handing `self` off to the
/// pipeline. The `Arc` means every clone shares the same vault.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    /// 🔒 Every body received, in order.
    pub received: Arc<Mutex<Vec<String>>>,
    script: Arc<Mutex<VecDeque<ScriptedResponse>>>,
    closed: Arc<Mutex<bool>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 🎬 Answer the next sends with these, in order. After the script runs out,
    /// every send is accepted with [`ACCEPTED_BODY`].
    pub fn with_script<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = ScriptedResponse>,
    {
        Self {
            script: Arc::new(Mutex::new(responses.into_iter().collect())),
            ..Self::default()
        }
    }

    pub async fn bodies(&self) -> Vec<String> {
        self.received.lock().await.clone()
    }

    pub async fn is_closed(&self) -> bool {
        *self.closed.lock().await
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn send(&mut self, payload: String) -> Result<BulkResponse> {
        self.received.lock().await.push(payload);
        match self.script.lock().await.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(reason)) => Err(anyhow!(reason)),
            None => Ok(BulkResponse::new(200, ACCEPTED_BODY)),
        }
    }

    async fn close(&mut self) -> Result<()> {
        *self.closed.lock().await = true;
        Ok(())
    }
}
