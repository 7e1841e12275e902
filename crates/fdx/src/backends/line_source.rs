// ai
//! 📂 Previously, on "Things That Could Go Wrong With A Pipe"...
//!
//! pmacct writes one JSON object per line. Sometimes to a spool file, sometimes
//! straight down a pipe into our stdin. Either way it's the same story: read a
//! line, hand it over, repeat until the other end hangs up.
//!
//! 🚰 file | stdin → BufReader → next_line() → pipeline
//! 💀 File missing → config was lying, we say so with the path in the message
//! 🦆 (mandatory, no notes)

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::trace;

use crate::backends::Source;

/// 📂 LineSource: reads newline-delimited text from a file or stdin.
///
/// 🧵 Async, non-blocking. The reader is boxed so one type covers both the
/// tokio `File` and tokio `Stdin` cases (and any in-memory reader a test wants).
pub struct LineSource {
    reader: Box<dyn AsyncBufRead + Unpin + Send>,
    label: String,
    lines_read: u64,
}

// 🐛 the boxed reader has no Debug; nobody debugging a LineSource wants its buffer anyway
impl std::fmt::Debug for LineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSource")
            .field("label", &self.label)
            .field("lines_read", &self.lines_read)
            .finish()
    }
}

impl LineSource {
    /// 🚰 Read from standard input.
    pub fn stdin() -> Self {
        Self::from_reader("<stdin>", BufReader::new(tokio::io::stdin()))
    }

    /// 📂 Open `path` for reading.
    pub async fn open(path: &Path) -> Result<Self> {
        // 💀 The door. It's locked. Or it doesn't exist. Or the filesystem lied to you.
        let file_handle = File::open(path).await.with_context(|| {
            format!(
                "💀 The door to '{}' would not budge. We checked if it existed (it might not). \
                 We checked permissions (they might be wrong). The file remains unopened.",
                path.display()
            )
        })?;
        Ok(Self::from_reader(
            path.display().to_string(),
            BufReader::new(file_handle),
        ))
    }

    /// 🧪 Wrap any buffered async reader.
    pub fn from_reader(
        label: impl Into<String>,
        reader: impl AsyncBufRead + Unpin + Send + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            label: label.into(),
            lines_read: 0,
        }
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}

#[async_trait]
impl Source for LineSource {
    async fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        // 📖 read_line appends into `line` and returns bytes read. 0 = EOF. The void calls.
        let bytes_read = self
            .reader
            .read_line(&mut line)
            .await
            .with_context(|| format!("💀 Reading line {} of '{}' failed", self.lines_read + 1, self.label))?;
        if bytes_read == 0 {
            trace!("📭 '{}' ran dry after {} lines", self.label, self.lines_read);
            return Ok(None);
        }
        self.lines_read += 1;

        // -- strip "\n" and a stray "\r" from Windows-flavoured exports
        let trimmed_len = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed_len);
        Ok(Some(line))
    }
}
