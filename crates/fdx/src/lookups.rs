// ai
//! 📖 Lookup tables: static key → value data for the `AddFieldLookup` action.
//!
//! A table is a JSON object. Keys are strings (record values get stringified
//! before the lookup, so `2` finds `"2"`). The key `"*"` is the wildcard: it
//! answers whenever nobody else does, like the intern who picks up every
//! unclaimed ticket in the queue.
//!
//! ```text
//! {"1": "A", "*": "Z"}   resolve("1") → "A"
//!                        resolve("2") → "Z"
//! {"1": "A"}             resolve("2") → None (the caller leaves the field alone)
//! ```
//!
//! Tables are loaded once at configuration time (inline, or from a JSON file)
//! and shared read-only behind an `Arc` by every record in the run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// 🃏 The key that matches when nothing else does.
pub const WILDCARD_KEY: &str = "*";

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("could not read lookup table file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("lookup table file '{}' is not valid JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("lookup table file '{}' must hold a JSON object", .path.display())]
    NotAnObject { path: PathBuf },
}

/// 📖 A resolved, read-only key → value table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupTable {
    entries: HashMap<String, Value>,
}

impl LookupTable {
    /// 🏗️ Table written straight into the configuration.
    pub fn from_inline(entries: Map<String, Value>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// 📂 Table living in its own JSON file. Missing or malformed files fail
    /// configuration validation before a single record is read.
    pub fn from_file(path: &Path) -> Result<Self, LookupError> {
        let raw = std::fs::read_to_string(path).map_err(|source| LookupError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed: Value = serde_json::from_str(&raw).map_err(|source| LookupError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let Value::Object(entries) = parsed else {
            return Err(LookupError::NotAnObject {
                path: path.to_path_buf(),
            });
        };
        debug!(
            "📖 loaded lookup table '{}' with {} entries",
            path.display(),
            entries.len()
        );
        Ok(Self::from_inline(entries))
    }

    /// 🔍 Exact key first, then the wildcard, then nothing.
    pub fn resolve(&self, key: &str) -> Option<&Value> {
        self.entries
            .get(key)
            .or_else(|| self.entries.get(WILDCARD_KEY))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
