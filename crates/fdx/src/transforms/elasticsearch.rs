// ai
//! 📡 Elasticsearch Bulk Transform: formatting records for the bulk API's peculiar tastes 🚀
//!
//! Rule 1: Two lines per document. Action metadata, then document source. Always.
//! Rule 2: Newline-delimited. Not comma-separated. Not XML. NEWLINES.
//! Rule 3: The body ends with a newline. Ours ends with a blank line on top of that,
//!          which the bulk API shrugs at and curl users recognise. 🦆
//!
//! The action line is the empty index command `{"index":{}}`: index and type come
//! from the request URL, ids are left to Elasticsearch.

use super::EgressTransform;
use crate::common::Record;
use anyhow::{Context, Result};

/// 🎬 The action line every fragment starts with.
pub const INDEX_ACTION_LINE: &str = r#"{"index":{}}"#;

/// 📡 ElasticsearchBulk: the format whisperer for ES bulk indexing.
///
/// ```text
/// {"index":{}}
/// {"src":"1.1.1.1","bytes":100,"@timestamp":"2026-10-16T13:37:00Z"}
/// ```
pub struct ElasticsearchBulk;

impl EgressTransform for ElasticsearchBulk {
    fn transform_record(record: &Record) -> Result<String> {
        let document = serde_json::to_string(record).context(
            "💀 Failed to serialize a flow record for the bulk body. \
             It was valid JSON when it came in. Something in the rules made it sad.",
        )?;
        let mut fragment =
            String::with_capacity(INDEX_ACTION_LINE.len() + document.len() + 2);
        fragment.push_str(INDEX_ACTION_LINE);
        fragment.push('\n');
        fragment.push_str(&document);
        fragment.push('\n');
        Ok(fragment)
    }
}

/// 📦 Join fragments into one `_bulk` request body, trailing blank line included.
pub fn compose_bulk_body(fragments: &[String]) -> String {
    // 🧮 Pre-allocate: every fragment plus the final newline. No reallocs. No drama.
    let estimated_size: usize = fragments.iter().map(String::len).sum::<usize>() + 1;
    let mut body = String::with_capacity(estimated_size);
    for fragment in fragments {
        body.push_str(fragment);
    }
    body.push('\n');
    body
}
