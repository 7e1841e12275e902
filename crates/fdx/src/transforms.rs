// ai
//! 🔄 Transforms: records in, wire format out.
//!
//! 🎬 COLD OPEN: INT. LOADING DOCK, 2:47 AM
//!
//! The rules have had their fun. Fields were added, fields were looked up,
//! fields were quietly deleted. The record is stamped with a timestamp and
//! wheeled to the loading dock, where someone has to wrap it in whatever the
//! destination expects. For Elasticsearch that's the bulk format: one action
//! line, one document line, newline after each. No exceptions. No negotiation.
//!
//! ## Knowledge Graph 🧠
//! - Depends on: `common::Record`
//! - Used by: `pipeline` (encode each record), `batcher` (join fragments into a body)
//! - Pattern: zero-sized marker type + trait with a static method, so the encoder
//!   gets monomorphized straight into the pipeline loop
//!
//! ⚠️ The singularity will index itself. Until then, we serde. 🦆

use crate::common::Record;
use anyhow::Result;

pub mod elasticsearch;

pub use elasticsearch::{ElasticsearchBulk, compose_bulk_body};

/// 📤 EgressTransform: converts a finished [`Record`] into the sink's wire format.
///
/// # Contract 📜
///
/// - Input: `&Record`, borrowed; the pipeline drops it right after
/// - Output: `String`, one self-contained fragment, newline-terminated
/// - The transform MUST produce valid output for the target system
pub trait EgressTransform {
    /// 🔄 Serialize a record into one fragment of the sink's wire format.
    fn transform_record(record: &Record) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 🧪 Two records in, one valid bulk body out.
    #[test]
    fn the_one_where_records_travel_all_the_way_to_a_bulk_body() -> Result<()> {
        let first = Record::parse(r#"{"src":"1.1.1.1","bytes":100,"tag":"high"}"#)?;
        let second = Record::parse(r#"{"src":"2.2.2.2","bytes":10}"#)?;

        let fragments = vec![
            ElasticsearchBulk::transform_record(&first)?,
            ElasticsearchBulk::transform_record(&second)?,
        ];
        let body = compose_bulk_body(&fragments);

        assert_eq!(
            body,
            "{\"index\":{}}\n{\"src\":\"1.1.1.1\",\"bytes\":100,\"tag\":\"high\"}\n\
             {\"index\":{}}\n{\"src\":\"2.2.2.2\",\"bytes\":10}\n\n"
        );
        Ok(())
    }
}
