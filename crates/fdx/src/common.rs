// ai
//! 📦 Common data structures: the humble `Record`.
//!
//! 🎬 COLD OPEN: INT. NETWORK CLOSET, 4:59 PM, FRIDAY
//!
//! A pmacct print plugin wakes up, dumps a minute of flow accounting to disk,
//! and goes back to sleep. Each line it wrote is a tiny JSON object: a source
//! address, a destination, some bytes, some packets. Each line becomes a
//! [`Record`]. The record gets poked by rules, stamped with a timestamp, and
//! shipped off to a search cluster it will never meet in person.
//!
//! 🧠 Knowledge graph:
//! - Created by: `pipeline` (one parsed input line → one `Record`)
//! - Mutated by: `rules::RuleSet::apply` (in place, exclusively owned)
//! - Consumed by: `transforms::ElasticsearchBulk` (serialized, then dropped)
//! - Field order is preserved (`serde_json` + `preserve_order`), so the document
//!   that lands in the index looks like the line pmacct wrote. Plus whatever the
//!   rules bolted on. 🦆

use serde::Serialize;
use serde_json::{Map, Value};

/// 📦 One flow record: an ordered mapping of field name → JSON value.
///
/// Scalars (strings, numbers, booleans) are what the rules expect. Anything
/// fancier that pmacct decides to emit is carried through untouched, like a
/// suitcase nobody wants to open at customs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// 🏗️ Wrap an already-parsed JSON object.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// 🔄 Parse one input line. Anything that is not a JSON object is rejected,
    /// because a flow record that is a bare number is not a flow record. It's a cry for help.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let fields: Map<String, Value> = serde_json::from_str(line)?;
        Ok(Self { fields })
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// ✏️ Set `field` to `value`, overwriting whatever was there.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// 🗑️ Remove `field` if present. Absent fields are not an error. They're just absent.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        // -- shift_remove keeps the remaining fields in their original order
        self.fields.shift_remove(field)
    }

    /// 🔍 Field names, in record order. Used by the data-macro expander.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self::new(fields)
    }
}

/// 🔤 Render a field value as the plain string rules and lookups see.
///
/// Strings come out verbatim (no quotes), numbers and booleans in their JSON
/// spelling, `null` as `null`. Objects and arrays come out as compact JSON,
/// which is technically a string and emotionally a warning sign.
pub fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_a_line_becomes_a_record_in_the_same_order() {
        let record = Record::parse(r#"{"src":"1.1.1.1","bytes":100,"proto":"tcp"}"#)
            .expect("💀 a perfectly normal flow line should parse");
        let names: Vec<&str> = record.field_names().collect();
        assert_eq!(names, vec!["src", "bytes", "proto"]);
        assert_eq!(record.get("bytes"), Some(&json!(100)));
    }

    #[test]
    fn the_one_where_an_array_is_not_a_flow_record() {
        assert!(Record::parse("[1,2,3]").is_err());
        assert!(Record::parse("42").is_err());
        assert!(Record::parse("{not json").is_err());
    }

    #[test]
    fn the_one_where_remove_keeps_the_neighbours_in_line() {
        let mut record = Record::parse(r#"{"a":1,"b":2,"c":3}"#).expect("parse");
        assert_eq!(record.remove("b"), Some(json!(2)));
        assert_eq!(record.remove("nope"), None);
        assert_eq!(serde_json::to_string(&record).expect("ser"), r#"{"a":1,"c":3}"#);
    }

    #[test]
    fn the_one_where_values_are_stringified_without_quotes() {
        assert_eq!(stringify_value(&json!("tcp")), "tcp");
        assert_eq!(stringify_value(&json!(443)), "443");
        assert_eq!(stringify_value(&json!(1.5)), "1.5");
        assert_eq!(stringify_value(&json!(true)), "true");
        assert_eq!(stringify_value(&Value::Null), "null");
    }
}
