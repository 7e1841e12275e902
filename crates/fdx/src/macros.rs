// ai
//! 🪄 Macros: `$Something` in, something out.
//!
//! Two flavours, one scanner:
//!
//! 1. **Static macros** ([`StaticMacro`]): `$PluginName`, `$IndexName`, `$Type`.
//!    Expanded once, at configuration time, inside configuration strings (index
//!    name pattern, input file path, log file path, template file path). No
//!    record in sight.
//! 2. **Data macros** ([`expand_data_macros`]): `$<fieldName>` inside an action's
//!    value, replaced per record with that field's current value. `$src` in
//!    `"from $src"` becomes `"from 10.0.0.1"`. Unknown tokens stay exactly as
//!    written. Nobody gets an error for a typo. Nobody gets a medal either.
//!
//! 🧠 Knowledge graph:
//! - Both go through `substitute`, which only walks the `$` positions `memchr` finds
//!   and hands back a `Cow::Borrowed` when nothing matched.
//! - Data macros pick the LONGEST field name that prefixes the text after `$`, so
//!   `$src_port` never turns into `<value of src>_port` when both fields exist.
//! - The index name also goes through strftime (chrono) with the run's start time:
//!   `flows-$PluginName-%Y.%m.%d` → `flows-netflow-2026.10.16`. 🦆

use std::borrow::Cow;
use std::fmt;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use memchr::{memchr, memchr_iter};

use crate::common::{Record, stringify_value};
use crate::errors::ConfigError;

/// 🏷️ The fixed set of configuration-time placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticMacro {
    PluginName,
    IndexName,
    Type,
}

impl StaticMacro {
    pub const ALL: [StaticMacro; 3] = [Self::PluginName, Self::IndexName, Self::Type];

    /// The token without its leading `$`.
    pub fn token(self) -> &'static str {
        match self {
            Self::PluginName => "PluginName",
            Self::IndexName => "IndexName",
            Self::Type => "Type",
        }
    }
}

impl fmt::Display for StaticMacro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.token())
    }
}

/// 🧳 The values static macros expand to, for one run.
///
/// `index_name` stays `None` until [`MacroContext::resolve_index_name`] has
/// produced it. Until then `$IndexName` is left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroContext {
    plugin_name: String,
    doc_type: String,
    index_name: Option<String>,
}

impl MacroContext {
    pub fn new(plugin_name: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            doc_type: doc_type.into(),
            index_name: None,
        }
    }

    pub fn index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }

    fn value_of(&self, macro_: StaticMacro) -> Option<&str> {
        match macro_ {
            StaticMacro::PluginName => Some(&self.plugin_name),
            StaticMacro::IndexName => self.index_name.as_deref(),
            StaticMacro::Type => Some(&self.doc_type),
        }
    }

    /// 🪄 Replace every known `$Token` in `input`.
    pub fn expand<'a>(&self, input: &'a str) -> Cow<'a, str> {
        substitute(input, |rest| {
            StaticMacro::ALL.iter().find_map(|macro_| {
                let token = macro_.token();
                if !rest.starts_with(token) {
                    return None;
                }
                self.value_of(*macro_)
                    .map(|value| (token.len(), value.to_string()))
            })
        })
    }

    /// 📅 Expand `pattern` (macros first, then strftime against `now`) and
    /// remember the result as `$IndexName` for everything expanded afterwards.
    pub fn resolve_index_name(
        &mut self,
        pattern: &str,
        now: DateTime<Utc>,
    ) -> Result<&str, ConfigError> {
        let expanded = self.expand(pattern).into_owned();
        let items: Vec<Item<'_>> = StrftimeItems::new(&expanded).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::IndexNamePattern(pattern.to_string()));
        }
        let index_name = now.format_with_items(items.into_iter()).to_string();
        if index_name.is_empty() {
            return Err(ConfigError::IndexNamePattern(pattern.to_string()));
        }
        Ok(self.index_name.insert(index_name).as_str())
    }
}

/// 🔁 Replace `$<field>` tokens in `template` with the record's current values.
///
/// Strings without a `$` are handed straight back, borrowed and untouched.
pub fn expand_data_macros<'a>(template: &'a str, record: &Record) -> Cow<'a, str> {
    substitute(template, |rest| {
        record
            .field_names()
            .filter(|name| !name.is_empty() && rest.starts_with(name))
            .max_by_key(|name| name.len())
            .and_then(|name| {
                record
                    .get(name)
                    .map(|value| (name.len(), stringify_value(value)))
            })
    })
}

/// Walks each `$` in `input`; `resolve` receives the text right after the `$`
/// and answers with (bytes consumed, replacement) or `None` to leave it alone.
fn substitute<'a, F>(input: &'a str, mut resolve: F) -> Cow<'a, str>
where
    F: FnMut(&str) -> Option<(usize, String)>,
{
    let bytes = input.as_bytes();
    if memchr(b'$', bytes).is_none() {
        return Cow::Borrowed(input);
    }

    let mut output: Option<String> = None;
    let mut cursor = 0;
    for dollar in memchr_iter(b'$', bytes) {
        if dollar < cursor {
            // -- this `$` was part of a value we already consumed
            continue;
        }
        let rest = &input[dollar + 1..];
        if let Some((consumed, replacement)) = resolve(rest) {
            let out = output.get_or_insert_with(|| String::with_capacity(input.len() + 16));
            out.push_str(&input[cursor..dollar]);
            out.push_str(&replacement);
            cursor = dollar + 1 + consumed;
        }
    }

    match output {
        Some(mut out) => {
            out.push_str(&input[cursor..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(input),
    }
}
