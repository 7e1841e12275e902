// ai
//! 📜 Rules: "when this, do that", in configured order, to every record.
//!
//! 🎬 COLD OPEN: INT. NOC, SHIFT CHANGE
//!
//! "Why does every flow from AS65000 say `customer: acme`?"
//! "Rule #3." "And why did `peer_ip_src` disappear?" "Rule #5." "And why..."
//! "Rule #7. It's always a rule. Read the config."
//!
//! A [`Rule`] pairs one compiled [`Condition`] with an ordered list of
//! [`Action`]s. A [`RuleSet`] runs its rules top to bottom against each record;
//! rule N+1 sees whatever rule N did, so order matters, the same way it matters
//! whether you put on socks or shoes first.
//!
//! ## Actions
//!
//! | type             | effect                                                             |
//! |------------------|--------------------------------------------------------------------|
//! | `AddField`       | `record[name] = value` (strings get `$field` data macros)          |
//! | `AddFieldLookup` | `record[name] = table[record[lookup_field_name]]`, `"*"` fallback  |
//! | `DelField`       | drop `record[name]` if it is there                                 |
//!
//! ## Knowledge graph 🧠
//! - Definitions come from `app_config` (inline TOML) or a JSON transformations file.
//! - [`RuleSet::compile`] validates EVERYTHING and returns every problem at once.
//! - Per-record failures come back as [`RuleError`]; the pipeline skips that record
//!   and keeps going. One bad record does not get to ruin the whole minute of flows. 🦆

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::trace;

use crate::common::{Record, stringify_value};
use crate::conditions::{Condition, ConditionError};
use crate::errors::{ConfigError, ConfigErrors};
use crate::lookups::LookupTable;
use crate::macros::expand_data_macros;

// ============================================================
// 📝 Definitions: what the configuration says
// ============================================================

/// 📝 One transformation as written in configuration.
///
/// `conditions` and `actions` stay raw JSON here. They get compiled (and
/// complained about) by [`RuleSet::compile`].
#[derive(Debug, Clone, Deserialize)]
pub struct RuleDefinition {
    pub conditions: Value,
    #[serde(default)]
    pub actions: Vec<Value>,
}

/// 📝 One action as written in configuration, tagged on `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ActionDefinition {
    AddField {
        name: String,
        value: Value,
    },
    AddFieldLookup {
        name: String,
        lookup_field_name: String,
        #[serde(default)]
        lookup_table: Option<Map<String, Value>>,
        #[serde(default)]
        lookup_table_file: Option<PathBuf>,
    },
    DelField {
        name: String,
    },
}

/// 📂 Read transformation definitions from a JSON file holding a list of them.
pub fn load_definitions_file(path: &Path) -> Result<Vec<RuleDefinition>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::TransformationsFile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|err| ConfigError::TransformationsFile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

// ============================================================
// 🔧 Compiled actions and rules
// ============================================================

/// 🔧 A compiled, ready-to-run action.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    AddField {
        name: String,
        value: Value,
    },
    AddFieldLookup {
        name: String,
        lookup_field: String,
        table: Arc<LookupTable>,
    },
    DelField {
        name: String,
    },
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("lookup field '{field}' holds {kind}, which cannot be used as a lookup key")]
    UnsupportedLookupKey { field: String, kind: &'static str },
}

impl Action {
    /// ✏️ Apply this action to the record, in place.
    pub fn apply(&self, record: &mut Record) -> Result<(), ActionError> {
        match self {
            Self::AddField { name, value } => {
                let value = expand_value(value, record);
                record.insert(name.clone(), value);
            }
            Self::AddFieldLookup {
                name,
                lookup_field,
                table,
            } => {
                let key = match record.get(lookup_field) {
                    // -- 🫥 nothing to look up with, nothing to do
                    None => return Ok(()),
                    Some(Value::Array(_)) => {
                        return Err(ActionError::UnsupportedLookupKey {
                            field: lookup_field.clone(),
                            kind: "a list",
                        });
                    }
                    Some(Value::Object(_)) => {
                        return Err(ActionError::UnsupportedLookupKey {
                            field: lookup_field.clone(),
                            kind: "an object",
                        });
                    }
                    Some(scalar) => stringify_value(scalar),
                };
                if let Some(resolved) = table.resolve(&key) {
                    let value = expand_value(resolved, record);
                    record.insert(name.clone(), value);
                }
            }
            Self::DelField { name } => {
                record.remove(name);
            }
        }
        Ok(())
    }
}

/// Strings get data macros, every other JSON value is used as-is.
fn expand_value(value: &Value, record: &Record) -> Value {
    match value {
        Value::String(template) => {
            Value::String(expand_data_macros(template, record).into_owned())
        }
        other => other.clone(),
    }
}

/// 💀 Something went wrong while running a rule against one record.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("transformation #{rule}: condition could not be evaluated: {source}")]
    Condition {
        rule: usize,
        source: ConditionError,
    },
    #[error("transformation #{rule}, action #{action}: {source}")]
    Action {
        rule: usize,
        action: usize,
        source: ActionError,
    },
}

/// 📜 A condition and the actions to run when it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    position: usize,
    condition: Condition,
    actions: Vec<Action>,
}

impl Rule {
    /// `position` is the 1-based place of this rule in its set, used in error messages.
    pub fn new(position: usize, condition: Condition, actions: Vec<Action>) -> Self {
        Self {
            position,
            condition,
            actions,
        }
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn applies(&self, record: &Record) -> Result<bool, RuleError> {
        self.condition
            .evaluate(record)
            .map_err(|source| RuleError::Condition {
                rule: self.position,
                source,
            })
    }

    /// ✏️ Run every action, in order. Stops at the first failing action.
    pub fn apply(&self, record: &mut Record) -> Result<(), RuleError> {
        for (index, action) in self.actions.iter().enumerate() {
            action.apply(record).map_err(|source| RuleError::Action {
                rule: self.position,
                action: index + 1,
                source,
            })?;
        }
        Ok(())
    }
}

/// 📚 The ordered list of rules every record walks through.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// 🏗️ Compile and validate every definition.
    ///
    /// Relative `lookup_table_file` paths resolve against `base_dir` (the
    /// configuration file's directory) when one is given. A file referenced by
    /// several actions is read once and shared.
    pub fn compile(
        definitions: &[RuleDefinition],
        base_dir: Option<&Path>,
    ) -> Result<Self, ConfigErrors> {
        let mut errors = ConfigErrors::default();
        let mut loaded_tables: HashMap<PathBuf, Arc<LookupTable>> = HashMap::new();
        let mut rules = Vec::with_capacity(definitions.len());

        for (rule_index, definition) in definitions.iter().enumerate() {
            let position = rule_index + 1;

            let condition = match Condition::compile(&definition.conditions) {
                Ok(condition) => Some(condition),
                Err(source) => {
                    errors.push(ConfigError::Condition {
                        rule: position,
                        source,
                    });
                    None
                }
            };

            let mut actions = Vec::with_capacity(definition.actions.len());
            for (action_index, raw) in definition.actions.iter().enumerate() {
                let action_position = action_index + 1;
                match compile_action(raw, base_dir, &mut loaded_tables) {
                    Ok(action) => actions.push(action),
                    Err(ActionCompileError::Invalid(reason)) => errors.push(ConfigError::Action {
                        rule: position,
                        action: action_position,
                        reason,
                    }),
                    Err(ActionCompileError::Table(source)) => {
                        errors.push(ConfigError::LookupTable {
                            rule: position,
                            action: action_position,
                            source,
                        })
                    }
                }
            }

            if let Some(condition) = condition {
                rules.push(Rule::new(position, condition, actions));
            }
        }

        errors.into_result(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 🔄 Run every applicable rule against `record`, in order.
    ///
    /// Returns how many rules fired. On error the record is left half-done;
    /// callers are expected to drop it.
    pub fn apply(&self, record: &mut Record) -> Result<usize, RuleError> {
        let mut fired = 0;
        for rule in &self.rules {
            if !rule.applies(record)? {
                continue;
            }
            trace!("📜 transformation #{} matched", rule.position);
            rule.apply(record)?;
            fired += 1;
        }
        Ok(fired)
    }
}

enum ActionCompileError {
    Invalid(String),
    Table(crate::lookups::LookupError),
}

fn compile_action(
    raw: &Value,
    base_dir: Option<&Path>,
    loaded_tables: &mut HashMap<PathBuf, Arc<LookupTable>>,
) -> Result<Action, ActionCompileError> {
    let definition: ActionDefinition = serde_json::from_value(raw.clone())
        .map_err(|err| ActionCompileError::Invalid(format!("invalid action: {err}")))?;

    match definition {
        ActionDefinition::AddField { name, value } => Ok(Action::AddField { name, value }),
        ActionDefinition::DelField { name } => Ok(Action::DelField { name }),
        ActionDefinition::AddFieldLookup {
            name,
            lookup_field_name,
            lookup_table,
            lookup_table_file,
        } => {
            let table = match (lookup_table, lookup_table_file) {
                (Some(inline), None) => Arc::new(LookupTable::from_inline(inline)),
                (None, Some(file)) => {
                    let path = match base_dir {
                        Some(dir) if file.is_relative() => dir.join(&file),
                        _ => file,
                    };
                    if let Some(shared) = loaded_tables.get(&path) {
                        Arc::clone(shared)
                    } else {
                        let table =
                            Arc::new(LookupTable::from_file(&path).map_err(ActionCompileError::Table)?);
                        loaded_tables.insert(path, Arc::clone(&table));
                        table
                    }
                }
                (Some(_), Some(_)) => {
                    return Err(ActionCompileError::Invalid(
                        "AddFieldLookup takes either lookup_table or lookup_table_file, not both"
                            .to_string(),
                    ));
                }
                (None, None) => {
                    return Err(ActionCompileError::Invalid(
                        "AddFieldLookup needs lookup_table or lookup_table_file".to_string(),
                    ));
                }
            };
            Ok(Action::AddFieldLookup {
                name,
                lookup_field: lookup_field_name,
                table,
            })
        }
    }
}
