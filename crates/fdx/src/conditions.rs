// ai
//! 🧮 Conditions: the tiny boolean language that decides which rules fire.
//!
//! 🎬 *[a flow record walks up to a rule. the rule squints at it.]*
//! *["bytes greater than or equal to fifty?" the rule asks. the record nods.]*
//! *["then you get a tag." the record did not ask for a tag. the record gets a tag.]*
//!
//! Conditions arrive from configuration as loosely-typed JSON:
//!
//! ```text
//! {"bytes": 50, "__op__": ">="}                       → leaf, explicit operator
//! {"proto": "tcp"}                                    → leaf, operator defaults to "="
//! [{"a": 1}, {"b": 2}]                                → implicit AND
//! ["OR", {"a": 1}, {"b": 2}]                          → explicit combinator
//! ["AND", {"a": 1}]                                   → degenerate: always false
//! ["OR", {"a": 1}]                                    → degenerate: always true
//! ```
//!
//! [`Condition::compile`] turns that JSON into a typed tree exactly once, at
//! configuration time. [`Condition::evaluate`] walks the typed tree per record
//! and never looks at a raw JSON shape again.
//!
//! 🧠 Knowledge graph:
//! - Compiled by: `rules::RuleSet::compile` (errors collected, not short-circuited)
//! - Evaluated by: `rules::Rule::applies`
//! - Leaf on a missing field → `false`, whatever the operator. Absence is not a crime.
//! - `AND` / `OR` short-circuit left to right.
//!
//! ⚠️ The degenerate-group asymmetry (`AND` too short → false, `OR` too short → true)
//! is pinned by tests below. Changing it changes which rules fire in production. 🦆

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::common::Record;

/// 🔑 The reserved key that carries a leaf's operator.
pub const OPERATOR_KEY: &str = "__op__";

/// 💀 Everything that can go wrong with a condition, at compile time or per record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("empty condition list")]
    EmptyList,
    #[error("unknown combinator keyword '{0}' (expected \"AND\" or \"OR\")")]
    UnknownCombinator(String),
    #[error("unknown operator '{0}' (expected one of =, >, >=, <, <=, !=, in, notin)")]
    UnknownOperator(String),
    #[error("the '__op__' key must hold a string, found {0}")]
    OperatorNotAString(String),
    #[error("operator '{0}' needs a list value, found {1}")]
    NotASequence(Operator, String),
    #[error("a condition must name exactly one field, found {0}")]
    FieldCount(usize),
    #[error("a condition must be an object or a list, found {0}")]
    InvalidNode(String),
    #[error("cannot compare field '{field}' ({found}) with {expected} using '{operator}'")]
    Incomparable {
        field: String,
        operator: Operator,
        found: String,
        expected: String,
    },
}

/// 🔗 The boolean joiner for a group of sub-conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
}

impl Combinator {
    fn from_token(token: &str) -> Result<Self, ConditionError> {
        match token {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            other => Err(ConditionError::UnknownCombinator(other.to_string())),
        }
    }

    /// What a too-short explicit group evaluates to.
    fn degenerate_outcome(self) -> bool {
        match self {
            Self::And => false,
            Self::Or => true,
        }
    }
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => f.write_str("AND"),
            Self::Or => f.write_str("OR"),
        }
    }
}

/// ⚖️ Leaf operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
    Ne,
    In,
    NotIn,
}

impl Operator {
    fn wants_sequence(self) -> bool {
        matches!(self, Self::In | Self::NotIn)
    }
}

impl FromStr for Operator {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" => Ok(Self::Eq),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            "!=" => Ok(Self::Ne),
            "in" => Ok(Self::In),
            "notin" => Ok(Self::NotIn),
            other => Err(ConditionError::UnknownOperator(other.to_string())),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Ne => "!=",
            Self::In => "in",
            Self::NotIn => "notin",
        };
        f.write_str(token)
    }
}

/// 🎯 The right-hand side of a leaf comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(Value),
    Set(Vec<Value>),
}

/// 🍃 `{field} {operator} {operand}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub field: String,
    pub operator: Operator,
    pub operand: Operand,
}

impl Leaf {
    fn compile(node: &Map<String, Value>) -> Result<Self, ConditionError> {
        let operator = match node.get(OPERATOR_KEY) {
            None => Operator::Eq,
            Some(Value::String(token)) => token.parse()?,
            Some(other) => return Err(ConditionError::OperatorNotAString(kind_of(other))),
        };

        let mut pairs = node.iter().filter(|(key, _)| key.as_str() != OPERATOR_KEY);
        let (field, value) = match (pairs.next(), pairs.next()) {
            (Some(pair), None) => pair,
            _ => {
                let count = node.keys().filter(|key| key.as_str() != OPERATOR_KEY).count();
                return Err(ConditionError::FieldCount(count));
            }
        };

        let operand = match (operator.wants_sequence(), value) {
            (true, Value::Array(items)) => Operand::Set(items.clone()),
            (true, other) => return Err(ConditionError::NotASequence(operator, kind_of(other))),
            (false, scalar) => Operand::Scalar(scalar.clone()),
        };

        Ok(Self {
            field: field.clone(),
            operator,
            operand,
        })
    }

    fn evaluate(&self, record: &Record) -> Result<bool, ConditionError> {
        // -- 🫥 no field, no match. not even for != or notin.
        let Some(actual) = record.get(&self.field) else {
            return Ok(false);
        };

        match (&self.operand, self.operator) {
            (Operand::Set(items), Operator::In) => {
                Ok(items.iter().any(|item| loosely_equal(actual, item)))
            }
            (Operand::Set(items), _) => Ok(!items.iter().any(|item| loosely_equal(actual, item))),
            (Operand::Scalar(expected), Operator::Eq) => Ok(loosely_equal(actual, expected)),
            (Operand::Scalar(expected), Operator::Ne) => Ok(!loosely_equal(actual, expected)),
            (Operand::Scalar(expected), operator) => {
                let ordering =
                    ordering_of(actual, expected).ok_or_else(|| ConditionError::Incomparable {
                        field: self.field.clone(),
                        operator,
                        found: kind_of(actual),
                        expected: kind_of(expected),
                    })?;
                Ok(match operator {
                    Operator::Gt => ordering == Ordering::Greater,
                    Operator::Ge => ordering != Ordering::Less,
                    Operator::Lt => ordering == Ordering::Less,
                    Operator::Le => ordering != Ordering::Greater,
                    // -- Eq/Ne handled above, In/NotIn always carry a Set
                    _ => false,
                })
            }
        }
    }
}

/// 🌳 A compiled condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Leaf(Leaf),
    Group {
        combinator: Combinator,
        children: Vec<Condition>,
    },
    /// An explicit `["AND"|"OR", ...]` with two or fewer elements in total.
    /// Its members were validated at compile time and are never evaluated.
    Degenerate(Combinator),
}

impl Condition {
    /// 🏗️ Compile a raw JSON condition into a typed tree.
    ///
    /// Objects are leaves, arrays are groups, everything else is a config bug.
    pub fn compile(node: &Value) -> Result<Self, ConditionError> {
        match node {
            Value::Object(map) => Leaf::compile(map).map(Self::Leaf),
            Value::Array(items) => Self::compile_group(items),
            other => Err(ConditionError::InvalidNode(kind_of(other))),
        }
    }

    fn compile_group(items: &[Value]) -> Result<Self, ConditionError> {
        let Some(first) = items.first() else {
            return Err(ConditionError::EmptyList);
        };

        if let Value::String(token) = first {
            let combinator = Combinator::from_token(token)?;
            let children = items[1..]
                .iter()
                .map(Self::compile)
                .collect::<Result<Vec<_>, _>>()?;
            if items.len() > 2 {
                return Ok(Self::Group {
                    combinator,
                    children,
                });
            }
            return Ok(Self::Degenerate(combinator));
        }

        let children = items
            .iter()
            .map(Self::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::Group {
            combinator: Combinator::And,
            children,
        })
    }

    /// ✅ or ❌: does this record satisfy the condition?
    ///
    /// Only fails when a leaf asks for an ordering between values of different
    /// kinds (a string `>` a number, say).
    pub fn evaluate(&self, record: &Record) -> Result<bool, ConditionError> {
        match self {
            Self::Leaf(leaf) => leaf.evaluate(record),
            Self::Group {
                combinator: Combinator::And,
                children,
            } => {
                for child in children {
                    if !child.evaluate(record)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Group {
                combinator: Combinator::Or,
                children,
            } => {
                for child in children {
                    if child.evaluate(record)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Degenerate(combinator) => Ok(combinator.degenerate_outcome()),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(leaf) => match &leaf.operand {
                Operand::Scalar(value) => write!(f, "{} {} {}", leaf.field, leaf.operator, value),
                Operand::Set(items) => {
                    write!(f, "{} {} {}", leaf.field, leaf.operator, Value::Array(items.clone()))
                }
            },
            Self::Group {
                combinator,
                children,
            } => {
                f.write_str("(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {combinator} ")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
            Self::Degenerate(combinator) => {
                write!(f, "({combinator} with too few members: {})", combinator.degenerate_outcome())
            }
        }
    }
}

/// Natural ordering between two JSON values of the same kind; `None` across kinds.
fn ordering_of(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                Some(a.cmp(&b))
            } else if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
                Some(a.cmp(&b))
            } else {
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// `100 == 100.0`, `"a" != 1`, arrays and objects by structure.
fn loosely_equal(left: &Value, right: &Value) -> bool {
    match ordering_of(left, right) {
        Some(ordering) => ordering == Ordering::Equal,
        None => left == right,
    }
}

fn kind_of(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(_) => "a number".to_string(),
        Value::String(_) => "a string".to_string(),
        Value::Array(_) => "a list".to_string(),
        Value::Object(_) => "an object".to_string(),
    }
}
