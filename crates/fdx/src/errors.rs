// ai
//! 💀 Configuration errors: caught before the first record, reported all at once.
//!
//! Nobody enjoys the "fix one typo, rerun, find the next typo" loop. So every
//! transformation, condition, action and lookup table is validated, and every
//! problem found lands in one [`ConfigErrors`] list with enough context
//! ("transformation #2, action #1") to go straight to the offending line.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::conditions::ConditionError;
use crate::lookups::LookupError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("transformation #{rule}: invalid condition: {source}")]
    Condition {
        rule: usize,
        source: ConditionError,
    },
    #[error("transformation #{rule}, action #{action}: {reason}")]
    Action {
        rule: usize,
        action: usize,
        reason: String,
    },
    #[error("transformation #{rule}, action #{action}: {source}")]
    LookupTable {
        rule: usize,
        action: usize,
        source: LookupError,
    },
    #[error("transformations file '{}': {reason}", .path.display())]
    TransformationsFile { path: PathBuf, reason: String },
    #[error("index name pattern '{0}' is not a usable strftime pattern")]
    IndexNamePattern(String),
}

/// 📋 Every configuration problem found in one validation pass.
#[derive(Debug, Default)]
pub struct ConfigErrors(pub Vec<ConfigError>);

impl ConfigErrors {
    pub fn push(&mut self, error: ConfigError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigError> {
        self.0.iter()
    }

    /// `Ok(value)` when nothing went wrong, otherwise every collected problem.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl From<ConfigError> for ConfigErrors {
    fn from(error: ConfigError) -> Self {
        Self(vec![error])
    }
}

impl fmt::Display for ConfigErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} configuration problem(s) found", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  - {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigErrors {}
