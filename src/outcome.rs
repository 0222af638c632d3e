use crate::dataset::Record;
use crate::error::StageError;
use crate::services::types::{ResolvedLocation, StructuredResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Locate,
    Fetch,
    Ocr,
    Extract,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Locate => "locate",
            Stage::Fetch => "fetch",
            Stage::Ocr => "ocr",
            Stage::Extract => "extract",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of auditing one sampled record.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        record: Record,
        location: ResolvedLocation,
        result: StructuredResult,
    },
    Failure {
        record: Record,
        /// What the locator said, when it answered at all.
        location: Option<ResolvedLocation>,
        reason: StageError,
    },
}

impl Outcome {
    pub fn record(&self) -> &Record {
        match self {
            Outcome::Success { record, .. } | Outcome::Failure { record, .. } => record,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// Failing stage; `None` for successes.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { reason, .. } => Some(reason.stage()),
        }
    }

    pub fn reason(&self) -> Option<&StageError> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Failure { reason, .. } => Some(reason),
        }
    }
}
