//! Migration-specific error types.

use crate::error::Error;
use thiserror::Error;

/// Migration engine errors. Every variant stops the run; nothing is retried or skipped.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A step's operations cannot apply to the current schema or data.
    #[error("step {version} conflicts with the current schema: {message}")]
    SchemaConflict {
        /// Version of the failing step.
        version: String,
        /// What conflicted.
        message: String,
    },

    /// A step failed for a reason other than a schema conflict.
    #[error("step {version} failed: {source}")]
    StepFailed {
        /// Version of the failing step.
        version: String,
        /// Underlying error.
        #[source]
        source: Error,
    },

    /// A step committed but an enum type it drops after the commit is still there.
    ///
    /// The ledger already reflects the step, so re-applying the step that creates the type
    /// fails until the type is dropped by hand.
    #[error(
        "step {version} committed but enum type {type_name} was not dropped; \
         run DROP TYPE \"{type_name}\"; before re-applying its creating step: {source}"
    )]
    EnumDropFailed {
        /// Version of the committed step.
        version: String,
        /// Enum type left behind.
        type_name: String,
        /// Underlying error.
        #[source]
        source: Error,
    },

    /// The ledger and the known step sequence disagree.
    #[error("ledger out of sync: {0}")]
    LedgerDesync(String),

    /// The requested target version is not a known step.
    #[error("unknown target version {0}")]
    UnknownTarget(String),

    /// The step sequence itself is malformed.
    #[error("invalid step sequence: {0}")]
    InvalidSequence(String),

    /// Another run holds the migration lock.
    #[error("another migration run holds the lock")]
    Locked,

    /// Storage error outside any step.
    #[error(transparent)]
    Storage(#[from] Error),
}

impl MigrationError {
    /// Attribute a core error to the step that raised it.
    pub(crate) fn in_step(version: &str, error: Error) -> Self {
        match error {
            Error::SchemaConflict(message) => MigrationError::SchemaConflict {
                version: version.to_string(),
                message,
            },
            source => MigrationError::StepFailed {
                version: version.to_string(),
                source,
            },
        }
    }
}

/// Non-fatal conditions reported alongside a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationWarning {
    /// A reverted step could not restore data its forward direction destroyed.
    LossyRevert {
        /// Version of the reverted step.
        version: String,
        /// What was not restored.
        detail: String,
    },
}

impl std::fmt::Display for MigrationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationWarning::LossyRevert { version, detail } => {
                write!(f, "irreversible step {version} reverted: {detail}")
            }
        }
    }
}
