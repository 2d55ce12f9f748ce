//! Migration ledger: the persisted history of applied steps.

use super::step::MigrationStep;
use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One applied step as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Step version.
    pub version: String,
    /// Step name.
    pub name: String,
    /// Checksum of the step's SQL when it was applied.
    pub checksum: String,
    /// When the step was applied.
    pub applied_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Entry for a step applied now.
    pub fn for_step(step: &MigrationStep) -> Self {
        Self {
            version: step.version.to_string(),
            name: step.name.to_string(),
            checksum: step.checksum(),
            applied_at: Utc::now(),
        }
    }
}

/// Read and write access to the ledger.
///
/// Implemented by backend transactions so ledger changes commit with the step they record.
pub trait MigrationLedger {
    /// Applied entries ordered by ascending version.
    fn applied_versions(&self) -> Result<Vec<LedgerEntry>, Error>;

    /// Record a step as applied.
    fn record_applied(&mut self, entry: &LedgerEntry) -> Result<(), Error>;

    /// Remove a step from the ledger after reverting it.
    fn record_reverted(&mut self, version: &str) -> Result<(), Error>;
}
