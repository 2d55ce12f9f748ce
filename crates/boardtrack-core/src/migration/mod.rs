//! Schema migrations for boardtrack.
//!
//! Every schema change is a versioned [`MigrationStep`] with an `apply` and a `revert`
//! direction described through a [`SchemaBuilder`]. The [`MigrationEngine`] compares the
//! ledger with the step sequence and applies or reverts steps one at a time:
//!
//! 1. enum types the step creates are created first,
//! 2. everything else runs in one transaction together with the ledger update,
//! 3. enum types the step drops are dropped after commit.
//!
//! A failing step rolls back, drops the enum types it created and stops the run.
//!
//! # Example
//!
//! ```ignore
//! use boardtrack_core::migration::{steps, MigrationEngine};
//! use boardtrack_core::storage::EmbeddedStore;
//!
//! let store = EmbeddedStore::temporary()?;
//! let report = MigrationEngine::new(&store, steps::all()).up(None)?;
//! println!("applied {} steps", report.steps.len());
//! ```

mod backend;
mod engine;
mod error;
mod ledger;
mod step;

pub mod steps;

pub use backend::{SchemaBackend, SchemaTransaction};
pub use engine::{
    Direction, DownTarget, MigrationConfig, MigrationEngine, MigrationReport, MigrationStatus,
    StepOutcome, StepState, StepStatus, DEFAULT_LEDGER_TABLE, DEFAULT_LOCK_KEY,
};
pub use error::{MigrationError, MigrationWarning};
pub use ledger::{LedgerEntry, MigrationLedger};
pub use step::{validate_sequence, MigrationStep, SchemaBuilder};

use crate::catalog::Schema;
use crate::error::Error;

/// Schema produced by applying `steps` in order to an empty schema.
pub fn cumulative_schema(steps: &[MigrationStep]) -> Result<Schema, Error> {
    let mut schema = Schema::new();
    for step in steps {
        schema.apply_all(&step.apply_ops())?;
    }
    Ok(schema)
}
