//! Schema backends the migration engine drives.

use super::ledger::MigrationLedger;
use crate::catalog::SchemaOp;
use crate::error::Error;

/// A database the migration engine can change.
pub trait SchemaBackend {
    /// Transaction type; ledger access goes through it.
    type Tx<'a>: SchemaTransaction
    where
        Self: 'a;

    /// Try to take the migration lock. Returns `false` if another run holds it.
    fn try_lock(&self) -> Result<bool, Error>;

    /// Release the migration lock.
    fn unlock(&self) -> Result<(), Error>;

    /// Open a transaction.
    fn begin(&self) -> Result<Self::Tx<'_>, Error>;

    /// Execute one operation outside any transaction.
    fn execute(&self, op: &SchemaOp) -> Result<(), Error>;
}

/// An open backend transaction.
pub trait SchemaTransaction: MigrationLedger {
    /// Execute one operation inside the transaction.
    fn execute(&mut self, op: &SchemaOp) -> Result<(), Error>;

    /// Commit every operation and ledger change.
    fn commit(self) -> Result<(), Error>;

    /// Discard every operation and ledger change.
    fn rollback(self) -> Result<(), Error>;
}
