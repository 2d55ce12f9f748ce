//! Migration engine: plans against the ledger and applies or reverts steps one by one.

use super::backend::{SchemaBackend, SchemaTransaction};
use super::error::{MigrationError, MigrationWarning};
use super::ledger::{LedgerEntry, MigrationLedger};
use super::step::{validate_sequence, MigrationStep};
use crate::catalog::sql::render_op;
use crate::catalog::SchemaOp;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Ledger table used on PostgreSQL.
pub const DEFAULT_LEDGER_TABLE: &str = "schema_migrations";

/// Advisory lock key used on PostgreSQL (`boardtrk` in ASCII).
pub const DEFAULT_LOCK_KEY: i64 = 0x626f_6172_6474_726b;

/// Migration engine configuration.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Render the SQL plan without executing anything.
    pub dry_run: bool,
    /// Name of the ledger table.
    pub ledger_table: String,
    /// Advisory lock key excluding concurrent runs.
    pub lock_key: i64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
            lock_key: DEFAULT_LOCK_KEY,
        }
    }
}

impl MigrationConfig {
    /// Set dry-run mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the ledger table name.
    pub fn ledger_table(mut self, table: impl Into<String>) -> Self {
        self.ledger_table = table.into();
        self
    }

    /// Set the advisory lock key.
    pub fn lock_key(mut self, key: i64) -> Self {
        self.lock_key = key;
        self
    }
}

/// How far `down` reverts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DownTarget {
    /// Only the most recently applied step.
    #[default]
    Last,
    /// Every applied step after this version.
    Version(String),
    /// Every applied step.
    Baseline,
}

/// Direction of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Applying steps.
    Up,
    /// Reverting steps.
    Down,
}

/// One step handled by a run.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Step version.
    pub version: String,
    /// Step name.
    pub name: String,
    /// SQL statements for the step, in execution order.
    pub statements: Vec<String>,
    /// Time spent; zero for dry runs.
    pub elapsed: Duration,
}

/// Result of an `up` or `down` run.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    /// Run direction.
    pub direction: Direction,
    /// Whether anything was executed.
    pub dry_run: bool,
    /// Steps in the order they were handled.
    pub steps: Vec<StepOutcome>,
    /// Non-fatal conditions.
    pub warnings: Vec<MigrationWarning>,
}

impl MigrationReport {
    fn new(direction: Direction, dry_run: bool) -> Self {
        Self {
            direction,
            dry_run,
            steps: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Versions handled, in order.
    pub fn versions(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.version.as_str()).collect()
    }

    /// True when no step was handled.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// State of one known step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepState {
    /// Not applied.
    Pending,
    /// Applied at the given time.
    Applied(DateTime<Utc>),
    /// Applied, but the step changed since.
    ChecksumMismatch(DateTime<Utc>),
}

/// Status line for one known step.
#[derive(Debug, Clone)]
pub struct StepStatus {
    /// Step version.
    pub version: String,
    /// Step name.
    pub name: String,
    /// Current state.
    pub state: StepState,
}

/// Ledger state against the known step sequence.
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Every known step in order.
    pub steps: Vec<StepStatus>,
    /// Ledger rows with no matching step.
    pub orphaned: Vec<LedgerEntry>,
}

impl MigrationStatus {
    /// Version of the last applied step.
    pub fn current_version(&self) -> Option<&str> {
        self.steps
            .iter()
            .rev()
            .find(|s| !matches!(s.state, StepState::Pending))
            .map(|s| s.version.as_str())
    }

    /// Number of pending steps.
    pub fn pending_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.state == StepState::Pending)
            .count()
    }
}

/// Holds the backend's migration lock for the duration of a run.
struct LockGuard<'a, B: SchemaBackend> {
    backend: &'a B,
}

impl<'a, B: SchemaBackend> LockGuard<'a, B> {
    fn acquire(backend: &'a B) -> Result<Self, MigrationError> {
        if !backend.try_lock()? {
            return Err(MigrationError::Locked);
        }
        Ok(Self { backend })
    }
}

impl<B: SchemaBackend> Drop for LockGuard<'_, B> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.unlock() {
            warn!(error = %e, "Failed to release migration lock");
        }
    }
}

/// Applies and reverts an ordered step sequence against a backend.
pub struct MigrationEngine<'a, B: SchemaBackend> {
    backend: &'a B,
    steps: &'a [MigrationStep],
    config: MigrationConfig,
}

impl<'a, B: SchemaBackend> MigrationEngine<'a, B> {
    /// Create an engine over a step sequence.
    pub fn new(backend: &'a B, steps: &'a [MigrationStep]) -> Self {
        Self {
            backend,
            steps,
            config: MigrationConfig::default(),
        }
    }

    /// Use the given configuration.
    pub fn with_config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    /// The known steps.
    pub fn steps(&self) -> &[MigrationStep] {
        self.steps
    }

    /// Report every step's state without validating the ledger.
    pub fn status(&self) -> Result<MigrationStatus, MigrationError> {
        let applied = self.read_ledger()?;
        let mut by_version: BTreeMap<&str, &LedgerEntry> =
            applied.iter().map(|e| (e.version.as_str(), e)).collect();

        let steps = self
            .steps
            .iter()
            .map(|step| {
                let state = match by_version.remove(step.version) {
                    None => StepState::Pending,
                    Some(entry) if entry.checksum == step.checksum() => {
                        StepState::Applied(entry.applied_at)
                    }
                    Some(entry) => StepState::ChecksumMismatch(entry.applied_at),
                };
                StepStatus {
                    version: step.version.to_string(),
                    name: step.name.to_string(),
                    state,
                }
            })
            .collect();

        let orphaned = by_version.into_values().cloned().collect();
        Ok(MigrationStatus { steps, orphaned })
    }

    /// Apply every pending step up to and including `target` (default: the latest).
    pub fn up(&self, target: Option<&str>) -> Result<MigrationReport, MigrationError> {
        let _lock = self.lock()?;
        let applied = self.verified_ledger()?;
        let pending = self.plan_up(&applied, target)?;

        let mut report = MigrationReport::new(Direction::Up, self.config.dry_run);
        if pending.is_empty() {
            info!("Schema is up to date");
            return Ok(report);
        }

        for step in pending {
            let outcome = if self.config.dry_run {
                dry_run_outcome(step, step.apply_ops())
            } else {
                self.run_step(step, Direction::Up)?
            };
            report.steps.push(outcome);
        }
        Ok(report)
    }

    /// Revert applied steps in descending order.
    pub fn down(&self, target: DownTarget) -> Result<MigrationReport, MigrationError> {
        let _lock = self.lock()?;
        let applied = self.verified_ledger()?;
        let to_revert = self.plan_down(&applied, &target)?;

        let mut report = MigrationReport::new(Direction::Down, self.config.dry_run);
        if to_revert.is_empty() {
            info!("Nothing to revert");
            return Ok(report);
        }

        for step in to_revert {
            let outcome = if self.config.dry_run {
                dry_run_outcome(step, step.revert_ops())
            } else {
                self.run_step(step, Direction::Down)?
            };
            if let Some(detail) = step.lossy_revert() {
                warn!(version = step.version, detail, "Reverted irreversible step");
                report.warnings.push(MigrationWarning::LossyRevert {
                    version: step.version.to_string(),
                    detail: detail.to_string(),
                });
            }
            report.steps.push(outcome);
        }
        Ok(report)
    }

    fn lock(&self) -> Result<Option<LockGuard<'a, B>>, MigrationError> {
        if self.config.dry_run {
            return Ok(None);
        }
        LockGuard::acquire(self.backend).map(Some)
    }

    fn read_ledger(&self) -> Result<Vec<LedgerEntry>, MigrationError> {
        let tx = self.backend.begin()?;
        let applied = tx.applied_versions()?;
        tx.rollback()?;
        Ok(applied)
    }

    /// Read the ledger and check it against the step sequence.
    fn verified_ledger(&self) -> Result<Vec<LedgerEntry>, MigrationError> {
        validate_sequence(self.steps).map_err(MigrationError::InvalidSequence)?;
        let applied = self.read_ledger()?;

        let known: BTreeMap<&str, &MigrationStep> =
            self.steps.iter().map(|s| (s.version, s)).collect();

        for entry in &applied {
            let step = known.get(entry.version.as_str()).ok_or_else(|| {
                MigrationError::LedgerDesync(format!(
                    "applied version {}-{} has no matching step",
                    entry.version, entry.name
                ))
            })?;
            if entry.checksum != step.checksum() {
                return Err(MigrationError::LedgerDesync(format!(
                    "step {} changed after it was applied",
                    step.id()
                )));
            }
        }

        if let Some(last) = applied.iter().map(|e| e.version.as_str()).max() {
            if let Some(missing) = self
                .steps
                .iter()
                .take_while(|s| s.version < last)
                .find(|s| !applied.iter().any(|e| e.version == s.version))
            {
                return Err(MigrationError::LedgerDesync(format!(
                    "step {} is missing below applied version {last}",
                    missing.id()
                )));
            }
        }
        Ok(applied)
    }

    fn plan_up(
        &self,
        applied: &[LedgerEntry],
        target: Option<&str>,
    ) -> Result<Vec<&'a MigrationStep>, MigrationError> {
        let target = target.map(|t| self.known(t).map(|s| s.version)).transpose()?;
        let last = applied.last().map(|e| e.version.as_str());
        Ok(self
            .steps
            .iter()
            .filter(|s| last.map_or(true, |last| s.version > last))
            .filter(|s| target.map_or(true, |target| s.version <= target))
            .collect())
    }

    fn plan_down(
        &self,
        applied: &[LedgerEntry],
        target: &DownTarget,
    ) -> Result<Vec<&'a MigrationStep>, MigrationError> {
        let floor = match target {
            DownTarget::Last => {
                return Ok(applied
                    .last()
                    .and_then(|e| self.steps.iter().find(|s| s.version == e.version))
                    .into_iter()
                    .collect());
            }
            DownTarget::Version(version) => Some(self.known(version)?.version),
            DownTarget::Baseline => None,
        };
        Ok(self
            .steps
            .iter()
            .rev()
            .filter(|s| applied.iter().any(|e| e.version == s.version))
            .filter(|s| floor.map_or(true, |floor| s.version > floor))
            .collect())
    }

    fn known(&self, version: &str) -> Result<&'a MigrationStep, MigrationError> {
        self.steps
            .iter()
            .find(|s| s.version == version || s.id() == version)
            .ok_or_else(|| MigrationError::UnknownTarget(version.to_string()))
    }

    /// Run one step: enum creation, then a transaction with the ledger update, then enum drops.
    fn run_step(&self, step: &MigrationStep, direction: Direction) -> Result<StepOutcome, MigrationError> {
        let started = Instant::now();
        let ops = match direction {
            Direction::Up => step.apply_ops(),
            Direction::Down => step.revert_ops(),
        };
        let (before, inside, after) = partition_ops(&ops);
        let statements = ops.iter().flat_map(render_op).collect();

        let mut created = Vec::new();
        for op in before {
            log_statements(op);
            if let Err(e) = self.backend.execute(op) {
                self.drop_created_enums(step, &created);
                return Err(self.fail(step, e));
            }
            if let SchemaOp::CreateEnum(def) = op {
                created.push(def.name.clone());
            }
        }

        if let Err(e) = self.run_transaction(step, direction, &inside) {
            self.drop_created_enums(step, &created);
            return Err(e);
        }

        for name in after {
            let op = SchemaOp::DropEnum {
                name: name.to_string(),
            };
            log_statements(&op);
            if let Err(e) = self.backend.execute(&op) {
                error!(version = step.version, type_name = name, error = %e, "Enum drop failed after commit");
                return Err(MigrationError::EnumDropFailed {
                    version: step.version.to_string(),
                    type_name: name.to_string(),
                    source: e,
                });
            }
        }

        let elapsed = started.elapsed();
        match direction {
            Direction::Up => info!(version = step.version, name = step.name, ?elapsed, "Applied step"),
            Direction::Down => info!(version = step.version, name = step.name, ?elapsed, "Reverted step"),
        }

        Ok(StepOutcome {
            version: step.version.to_string(),
            name: step.name.to_string(),
            statements,
            elapsed,
        })
    }

    fn run_transaction(
        &self,
        step: &MigrationStep,
        direction: Direction,
        ops: &[&SchemaOp],
    ) -> Result<(), MigrationError> {
        let mut tx = self.backend.begin().map_err(|e| self.fail(step, e))?;

        match execute_in(&mut tx, step, direction, ops) {
            Ok(()) => tx.commit().map_err(|e| self.fail(step, e)),
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    warn!(version = step.version, error = %rollback, "Rollback failed");
                }
                Err(self.fail(step, e))
            }
        }
    }

    fn drop_created_enums(&self, step: &MigrationStep, created: &[String]) {
        for name in created.iter().rev() {
            warn!(version = step.version, name = %name, "Dropping enum type created by failed step");
            let op = SchemaOp::DropEnum { name: name.clone() };
            if let Err(e) = self.backend.execute(&op) {
                warn!(version = step.version, name = %name, error = %e, "Failed to drop enum type");
            }
        }
    }

    fn fail(&self, step: &MigrationStep, e: crate::error::Error) -> MigrationError {
        error!(version = step.version, name = step.name, error = %e, "Step failed");
        MigrationError::in_step(step.version, e)
    }
}

fn execute_in<T: SchemaTransaction>(
    tx: &mut T,
    step: &MigrationStep,
    direction: Direction,
    ops: &[&SchemaOp],
) -> Result<(), crate::error::Error> {
    for op in ops {
        log_statements(op);
        tx.execute(op)?;
    }
    match direction {
        Direction::Up => tx.record_applied(&LedgerEntry::for_step(step)),
        Direction::Down => tx.record_reverted(step.version),
    }
}

/// Split a step's operations into enum creations, transactional work and the enum types
/// dropped after commit.
fn partition_ops(ops: &[SchemaOp]) -> (Vec<&SchemaOp>, Vec<&SchemaOp>, Vec<&str>) {
    let mut before = Vec::new();
    let mut inside = Vec::new();
    let mut after = Vec::new();
    for op in ops {
        match op {
            SchemaOp::CreateEnum(_) => before.push(op),
            SchemaOp::DropEnum { name } => after.push(name.as_str()),
            _ => inside.push(op),
        }
    }
    (before, inside, after)
}

fn dry_run_outcome(step: &MigrationStep, ops: Vec<SchemaOp>) -> StepOutcome {
    StepOutcome {
        version: step.version.to_string(),
        name: step.name.to_string(),
        statements: ops.iter().flat_map(render_op).collect(),
        elapsed: Duration::ZERO,
    }
}

fn log_statements(op: &SchemaOp) {
    for statement in render_op(op) {
        debug!(%statement, "Executing");
    }
}
