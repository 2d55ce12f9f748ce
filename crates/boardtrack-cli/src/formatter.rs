//! Output formatting for migration reports, status and the schema.

use crate::commands::CliError;
use boardtrack_core::catalog::sql::render_schema;
use boardtrack_core::migration::{Direction, MigrationReport, MigrationStatus, StepState};
use boardtrack_core::Schema;
use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde_json::{json, Value};

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text and tables
    Table,
    /// JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

fn state_label(state: &StepState) -> (&'static str, String) {
    match state {
        StepState::Pending => ("pending", String::new()),
        StepState::Applied(at) => ("applied", at.to_rfc3339()),
        StepState::ChecksumMismatch(at) => ("changed", at.to_rfc3339()),
    }
}

/// Format the state of every step and any orphaned ledger rows.
pub fn format_status(status: &MigrationStatus, format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_header(vec!["Version", "Name", "State", "Applied at"]);
            for step in &status.steps {
                let (label, applied_at) = state_label(&step.state);
                table.add_row(vec![
                    Cell::new(&step.version),
                    Cell::new(&step.name),
                    Cell::new(label),
                    Cell::new(applied_at),
                ]);
            }
            for entry in &status.orphaned {
                table.add_row(vec![
                    Cell::new(&entry.version),
                    Cell::new(&entry.name),
                    Cell::new("orphaned"),
                    Cell::new(entry.applied_at.to_rfc3339()),
                ]);
            }
            Ok(format!(
                "{}\n\ncurrent version: {}, {} pending",
                table,
                status.current_version().unwrap_or("none"),
                status.pending_count()
            ))
        }
        OutputFormat::Json => {
            let steps: Vec<Value> = status
                .steps
                .iter()
                .map(|step| {
                    let (label, applied_at) = state_label(&step.state);
                    json!({
                        "version": step.version,
                        "name": step.name,
                        "state": label,
                        "appliedAt": (!applied_at.is_empty()).then_some(applied_at),
                    })
                })
                .collect();
            let orphaned: Vec<Value> = status
                .orphaned
                .iter()
                .map(|entry| {
                    json!({
                        "version": entry.version,
                        "name": entry.name,
                        "appliedAt": entry.applied_at.to_rfc3339(),
                    })
                })
                .collect();
            Ok(serde_json::to_string_pretty(&json!({
                "currentVersion": status.current_version(),
                "pending": status.pending_count(),
                "steps": steps,
                "orphaned": orphaned,
            }))?)
        }
    }
}

/// Format the outcome of an `up` or `down` run.
pub fn format_report(report: &MigrationReport, format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Table => {
            let mut lines = Vec::new();
            if report.is_empty() {
                lines.push(match report.direction {
                    Direction::Up => "Schema is up to date".to_string(),
                    Direction::Down => "Nothing to revert".to_string(),
                });
            }
            for step in &report.steps {
                if report.dry_run {
                    lines.push(format!("-- {}-{}", step.version, step.name));
                    lines.extend(step.statements.iter().cloned());
                } else {
                    let verb = match report.direction {
                        Direction::Up => "Applied",
                        Direction::Down => "Reverted",
                    };
                    lines.push(format!(
                        "{verb} {}-{} ({:.1?})",
                        step.version, step.name, step.elapsed
                    ));
                }
            }
            for warning in &report.warnings {
                lines.push(format!("warning: {warning}"));
            }
            Ok(lines.join("\n"))
        }
        OutputFormat::Json => {
            let steps: Vec<Value> = report
                .steps
                .iter()
                .map(|step| {
                    json!({
                        "version": step.version,
                        "name": step.name,
                        "statements": step.statements,
                        "elapsedMs": step.elapsed.as_millis() as u64,
                    })
                })
                .collect();
            let warnings: Vec<String> = report.warnings.iter().map(ToString::to_string).collect();
            Ok(serde_json::to_string_pretty(&json!({
                "direction": match report.direction {
                    Direction::Up => "up",
                    Direction::Down => "down",
                },
                "dryRun": report.dry_run,
                "steps": steps,
                "warnings": warnings,
            }))?)
        }
    }
}

/// Format a schema as the DDL that creates it.
pub fn format_schema(schema: &Schema, format: OutputFormat) -> Result<String, CliError> {
    let statements = render_schema(schema);
    match format {
        OutputFormat::Table => Ok(statements.join("\n")),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&statements)?),
    }
}
