//! Operation log for administrative actions on registrations.
//!
//! Entries are written in the same transaction as the action they describe. A failed insert is
//! logged and ignored: losing an audit line never blocks the front desk.

use crate::clock::Clock;
use crate::error::ClinicResult;
use crate::models::{AuditEntry, Operator};
use rusqlite::{params, Connection, Transaction};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    CancelRegistration,
    RestoreRegistration,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::CancelRegistration => "CANCEL_REGISTRATION",
            AuditAction::RestoreRegistration => "RESTORE_REGISTRATION",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Appends an entry. Never fails.
pub fn record(
    tx: &Transaction<'_>,
    clock: &dyn Clock,
    operator: &Operator,
    action: AuditAction,
    target_id: i64,
    detail: &str,
) {
    let result = tx.execute(
        "INSERT INTO operation_log (operator_id, operator_name, operator_role, op_type, target_id, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            operator.id,
            operator.name,
            operator.role,
            action.as_str(),
            target_id,
            detail,
            clock.now()
        ],
    );

    if let Err(e) = result {
        tracing::warn!("failed to record {} on {}: {}", action, target_id, e);
    }
}

/// Most recent entries first.
pub fn list(conn: &Connection, limit: u32) -> ClinicResult<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT log_id, operator_id, operator_name, operator_role, op_type, target_id, detail, created_at
         FROM operation_log
         ORDER BY log_id DESC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit], |row| {
        Ok(AuditEntry {
            log_id: row.get(0)?,
            operator_id: row.get(1)?,
            operator_name: row.get(2)?,
            operator_role: row.get(3)?,
            op_type: row.get(4)?,
            target_id: row.get(5)?,
            detail: row.get(6)?,
            created_at: row.get(7)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
