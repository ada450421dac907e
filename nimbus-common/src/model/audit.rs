use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a single (experiment, operation) run stands.
///
/// The store enforces that, for a given (experiment, operation), the
/// sequence of recorded statuses is `Start -> (Fail | End)` and never
/// repeats `Start` without an intervening terminal status.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, sqlx::Type, strum::Display, strum::EnumString, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum AuditStatus {
    Start,
    Fail,
    End,
}

/// One append-only row in the audit log.
///
/// `step` indexes into the operation's message table (see
/// `nimbus-engine::messages`) when the row was emitted mid-pipeline rather
/// than at the start or end of it.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub experiment_id: i64,
    pub operation: String,
    pub status: AuditStatus,
    pub note: Option<String>,
    pub step: Option<i32>,
    pub recorded_at: DateTime<Utc>,
}
