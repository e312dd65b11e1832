use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only record of who assigned a task to whom. Best-effort telemetry:
/// never the source of truth for current assignment, which lives on the task
/// row itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub assignment_id: String,
    pub task_id: String,
    pub user_id: String,
    pub assigned_by: String,
    pub assigned_at: DateTime<Utc>,
}
