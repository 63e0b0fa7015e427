use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceKind {
    Daily,
    Weekly,
    Monthly,
}

// Stored on the task but never acted upon by the backend;
// recurrence expansion is a client concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recurrence {
    #[serde(rename = "type")]
    pub kind: RecurrenceKind,
    pub interval: u32, // >= 1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub priority: Priority,
    pub category: String,
    pub due_date: Option<DateTime<FixedOffset>>,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
    pub owner_id: String,
    // Subtasks are embedded inline on the parent, not stored as
    // separate top-level records. parent_id marks embedded children.
    pub parent_id: Option<Uuid>,
    pub subtasks: Option<Vec<Task>>,
    pub tags: Option<Vec<String>>,
    pub recurring: Option<Recurrence>,
}

// Cumulative gamification state, one record per owner.
// level is always derived: points / 100 + 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserStats {
    pub points: u32,
    pub level: u32,
    pub badges: Vec<String>,
    pub streak: u32,
    pub tasks_completed: u32,
    pub pomodoros_completed: u32,
    pub total_focus_time: u32, // minutes
}

impl Default for UserStats {
    fn default() -> Self {
        UserStats {
            points: 0,
            level: 1,
            badges: Vec::new(),
            streak: 0,
            tasks_completed: 0,
            pomodoros_completed: 0,
            total_focus_time: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SessionKind {
    Work,
    ShortBreak,
    LongBreak,
}

// One timed interval tracked by the focus timer. Ephemeral: exists
// only in the timer's working state and is discarded once reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PomodoroSession {
    pub task_id: Option<Uuid>,
    pub task_title: Option<String>,
    pub duration_min: u32,
    #[serde(rename = "type")]
    pub kind: SessionKind,
}
