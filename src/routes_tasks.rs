// --------------------------------------------------
// Handles API endpoints related to task CRUD operations.
//
// Responsibilities:
// - Create / read / update / delete tasks for one owner
// - Toggle task completion and fold the resulting
//   completion delta into the owner's gamification stats
// -------------------------------------------------

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::gamification::Badge;
use crate::models::{Task, UserStats};
use crate::store::{TaskDraft, TaskPatch};

fn now_fixed_offset() -> DateTime<FixedOffset> {
    let local = chrono::Local::now();
    let offset_seconds = local.offset().local_minus_utc();
    let fixed = FixedOffset::east_opt(offset_seconds).unwrap();
    local.with_timezone(&fixed)
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner: String,
}

#[derive(Debug, Serialize)]
pub struct TasksResponse {
    pub owner: String,
    pub now: String,
    pub tasks: Vec<Task>,
}

// -----------------------------
// GET /api/tasks?owner=...
// Returns the owner's full task collection, newest first
// -----------------------------
pub async fn get_tasks(
    State(state): State<AppState>,
    Query(q): Query<OwnerQuery>,
) -> impl IntoResponse {
    let now = now_fixed_offset();
    let tasks = state.store.tasks_for(&q.owner);

    Json(TasksResponse {
        owner: q.owner,
        now: now.to_rfc3339(),
        tasks,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskInput {
    pub owner_id: String,
    #[serde(flatten)]
    pub draft: TaskDraft,
}

// -----------------------------
// POST /api/tasks
// Creates a new task; id, timestamps and owner are stamped here
// -----------------------------
pub async fn create_task(
    State(state): State<AppState>,
    Json(input): Json<CreateTaskInput>,
) -> impl IntoResponse {
    let now = now_fixed_offset();

    match state.store.create_task(&input.owner_id, input.draft, now) {
        Ok(task) => Json(task).into_response(),
        Err(e) => (e.status(), e.to_string()).into_response(),
    }
}

// -----------------------------
// PUT /api/tasks/:id
// Partially updates an existing task by ID. Edits that touch the
// completion flag run the same award pass as the toggle endpoint.
// ----------------------------
pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> impl IntoResponse {
    let id = match Uuid::parse_str(&id) {
        Ok(u) => u,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid id").into_response(),
    };

    let now = now_fixed_offset();
    let completion_changed = patch.completed.is_some();

    match state.store.update_task(id, patch, now) {
        Ok(task) => {
            if completion_changed {
                award_completion_delta(&state, &task.owner_id);
            }
            Json(task).into_response()
        }
        Err(e) => (e.status(), e.to_string()).into_response(),
    }
}

// -----------------------------
// DELETE /api/tasks/:id
// Removes a task (and its embedded subtasks) permanently
// -----------------------------
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = match Uuid::parse_str(&id) {
        Ok(u) => u,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid id").into_response(),
    };

    match state.store.delete_task(id) {
        Ok(()) => Json(serde_json::json!({ "ok": true })).into_response(),
        Err(e) => (e.status(), e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ToggleInput {
    pub completed: bool,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub task: Task,
    pub stats: Option<UserStats>,
    pub new_badges: Vec<&'static Badge>,
}

// -----------------------------
// POST /api/tasks/:id/toggle
// Flips the completion flag and runs the award pass
// -----------------------------
pub async fn toggle_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<ToggleInput>,
) -> impl IntoResponse {
    let id = match Uuid::parse_str(&id) {
        Ok(u) => u,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid id").into_response(),
    };

    let now = now_fixed_offset();

    let task = match state.store.toggle_task(id, input.completed, now) {
        Ok(t) => t,
        Err(e) => return (e.status(), e.to_string()).into_response(),
    };

    let (stats, new_badges) = award_completion_delta(&state, &task.owner_id);

    Json(ToggleResponse {
        task,
        stats,
        new_badges,
    })
    .into_response()
}

// Run the store's atomic award pass for the owner. The task write
// has already succeeded by the time this runs, so a failed stats
// write is logged and swallowed (best-effort, no cross-store
// transaction).
fn award_completion_delta(
    state: &AppState,
    owner_id: &str,
) -> (Option<UserStats>, Vec<&'static Badge>) {
    match state.store.award_completions_for(owner_id) {
        Ok((stats, earned)) => {
            for badge in &earned {
                tracing::info!(owner = %owner_id, badge = badge.id, "badge unlocked");
            }
            (Some(stats), earned)
        }
        Err(e) => {
            tracing::warn!(owner = %owner_id, error = %e, "failed to award task points");
            (None, Vec::new())
        }
    }
}
