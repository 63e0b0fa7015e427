// --------------------------------------------------
// Handles API endpoints for derived state and the focus timer.
//
// Responsibilities:
// - Analytics bundle (recomputed from scratch per request)
// - Gamification stats + badge catalog
// - Focus timer commands and view state
// -------------------------------------------------

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use crate::analytics::{self, AnalyticsBundle};
use crate::gamification::{BADGES, Badge, StatsDelta};
use crate::models::UserStats;
use crate::routes_tasks::OwnerQuery;

fn now_fixed_offset() -> DateTime<FixedOffset> {
    let local = chrono::Local::now();
    let offset_seconds = local.offset().local_minus_utc();
    let fixed = FixedOffset::east_opt(offset_seconds).unwrap();
    local.with_timezone(&fixed)
}

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub owner: String,
    pub now: String,
    #[serde(flatten)]
    pub analytics: AnalyticsBundle,
}

// -----------------------------
// GET /api/analytics?owner=...
// Derives the full metrics bundle from the owner's current snapshot
// -----------------------------
pub async fn get_analytics(
    State(state): State<AppState>,
    Query(q): Query<OwnerQuery>,
) -> impl IntoResponse {
    let now = now_fixed_offset();
    let tasks = state.store.tasks_for(&q.owner);
    let analytics = analytics::derive(&tasks, now);

    Json(AnalyticsResponse {
        owner: q.owner,
        now: now.to_rfc3339(),
        analytics,
    })
    .into_response()
}

#[derive(Debug, Serialize)]
pub struct BadgeView {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub earned: bool,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: UserStats,
    pub badges: Vec<BadgeView>,
}

fn badge_views(stats: &UserStats) -> Vec<BadgeView> {
    BADGES
        .iter()
        .map(|b| BadgeView {
            id: b.id,
            name: b.name,
            description: b.description,
            icon: b.icon,
            earned: stats.badges.iter().any(|id| id == b.id),
        })
        .collect()
}

// -----------------------------
// GET /api/stats?owner=...
// Returns the owner's stats record (created on first access)
// together with the badge catalog
// -----------------------------
pub async fn get_stats(
    State(state): State<AppState>,
    Query(q): Query<OwnerQuery>,
) -> impl IntoResponse {
    match state.store.get_stats(&q.owner) {
        Ok(stats) => {
            let badges = badge_views(&stats);
            Json(StatsResponse { stats, badges }).into_response()
        }
        Err(e) => (e.status(), e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct StreakInput {
    pub owner_id: String,
    pub streak: u32,
}

#[derive(Debug, Serialize)]
pub struct StatsUpdateResponse {
    pub stats: UserStats,
    pub new_badges: Vec<&'static Badge>,
}

// -----------------------------
// POST /api/stats/streak
// Stores a caller-supplied streak value (the analytics engine's
// current_streak is the intended source); the engine just stores it
// -----------------------------
pub async fn put_streak(
    State(state): State<AppState>,
    Json(input): Json<StreakInput>,
) -> impl IntoResponse {
    match state
        .store
        .apply_stats(&input.owner_id, &StatsDelta::streak(input.streak))
    {
        Ok((stats, new_badges)) => {
            for badge in &new_badges {
                tracing::info!(owner = %input.owner_id, badge = badge.id, "badge unlocked");
            }
            Json(StatsUpdateResponse { stats, new_badges }).into_response()
        }
        Err(e) => (e.status(), e.to_string()).into_response(),
    }
}

// -----------------------------
// GET /api/timer
// Returns the current timer view state
// -----------------------------
pub async fn get_timer(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.timer.view().await).into_response()
}

#[derive(Debug, Deserialize)]
pub struct TimerStartInput {
    pub owner_id: String,
    pub task_id: Option<Uuid>,
    pub task_title: Option<String>,
}

// -----------------------------
// POST /api/timer/start
// Starts the pending session; ignored if one is already running
// -----------------------------
pub async fn start_timer(
    State(state): State<AppState>,
    Json(input): Json<TimerStartInput>,
) -> impl IntoResponse {
    let view = state
        .timer
        .start(input.owner_id, input.task_id, input.task_title)
        .await;
    Json(view).into_response()
}

// -----------------------------
// POST /api/timer/pause
// -----------------------------
pub async fn pause_timer(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.timer.pause().await).into_response()
}

// -----------------------------
// POST /api/timer/resume
// -----------------------------
pub async fn resume_timer(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.timer.resume().await).into_response()
}

// -----------------------------
// POST /api/timer/stop
// Cancels the running session; no completion event, no points
// -----------------------------
pub async fn stop_timer(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.timer.stop().await).into_response()
}

#[derive(Debug, Deserialize)]
pub struct BreakInput {
    #[serde(default)]
    pub long: bool,
}

// -----------------------------
// POST /api/timer/break
// Manually forces a 5 or 15 minute break session
// -----------------------------
pub async fn start_break(
    State(state): State<AppState>,
    Json(input): Json<BreakInput>,
) -> impl IntoResponse {
    Json(state.timer.start_break(input.long).await).into_response()
}

// -----------------------------
// POST /api/timer/reset
// Forces the timer back to the idle 25-minute work default
// -----------------------------
pub async fn reset_timer(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.timer.reset_to_work().await).into_response()
}

#[derive(Debug, Deserialize)]
pub struct DurationInput {
    pub minutes: i64,
}

// -----------------------------
// POST /api/timer/duration
// Replaces the default work duration for the next session
// -----------------------------
pub async fn set_duration(
    State(state): State<AppState>,
    Json(input): Json<DurationInput>,
) -> impl IntoResponse {
    if input.minutes < 1 {
        return (StatusCode::BAD_REQUEST, "duration must be at least 1 minute").into_response();
    }

    match state.timer.set_custom_duration(input.minutes as u32).await {
        Some(view) => Json(view).into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            "timer must be idle on a work session",
        )
            .into_response(),
    }
}
