/*
Gamification rules: points, levels, and badge unlocks.
Module is independently written from HTTP / Axum for testing.
State transitions are expressed as deltas folded into the last known
stats record, never as whole-record overwrites.
*/

use serde::Serialize;

use crate::models::UserStats;

pub const POINTS_PER_TASK: u32 = 10;
pub const POINTS_PER_POMODORO: u32 = 25;

// Static achievement catalog. Fixed data, not user data; only the
// earned ids are persisted per user.
#[derive(Debug, Clone, Serialize)]
pub struct Badge {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    #[serde(skip)]
    pub requirement: fn(&UserStats) -> bool,
}

pub const BADGES: &[Badge] = &[
    Badge {
        id: "first-task",
        name: "Getting Started",
        description: "Complete your first task",
        icon: "🎯",
        requirement: |s| s.tasks_completed >= 1,
    },
    Badge {
        id: "task-master",
        name: "Task Master",
        description: "Complete 10 tasks",
        icon: "🏆",
        requirement: |s| s.tasks_completed >= 10,
    },
    Badge {
        id: "productivity-pro",
        name: "Productivity Pro",
        description: "Complete 50 tasks",
        icon: "⭐",
        requirement: |s| s.tasks_completed >= 50,
    },
    Badge {
        id: "streak-starter",
        name: "Streak Starter",
        description: "Maintain a 3-day streak",
        icon: "🔥",
        requirement: |s| s.streak >= 3,
    },
    Badge {
        id: "streak-master",
        name: "Streak Master",
        description: "Maintain a 7-day streak",
        icon: "🚀",
        requirement: |s| s.streak >= 7,
    },
    Badge {
        id: "focus-champion",
        name: "Focus Champion",
        description: "Complete 10 Pomodoro sessions",
        icon: "🧠",
        requirement: |s| s.pomodoros_completed >= 10,
    },
    Badge {
        id: "time-warrior",
        name: "Time Warrior",
        description: "Focus for 10 hours total",
        icon: "⏰",
        requirement: |s| s.total_focus_time >= 600,
    },
];

// One gamification event, expressed as increments over the last known
// stats record. The engine folds whatever it is given: callers are
// responsible for computing true deltas (a double-fired event cannot
// be detected here).
#[derive(Debug, Clone, Default)]
pub struct StatsDelta {
    pub points: u32,
    pub tasks_completed: u32,
    pub pomodoros_completed: u32,
    pub focus_minutes: u32,
    pub streak: Option<u32>,
}

impl StatsDelta {
    // n newly completed tasks since the last observed count.
    // Reopened tasks deduct nothing: decreases never reach this path.
    pub fn task_completions(n: u32) -> Self {
        StatsDelta {
            points: n * POINTS_PER_TASK,
            tasks_completed: n,
            ..StatsDelta::default()
        }
    }

    // One finished work session of the given length.
    pub fn pomodoro(minutes: u32) -> Self {
        StatsDelta {
            points: POINTS_PER_POMODORO,
            pomodoros_completed: 1,
            focus_minutes: minutes,
            ..StatsDelta::default()
        }
    }

    // Store a caller-supplied streak value (the analytics engine's
    // current_streak is the intended source, but any value is stored).
    pub fn streak(days: u32) -> Self {
        StatsDelta {
            streak: Some(days),
            ..StatsDelta::default()
        }
    }
}

// Fold a delta into the stats record: recompute the level, then scan
// the catalog for newly satisfied badges. Returns the updated record
// and the badges earned by this update, in catalog order. A badge,
// once earned, is never removed even if the stats later regress.
pub fn apply(stats: &UserStats, delta: &StatsDelta) -> (UserStats, Vec<&'static Badge>) {
    let mut next = stats.clone();
    next.points += delta.points;
    next.tasks_completed += delta.tasks_completed;
    next.pomodoros_completed += delta.pomodoros_completed;
    next.total_focus_time += delta.focus_minutes;
    if let Some(streak) = delta.streak {
        next.streak = streak;
    }
    next.level = next.points / 100 + 1;

    let newly_earned: Vec<&'static Badge> = BADGES
        .iter()
        .filter(|b| (b.requirement)(&next) && !next.badges.iter().any(|id| id == b.id))
        .collect();
    for badge in &newly_earned {
        next.badges.push(badge.id.to_string());
    }

    (next, newly_earned)
}
