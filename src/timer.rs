/*
Focus timer: a one-second countdown state machine plus the tokio task
that drives it. The state machine itself is synchronous and tick-driven
so it can be tested without a runtime; TimerService owns the single
spawned ticker and reports completed work sessions to the stats store.
*/

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::gamification::StatsDelta;
use crate::models::{PomodoroSession, SessionKind};
use crate::store::Store;

pub const DEFAULT_WORK_MIN: u32 = 25;
pub const SHORT_BREAK_MIN: u32 = 5;
pub const LONG_BREAK_MIN: u32 = 15;

// Emitted at most once per session, when remaining hits zero.
#[derive(Debug, Clone)]
pub enum TimerEvent {
    WorkComplete { session: PomodoroSession },
    BreakComplete,
}

// Snapshot consumed by the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct TimerViewState {
    pub remaining_secs: u32,
    pub clock: String, // "MM:SS"
    pub progress: f64, // 0.0..=1.0
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub duration_min: u32,
    pub active: bool,
    pub paused: bool,
    pub sessions_completed: u32,
    pub total_focus_time: u32, // minutes, local to this timer
    pub task_id: Option<Uuid>,
    pub task_title: Option<String>,
}

#[derive(Debug)]
pub struct FocusTimer {
    session: PomodoroSession,
    remaining_secs: u32,
    active: bool,
    paused: bool,
    sessions_completed: u32,
    total_focus_time: u32,
}

impl Default for FocusTimer {
    fn default() -> Self {
        FocusTimer {
            session: PomodoroSession {
                task_id: None,
                task_title: None,
                duration_min: DEFAULT_WORK_MIN,
                kind: SessionKind::Work,
            },
            remaining_secs: DEFAULT_WORK_MIN * 60,
            active: false,
            paused: false,
            sessions_completed: 0,
            total_focus_time: 0,
        }
    }
}

impl FocusTimer {
    pub fn is_active(&self) -> bool {
        self.active
    }

    // Begin the pending work (or manually forced break) session.
    // Ignored while a session is already running.
    pub fn start(&mut self, task_id: Option<Uuid>, task_title: Option<String>) -> bool {
        if self.active {
            return false;
        }
        self.session.task_id = task_id;
        self.session.task_title = task_title;
        self.active = true;
        self.paused = false;
        true
    }

    pub fn pause(&mut self) {
        if self.active {
            self.paused = true;
        }
    }

    pub fn resume(&mut self) {
        if self.active {
            self.paused = false;
        }
    }

    // Abandon the running session: no completion event, no points.
    pub fn stop(&mut self) {
        self.active = false;
        self.paused = false;
        self.remaining_secs = self.session.duration_min * 60;
    }

    // Advance the countdown by one second of wall-clock time.
    // Completion fires exactly once: a finished work session rolls
    // straight into the next break (long every 4th), a finished break
    // resets to the idle work default.
    pub fn tick(&mut self) -> Option<TimerEvent> {
        if !self.active || self.paused || self.remaining_secs == 0 {
            return None;
        }
        self.remaining_secs -= 1;
        if self.remaining_secs > 0 {
            return None;
        }

        self.active = false;
        self.paused = false;
        match self.session.kind {
            SessionKind::Work => {
                self.sessions_completed += 1;
                self.total_focus_time += self.session.duration_min;
                let completed = self.session.clone();
                let long = self.sessions_completed % 4 == 0;
                self.start_break(long);
                Some(TimerEvent::WorkComplete { session: completed })
            }
            SessionKind::ShortBreak | SessionKind::LongBreak => {
                self.reset_to_work();
                Some(TimerEvent::BreakComplete)
            }
        }
    }

    // Force a break session, bypassing the automatic work -> break flow.
    pub fn start_break(&mut self, long: bool) {
        let duration_min = if long { LONG_BREAK_MIN } else { SHORT_BREAK_MIN };
        self.session = PomodoroSession {
            task_id: None,
            task_title: None,
            duration_min,
            kind: if long {
                SessionKind::LongBreak
            } else {
                SessionKind::ShortBreak
            },
        };
        self.remaining_secs = duration_min * 60;
        self.active = true;
        self.paused = false;
    }

    pub fn reset_to_work(&mut self) {
        self.session = PomodoroSession {
            task_id: None,
            task_title: None,
            duration_min: DEFAULT_WORK_MIN,
            kind: SessionKind::Work,
        };
        self.remaining_secs = DEFAULT_WORK_MIN * 60;
        self.active = false;
        self.paused = false;
    }

    // Replace the default duration for the next work session.
    // Only permitted while idle on a work session.
    pub fn set_custom_duration(&mut self, minutes: u32) -> bool {
        if self.active || self.session.kind != SessionKind::Work || minutes == 0 {
            return false;
        }
        self.session.duration_min = minutes;
        self.remaining_secs = minutes * 60;
        true
    }

    pub fn progress(&self) -> f64 {
        let full = (self.session.duration_min * 60) as f64;
        if full == 0.0 {
            return 0.0;
        }
        (full - self.remaining_secs as f64) / full
    }

    pub fn view(&self) -> TimerViewState {
        let mins = self.remaining_secs / 60;
        let secs = self.remaining_secs % 60;
        TimerViewState {
            remaining_secs: self.remaining_secs,
            clock: format!("{mins:02}:{secs:02}"),
            progress: self.progress(),
            kind: self.session.kind,
            duration_min: self.session.duration_min,
            active: self.active,
            paused: self.paused,
            sessions_completed: self.sessions_completed,
            total_focus_time: self.total_focus_time,
            task_id: self.session.task_id,
            task_title: self.session.task_title.clone(),
        }
    }
}

// Owns the shared timer state and the single one-second ticker task.
// Starting or stopping always cancels the previous ticker before
// installing a new one, so no orphaned callback can double-decrement.
pub struct TimerService {
    store: Arc<Store>,
    timer: Mutex<FocusTimer>,
    owner: std::sync::Mutex<Option<String>>,
    ticker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TimerService {
    pub fn new(store: Arc<Store>) -> Arc<Self> {
        Arc::new(TimerService {
            store,
            timer: Mutex::new(FocusTimer::default()),
            owner: std::sync::Mutex::new(None),
            ticker: std::sync::Mutex::new(None),
        })
    }

    pub async fn view(&self) -> TimerViewState {
        self.timer.lock().await.view()
    }

    pub async fn start(
        self: Arc<Self>,
        owner_id: String,
        task_id: Option<Uuid>,
        task_title: Option<String>,
    ) -> TimerViewState {
        let started = {
            let mut timer = self.timer.lock().await;
            timer.start(task_id, task_title)
        };
        if started {
            *self.owner.lock().unwrap() = Some(owner_id);
            Self::spawn_ticker(&self);
        }
        self.view().await
    }

    pub async fn pause(&self) -> TimerViewState {
        let mut timer = self.timer.lock().await;
        timer.pause();
        timer.view()
    }

    pub async fn resume(&self) -> TimerViewState {
        let mut timer = self.timer.lock().await;
        timer.resume();
        timer.view()
    }

    pub async fn stop(&self) -> TimerViewState {
        self.cancel_ticker();
        let mut timer = self.timer.lock().await;
        timer.stop();
        timer.view()
    }

    pub async fn start_break(self: Arc<Self>, long: bool) -> TimerViewState {
        {
            let mut timer = self.timer.lock().await;
            timer.start_break(long);
        }
        Self::spawn_ticker(&self);
        self.view().await
    }

    pub async fn reset_to_work(&self) -> TimerViewState {
        self.cancel_ticker();
        let mut timer = self.timer.lock().await;
        timer.reset_to_work();
        timer.view()
    }

    pub async fn set_custom_duration(&self, minutes: u32) -> Option<TimerViewState> {
        let mut timer = self.timer.lock().await;
        if timer.set_custom_duration(minutes) {
            Some(timer.view())
        } else {
            None
        }
    }

    fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().unwrap().take() {
            handle.abort();
        }
    }

    fn spawn_ticker(svc: &Arc<TimerService>) {
        let mut guard = svc.ticker.lock().unwrap();
        if let Some(handle) = guard.take() {
            handle.abort();
        }
        let svc = Arc::clone(svc);
        *guard = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first interval tick resolves immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let event = svc.timer.lock().await.tick();
                if let Some(TimerEvent::WorkComplete { session }) = event {
                    svc.report_work_session(&session).await;
                }
                if !svc.timer.lock().await.is_active() {
                    break;
                }
            }
        }));
    }

    // A failed stats write must not block the timer's own transition;
    // the points are silently lost and the failure only logged.
    async fn report_work_session(&self, session: &PomodoroSession) {
        let owner = self.owner.lock().unwrap().clone();
        let Some(owner) = owner else {
            return;
        };
        match self
            .store
            .apply_stats(&owner, &StatsDelta::pomodoro(session.duration_min))
        {
            Ok((stats, earned)) => {
                tracing::info!(
                    owner = %owner,
                    points = stats.points,
                    "pomodoro session recorded"
                );
                for badge in earned {
                    tracing::info!(owner = %owner, badge = badge.id, "badge unlocked");
                }
            }
            Err(e) => {
                tracing::warn!(owner = %owner, error = %e, "failed to record pomodoro session");
            }
        }
    }
}
