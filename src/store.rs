/*
JSON document store for tasks and per-owner stats records.
One file, loaded into memory behind a lock, written back atomically
(temp file + rename) after every mutation. Stats updates are folded in
as deltas under the same lock, so two concurrent award events for one
owner can never race on the read-modify-write.
*/

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::{fs, io};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::StoreError;
use crate::gamification::{self, Badge, StatsDelta};
use crate::models::{Priority, Recurrence, Task, UserStats};

pub const DB_PATH: &str = "data/db.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Db {
    tasks: Vec<Task>,
    stats: HashMap<String, UserStats>,
}

// Everything the caller supplies at creation; id, owner and
// timestamps are stamped by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub category: String,
    pub due_date: Option<DateTime<FixedOffset>>,
    pub parent_id: Option<Uuid>,
    pub tags: Option<Vec<String>>,
    pub recurring: Option<Recurrence>,
}

// Partial update. None leaves a field unchanged, except due_date,
// which is replaced on every edit (an absent value clears it) --
// the task form always submits the full date field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub completed: Option<bool>,
    pub priority: Option<Priority>,
    pub category: Option<String>,
    pub due_date: Option<DateTime<FixedOffset>>,
    pub subtasks: Option<Vec<Task>>,
    pub tags: Option<Vec<String>>,
    pub recurring: Option<Recurrence>,
}

// Live feed of one owner's task collection. Each received item is a
// full authoritative snapshot, not a diff. Dropping the handle
// releases the subscription.
pub struct Subscription {
    rx: broadcast::Receiver<Vec<Task>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Vec<Task>> {
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                // fell behind: skip to the newest snapshot
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Vec<Task>> {
        self.rx.try_recv().ok()
    }
}

pub struct Store {
    path: PathBuf,
    db: Mutex<Db>,
    subscribers: Mutex<HashMap<String, broadcast::Sender<Vec<Task>>>>,
}

impl Store {
    // Load the database file, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Store> {
        let path = path.into();
        let db = if path.exists() {
            let text = fs::read_to_string(&path)?;
            serde_json::from_str(&text)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
        } else {
            Db::default()
        };
        Ok(Store {
            path,
            db: Mutex::new(db),
            subscribers: Mutex::new(HashMap::new()),
        })
    }

    fn save(&self, db: &Db) -> io::Result<()> {
        let tmp_path = self.path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(db)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = Path::new(&self.path).parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&tmp_path, text)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    // ---- tasks -------------------------------------------------

    pub fn create_task(
        &self,
        owner_id: &str,
        draft: TaskDraft,
        now: DateTime<FixedOffset>,
    ) -> Result<Task, StoreError> {
        validate_title(&draft.title)?;
        validate_recurrence(draft.recurring.as_ref())?;

        let task = Task {
            id: Uuid::new_v4(),
            title: draft.title.trim().to_string(),
            description: draft.description,
            completed: false,
            priority: draft.priority,
            category: draft.category,
            due_date: draft.due_date,
            created_at: now,
            updated_at: now,
            owner_id: owner_id.to_string(),
            parent_id: draft.parent_id,
            subtasks: None,
            tags: draft.tags,
            recurring: draft.recurring,
        };

        let mut db = self.db.lock().unwrap();
        db.tasks.push(task.clone());
        self.save(&db)?;
        self.publish(owner_id, &db);
        Ok(task)
    }

    pub fn update_task(
        &self,
        id: Uuid,
        patch: TaskPatch,
        now: DateTime<FixedOffset>,
    ) -> Result<Task, StoreError> {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        validate_recurrence(patch.recurring.as_ref())?;

        let mut db = self.db.lock().unwrap();
        let Some(t) = db.tasks.iter_mut().find(|t| t.id == id) else {
            return Err(StoreError::NotFound(id));
        };

        if let Some(title) = patch.title {
            t.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            t.description = Some(description);
        }
        if let Some(completed) = patch.completed {
            t.completed = completed;
        }
        if let Some(priority) = patch.priority {
            t.priority = priority;
        }
        if let Some(category) = patch.category {
            t.category = category;
        }
        t.due_date = patch.due_date;
        if let Some(subtasks) = patch.subtasks {
            t.subtasks = Some(subtasks);
        }
        if let Some(tags) = patch.tags {
            t.tags = Some(tags);
        }
        if let Some(recurring) = patch.recurring {
            t.recurring = Some(recurring);
        }
        t.updated_at = now;

        let updated = t.clone();
        self.save(&db)?;
        self.publish(&updated.owner_id, &db);
        Ok(updated)
    }

    // Flip only the completion flag, refreshing updated_at. This is
    // the timestamp the analytics streak derivation keys off.
    pub fn toggle_task(
        &self,
        id: Uuid,
        completed: bool,
        now: DateTime<FixedOffset>,
    ) -> Result<Task, StoreError> {
        let mut db = self.db.lock().unwrap();
        let Some(t) = db.tasks.iter_mut().find(|t| t.id == id) else {
            return Err(StoreError::NotFound(id));
        };

        t.completed = completed;
        t.updated_at = now;

        let updated = t.clone();
        self.save(&db)?;
        self.publish(&updated.owner_id, &db);
        Ok(updated)
    }

    // Deleting a task drops its embedded subtasks with it; subtasks
    // are never stored as separate top-level records.
    pub fn delete_task(&self, id: Uuid) -> Result<(), StoreError> {
        let mut db = self.db.lock().unwrap();
        let Some(pos) = db.tasks.iter().position(|t| t.id == id) else {
            return Err(StoreError::NotFound(id));
        };
        let removed = db.tasks.remove(pos);
        self.save(&db)?;
        self.publish(&removed.owner_id, &db);
        Ok(())
    }

    // Full snapshot of one owner's collection, newest first.
    pub fn tasks_for(&self, owner_id: &str) -> Vec<Task> {
        let db = self.db.lock().unwrap();
        snapshot_for(&db, owner_id)
    }

    // ---- stats -------------------------------------------------

    // First access creates and persists the zeroed level-1 record.
    pub fn get_stats(&self, owner_id: &str) -> Result<UserStats, StoreError> {
        let mut db = self.db.lock().unwrap();
        if let Some(stats) = db.stats.get(owner_id) {
            return Ok(stats.clone());
        }
        let stats = UserStats::default();
        db.stats.insert(owner_id.to_string(), stats.clone());
        self.save(&db)?;
        Ok(stats)
    }

    // Award points for any increase in the owner's completed-task
    // count: 10 points per newly completed task. The count, the
    // comparison against the last recorded tasks_completed, and the
    // delta application all happen under one lock acquisition, so two
    // concurrent completions for the same owner cannot both observe
    // the same increase and double-count the award. Reopened tasks
    // produce a zero delta and deduct nothing.
    pub fn award_completions_for(
        &self,
        owner_id: &str,
    ) -> Result<(UserStats, Vec<&'static Badge>), StoreError> {
        let mut db = self.db.lock().unwrap();
        let completed_now = db
            .tasks
            .iter()
            .filter(|t| t.owner_id == owner_id && t.completed)
            .count() as u32;
        let current = db.stats.get(owner_id).cloned().unwrap_or_default();

        let delta = completed_now.saturating_sub(current.tasks_completed);
        if delta == 0 {
            return Ok((current, Vec::new()));
        }

        let (next, earned) = gamification::apply(&current, &StatsDelta::task_completions(delta));
        db.stats.insert(owner_id.to_string(), next.clone());
        self.save(&db)?;
        Ok((next, earned))
    }

    // Fold a gamification delta into the owner's record. The whole
    // read-modify-write happens under the store lock.
    pub fn apply_stats(
        &self,
        owner_id: &str,
        delta: &StatsDelta,
    ) -> Result<(UserStats, Vec<&'static Badge>), StoreError> {
        let mut db = self.db.lock().unwrap();
        let current = db.stats.get(owner_id).cloned().unwrap_or_default();
        let (next, earned) = gamification::apply(&current, delta);
        db.stats.insert(owner_id.to_string(), next.clone());
        self.save(&db)?;
        Ok((next, earned))
    }

    // ---- subscriptions -----------------------------------------

    pub fn subscribe(&self, owner_id: &str) -> Subscription {
        let mut subs = self.subscribers.lock().unwrap();
        // reap channels whose receivers have all been dropped
        subs.retain(|_, tx| tx.receiver_count() > 0);
        let tx = subs
            .entry(owner_id.to_string())
            .or_insert_with(|| broadcast::channel(16).0);
        Subscription {
            rx: tx.subscribe(),
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    fn publish(&self, owner_id: &str, db: &Db) {
        let mut subs = self.subscribers.lock().unwrap();
        if let Some(tx) = subs.get(owner_id) {
            if tx.receiver_count() == 0 {
                subs.remove(owner_id);
                return;
            }
            // send only fails when all receivers are gone
            let _ = tx.send(snapshot_for(db, owner_id));
        }
    }
}

fn snapshot_for(db: &Db, owner_id: &str) -> Vec<Task> {
    let mut tasks: Vec<Task> = db
        .tasks
        .iter()
        .filter(|t| t.owner_id == owner_id)
        .cloned()
        .collect();
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    tasks
}

fn validate_title(title: &str) -> Result<(), StoreError> {
    if title.trim().is_empty() {
        return Err(StoreError::InvalidInput("title required".to_string()));
    }
    Ok(())
}

fn validate_recurrence(recurring: Option<&Recurrence>) -> Result<(), StoreError> {
    if let Some(r) = recurring {
        if r.interval == 0 {
            return Err(StoreError::InvalidInput(
                "recurrence interval must be at least 1".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2026-08-15T12:00:00+00:00").unwrap()
    }

    fn draft(title: &str) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            description: None,
            priority: Priority::Medium,
            category: "work".to_string(),
            due_date: None,
            parent_id: None,
            tags: None,
            recurring: None,
        }
    }

    fn open_store(dir: &TempDir) -> Store {
        Store::open(dir.path().join("db.json")).unwrap()
    }

    #[test]
    fn create_stamps_identity_and_timestamps() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let task = store
            .create_task("u1", draft("  write report  "), now())
            .unwrap();
        assert_eq!(task.title, "write report");
        assert_eq!(task.owner_id, "u1");
        assert!(!task.completed);
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn empty_title_is_rejected_before_any_write() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let err = store.create_task("u1", draft("   "), now()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
        assert!(store.tasks_for("u1").is_empty());
    }

    #[test]
    fn zero_recurrence_interval_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut d = draft("water plants");
        d.recurring = Some(Recurrence {
            kind: crate::models::RecurrenceKind::Daily,
            interval: 0,
        });
        let err = store.create_task("u1", d, now()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
    }

    #[test]
    fn update_refreshes_updated_at_and_keeps_created_at() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let task = store.create_task("u1", draft("a"), now()).unwrap();
        let later = now() + Duration::hours(1);
        let patch = TaskPatch {
            title: Some("b".to_string()),
            ..TaskPatch::default()
        };
        let updated = store.update_task(task.id, patch, later).unwrap();
        assert_eq!(updated.title, "b");
        assert_eq!(updated.created_at, task.created_at);
        assert_eq!(updated.updated_at, later);
    }

    #[test]
    fn operations_on_unknown_ids_return_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let id = Uuid::new_v4();
        assert!(matches!(
            store.update_task(id, TaskPatch::default(), now()),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.toggle_task(id, true, now()),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(store.delete_task(id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn snapshots_are_owner_scoped_and_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.create_task("u1", draft("older"), now()).unwrap();
        store
            .create_task("u1", draft("newer"), now() + Duration::minutes(5))
            .unwrap();
        store.create_task("u2", draft("other owner"), now()).unwrap();

        let tasks = store.tasks_for("u1");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].title, "newer");
        assert_eq!(tasks[1].title, "older");
    }

    #[test]
    fn first_stats_access_creates_the_default_record() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let stats = store.get_stats("u1").unwrap();
        assert_eq!(stats, UserStats::default());
        assert_eq!(stats.level, 1);
    }

    #[test]
    fn stats_deltas_accumulate_across_applications() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .apply_stats("u1", &StatsDelta::task_completions(3))
            .unwrap();
        let (stats, _) = store.apply_stats("u1", &StatsDelta::pomodoro(25)).unwrap();
        assert_eq!(stats.points, 55);
        assert_eq!(stats.tasks_completed, 3);
        assert_eq!(stats.pomodoros_completed, 1);
    }

    #[test]
    fn completing_tasks_awards_ten_points_per_increase() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let a = store.create_task("u1", draft("a"), now()).unwrap();
        let b = store.create_task("u1", draft("b"), now()).unwrap();

        store.toggle_task(a.id, true, now()).unwrap();
        let (stats, earned) = store.award_completions_for("u1").unwrap();
        assert_eq!(stats.points, 10);
        assert_eq!(stats.tasks_completed, 1);
        assert_eq!(earned[0].id, "first-task");

        store.toggle_task(b.id, true, now()).unwrap();
        let (stats, earned) = store.award_completions_for("u1").unwrap();
        assert_eq!(stats.points, 20);
        assert_eq!(stats.tasks_completed, 2);
        assert!(earned.is_empty());
    }

    #[test]
    fn rerunning_the_award_pass_never_double_counts() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let a = store.create_task("u1", draft("a"), now()).unwrap();
        let b = store.create_task("u1", draft("b"), now()).unwrap();
        store.toggle_task(a.id, true, now()).unwrap();
        store.toggle_task(b.id, true, now()).unwrap();

        // two award passes observing the same two completions: the
        // second sees tasks_completed already caught up and folds in
        // a zero delta
        let (stats, _) = store.award_completions_for("u1").unwrap();
        assert_eq!(stats.points, 20);
        assert_eq!(stats.tasks_completed, 2);

        let (stats, earned) = store.award_completions_for("u1").unwrap();
        assert_eq!(stats.points, 20);
        assert_eq!(stats.tasks_completed, 2);
        assert!(earned.is_empty());
    }

    #[test]
    fn reopening_and_recompleting_deducts_and_awards_nothing() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let a = store.create_task("u1", draft("a"), now()).unwrap();
        store.toggle_task(a.id, true, now()).unwrap();
        let (stats, _) = store.award_completions_for("u1").unwrap();
        assert_eq!(stats.points, 10);

        // reopen: completed count drops below tasks_completed,
        // nothing is deducted
        store.toggle_task(a.id, false, now()).unwrap();
        let (stats, earned) = store.award_completions_for("u1").unwrap();
        assert_eq!(stats.points, 10);
        assert_eq!(stats.tasks_completed, 1);
        assert!(earned.is_empty());

        // re-complete: count only catches back up, no second award
        store.toggle_task(a.id, true, now()).unwrap();
        let (stats, _) = store.award_completions_for("u1").unwrap();
        assert_eq!(stats.points, 10);
        assert_eq!(stats.tasks_completed, 1);
    }

    #[test]
    fn data_survives_a_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db.json");

        {
            let store = Store::open(&path).unwrap();
            store.create_task("u1", draft("persisted"), now()).unwrap();
            store
                .apply_stats("u1", &StatsDelta::task_completions(1))
                .unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.tasks_for("u1").len(), 1);
        assert_eq!(store.get_stats("u1").unwrap().points, 10);
    }

    #[test]
    fn subscribers_receive_full_snapshots_after_each_mutation() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut sub = store.subscribe("u1");
        let task = store.create_task("u1", draft("a"), now()).unwrap();
        let snapshot = sub.try_recv().unwrap();
        assert_eq!(snapshot.len(), 1);

        store.toggle_task(task.id, true, now()).unwrap();
        let snapshot = sub.try_recv().unwrap();
        assert!(snapshot[0].completed);

        // other owners' mutations never reach this subscription
        store.create_task("u2", draft("b"), now()).unwrap();
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn recv_delivers_buffered_snapshots_in_order() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut sub = store.subscribe("u1");
        store.create_task("u1", draft("a"), now()).unwrap();
        store.create_task("u1", draft("b"), now()).unwrap();

        let first = sub.recv().await.unwrap();
        assert_eq!(first.len(), 1);
        let second = sub.recv().await.unwrap();
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn dropped_subscriptions_stop_receiving() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let sub = store.subscribe("u1");
        drop(sub);
        // publish notices the dead channel and clears it
        store.create_task("u1", draft("a"), now()).unwrap();
        let mut sub = store.subscribe("u1");
        assert!(sub.try_recv().is_none());
        store.create_task("u1", draft("b"), now()).unwrap();
        assert_eq!(sub.try_recv().unwrap().len(), 2);
    }

    #[test]
    fn dead_channels_are_reaped_without_waiting_for_a_mutation() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let sub = store.subscribe("u1");
        assert_eq!(store.subscriber_count(), 1);
        drop(sub);

        // a later subscribe for any owner clears the dead entry
        let _sub2 = store.subscribe("u2");
        assert_eq!(store.subscriber_count(), 1);
    }
}
