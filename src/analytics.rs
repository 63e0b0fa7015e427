/*
Analytics derivation logic.
Module is independently written from HTTP / Axum for testing.
Pure function of (tasks, now): no side effects, no persistence.
*/

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate};
use serde::Serialize;

use crate::models::{Priority, Task};

// One entry of the 7-day trend, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct DayPoint {
    pub date: String,    // "Jan 05" style label
    pub completed: usize, // tasks completed on that calendar day
    pub total: usize,    // tasks created on or before that day
}

// All four priorities always present, zero if none.
#[derive(Debug, Clone, Serialize)]
pub struct PriorityStats {
    pub urgent: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryCompletion {
    pub category: String,
    pub total: usize,
    pub completed: usize,
    pub rate: u32, // 0..=100
}

// The full metrics bundle. Never persisted; recomputed from scratch
// on every request (task counts are small, so no incremental diffing).
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsBundle {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub pending_tasks: usize,
    pub overdue_tasks: usize,
    pub completion_rate: u32,
    pub last7_days: Vec<DayPoint>,
    pub priority_stats: PriorityStats,
    pub category_stats: BTreeMap<String, usize>,
    pub category_completion: Vec<CategoryCompletion>,
    pub this_week_tasks: usize,
    pub this_month_tasks: usize,
    pub weekly_completion: usize,
    pub monthly_completion: usize,
    pub weekly_completion_rate: u32,
    pub monthly_completion_rate: u32,
    pub current_streak: u32,
    pub max_streak: u32,
}

// completed / total as a rounded percentage, 0 when total == 0.
fn rate(completed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u32
}

// Count tasks completed on each of the 30 days ending today and
// return (current, max): the run touching today, and the longest
// run anywhere in the window. A broken run today means current == 0
// even when an earlier run keeps max positive.
fn streaks(tasks: &[Task], today: NaiveDate) -> (u32, u32) {
    let completed_days: HashSet<NaiveDate> = tasks
        .iter()
        .filter(|t| t.completed)
        .map(|t| t.updated_at.date_naive())
        .collect();

    let mut current = 0u32;
    while current < 30 && completed_days.contains(&(today - Duration::days(current as i64))) {
        current += 1;
    }

    let mut max = 0u32;
    let mut run = 0u32;
    for i in 0..30 {
        if completed_days.contains(&(today - Duration::days(i))) {
            run += 1;
            max = max.max(run);
        } else {
            run = 0;
        }
    }

    (current, max)
}

// Derive the full metrics bundle for one owner's task collection.
//
// Day boundaries use calendar-day equality on the local date, not
// 24h rolling windows. Missing due dates / categories count as
// "not present" rather than erroring.
pub fn derive(tasks: &[Task], now: DateTime<FixedOffset>) -> AnalyticsBundle {
    let today = now.date_naive();

    let total_tasks = tasks.len();
    let completed_tasks = tasks.iter().filter(|t| t.completed).count();
    let pending_tasks = total_tasks - completed_tasks;
    let overdue_tasks = tasks
        .iter()
        .filter(|t| !t.completed && t.due_date.is_some_and(|d| d < now))
        .count();

    // 7-day trend, oldest first: completions per day plus a
    // cumulative created-so-far series.
    let last7_days: Vec<DayPoint> = (0..7)
        .map(|i| {
            let day = today - Duration::days(6 - i);
            let completed = tasks
                .iter()
                .filter(|t| t.completed && t.updated_at.date_naive() == day)
                .count();
            let total = tasks
                .iter()
                .filter(|t| t.created_at.date_naive() <= day)
                .count();
            DayPoint {
                date: day.format("%b %d").to_string(),
                completed,
                total,
            }
        })
        .collect();

    let count_priority =
        |p: Priority| tasks.iter().filter(|t| t.priority == p).count();
    let priority_stats = PriorityStats {
        urgent: count_priority(Priority::Urgent),
        high: count_priority(Priority::High),
        medium: count_priority(Priority::Medium),
        low: count_priority(Priority::Low),
    };

    // Categories come from the data, not a fixed catalog.
    let mut category_stats: BTreeMap<String, usize> = BTreeMap::new();
    for t in tasks {
        *category_stats.entry(t.category.clone()).or_insert(0) += 1;
    }

    let category_completion: Vec<CategoryCompletion> = category_stats
        .iter()
        .map(|(category, &total)| {
            let completed = tasks
                .iter()
                .filter(|t| t.completed && t.category == *category)
                .count();
            CategoryCompletion {
                category: category.clone(),
                total,
                completed,
                rate: rate(completed, total),
            }
        })
        .collect();

    // Calendar week starts Sunday; calendar month by year + month.
    let week_start = today - Duration::days(now.weekday().num_days_from_sunday() as i64);
    let week_end = week_start + Duration::days(6);
    let in_this_week = |t: &&Task| {
        let d = t.created_at.date_naive();
        d >= week_start && d <= week_end
    };
    let in_this_month = |t: &&Task| {
        let d = t.created_at.date_naive();
        d.year() == today.year() && d.month() == today.month()
    };

    let this_week_tasks = tasks.iter().filter(in_this_week).count();
    let this_month_tasks = tasks.iter().filter(in_this_month).count();
    let weekly_completion = tasks.iter().filter(in_this_week).filter(|t| t.completed).count();
    let monthly_completion = tasks.iter().filter(in_this_month).filter(|t| t.completed).count();

    let (current_streak, max_streak) = streaks(tasks, today);

    AnalyticsBundle {
        total_tasks,
        completed_tasks,
        pending_tasks,
        overdue_tasks,
        completion_rate: rate(completed_tasks, total_tasks),
        last7_days,
        priority_stats,
        category_stats,
        category_completion,
        this_week_tasks,
        this_month_tasks,
        weekly_completion,
        monthly_completion,
        weekly_completion_rate: rate(weekly_completion, this_week_tasks),
        monthly_completion_rate: rate(monthly_completion, this_month_tasks),
        current_streak,
        max_streak,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use uuid::Uuid;

    fn now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2026-08-15T12:00:00+00:00").unwrap()
    }

    fn task(completed: bool, category: &str, priority: Priority) -> Task {
        let ts = now();
        Task {
            id: Uuid::new_v4(),
            title: "t".to_string(),
            description: None,
            completed,
            priority,
            category: category.to_string(),
            due_date: None,
            created_at: ts,
            updated_at: ts,
            owner_id: "u1".to_string(),
            parent_id: None,
            subtasks: None,
            tags: None,
            recurring: None,
        }
    }

    fn days_ago(base: DateTime<FixedOffset>, d: i64) -> DateTime<FixedOffset> {
        base - Duration::days(d)
    }

    #[test]
    fn empty_collection_yields_zeroed_bundle() {
        let b = derive(&[], now());
        assert_eq!(b.total_tasks, 0);
        assert_eq!(b.completion_rate, 0);
        assert_eq!(b.overdue_tasks, 0);
        assert_eq!(b.current_streak, 0);
        assert_eq!(b.max_streak, 0);
        assert_eq!(b.last7_days.len(), 7);
    }

    #[test]
    fn completion_rate_rounds_and_stays_in_bounds() {
        let mut tasks: Vec<Task> = (0..10).map(|i| task(i < 5, "work", Priority::Low)).collect();
        let b = derive(&tasks, now());
        assert_eq!(b.completion_rate, 50);

        tasks.push(task(true, "work", Priority::Low));
        let b = derive(&tasks, now());
        // 6/11 = 54.5..., rounds to 55
        assert_eq!(b.completion_rate, 55);
        assert!(b.completion_rate <= 100);
    }

    #[test]
    fn overdue_requires_due_date_and_pending() {
        let mut due_past = task(false, "work", Priority::High);
        due_past.due_date = Some(days_ago(now(), 1));
        let mut due_past_done = task(true, "work", Priority::High);
        due_past_done.due_date = Some(days_ago(now(), 1));
        let no_due = task(false, "work", Priority::High);

        let b = derive(&[due_past, due_past_done, no_due], now());
        assert_eq!(b.overdue_tasks, 1);
    }

    #[test]
    fn priority_stats_always_list_all_four() {
        let b = derive(&[task(false, "work", Priority::Urgent)], now());
        assert_eq!(b.priority_stats.urgent, 1);
        assert_eq!(b.priority_stats.high, 0);
        assert_eq!(b.priority_stats.medium, 0);
        assert_eq!(b.priority_stats.low, 0);
    }

    #[test]
    fn category_rate_is_zero_guarded() {
        let tasks = vec![
            task(true, "home", Priority::Low),
            task(false, "home", Priority::Low),
            task(false, "errands", Priority::Low),
        ];
        let b = derive(&tasks, now());
        let home = b
            .category_completion
            .iter()
            .find(|c| c.category == "home")
            .unwrap();
        assert_eq!(home.total, 2);
        assert_eq!(home.rate, 50);
        let errands = b
            .category_completion
            .iter()
            .find(|c| c.category == "errands")
            .unwrap();
        assert_eq!(errands.rate, 0);
    }

    #[test]
    fn last7_days_counts_completions_per_day_and_cumulative_totals() {
        let mut old_done = task(true, "work", Priority::Low);
        old_done.created_at = days_ago(now(), 10);
        old_done.updated_at = days_ago(now(), 2);

        let mut fresh = task(false, "work", Priority::Low);
        fresh.created_at = days_ago(now(), 1);

        let b = derive(&[old_done, fresh], now());
        assert_eq!(b.last7_days.len(), 7);
        // offset 2 days back sits at index 4 (oldest first)
        assert_eq!(b.last7_days[4].completed, 1);
        assert_eq!(b.last7_days[6].completed, 0);
        // oldest day: only the 10-day-old task existed
        assert_eq!(b.last7_days[0].total, 1);
        assert_eq!(b.last7_days[6].total, 2);
    }

    #[test]
    fn streak_walks_back_from_today_until_first_gap() {
        let mut tasks = Vec::new();
        for d in 0..3 {
            let mut t = task(true, "work", Priority::Low);
            t.updated_at = days_ago(now(), d);
            tasks.push(t);
        }
        // earlier 5-day run, separated by a gap
        for d in 5..10 {
            let mut t = task(true, "work", Priority::Low);
            t.updated_at = days_ago(now(), d);
            tasks.push(t);
        }
        let b = derive(&tasks, now());
        assert_eq!(b.current_streak, 3);
        assert_eq!(b.max_streak, 5);
        assert!(b.max_streak >= b.current_streak);
    }

    #[test]
    fn streak_is_zero_when_today_has_no_completion() {
        let mut t = task(true, "work", Priority::Low);
        t.updated_at = days_ago(now(), 2);
        let b = derive(&[t], now());
        assert_eq!(b.current_streak, 0);
        assert_eq!(b.max_streak, 1);
    }

    #[test]
    fn week_and_month_windows_use_creation_date() {
        let mut in_week = task(true, "work", Priority::Low);
        in_week.created_at = now(); // 2026-08-15 is a Saturday, same week
        let mut out_of_month = task(true, "work", Priority::Low);
        out_of_month.created_at = days_ago(now(), 40);
        out_of_month.updated_at = days_ago(now(), 40);

        let b = derive(&[in_week, out_of_month], now());
        assert_eq!(b.this_week_tasks, 1);
        assert_eq!(b.this_month_tasks, 1);
        assert_eq!(b.weekly_completion, 1);
        assert_eq!(b.weekly_completion_rate, 100);
        assert_eq!(b.monthly_completion_rate, 100);
    }
}
