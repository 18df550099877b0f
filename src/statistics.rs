//! Read-only aggregations over a task store.
//!
//! Every function here tolerates malformed records: a task whose timestamps do not parse is
//! left out of the metric being computed and nothing else.

use std::collections::{BTreeMap, HashMap};

use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::models::{Task, TaskState, DEFAULT_CATEGORY};
use crate::store::TaskStore;
use crate::timefmt::{month_start, week_start, DATE_FORMAT, MONTH_FORMAT};

/// Upper bound on the number of buckets a trend series carries.
pub const MAX_TREND_BUCKETS: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    /// First day of the bucket containing `date`. Weeks start on Monday.
    pub fn bucket_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            Period::Daily => date,
            Period::Weekly => week_start(date),
            Period::Monthly => month_start(date),
        }
    }

    fn previous_bucket(self, start: NaiveDate) -> Option<NaiveDate> {
        match self {
            Period::Daily => start.pred_opt(),
            Period::Weekly => start.checked_sub_days(Days::new(7)),
            Period::Monthly => start.pred_opt().map(month_start),
        }
    }

    pub fn label(self, start: NaiveDate) -> String {
        match self {
            Period::Daily | Period::Weekly => start.format(DATE_FORMAT).to_string(),
            Period::Monthly => start.format(MONTH_FORMAT).to_string(),
        }
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "daily" => Ok(Period::Daily),
            "weekly" => Ok(Period::Weekly),
            "monthly" => Ok(Period::Monthly),
            other => Err(format!("unknown period: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFilter {
    Pending,
    Done,
    Overdue,
    All,
}

impl StateFilter {
    pub fn includes(self, state: TaskState) -> bool {
        match self {
            StateFilter::All => true,
            StateFilter::Pending => state == TaskState::Pending,
            StateFilter::Overdue => state == TaskState::Overdue,
            StateFilter::Done => state == TaskState::Done,
        }
    }
}

impl std::str::FromStr for StateFilter {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "all" => Ok(StateFilter::All),
            other => other
                .parse::<TaskState>()
                .map(|state| match state {
                    TaskState::Pending => StateFilter::Pending,
                    TaskState::Overdue => StateFilter::Overdue,
                    TaskState::Done => StateFilter::Done,
                }),
        }
    }
}

/// Parallel label/count vectors, ready for charting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Series {
    pub labels: Vec<String>,
    pub counts: Vec<usize>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn count_for(&self, label: &str) -> Option<usize> {
        self.labels
            .iter()
            .position(|candidate| candidate == label)
            .map(|index| self.counts[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.counts.iter().copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompletionRate {
    pub total: usize,
    pub on_time: usize,
    pub rate_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AverageCompletion {
    pub count: usize,
    pub hours: i64,
    pub minutes: i64,
}

/// Aggregations as of `today`. Windows are inclusive calendar-date ranges
/// `[today - window_days, today]`.
pub struct Statistics<'a> {
    store: &'a TaskStore,
    today: NaiveDate,
}

impl<'a> Statistics<'a> {
    pub fn new(store: &'a TaskStore, now: NaiveDateTime) -> Self {
        Self {
            store,
            today: now.date(),
        }
    }

    fn window_start(&self, window_days: u32) -> NaiveDate {
        self.today
            .checked_sub_days(Days::new(u64::from(window_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    fn in_window(&self, date: NaiveDate, window_days: u32) -> bool {
        self.window_start(window_days) <= date && date <= self.today
    }

    fn created_in_window(&self, task: &Task, window_days: u32) -> bool {
        match task.created_at() {
            Ok(created) => self.in_window(created.date(), window_days),
            Err(error) => {
                log::debug!("statistics skipped task={} create_time: {error}", task.id);
                false
            }
        }
    }

    pub fn total_tasks(&self) -> usize {
        self.store.total_tasks()
    }

    /// Completions per bucket, oldest first. Empty buckets are included; at most
    /// `MAX_TREND_BUCKETS` of the most recent buckets are returned.
    pub fn completion_trend(&self, period: Period, window_days: u32) -> Series {
        let first = period.bucket_start(self.window_start(window_days));
        let mut buckets: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        let mut cursor = period.bucket_start(self.today);
        while cursor >= first && buckets.len() < MAX_TREND_BUCKETS {
            buckets.insert(cursor, 0);
            match period.previous_bucket(cursor) {
                Some(previous) => cursor = previous,
                None => break,
            }
        }

        for task in self.store.partition(TaskState::Done) {
            let done = match task.done_at() {
                Ok(Some(done)) => done.date(),
                Ok(None) => continue,
                Err(error) => {
                    log::debug!("trend skipped task={} done_time: {error}", task.id);
                    continue;
                }
            };
            if !self.in_window(done, window_days) {
                continue;
            }
            if let Some(count) = buckets.get_mut(&period.bucket_start(done)) {
                *count += 1;
            }
        }

        let (labels, counts) = buckets
            .into_iter()
            .map(|(start, count)| (period.label(start), count))
            .unzip();
        Series { labels, counts }
    }

    fn selected(&self, filter: StateFilter) -> impl Iterator<Item = &Task> + '_ {
        TaskState::ALL
            .into_iter()
            .filter(move |state| filter.includes(*state))
            .flat_map(move |state| self.store.partition(state).iter())
    }

    pub fn category_distribution(&self, filter: StateFilter) -> Series {
        let mut tally = Tally::default();
        for task in self.selected(filter) {
            let category = task.category.trim();
            tally.add(if category.is_empty() {
                DEFAULT_CATEGORY
            } else {
                category
            });
        }
        tally.into_series()
    }

    /// Each distinct tag on a task counts once for that task.
    pub fn tag_distribution(&self, filter: StateFilter) -> Series {
        let mut tally = Tally::default();
        for task in self.selected(filter) {
            let mut seen: Vec<&str> = Vec::with_capacity(task.tags.len());
            for tag in &task.tags {
                let tag = tag.trim();
                if tag.is_empty() || seen.contains(&tag) {
                    continue;
                }
                seen.push(tag);
                tally.add(tag);
            }
        }
        tally.into_series()
    }

    /// On-time share among deadline-bearing tasks created in the window. Overdue tasks count
    /// toward the total only.
    pub fn completion_rate(&self, window_days: u32) -> CompletionRate {
        let mut total = 0;
        let mut on_time = 0;

        for task in self.store.partition(TaskState::Done) {
            if !task.has_deadline() || !self.created_in_window(task, window_days) {
                continue;
            }
            match (task.deadline_at(), task.done_at()) {
                (Ok(Some(deadline)), Ok(Some(done))) => {
                    total += 1;
                    if done <= deadline {
                        on_time += 1;
                    }
                }
                _ => log::debug!("completion rate skipped task={}", task.id),
            }
        }

        total += self
            .store
            .partition(TaskState::Overdue)
            .iter()
            .filter(|task| self.created_in_window(task, window_days))
            .count();

        let rate_percent = if total == 0 {
            0.0
        } else {
            on_time as f64 / total as f64 * 100.0
        };
        CompletionRate {
            total,
            on_time,
            rate_percent,
        }
    }

    pub fn average_completion_time(&self, window_days: u32) -> AverageCompletion {
        let mut count = 0usize;
        let mut total_seconds = 0i64;

        for task in self.store.partition(TaskState::Done) {
            let (Ok(created), Ok(Some(done))) = (task.created_at(), task.done_at()) else {
                continue;
            };
            if !self.in_window(created.date(), window_days) {
                continue;
            }
            total_seconds += (done - created).num_seconds();
            count += 1;
        }

        if count == 0 {
            return AverageCompletion {
                count: 0,
                hours: 0,
                minutes: 0,
            };
        }
        let average = total_seconds as f64 / count as f64;
        let hours = (average / 3600.0).trunc();
        let minutes = ((average - hours * 3600.0) / 60.0).trunc();
        AverageCompletion {
            count,
            hours: hours as i64,
            minutes: minutes as i64,
        }
    }
}

/// Counts labels, remembering first-seen order for tie-breaking.
#[derive(Default)]
struct Tally {
    order: Vec<(String, usize)>,
    index: HashMap<String, usize>,
}

impl Tally {
    fn add(&mut self, label: &str) {
        match self.index.get(label) {
            Some(&slot) => self.order[slot].1 += 1,
            None => {
                self.index.insert(label.to_string(), self.order.len());
                self.order.push((label.to_string(), 1));
            }
        }
    }

    fn into_series(mut self) -> Series {
        self.order.sort_by(|a, b| b.1.cmp(&a.1));
        let (labels, counts) = self.order.into_iter().unzip();
        Series { labels, counts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, make_task};

    fn now() -> NaiveDateTime {
        // Wednesday.
        at(2024, 5, 15, 18, 0, 0)
    }

    fn done_task(id: &str, created: &str, done: &str, deadline: Option<&str>) -> Task {
        let mut task = make_task(id, deadline);
        task.create_time = created.to_string();
        task.done_time = Some(done.to_string());
        task
    }

    fn store(pending: Vec<Task>, overdue: Vec<Task>, done: Vec<Task>) -> TaskStore {
        TaskStore::from_file(crate::models::TasksFile {
            pending,
            overdue,
            done,
        })
    }

    #[test]
    fn daily_trend_counts_same_day_completions() {
        let done = vec![
            done_task("a", "2024-05-01 08:00:00", "2024-05-10 09:00:00", None),
            done_task("b", "2024-05-01 08:00:00", "2024-05-10 13:30:00", None),
            done_task("c", "2024-05-01 08:00:00", "2024-05-10 23:59:59", None),
        ];
        let store = store(Vec::new(), Vec::new(), done);
        let series = Statistics::new(&store, now()).completion_trend(Period::Daily, 30);

        assert_eq!(series.len(), 31);
        assert_eq!(series.labels.first().map(String::as_str), Some("2024-04-15"));
        assert_eq!(series.labels.last().map(String::as_str), Some("2024-05-15"));
        assert_eq!(series.count_for("2024-05-10"), Some(3));
        assert_eq!(series.counts.iter().sum::<usize>(), 3);
        let mut sorted = series.labels.clone();
        sorted.sort();
        assert_eq!(sorted, series.labels);
    }

    #[test]
    fn trend_ignores_completions_outside_window_and_malformed() {
        let done = vec![
            done_task("old", "2024-01-01 08:00:00", "2024-04-14 09:00:00", None),
            done_task("edge", "2024-01-01 08:00:00", "2024-04-15 00:00:00", None),
            done_task("bad", "2024-01-01 08:00:00", "yesterday", None),
        ];
        let store = store(Vec::new(), Vec::new(), done);
        let series = Statistics::new(&store, now()).completion_trend(Period::Daily, 30);
        assert_eq!(series.count_for("2024-04-15"), Some(1));
        assert_eq!(series.counts.iter().sum::<usize>(), 1);
    }

    #[test]
    fn weekly_trend_aligns_to_mondays_and_includes_current_week() {
        let done = vec![
            done_task("a", "2024-05-01 08:00:00", "2024-05-14 10:00:00", None),
            done_task("b", "2024-05-01 08:00:00", "2024-05-15 10:00:00", None),
            done_task("c", "2024-05-01 08:00:00", "2024-05-05 10:00:00", None),
        ];
        let store = store(Vec::new(), Vec::new(), done);
        let series = Statistics::new(&store, now()).completion_trend(Period::Weekly, 10);

        // Window starts Sunday 2024-05-05, whose week begins Monday 2024-04-29.
        assert_eq!(series.labels, vec!["2024-04-29", "2024-05-06", "2024-05-13"]);
        assert_eq!(series.counts, vec![1, 0, 2]);
    }

    #[test]
    fn monthly_trend_spans_year_boundary() {
        let done = vec![done_task(
            "a",
            "2023-12-01 08:00:00",
            "2023-12-24 10:00:00",
            None,
        )];
        let store = store(Vec::new(), Vec::new(), done);
        let jan = at(2024, 1, 20, 12, 0, 0);
        let series = Statistics::new(&store, jan).completion_trend(Period::Monthly, 60);
        assert_eq!(series.labels, vec!["2023-11", "2023-12", "2024-01"]);
        assert_eq!(series.counts, vec![0, 1, 0]);
    }

    #[test]
    fn category_distribution_sorts_by_count_then_first_seen() {
        let mut a = make_task("a", None);
        a.category = "work".into();
        let mut b = make_task("b", None);
        b.category = "home".into();
        let mut c = make_task("c", None);
        c.category = "home".into();
        let mut d = make_task("d", None);
        d.category = "study".into();
        let mut e = make_task("e", None);
        e.category = "work".into();
        let mut f = make_task("f", None);
        f.category = "".into();
        let store = store(vec![a, b, c], vec![d], vec![e, f]);
        let stats = Statistics::new(&store, now());

        let all = stats.category_distribution(StateFilter::All);
        assert_eq!(all.labels, vec!["work", "home", "study", DEFAULT_CATEGORY]);
        assert_eq!(all.counts, vec![2, 2, 1, 1]);

        let pending = stats.category_distribution(StateFilter::Pending);
        assert_eq!(pending.labels, vec!["home", "work"]);
        assert_eq!(pending.counts, vec![2, 1]);

        let overdue = stats.category_distribution(StateFilter::Overdue);
        assert_eq!(overdue.labels, vec!["study"]);
    }

    #[test]
    fn tag_distribution_counts_each_tag_per_task() {
        let mut a = make_task("a", None);
        a.tags = vec!["x".into(), "y".into(), "x".into()];
        let mut b = make_task("b", None);
        b.tags = vec!["y".into()];
        let c = make_task("c", None);
        let store = store(vec![a], Vec::new(), vec![b, c]);
        let stats = Statistics::new(&store, now());

        let all = stats.tag_distribution(StateFilter::All);
        assert_eq!(all.labels, vec!["y", "x"]);
        assert_eq!(all.counts, vec![2, 1]);
        assert!(stats.tag_distribution(StateFilter::Overdue).is_empty());
    }

    #[test]
    fn completion_rate_counts_late_done_and_overdue_in_total_only() {
        // Created T, deadline T+1h, completed T+2h: counted, not on time.
        let late = done_task(
            "late",
            "2024-05-10 10:00:00",
            "2024-05-10 12:00:00",
            Some("2024-05-10 11:00"),
        );
        let ok = done_task(
            "ok",
            "2024-05-10 10:00:00",
            "2024-05-10 11:00:00",
            Some("2024-05-10 11:00"),
        );
        let no_deadline = done_task("free", "2024-05-10 10:00:00", "2024-05-11 10:00:00", None);
        let old = done_task(
            "old",
            "2024-01-01 10:00:00",
            "2024-01-01 11:00:00",
            Some("2024-01-02 00:00"),
        );
        let broken = done_task("broken", "2024-05-10 10:00:00", "?", Some("2024-05-11 00:00"));
        let mut overdue = make_task("over", Some("2024-05-12 00:00"));
        overdue.create_time = "2024-05-11 09:00:00".into();

        let store = store(Vec::new(), vec![overdue], vec![late, ok, no_deadline, old, broken]);
        let rate = Statistics::new(&store, now()).completion_rate(30);
        assert_eq!(rate.total, 3);
        assert_eq!(rate.on_time, 1);
        assert!((rate.rate_percent - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn huge_windows_saturate_and_cap_the_trend() {
        let done = vec![
            done_task(
                "a",
                "1999-02-01 08:00:00",
                "1999-03-10 09:00:00",
                Some("1999-04-01 00:00"),
            ),
            done_task("b", "2024-05-01 08:00:00", "2024-05-15 10:00:00", None),
        ];
        let store = store(Vec::new(), Vec::new(), done);
        let stats = Statistics::new(&store, now());

        let monthly = stats.completion_trend(Period::Monthly, u32::MAX);
        assert_eq!(monthly.len(), MAX_TREND_BUCKETS);
        assert_eq!(monthly.labels.last().map(String::as_str), Some("2024-05"));
        assert_eq!(monthly.count_for("1999-03"), Some(1));
        assert_eq!(monthly.count_for("2024-05"), Some(1));

        let daily = stats.completion_trend(Period::Daily, u32::MAX);
        assert_eq!(daily.len(), MAX_TREND_BUCKETS);
        assert_eq!(daily.labels.last().map(String::as_str), Some("2024-05-15"));
        assert_eq!(daily.count_for("2024-05-15"), Some(1));
        assert_eq!(daily.counts.iter().sum::<usize>(), 1);

        let rate = stats.completion_rate(u32::MAX);
        assert_eq!((rate.total, rate.on_time), (1, 1));
        assert_eq!(stats.average_completion_time(u32::MAX).count, 2);
    }

    #[test]
    fn completion_rate_with_nothing_is_zero() {
        let store = TaskStore::new();
        let rate = Statistics::new(&store, now()).completion_rate(30);
        assert_eq!(rate.total, 0);
        assert_eq!(rate.on_time, 0);
        assert_eq!(rate.rate_percent, 0.0);
    }

    #[test]
    fn average_completion_time_splits_hours_and_minutes() {
        let done = vec![
            done_task("a", "2024-05-10 10:00:00", "2024-05-10 12:30:00", None),
            done_task("b", "2024-05-10 10:00:00", "2024-05-10 11:00:00", None),
            done_task("old", "2024-01-01 10:00:00", "2024-01-05 10:00:00", None),
            done_task("bad", "not a time", "2024-05-10 11:00:00", None),
        ];
        let store = store(Vec::new(), Vec::new(), done);
        let average = Statistics::new(&store, now()).average_completion_time(30);
        assert_eq!(
            average,
            AverageCompletion {
                count: 2,
                hours: 1,
                minutes: 45
            }
        );

        let empty = TaskStore::new();
        assert_eq!(
            Statistics::new(&empty, now()).average_completion_time(30),
            AverageCompletion {
                count: 0,
                hours: 0,
                minutes: 0
            }
        );
    }

    #[test]
    fn filters_and_periods_parse() {
        assert_eq!("todo".parse::<StateFilter>(), Ok(StateFilter::Pending));
        assert_eq!("ALL".parse::<StateFilter>(), Ok(StateFilter::All));
        assert_eq!("weekly".parse::<Period>(), Ok(Period::Weekly));
        assert!("hourly".parse::<Period>().is_err());
    }
}
