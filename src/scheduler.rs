use std::cmp::{Ordering, Reverse};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::commands::{refresh_impl, CommandCtx};
use crate::events::{OverdueEvent, ParseSkip, PromotionEvent, RecomputeReport};
use crate::models::{Task, TaskState};
use crate::state::AppState;
use crate::store::TaskStore;
use crate::timefmt::{days_between, seconds_between, ParseError, SECONDS_PER_DAY};

/// Urgency tier for a fractional number of days left. Bounds are exclusive from above:
/// exactly 7.0 days is tier 4, exactly 0.0 is tier 1.
pub fn tier_for_remaining_days(remaining_days: f64) -> u8 {
    if remaining_days > 7.0 {
        5
    } else if remaining_days > 3.0 {
        4
    } else if remaining_days > 1.0 {
        3
    } else if remaining_days > 0.0 {
        2
    } else {
        1
    }
}

pub fn classify_urgency(deadline: NaiveDateTime, now: NaiveDateTime) -> u8 {
    tier_for_remaining_days(days_between(now, deadline))
}

/// Deadline-bearing tasks of a partition with their parse outcome, in store order.
fn deadlines(tasks: &[Task]) -> Vec<(usize, Result<NaiveDateTime, ParseError>)> {
    tasks
        .iter()
        .enumerate()
        .filter_map(|(index, task)| {
            task.deadline_at()
                .transpose()
                .map(|deadline| (index, deadline))
        })
        .collect()
}

/// Rewrites the urgency of every pending task with a deadline to its current tier.
/// Running it again with the same `now` yields no events.
pub fn promote(store: &mut TaskStore, now: NaiveDateTime) -> Vec<PromotionEvent> {
    let pending = store.partition_mut(TaskState::Pending);
    let mut events = Vec::new();
    for (index, deadline) in deadlines(pending.as_slice()) {
        let deadline = match deadline {
            Ok(deadline) => deadline,
            Err(error) => {
                log::debug!("promote skipped task={} {error}", pending[index].id);
                continue;
            }
        };
        let remaining_days = days_between(now, deadline);
        let new_tier = tier_for_remaining_days(remaining_days);
        let task = &mut pending[index];
        if task.urgency == new_tier {
            continue;
        }
        let old_tier = task.urgency;
        task.urgency = new_tier;
        events.push(PromotionEvent {
            task: task.clone(),
            old_tier,
            new_tier,
            remaining_days,
        });
    }
    events
}

/// Moves pending tasks whose deadline has passed into the overdue partition.
/// Tasks without a deadline, or with one that does not parse, stay where they are.
pub fn sweep_overdue(store: &mut TaskStore, now: NaiveDateTime) -> Vec<Task> {
    let indices: Vec<usize> = deadlines(store.partition(TaskState::Pending))
        .into_iter()
        .filter_map(|(index, deadline)| match deadline {
            Ok(deadline) if deadline < now => Some(index),
            _ => None,
        })
        .collect();
    if indices.is_empty() {
        return Vec::new();
    }
    store.move_to_overdue(indices)
}

/// One full pass: promotion first so the sweep and any later ordering see fresh tiers.
pub fn recompute(store: &mut TaskStore, now: NaiveDateTime) -> RecomputeReport {
    let promotions = promote(store, now);
    let overdue = sweep_overdue(store, now)
        .into_iter()
        .map(|task| OverdueEvent { task })
        .collect();
    let skipped = deadlines(store.partition(TaskState::Pending))
        .into_iter()
        .filter_map(|(index, deadline)| {
            deadline.err().map(|error| ParseSkip {
                task_id: store.partition(TaskState::Pending)[index].id.clone(),
                error,
            })
        })
        .collect();
    let report = RecomputeReport {
        promotions,
        overdue,
        skipped,
    };
    log::debug!(
        "recompute at {now}: promoted={} overdue={} skipped={}",
        report.promotions.len(),
        report.overdue.len(),
        report.skipped.len()
    );
    report
}

fn open_task_key(task: &Task, now: NaiveDateTime) -> (bool, u8, Reverse<u8>, i64) {
    match task.deadline_at() {
        Ok(None) => (true, 0, Reverse(0), 0),
        Ok(Some(deadline)) => (
            false,
            task.urgency,
            Reverse(task.importance),
            seconds_between(now, deadline),
        ),
        Err(_) => (false, task.urgency, Reverse(task.importance), i64::MAX),
    }
}

fn done_order(a: &Task, b: &Task) -> Ordering {
    let a_done = a.done_at().ok().flatten();
    let b_done = b.done_at().ok().flatten();
    b_done.cmp(&a_done)
}

/// Display order for one partition. All sorts are stable, so equal keys keep store order.
pub fn order_for_display(tasks: &[Task], state: TaskState, now: NaiveDateTime) -> Vec<Task> {
    let mut ordered = tasks.to_vec();
    match state {
        TaskState::Pending | TaskState::Overdue => {
            ordered.sort_by_cached_key(|task| open_task_key(task, now));
        }
        TaskState::Done => ordered.sort_by(done_order),
    }
    ordered
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemainingTime {
    pub overdue: bool,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl RemainingTime {
    pub fn from_seconds(signed_seconds: i64) -> Self {
        let total = signed_seconds.unsigned_abs() as i64;
        Self {
            overdue: signed_seconds < 0,
            days: total / SECONDS_PER_DAY,
            hours: total % SECONDS_PER_DAY / 3600,
            minutes: total % 3600 / 60,
            seconds: total % 60,
        }
    }

    /// Units worth showing: larger units drop off once they reach zero, and seconds only
    /// appear when days and hours are both zero.
    pub fn units(&self) -> Vec<(i64, char)> {
        if self.days > 0 {
            vec![(self.days, 'd'), (self.hours, 'h'), (self.minutes, 'm')]
        } else if self.hours > 0 {
            vec![(self.hours, 'h'), (self.minutes, 'm')]
        } else if self.minutes > 0 {
            vec![(self.minutes, 'm'), (self.seconds, 's')]
        } else {
            vec![(self.seconds, 's')]
        }
    }
}

impl std::fmt::Display for RemainingTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .units()
            .into_iter()
            .map(|(value, unit)| format!("{value}{unit}"))
            .collect();
        if self.overdue {
            write!(f, "overdue by {}", parts.join(" "))
        } else {
            write!(f, "{} left", parts.join(" "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remaining {
    NoDeadline,
    Unparsed(ParseError),
    Time(RemainingTime),
}

impl std::fmt::Display for Remaining {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Remaining::NoDeadline => f.write_str("no deadline"),
            Remaining::Unparsed(error) => write!(f, "invalid deadline ({})", error.value),
            Remaining::Time(time) => write!(f, "{time}"),
        }
    }
}

pub fn calculate_remaining(task: &Task, now: NaiveDateTime) -> Remaining {
    match task.deadline_at() {
        Ok(None) => Remaining::NoDeadline,
        Ok(Some(deadline)) => {
            Remaining::Time(RemainingTime::from_seconds(seconds_between(now, deadline)))
        }
        Err(error) => Remaining::Unparsed(error),
    }
}

/// Runs a recompute pass right away and then once per configured interval. The interval is
/// read again after every pass so settings changes apply without a restart.
pub fn start_scheduler<C>(ctx: Arc<C>, state: AppState) -> tokio::task::JoinHandle<()>
where
    C: CommandCtx + Send + Sync + 'static,
{
    tokio::spawn(async move {
        loop {
            refresh_impl(ctx.as_ref(), &state);
            let interval = state.settings().refresh_interval_seconds;
            tokio::time::sleep(Duration::from_secs(interval)).await;
        }
    })
}
