use crate::models::{Settings, Task};
use crate::timefmt::ParseError;

pub const EVENT_URGENCY_CHANGED: &str = "urgency_changed";
pub const EVENT_TASKS_OVERDUE: &str = "tasks_overdue";
pub const EVENT_STATE_UPDATED: &str = "state_updated";

/// How many promotions a summary notification spells out.
const SUMMARY_DETAIL_LIMIT: usize = 3;

#[derive(Debug, Clone, serde::Serialize)]
pub struct PromotionEvent {
    pub task: Task,
    pub old_tier: u8,
    pub new_tier: u8,
    pub remaining_days: f64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OverdueEvent {
    pub task: Task,
}

/// A pending task whose deadline could not be read this pass; it stays untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSkip {
    pub task_id: String,
    pub error: ParseError,
}

#[derive(Debug, Clone, Default)]
pub struct RecomputeReport {
    pub promotions: Vec<PromotionEvent>,
    pub overdue: Vec<OverdueEvent>,
    pub skipped: Vec<ParseSkip>,
}

impl RecomputeReport {
    /// True when the pass changed the store and it should be saved.
    pub fn changed(&self) -> bool {
        !self.promotions.is_empty() || !self.overdue.is_empty()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StatePayload {
    pub pending: Vec<Task>,
    pub overdue: Vec<Task>,
    pub done: Vec<Task>,
    pub settings: Settings,
}

/// Receives the outcome of each recompute pass and decides how to surface it.
pub trait Notifier: Send + Sync {
    fn urgency_changed(&self, events: &[PromotionEvent]);
    fn tasks_overdue(&self, events: &[OverdueEvent]);
}

/// Surfaces events through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn urgency_changed(&self, events: &[PromotionEvent]) {
        if events.is_empty() {
            return;
        }
        log::info!("{EVENT_URGENCY_CHANGED}: {}", promotion_message(events));
    }

    fn tasks_overdue(&self, events: &[OverdueEvent]) {
        for event in events {
            log::info!(
                "{EVENT_TASKS_OVERDUE}: '{}' passed its deadline {}",
                event.task.name,
                event.task.deadline.as_deref().unwrap_or_default()
            );
        }
    }
}

/// One promotion is described in full; several are summarised with the first few listed.
pub fn promotion_message(events: &[PromotionEvent]) -> String {
    match events {
        [] => String::new(),
        [event] => format!(
            "'{}' urgency {} -> {} (remaining {:.1} days)",
            event.task.name, event.old_tier, event.new_tier, event.remaining_days
        ),
        _ => {
            let mut message = format!("{} tasks changed urgency", events.len());
            for (index, event) in events.iter().take(SUMMARY_DETAIL_LIMIT).enumerate() {
                message.push_str(&format!(
                    "\n{}. '{}': {} -> {}",
                    index + 1,
                    event.task.name,
                    event.old_tier,
                    event.new_tier
                ));
            }
            if events.len() > SUMMARY_DETAIL_LIMIT {
                message.push_str(&format!(
                    "\n... and {} more",
                    events.len() - SUMMARY_DETAIL_LIMIT
                ));
            }
            message
        }
    }
}
