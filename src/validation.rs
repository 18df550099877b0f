//! Boundary checks applied before anything reaches the store.
//!
//! A `NewTask` either becomes a complete `Task` or is rejected whole; settings updates are
//! checked the same way.

use chrono::NaiveDateTime;

use crate::models::{
    new_task_id, NewTask, Settings, Task, TaskState, DEFAULT_CATEGORY, MAX_REFRESH_INTERVAL_SECS,
    MIN_REFRESH_INTERVAL_SECS,
};
use crate::timefmt::{format_deadline, format_timestamp};

pub const IMPORTANCE_RANGE: std::ops::RangeInclusive<u8> = 1..=3;
pub const URGENCY_RANGE: std::ops::RangeInclusive<u8> = 1..=5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("task name must not be empty")]
    EmptyName,
    #[error("importance {0} is outside 1..=3")]
    Importance(u8),
    #[error("urgency {0} is outside 1..=5")]
    Urgency(u8),
    #[error("refresh interval {0}s is outside 1..=3600")]
    RefreshInterval(u64),
}

/// Builds a pending task stamped with `now` as its creation time.
pub fn validate_new_task(input: NewTask, now: NaiveDateTime) -> Result<Task, ValidationError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if !IMPORTANCE_RANGE.contains(&input.importance) {
        return Err(ValidationError::Importance(input.importance));
    }
    if !URGENCY_RANGE.contains(&input.urgency) {
        return Err(ValidationError::Urgency(input.urgency));
    }

    let category = input
        .category
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_CATEGORY)
        .to_string();

    Ok(Task {
        id: new_task_id(),
        name: name.to_string(),
        deadline: input.deadline.map(format_deadline),
        importance: input.importance,
        urgency: input.urgency,
        category,
        tags: normalize_labels(input.tags),
        create_time: format_timestamp(now),
        done_time: None,
        state: TaskState::Pending,
    })
}

pub fn validate_settings(settings: Settings) -> Result<Settings, ValidationError> {
    let interval = settings.refresh_interval_seconds;
    if !(MIN_REFRESH_INTERVAL_SECS..=MAX_REFRESH_INTERVAL_SECS).contains(&interval) {
        return Err(ValidationError::RefreshInterval(interval));
    }
    Ok(Settings {
        categories: normalize_labels(settings.categories),
        tags: normalize_labels(settings.tags),
        ..settings
    })
}

/// Trims, drops blanks and removes repeats while keeping first-seen order.
pub fn normalize_labels(labels: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        let label = label.trim();
        if label.is_empty() || out.iter().any(|seen| seen == label) {
            continue;
        }
        out.push(label.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn input(name: &str, importance: u8, urgency: u8) -> NewTask {
        NewTask {
            name: name.to_string(),
            deadline: None,
            importance,
            urgency,
            category: None,
            tags: Vec::new(),
        }
    }

    #[test]
    fn valid_input_becomes_pending_task() {
        let mut new_task = input("  file taxes ", 3, 2);
        new_task.deadline = Some(now() + chrono::Duration::hours(5));
        new_task.category = Some("  ".to_string());
        new_task.tags = vec![" home".into(), "".into(), "home".into(), "money".into()];

        let task = validate_new_task(new_task, now()).expect("valid task");
        assert_eq!(task.name, "file taxes");
        assert_eq!(task.deadline.as_deref(), Some("2024-05-01 15:00"));
        assert_eq!(task.category, DEFAULT_CATEGORY);
        assert_eq!(task.tags, vec!["home".to_string(), "money".to_string()]);
        assert_eq!(task.create_time, "2024-05-01 10:00:00");
        assert_eq!(task.state, TaskState::Pending);
        assert!(task.done_time.is_none());
    }

    #[test]
    fn rejects_out_of_range_fields() {
        assert_eq!(
            validate_new_task(input(" ", 1, 1), now()),
            Err(ValidationError::EmptyName)
        );
        assert_eq!(
            validate_new_task(input("a", 0, 1), now()),
            Err(ValidationError::Importance(0))
        );
        assert_eq!(
            validate_new_task(input("a", 4, 1), now()),
            Err(ValidationError::Importance(4))
        );
        assert_eq!(
            validate_new_task(input("a", 2, 6), now()),
            Err(ValidationError::Urgency(6))
        );
    }

    #[test]
    fn settings_interval_bounds() {
        let mut settings = Settings::default();
        settings.refresh_interval_seconds = 0;
        assert_eq!(
            validate_settings(settings.clone()),
            Err(ValidationError::RefreshInterval(0))
        );
        settings.refresh_interval_seconds = 3601;
        assert!(validate_settings(settings.clone()).is_err());

        settings.refresh_interval_seconds = 3600;
        settings.categories = vec!["work".into(), " work ".into()];
        let out = validate_settings(settings).expect("valid settings");
        assert_eq!(out.categories, vec!["work".to_string()]);
    }
}
