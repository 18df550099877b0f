use chrono::{NaiveDate, NaiveDateTime};

use crate::models::{Task, TaskState, DEFAULT_CATEGORY};

pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, min, s)
        .unwrap()
}

pub fn make_task(id: &str, deadline: Option<&str>) -> Task {
    Task {
        id: id.to_string(),
        name: format!("task-{id}"),
        deadline: deadline.map(str::to_string),
        importance: 1,
        urgency: 5,
        category: DEFAULT_CATEGORY.to_string(),
        tags: Vec::new(),
        create_time: "2024-01-01 09:00:00".to_string(),
        done_time: None,
        state: TaskState::Pending,
    }
}
