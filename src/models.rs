use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::timefmt::{self, ParseError};

pub const DEFAULT_CATEGORY: &str = "uncategorized";
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 1;
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    Pending,
    Overdue,
    Done,
}

impl TaskState {
    pub const ALL: [TaskState; 3] = [TaskState::Pending, TaskState::Overdue, TaskState::Done];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Overdue => "overdue",
            TaskState::Done => "done",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pending" | "todo" => Ok(TaskState::Pending),
            "overdue" => Ok(TaskState::Overdue),
            "done" => Ok(TaskState::Done),
            other => Err(format!("unknown task state: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Task {
    #[serde(default = "new_task_id")]
    pub id: String,
    pub name: String,
    /// Raw stored value; `None` is the "no deadline" sentinel. Unparseable values are kept
    /// verbatim so later passes can retry them.
    #[serde(default, with = "deadline_field")]
    pub deadline: Option<String>,
    #[serde(default = "default_importance")]
    pub importance: u8,
    #[serde(default = "default_urgency")]
    pub urgency: u8,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default, alias = "labels")]
    pub tags: Vec<String>,
    #[serde(default, alias = "createTime")]
    pub create_time: String,
    #[serde(default, alias = "doneTime", skip_serializing_if = "Option::is_none")]
    pub done_time: Option<String>,
    /// Derived from the partition the task is stored in.
    #[serde(skip)]
    pub state: TaskState,
}

impl Task {
    pub fn has_deadline(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline_at(&self) -> Result<Option<NaiveDateTime>, ParseError> {
        self.deadline
            .as_deref()
            .map(timefmt::parse_deadline)
            .transpose()
    }

    pub fn created_at(&self) -> Result<NaiveDateTime, ParseError> {
        timefmt::parse_timestamp(&self.create_time)
    }

    pub fn done_at(&self) -> Result<Option<NaiveDateTime>, ParseError> {
        self.done_time
            .as_deref()
            .map(timefmt::parse_timestamp)
            .transpose()
    }
}

/// Boundary input for creating a task; checked by `validation::validate_new_task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NewTask {
    pub name: String,
    #[serde(default)]
    pub deadline: Option<NaiveDateTime>,
    pub importance: u8,
    pub urgency: u8,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    #[serde(
        default = "default_refresh_interval",
        alias = "update_interval",
        alias = "refreshIntervalSeconds"
    )]
    pub refresh_interval_seconds: u64,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_show_notifications")]
    pub show_notifications: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: DEFAULT_REFRESH_INTERVAL_SECS,
            categories: Vec::new(),
            tags: Vec::new(),
            show_notifications: default_show_notifications(),
        }
    }
}

impl Settings {
    /// Pulls a hand-edited interval back into range.
    pub fn normalized(mut self) -> Self {
        self.refresh_interval_seconds = self
            .refresh_interval_seconds
            .clamp(MIN_REFRESH_INTERVAL_SECS, MAX_REFRESH_INTERVAL_SECS);
        self
    }
}

/// On-disk layout of the task collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TasksFile {
    #[serde(default, alias = "todo")]
    pub pending: Vec<Task>,
    #[serde(default)]
    pub overdue: Vec<Task>,
    #[serde(default)]
    pub done: Vec<Task>,
}

pub fn new_task_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_importance() -> u8 {
    1
}

fn default_urgency() -> u8 {
    5
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_show_notifications() -> bool {
    true
}

mod deadline_field {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::timefmt::{is_no_deadline, NO_DEADLINE};

    pub fn serialize<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.as_deref().unwrap_or(NO_DEADLINE))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.filter(|value| !is_no_deadline(value)))
    }
}
