use chrono::NaiveDateTime;

use crate::models::{Task, TaskState, TasksFile};
use crate::timefmt::format_timestamp;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("task already completed: {0}")]
    AlreadyDone(String),
}

/// Three disjoint partitions; every task lives in exactly one of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskStore {
    pending: Vec<Task>,
    overdue: Vec<Task>,
    done: Vec<Task>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from the persisted layout, stamping each task with its partition.
    pub fn from_file(file: TasksFile) -> Self {
        let mut store = Self {
            pending: file.pending,
            overdue: file.overdue,
            done: file.done,
        };
        for state in TaskState::ALL {
            for task in store.partition_mut(state) {
                task.state = state;
            }
        }
        store
    }

    pub fn to_file(&self) -> TasksFile {
        TasksFile {
            pending: self.pending.clone(),
            overdue: self.overdue.clone(),
            done: self.done.clone(),
        }
    }

    pub fn partition(&self, state: TaskState) -> &[Task] {
        match state {
            TaskState::Pending => &self.pending,
            TaskState::Overdue => &self.overdue,
            TaskState::Done => &self.done,
        }
    }

    pub(crate) fn partition_mut(&mut self, state: TaskState) -> &mut Vec<Task> {
        match state {
            TaskState::Pending => &mut self.pending,
            TaskState::Overdue => &mut self.overdue,
            TaskState::Done => &mut self.done,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.pending
            .iter()
            .chain(self.overdue.iter())
            .chain(self.done.iter())
    }

    pub fn total_tasks(&self) -> usize {
        self.pending.len() + self.overdue.len() + self.done.len()
    }

    pub fn len(&self) -> usize {
        self.total_tasks()
    }

    pub fn is_empty(&self) -> bool {
        self.total_tasks() == 0
    }

    pub fn find(&self, task_id: &str) -> Option<&Task> {
        self.iter().find(|task| task.id == task_id)
    }

    pub fn state_of(&self, task_id: &str) -> Option<TaskState> {
        self.locate(task_id).map(|(state, _)| state)
    }

    /// New tasks always start out pending, whatever their deadline.
    pub fn add(&mut self, mut task: Task) -> &Task {
        task.state = TaskState::Pending;
        task.done_time = None;
        self.pending.push(task);
        &self.pending[self.pending.len() - 1]
    }

    /// Moves a pending or overdue task to done, stamping `done_time` once.
    pub fn complete(&mut self, task_id: &str, now: NaiveDateTime) -> Result<Task, StoreError> {
        let (state, index) = self
            .locate(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        if state == TaskState::Done {
            return Err(StoreError::AlreadyDone(task_id.to_string()));
        }
        let mut task = self.partition_mut(state).remove(index);
        task.state = TaskState::Done;
        task.done_time = Some(format_timestamp(now));
        self.done.push(task.clone());
        Ok(task)
    }

    pub fn delete(&mut self, task_id: &str) -> Result<Task, StoreError> {
        let (state, index) = self
            .locate(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))?;
        Ok(self.partition_mut(state).remove(index))
    }

    /// Pending -> Overdue for the given pending indices; returns the moved tasks in store order.
    pub(crate) fn move_to_overdue(&mut self, mut indices: Vec<usize>) -> Vec<Task> {
        indices.sort_unstable();
        indices.dedup();
        let mut moved = Vec::with_capacity(indices.len());
        for index in indices.into_iter().rev() {
            if index >= self.pending.len() {
                continue;
            }
            let mut task = self.pending.remove(index);
            task.state = TaskState::Overdue;
            moved.push(task);
        }
        moved.reverse();
        self.overdue.extend(moved.iter().cloned());
        moved
    }

    fn locate(&self, task_id: &str) -> Option<(TaskState, usize)> {
        TaskState::ALL.into_iter().find_map(|state| {
            self.partition(state)
                .iter()
                .position(|task| task.id == task_id)
                .map(|index| (state, index))
        })
    }
}
