use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDateTime;

use crate::clock::{Clock, SystemClock};
use crate::events::{RecomputeReport, StatePayload};
use crate::models::{NewTask, Settings, Task, TaskState, TasksFile};
use crate::scheduler::{order_for_display, recompute};
use crate::store::{StoreError, TaskStore};
use crate::validation::{validate_new_task, ValidationError};

/// Shared handle over the single task store. Every mutation takes the write lock, so add,
/// complete, delete and recompute passes never interleave; readers see whole passes only.
/// Saves are serialized separately through `lock_saves`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<RwLock<AppData>>,
    clock: Arc<dyn Clock>,
    saves: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(store: TaskStore, settings: Settings) -> Self {
        Self::with_clock(store, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(store: TaskStore, settings: Settings, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AppData {
                store,
                settings: settings.normalized(),
            })),
            clock,
            saves: Arc::new(Mutex::new(())),
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Held across snapshot-and-write so the newest snapshot is always the last one written.
    pub fn lock_saves(&self) -> MutexGuard<'_, ()> {
        self.saves.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> RwLockReadGuard<'_, AppData> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, AppData> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> TaskStore {
        self.read().store.clone()
    }

    /// Runs `f` against the store under the read lock, together with the current time.
    pub fn with_store<R>(&self, f: impl FnOnce(&TaskStore, NaiveDateTime) -> R) -> R {
        let now = self.now();
        let guard = self.read();
        f(&guard.store, now)
    }

    pub fn tasks_file(&self) -> TasksFile {
        self.read().store.to_file()
    }

    pub fn state_payload(&self) -> StatePayload {
        let guard = self.read();
        StatePayload {
            pending: guard.store.partition(TaskState::Pending).to_vec(),
            overdue: guard.store.partition(TaskState::Overdue).to_vec(),
            done: guard.store.partition(TaskState::Done).to_vec(),
            settings: guard.settings.clone(),
        }
    }

    /// Validates and stores a new task, then recomputes so a preset urgency that disagrees
    /// with the deadline is corrected straight away.
    pub fn add_task(&self, input: NewTask) -> Result<(Task, RecomputeReport), ValidationError> {
        let now = self.now();
        let task = validate_new_task(input, now)?;
        let mut guard = self.write();
        let added = guard.store.add(task).clone();
        let report = recompute(&mut guard.store, now);
        let stored = guard.store.find(&added.id).cloned().unwrap_or(added);
        log::info!("task added id={} state={}", stored.id, stored.state);
        Ok((stored, report))
    }

    pub fn complete_task(&self, task_id: &str) -> Result<Task, StoreError> {
        let now = self.now();
        self.write().store.complete(task_id, now)
    }

    pub fn delete_task(&self, task_id: &str) -> Result<Task, StoreError> {
        self.write().store.delete(task_id)
    }

    pub fn recompute(&self) -> RecomputeReport {
        let now = self.now();
        recompute(&mut self.write().store, now)
    }

    /// Fresh display order for one partition; recomputes first.
    pub fn sorted(&self, state: TaskState) -> (Vec<Task>, RecomputeReport) {
        let now = self.now();
        let mut guard = self.write();
        let report = recompute(&mut guard.store, now);
        let ordered = order_for_display(guard.store.partition(state), state, now);
        (ordered, report)
    }

    pub fn replace_store(&self, store: TaskStore) {
        self.write().store = store;
    }

    pub fn settings(&self) -> Settings {
        self.read().settings.clone()
    }

    pub fn update_settings(&self, settings: Settings) {
        self.write().settings = settings;
    }
}

#[derive(Debug)]
struct AppData {
    store: TaskStore,
    settings: Settings,
}
