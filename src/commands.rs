use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::events::{
    Notifier, OverdueEvent, PromotionEvent, RecomputeReport, StatePayload, EVENT_STATE_UPDATED,
};
use crate::export::{self, ExportError, Summary};
use crate::models::{NewTask, Settings, Task, TaskState};
use crate::scheduler::{calculate_remaining, Remaining};
use crate::state::AppState;
use crate::statistics::{AverageCompletion, CompletionRate, Period, Series, StateFilter, Statistics};
use crate::storage::{BackupEntry, Persistence, Storage, StorageError};
use crate::store::TaskStore;
use crate::validation::validate_settings;

#[derive(Debug, serde::Serialize)]
pub struct CommandResult<T> {
    pub ok: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    /// Set when the change applied in memory but could not be saved.
    pub warning: Option<String>,
}

/// Everything the commands need from the hosting surface.
pub trait CommandCtx {
    fn app_data_dir(&self) -> Result<PathBuf, StorageError>;
    fn emit_state_updated(&self, payload: StatePayload);
    fn urgency_changed(&self, events: &[PromotionEvent]);
    fn tasks_overdue(&self, events: &[OverdueEvent]);
}

/// Context used by the binary: a fixed data directory and a `Notifier`.
pub struct AppCtx<N: Notifier> {
    root: PathBuf,
    notifier: N,
}

impl<N: Notifier> AppCtx<N> {
    pub fn new(root: PathBuf, notifier: N) -> Self {
        Self { root, notifier }
    }
}

impl<N: Notifier> CommandCtx for AppCtx<N> {
    fn app_data_dir(&self) -> Result<PathBuf, StorageError> {
        Ok(self.root.clone())
    }

    fn emit_state_updated(&self, payload: StatePayload) {
        log::debug!(
            "{EVENT_STATE_UPDATED}: pending={} overdue={} done={}",
            payload.pending.len(),
            payload.overdue.len(),
            payload.done.len()
        );
    }

    fn urgency_changed(&self, events: &[PromotionEvent]) {
        self.notifier.urgency_changed(events);
    }

    fn tasks_overdue(&self, events: &[OverdueEvent]) {
        self.notifier.tasks_overdue(events);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionKind {
    Category,
    Tag,
}

fn ok<T>(data: T) -> CommandResult<T> {
    CommandResult {
        ok: true,
        data: Some(data),
        error: None,
        warning: None,
    }
}

fn err<T>(message: &str) -> CommandResult<T> {
    CommandResult {
        ok: false,
        data: None,
        error: Some(message.to_string()),
        warning: None,
    }
}

/// `ok` when the save went through, otherwise `ok` carrying the save failure as a warning.
fn saved<T>(data: T, outcome: Result<(), StorageError>) -> CommandResult<T> {
    let mut result = ok(data);
    if let Err(error) = outcome {
        log::warn!("persist failed: {error}");
        result.warning = Some(format!("storage error: {error}"));
    }
    result
}

fn storage(ctx: &(impl CommandCtx + ?Sized), state: &AppState) -> Result<Storage, StorageError> {
    Ok(Storage::with_clock(ctx.app_data_dir()?, state.clock()))
}

/// Saves tasks and settings, then publishes the new state whether or not the save worked.
/// The snapshot is taken under the save lock, so a slower writer never overwrites a newer file.
fn persist(ctx: &(impl CommandCtx + ?Sized), state: &AppState) -> Result<(), StorageError> {
    let result = {
        let _saving = state.lock_saves();
        storage(ctx, state).and_then(|storage| {
            storage.save_tasks(&state.tasks_file())?;
            storage.save_settings(&state.settings())
        })
    };
    ctx.emit_state_updated(state.state_payload());
    result
}

fn notify(ctx: &(impl CommandCtx + ?Sized), state: &AppState, report: &RecomputeReport) {
    if !state.settings().show_notifications {
        return;
    }
    if !report.promotions.is_empty() {
        ctx.urgency_changed(&report.promotions);
    }
    if !report.overdue.is_empty() {
        ctx.tasks_overdue(&report.overdue);
    }
}

/// Publishes a pass: save when it changed anything, then notify.
fn apply_report(
    ctx: &(impl CommandCtx + ?Sized),
    state: &AppState,
    report: &RecomputeReport,
) -> Result<(), StorageError> {
    let outcome = if report.changed() {
        persist(ctx, state)
    } else {
        Ok(())
    };
    notify(ctx, state, report);
    outcome
}

/// One recompute pass as run by the background loop.
pub fn refresh_impl<C: CommandCtx + ?Sized>(ctx: &C, state: &AppState) -> RecomputeReport {
    let report = state.recompute();
    if let Err(error) = apply_report(ctx, state, &report) {
        log::warn!("refresh persist failed: {error}");
    }
    report
}

pub fn load_state_impl(ctx: &impl CommandCtx, state: &AppState) -> CommandResult<StatePayload> {
    let storage = match storage(ctx, state) {
        Ok(storage) => storage,
        Err(e) => return err(&format!("app_data_dir error: {e}")),
    };
    if let Err(error) = storage.ensure_dirs() {
        return err(&format!("storage error: {error}"));
    }
    state.replace_store(storage.load_tasks());
    state.update_settings(storage.load_settings());
    let report = state.recompute();
    let outcome = apply_report(ctx, state, &report);
    saved(state.state_payload(), outcome)
}

pub fn create_task_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    input: NewTask,
) -> CommandResult<Task> {
    let (task, report) = match state.add_task(input) {
        Ok(added) => added,
        Err(error) => return err(&error.to_string()),
    };
    notify(ctx, state, &report);
    saved(task, persist(ctx, state))
}

pub fn complete_task_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: &str,
) -> CommandResult<Task> {
    match state.complete_task(task_id) {
        Ok(task) => saved(task, persist(ctx, state)),
        Err(error) => err(&error.to_string()),
    }
}

pub fn delete_task_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_id: &str,
) -> CommandResult<Task> {
    match state.delete_task(task_id) {
        Ok(task) => saved(task, persist(ctx, state)),
        Err(error) => err(&error.to_string()),
    }
}

pub fn sorted_tasks_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    task_state: TaskState,
) -> CommandResult<Vec<Task>> {
    let (tasks, report) = state.sorted(task_state);
    let outcome = apply_report(ctx, state, &report);
    saved(tasks, outcome)
}

pub fn remaining_impl(state: &AppState, task_id: &str) -> CommandResult<String> {
    let remaining = state.with_store(|store, now| {
        store
            .find(task_id)
            .map(|task| calculate_remaining(task, now))
    });
    match remaining {
        Some(Remaining::Unparsed(error)) => err(&error.to_string()),
        Some(remaining) => ok(remaining.to_string()),
        None => err(&format!("task not found: {task_id}")),
    }
}

pub fn completion_trend_impl(
    state: &AppState,
    period: Period,
    window_days: u32,
) -> CommandResult<Series> {
    ok(state.with_store(|store, now| {
        Statistics::new(store, now).completion_trend(period, window_days)
    }))
}

pub fn distribution_impl(
    state: &AppState,
    kind: DistributionKind,
    filter: StateFilter,
) -> CommandResult<Series> {
    ok(state.with_store(|store, now| distribution(store, now, kind, filter)))
}

fn distribution(
    store: &TaskStore,
    now: chrono::NaiveDateTime,
    kind: DistributionKind,
    filter: StateFilter,
) -> Series {
    let stats = Statistics::new(store, now);
    match kind {
        DistributionKind::Category => stats.category_distribution(filter),
        DistributionKind::Tag => stats.tag_distribution(filter),
    }
}

pub fn completion_rate_impl(state: &AppState, window_days: u32) -> CommandResult<CompletionRate> {
    ok(state.with_store(|store, now| Statistics::new(store, now).completion_rate(window_days)))
}

pub fn average_completion_impl(
    state: &AppState,
    window_days: u32,
) -> CommandResult<AverageCompletion> {
    ok(state.with_store(|store, now| {
        Statistics::new(store, now).average_completion_time(window_days)
    }))
}

pub fn update_settings_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    settings: Settings,
) -> CommandResult<Settings> {
    let settings = match validate_settings(settings) {
        Ok(settings) => settings,
        Err(error) => return err(&error.to_string()),
    };
    state.update_settings(settings.clone());
    saved(settings, persist(ctx, state))
}

pub fn list_backups_impl(ctx: &impl CommandCtx) -> CommandResult<Vec<BackupEntry>> {
    let storage = match ctx.app_data_dir().map(Storage::new) {
        Ok(storage) => storage,
        Err(e) => return err(&format!("app_data_dir error: {e}")),
    };
    match storage.list_backups() {
        Ok(list) => ok(list),
        Err(error) => err(&format!("storage error: {error}")),
    }
}

pub fn restore_backup_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    filename: &str,
) -> CommandResult<StatePayload> {
    let storage = match storage(ctx, state) {
        Ok(storage) => storage,
        Err(e) => return err(&format!("app_data_dir error: {e}")),
    };
    let restored = {
        let _saving = state.lock_saves();
        storage.restore_backup(filename)
    };
    let data = match restored {
        Ok(data) => data,
        Err(error) => return err(&format!("storage error: {error}")),
    };
    state.replace_store(TaskStore::from_file(data));
    log::info!("restored backup {filename}");
    let report = state.recompute();
    let outcome = apply_report(ctx, state, &report);
    if !report.changed() {
        ctx.emit_state_updated(state.state_payload());
    }
    saved(state.state_payload(), outcome)
}

fn export_default_path(root: &Path, name: &str, now: NaiveDateTime) -> PathBuf {
    let stamp = now.format("%Y%m%d-%H%M%S").to_string();
    root.join("exports").join(format!("todo-pulse-{name}-{stamp}.csv"))
}

fn export_to(
    ctx: &impl CommandCtx,
    state: &AppState,
    name: &str,
    path: Option<PathBuf>,
    render: impl FnOnce() -> Result<Vec<u8>, ExportError>,
) -> CommandResult<String> {
    let path = match path {
        Some(path) => path,
        None => match ctx.app_data_dir() {
            Ok(root) => export_default_path(&root, name, state.now()),
            Err(e) => return err(&format!("app_data_dir error: {e}")),
        },
    };
    let written = render().and_then(|bytes| export::write_csv(&path, &bytes));
    match written {
        Ok(()) => ok(path.to_string_lossy().to_string()),
        Err(error) => err(&format!("export error: {error}")),
    }
}

pub fn export_trend_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    period: Period,
    window_days: u32,
    path: Option<PathBuf>,
) -> CommandResult<String> {
    let series = state.with_store(|store, now| {
        Statistics::new(store, now).completion_trend(period, window_days)
    });
    export_to(ctx, state, "trend", path, || export::trend_csv(&series))
}

pub fn export_distribution_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    kind: DistributionKind,
    filter: StateFilter,
    path: Option<PathBuf>,
) -> CommandResult<String> {
    let series = state.with_store(|store, now| distribution(store, now, kind, filter));
    export_to(ctx, state, "distribution", path, || export::distribution_csv(&series))
}

pub fn export_summary_impl(
    ctx: &impl CommandCtx,
    state: &AppState,
    window_days: u32,
    path: Option<PathBuf>,
) -> CommandResult<String> {
    let summary = state.with_store(|store, now| {
        let stats = Statistics::new(store, now);
        Summary {
            total_tasks: stats.total_tasks(),
            rate: stats.completion_rate(window_days),
            average: stats.average_completion_time(window_days),
        }
    });
    export_to(ctx, state, "summary", path, || export::summary_csv(&summary))
}
