pub mod clock;
pub mod commands;
pub mod events;
pub mod export;
pub mod logging;
pub mod models;
pub mod scheduler;
pub mod state;
pub mod statistics;
pub mod storage;
pub mod store;
pub mod timefmt;
pub mod validation;

#[cfg(test)]
mod test_support;

#[cfg(feature = "app")]
use std::path::PathBuf;

#[cfg(all(feature = "app", not(test)))]
use crate::commands::{load_state_impl, sorted_tasks_impl, AppCtx};
#[cfg(all(feature = "app", not(test)))]
use crate::events::LogNotifier;
#[cfg(all(feature = "app", not(test)))]
use crate::models::{Settings, TaskState};
#[cfg(all(feature = "app", not(test)))]
use crate::scheduler::{calculate_remaining, start_scheduler};
#[cfg(all(feature = "app", not(test)))]
use crate::state::AppState;
#[cfg(all(feature = "app", not(test)))]
use crate::store::TaskStore;

#[cfg(feature = "app")]
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub data_dir: PathBuf,
    /// Run one pass, print the display order and exit.
    pub once: bool,
}

#[cfg(all(feature = "app", not(test)))]
pub fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging(&options.data_dir)?;

    let ctx = std::sync::Arc::new(AppCtx::new(options.data_dir.clone(), LogNotifier));
    let state = AppState::new(TaskStore::new(), Settings::default());
    let loaded = load_state_impl(ctx.as_ref(), &state);
    if let Some(error) = loaded.error {
        return Err(error.into());
    }
    if let Some(warning) = loaded.warning {
        log::warn!("startup: {warning}");
    }

    if options.once {
        print_partitions(ctx.as_ref(), &state);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let handle = start_scheduler(ctx, state);
        log::info!("scheduler started, waiting for ctrl-c");
        let signal = tokio::signal::ctrl_c().await;
        handle.abort();
        signal
    })?;
    log::info!("shutdown");
    Ok(())
}

#[cfg(all(feature = "app", not(test)))]
fn print_partitions(ctx: &AppCtx<LogNotifier>, state: &AppState) {
    let now = state.now();
    for task_state in TaskState::ALL {
        let result = sorted_tasks_impl(ctx, state, task_state);
        if let Some(warning) = result.warning {
            log::warn!("{warning}");
        }
        let tasks = result.data.unwrap_or_default();
        println!("[{task_state}] {}", tasks.len());
        for task in tasks {
            println!(
                "  {} (importance {}, urgency {}) {}",
                task.name,
                task.importance,
                task.urgency,
                calculate_remaining(&task, now)
            );
        }
    }
}
