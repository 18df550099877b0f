use std::path::Path;

pub const LOG_FILE_BASENAME: &str = "todo-pulse";
pub const LOG_FILE_SUFFIX: &str = "log";
pub const LOG_ROTATE_SIZE_BYTES: u64 = 100 * 1024 * 1024;
pub const LOG_ROTATE_KEEP_FILES: usize = 30;
pub const LOG_ENV_VAR: &str = "TODO_PULSE_LOG";

const DEFAULT_SPEC_DEBUG: &str = "warn,todo_pulse_lib=debug,todo_pulse=debug";
const DEFAULT_SPEC_RELEASE: &str = "warn,todo_pulse_lib=info,todo_pulse=info";

/// `TODO_PULSE_LOG` wins over `RUST_LOG`; blank values count as unset.
pub fn filter_spec(own: Option<String>, rust_log: Option<String>, debug_build: bool) -> String {
    let present = |value: Option<String>| value.filter(|value| !value.trim().is_empty());
    present(own)
        .or_else(|| present(rust_log))
        .unwrap_or_else(|| {
            if debug_build {
                DEFAULT_SPEC_DEBUG
            } else {
                DEFAULT_SPEC_RELEASE
            }
            .to_string()
        })
}

/// Log files sit beside data.json, settings.json and backups/.
pub fn log_directory(data_dir: &Path) -> &Path {
    data_dir
}

#[cfg(all(feature = "app", not(test)))]
pub fn init_logging(data_dir: &Path) -> Result<(), flexi_logger::FlexiLoggerError> {
    use flexi_logger::{
        detailed_format, Cleanup, Criterion, Duplicate, FileSpec, Logger, Naming, WriteMode,
    };

    std::fs::create_dir_all(data_dir)?;

    let spec = filter_spec(
        std::env::var(LOG_ENV_VAR).ok(),
        std::env::var("RUST_LOG").ok(),
        cfg!(debug_assertions),
    );

    Logger::try_with_str(&spec)?
        .log_to_file(
            FileSpec::default()
                .directory(log_directory(data_dir))
                .basename(LOG_FILE_BASENAME)
                .suffix(LOG_FILE_SUFFIX),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .format_for_files(detailed_format)
        .rotate(
            Criterion::Size(LOG_ROTATE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(LOG_ROTATE_KEEP_FILES),
        )
        .duplicate_to_stdout(if cfg!(debug_assertions) {
            Duplicate::Info
        } else {
            Duplicate::None
        })
        .start()?;

    install_panic_hook();

    log::info!(
        "logger initialized dir={} spec={spec} rotate_size_bytes={LOG_ROTATE_SIZE_BYTES} keep_files={LOG_ROTATE_KEEP_FILES}",
        log_directory(data_dir).display(),
    );
    Ok(())
}

#[cfg(all(feature = "app", not(test)))]
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info: &std::panic::PanicHookInfo<'_>| {
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<non-string panic payload>");
        let location = info
            .location()
            .map(|loc| loc.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        let backtrace = std::backtrace::Backtrace::force_capture();
        log::error!("panic: payload={payload} location={location}\nbacktrace:\n{backtrace}");
        default_hook(info);
    }));
}
