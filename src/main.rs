use std::path::PathBuf;

use clap::Parser;
use todo_pulse_lib::RunOptions;

/// Task tracker that keeps urgency tiers current as deadlines approach.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding data.json, settings.json, backups and logs
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Run a single recompute pass, print the lists and exit
    #[arg(long)]
    once: bool,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("todo-pulse")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    todo_pulse_lib::run(RunOptions {
        data_dir: args.data_dir.unwrap_or_else(default_data_dir),
        once: args.once,
    })
}
