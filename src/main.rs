mod app;
mod audio;
mod config;
mod input;
mod palette;
mod render;
mod sim;
mod term;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Args, Config};
use std::fs::File;
use std::path::Path;
use std::process::ExitCode;

/// Logs go to a file or nowhere: the terminal is busy.
fn init_logging(path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create log file {}", path.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .format_timestamp_millis()
        .try_init()
        .context("logger already initialised")?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(path) = &args.log_file {
        if let Err(e) = init_logging(path) {
            eprintln!("pyre: {e:#}");
            return ExitCode::FAILURE;
        }
    }

    match app::run(Config::from(args)) {
        Ok(reason) => ExitCode::from(reason.status()),
        Err(e) => {
            eprintln!("pyre: {e:#}");
            ExitCode::FAILURE
        }
    }
}
