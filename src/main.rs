//! checkboottimes
//!
//! Entry point: parses the repetition count, loads the configuration and
//! runs every boot time measurement.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use anyhow::{Context, Result};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use checkboottimes::boot_timing::{self, BootTimeSummary};
use checkboottimes::cli;
use checkboottimes::core::{BenchConfig, APP_NAME, VERSION};
use checkboottimes::toolchain::{home_dir, ToolLocator};

#[tokio::main]
async fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let execution_times = match cli::parse_execution_times(std::env::args().skip(1)) {
        Ok(execution_times) => execution_times,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", cli::usage());
            return ExitCode::FAILURE;
        }
    };

    info!("{} v{}", APP_NAME, VERSION);
    info!("Testing emulator startup times. This may take several minutes.");

    match run(execution_times).await {
        Ok(summaries) => {
            info!("Finished {} measurement(s)", summaries.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(execution_times: Option<u32>) -> Result<Vec<BootTimeSummary>> {
    let home = home_dir().context("unable to determine the home directory")?;
    let mut config = BenchConfig::load(&config_path(&home))
        .context("failed to load configuration")?;

    if let Some(execution_times) = execution_times {
        config = config.with_execution_times(execution_times);
    }

    let summaries = boot_timing::run(&ToolLocator::from_env(), &home, config)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    Ok(summaries)
}

/// `<home>/.config/checkboottimes/config.toml`
fn config_path(home: &Path) -> PathBuf {
    home.join(".config").join(APP_NAME).join("config.toml")
}
