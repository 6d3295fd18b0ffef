//! officedir: keeps the local office directory in sync with the board API.
//!
//! Usage: `officedir <run|full-sync|incremental-sync|status|clear|search TERM>`
//! Logging defaults to `info`; override with `RUST_LOG`.

use anyhow::Context;

use officedir_lib::services::{admin, search};
use officedir_lib::state::{config_path, load_config, DirectoryState};
use officedir_lib::types::SyncReport;

const USAGE: &str = "usage: officedir <run|full-sync|incremental-sync|status|clear|search TERM>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        anyhow::bail!(USAGE);
    };

    let config = load_config().context("Failed to load officedir config")?;
    let state = DirectoryState::from_config(config, Some(config_path()?))
        .context("Failed to open office directory")?;

    match command {
        "run" => run(&state).await,
        "full-sync" => {
            let report = admin::trigger_full_sync(&state).await?;
            print_report(&report)
        }
        "incremental-sync" => {
            let report = admin::trigger_incremental_sync(&state).await?;
            print_report(&report)
        }
        "status" => {
            let status = admin::sync_status(&state)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
        "clear" => {
            let removed = admin::clear_all_data(&state).await?;
            println!("Removed {} office(s)", removed);
            Ok(())
        }
        "search" => {
            let term = args[1..].join(" ");
            let offices = search::search_offices(&state, &term)?;
            println!("{}", serde_json::to_string_pretty(&offices)?);
            Ok(())
        }
        other => anyhow::bail!("unknown command '{}'\n{}", other, USAGE),
    }
}

/// Activate scheduling and stay up until Ctrl-C.
async fn run(state: &DirectoryState) -> anyhow::Result<()> {
    tokio::select! {
        result = state.activate() => match result {
            Ok(Some(report)) => log::info!(
                "Bootstrap full sync saved {} office(s)",
                report.upserted
            ),
            Ok(None) => {}
            // Scheduling stays armed; the next incremental pass retries.
            Err(e) => log::error!("Bootstrap full sync failed: {}", e),
        },
        _ = tokio::signal::ctrl_c() => {
            state.shutdown();
            return Ok(());
        }
    }

    log::info!("officedir running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    state.shutdown();
    Ok(())
}

fn print_report(report: &SyncReport) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    if !report.is_clean() {
        anyhow::bail!("{} sync finished with failures", report.kind);
    }
    Ok(())
}
