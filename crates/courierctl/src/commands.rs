//! Subcommand handlers for courierctl.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use courier_common::plan::InstallPlan;
use courier_common::wire::{self, Command, Opcode, Status, HELLO_TOKEN};
use owo_colors::OwoColorize;
use tracing::info;

use crate::install::journal::DEFAULT_JOURNAL_DIR;
use crate::install::{Installer, RunOutcome};
use crate::link::{self, CommandLink};
use crate::sink::ConsoleSink;

/// Poll interval for the one-shot diagnostic exchanges.
const DIAG_POLL: Duration = Duration::from_millis(500);

/// Run the full installation procedure against the connected peer.
pub async fn install(
    plan_path: Option<PathBuf>,
    link_path: Option<String>,
    journal_dir: Option<PathBuf>,
) -> Result<()> {
    let plan = InstallPlan::load_or_default(plan_path.as_deref())?;
    let path = link::discover_link_path(link_path.as_deref(), plan.link.socket.as_deref());

    info!(link = %path, "connecting to peer");
    let stream = link::connect(&path).await?;
    let command_link = CommandLink::with_read_timeout(stream, plan.link.read_timeout());

    let journal_dir = journal_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_JOURNAL_DIR));
    let mut installer = Installer::new(command_link, plan).with_journal_dir(journal_dir);
    let mut sink = ConsoleSink::new();

    let report = installer.run(&mut sink).await;
    match report.outcome {
        RunOutcome::Completed => Ok(()),
        RunOutcome::Failed { stage, reason } => {
            bail!("installation failed at {stage}: {reason}")
        }
    }
}

/// Handshake with the peer and print the disks it reports.
pub async fn detect(link_path: Option<String>) -> Result<()> {
    let mut command_link = open_link(link_path.as_deref()).await?;

    let hello = command_link
        .execute(&Command::new(Opcode::Hello, HELLO_TOKEN), DIAG_POLL, |_| {})
        .await
        .context("handshake exchange failed")?;
    if let Status::Error(code) = hello.status {
        bail!("peer rejected handshake ({code}): {}", hello.detail);
    }

    let response = command_link
        .execute(&Command::new(Opcode::DetectDisks, ""), DIAG_POLL, |_| {})
        .await
        .context("disk detection exchange failed")?;
    if let Status::Error(code) = response.status {
        bail!("disk detection failed ({code}): {}", response.detail);
    }

    let disks = wire::parse_disk_list(&response.detail);
    if disks.is_empty() {
        println!("{}", "peer reported no installable disks".yellow());
        return Ok(());
    }

    println!("{} disk(s) reported:", disks.len());
    for disk in &disks {
        println!("  {}", disk.bold());
    }
    Ok(())
}

/// Query the peer's status report.
pub async fn status(link_path: Option<String>) -> Result<()> {
    let mut command_link = open_link(link_path.as_deref()).await?;

    let response = command_link
        .execute(&Command::new(Opcode::Status, ""), DIAG_POLL, |_| {})
        .await
        .context("status exchange failed")?;
    match response.status {
        Status::Success => {
            if response.detail.is_empty() {
                println!("{}", "peer is ready".green());
            } else {
                println!("{}", response.detail);
            }
            Ok(())
        }
        Status::Error(code) => bail!("peer status error ({code}): {}", response.detail),
        Status::Progress => bail!("peer returned a non-terminal status report"),
    }
}

/// Print the effective installation plan as TOML.
pub fn plan(plan_path: Option<PathBuf>) -> Result<()> {
    let plan = InstallPlan::load_or_default(plan_path.as_deref())?;
    let rendered = toml::to_string_pretty(&plan).context("failed to render plan")?;
    print!("{rendered}");
    Ok(())
}

async fn open_link(link_path: Option<&str>) -> Result<CommandLink<tokio::net::UnixStream>> {
    let path = link::discover_link_path(link_path, None);
    let stream = link::connect(&path).await?;
    Ok(CommandLink::new(stream))
}
