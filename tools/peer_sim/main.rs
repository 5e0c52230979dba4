//! Peer Simulator - deterministic stand-in for the installation peer.
//!
//! Usage:
//!   peer_sim /tmp/peer.sock
//!   peer_sim /tmp/peer.sock --scenario disk-busy
//!   peer_sim /tmp/peer.sock --scenario no-disks
//!   peer_sim /tmp/peer.sock --scenario mute
//!
//! Binds a Unix socket in place of the real link bridge and answers each
//! command with a scripted frame sequence, so the driver can be exercised
//! end to end without a device. Frames of a multi-frame reply are paced
//! apart so each lands in its own read on the driver side.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use courier_common::wire::{Command, Opcode, Response, Status, MAX_FRAME_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::sleep;
use tracing::{info, warn};

/// Gap between consecutive frames of one reply. Longer than the driver's
/// slowest progress poll, so frames never coalesce in the socket buffer.
const FRAME_PACE: Duration = Duration::from_millis(1200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    /// Every stage succeeds, long stages emit progress first.
    Happy,
    /// DETECT_DISKS succeeds with an empty disk list.
    NoDisks,
    /// FORMAT fails with a busy-disk error.
    DiskBusy,
    /// Accepts commands but never answers; exercises read timeouts.
    Mute,
}

impl Scenario {
    fn parse(value: &str) -> Result<Scenario> {
        match value {
            "happy" => Ok(Scenario::Happy),
            "no-disks" => Ok(Scenario::NoDisks),
            "disk-busy" => Ok(Scenario::DiskBusy),
            "mute" => Ok(Scenario::Mute),
            other => bail!("unknown scenario {other:?} (happy, no-disks, disk-busy, mute)"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let (socket, scenario) = parse_args()?;

    let _ = std::fs::remove_file(&socket);
    let listener = UnixListener::bind(&socket)
        .with_context(|| format!("failed to bind simulator socket {socket}"))?;
    info!(socket = %socket, scenario = ?scenario, "peer simulator listening");

    loop {
        let (stream, _addr) = listener.accept().await?;
        info!("driver connected");
        if let Err(err) = handle_driver(stream, scenario).await {
            warn!("driver session ended with error: {err:#}");
        } else {
            info!("driver disconnected");
        }
    }
}

fn parse_args() -> Result<(String, Scenario)> {
    let mut socket = None;
    let mut scenario = Scenario::Happy;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--scenario" => {
                let value = args.next().context("--scenario needs a value")?;
                scenario = Scenario::parse(&value)?;
            }
            "--help" | "-h" => {
                println!("usage: peer_sim <socket-path> [--scenario happy|no-disks|disk-busy|mute]");
                std::process::exit(0);
            }
            other if socket.is_none() => socket = Some(other.to_string()),
            other => bail!("unexpected argument: {other}"),
        }
    }

    let socket = socket.context("usage: peer_sim <socket-path> [--scenario ...]")?;
    Ok((socket, scenario))
}

async fn handle_driver(mut stream: UnixStream, scenario: Scenario) -> Result<()> {
    let mut buf = vec![0u8; MAX_FRAME_LEN];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        let command = match Command::decode(&buf[..n]) {
            Ok(command) => command,
            Err(err) => {
                warn!("undecodable command frame: {err}");
                let reply = error_frame(Opcode::Error.as_u8(), &err.to_string());
                stream.write_all(&reply).await?;
                continue;
            }
        };
        info!(opcode = command.opcode.as_str(), payload = %command.payload, "command received");

        if scenario == Scenario::Mute {
            continue;
        }

        let frames = respond(scenario, &command);
        for (index, frame) in frames.iter().enumerate() {
            if index > 0 {
                sleep(FRAME_PACE).await;
            }
            stream.write_all(frame).await?;
        }
    }
}

fn respond(scenario: Scenario, command: &Command) -> Vec<Vec<u8>> {
    let echo = command.opcode.as_u8();
    match command.opcode {
        Opcode::Hello => vec![success_frame(echo, "")],
        Opcode::DetectDisks => match scenario {
            Scenario::NoDisks => vec![success_frame(echo, "")],
            _ => vec![success_frame(echo, "/dev/sda;/dev/sdb")],
        },
        Opcode::Partition => vec![
            progress_frame(echo, 20, "writing partition table"),
            progress_frame(echo, 70, ""),
            success_frame(echo, ""),
        ],
        Opcode::Format => match scenario {
            Scenario::DiskBusy => vec![error_frame(echo, "disk busy")],
            _ => vec![progress_frame(echo, 50, ""), success_frame(echo, "")],
        },
        Opcode::Mount => vec![success_frame(echo, "")],
        Opcode::Download => vec![
            progress_frame(echo, 10, ""),
            progress_frame(echo, 45, ""),
            progress_frame(echo, 90, ""),
            success_frame(echo, ""),
        ],
        Opcode::Install => vec![
            progress_frame(echo, 30, ""),
            progress_frame(echo, 75, ""),
            success_frame(echo, ""),
        ],
        Opcode::Configure => vec![progress_frame(echo, 50, ""), success_frame(echo, "")],
        Opcode::Status => vec![success_frame(echo, "idle")],
        Opcode::Finish => vec![success_frame(echo, "")],
        Opcode::Error => vec![error_frame(echo, "unexpected ERROR command")],
    }
}

fn success_frame(opcode: u8, detail: &str) -> Vec<u8> {
    Response {
        opcode,
        status: Status::Success,
        progress: 0,
        detail: detail.to_string(),
    }
    .encode()
}

fn progress_frame(opcode: u8, percent: u32, detail: &str) -> Vec<u8> {
    Response {
        opcode,
        status: Status::Progress,
        progress: percent,
        detail: detail.to_string(),
    }
    .encode()
}

fn error_frame(opcode: u8, detail: &str) -> Vec<u8> {
    Response {
        opcode,
        status: Status::Error(2),
        progress: 0,
        detail: detail.to_string(),
    }
    .encode()
}
