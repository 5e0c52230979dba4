//! End-to-end installation runs over an in-memory byte stream.
//!
//! A spawned task plays the peer on the far side of a duplex pipe, pacing
//! multi-frame replies further apart than the driver's progress polls so
//! each frame lands in its own read, like the real link.

use std::time::Duration;

use courier_common::plan::InstallPlan;
use courier_common::wire::{Command, Opcode, Response, Status, MAX_FRAME_LEN};
use courierctl::install::{
    EventSink, FailureReason, InstallEvent, Installer, RunOutcome, Stage,
};
use courierctl::link::CommandLink;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::sleep;

const FRAME_PACE: Duration = Duration::from_millis(1500);

struct VecSink(Vec<InstallEvent>);

impl EventSink for VecSink {
    fn emit(&mut self, event: InstallEvent) {
        self.0.push(event);
    }
}

fn frame(opcode: Opcode, status: Status, progress: u32, detail: &str) -> Vec<u8> {
    Response {
        opcode: opcode.as_u8(),
        status,
        progress,
        detail: detail.to_string(),
    }
    .encode()
}

fn success(opcode: Opcode, detail: &str) -> Vec<u8> {
    frame(opcode, Status::Success, 0, detail)
}

fn progress(opcode: Opcode, percent: u32, detail: &str) -> Vec<u8> {
    frame(opcode, Status::Progress, percent, detail)
}

async fn serve_peer(mut stream: DuplexStream, disk_busy: bool) {
    let mut buf = vec![0u8; MAX_FRAME_LEN];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let command = match Command::decode(&buf[..n]) {
            Ok(command) => command,
            Err(_) => return,
        };

        let frames: Vec<Vec<u8>> = match command.opcode {
            Opcode::Hello => vec![success(Opcode::Hello, "")],
            Opcode::DetectDisks => vec![success(Opcode::DetectDisks, "/dev/sda;/dev/sdb")],
            Opcode::Partition => vec![
                progress(Opcode::Partition, 40, "writing table"),
                success(Opcode::Partition, ""),
            ],
            Opcode::Format if disk_busy => {
                vec![frame(Opcode::Format, Status::Error(2), 0, "disk busy")]
            }
            Opcode::Format => vec![success(Opcode::Format, "")],
            Opcode::Mount => vec![success(Opcode::Mount, "")],
            Opcode::Download => vec![
                progress(Opcode::Download, 25, ""),
                progress(Opcode::Download, 85, ""),
                success(Opcode::Download, ""),
            ],
            Opcode::Install => vec![success(Opcode::Install, "")],
            Opcode::Configure => vec![success(Opcode::Configure, "")],
            _ => return,
        };

        for (index, reply) in frames.iter().enumerate() {
            if index > 0 {
                sleep(FRAME_PACE).await;
            }
            if stream.write_all(reply).await.is_err() {
                return;
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn full_procedure_succeeds_over_a_byte_stream() {
    let (driver_side, peer_side) = tokio::io::duplex(MAX_FRAME_LEN);
    let peer = tokio::spawn(serve_peer(peer_side, false));

    let mut installer = Installer::new(CommandLink::new(driver_side), InstallPlan::default());
    let mut sink = VecSink(Vec::new());
    let report = installer.run(&mut sink).await;

    assert!(report.outcome.is_success());
    assert_eq!(report.stages.len(), 8);
    assert!(report.stages.iter().all(|stage| stage.success));
    assert_eq!(sink.0.last(), Some(&InstallEvent::RunCompleted));

    let seen: Vec<(Stage, u32)> = sink
        .0
        .iter()
        .filter_map(|event| match event {
            InstallEvent::StageProgress { stage, percent, .. } => Some((*stage, *percent)),
            _ => None,
        })
        .collect();
    assert!(seen.contains(&(Stage::Partition, 40)));
    assert!(seen.contains(&(Stage::Download, 25)));
    assert!(seen.contains(&(Stage::Download, 85)));

    drop(installer);
    let _ = peer.await;
}

#[tokio::test(start_paused = true)]
async fn format_error_aborts_the_remaining_stages() {
    let (driver_side, peer_side) = tokio::io::duplex(MAX_FRAME_LEN);
    let peer = tokio::spawn(serve_peer(peer_side, true));

    let mut installer = Installer::new(CommandLink::new(driver_side), InstallPlan::default());
    let mut sink = VecSink(Vec::new());
    let report = installer.run(&mut sink).await;

    match &report.outcome {
        RunOutcome::Failed { stage, reason } => {
            assert_eq!(*stage, Stage::Format);
            assert_eq!(
                reason,
                &FailureReason::Peer {
                    detail: "disk busy".to_string()
                }
            );
        }
        other => panic!("expected failure, got {other:?}"),
    }

    // HELLO, DETECT_DISKS, PARTITION, FORMAT reported; MOUNT never started.
    assert_eq!(report.stages.len(), 4);
    assert!(!sink
        .0
        .iter()
        .any(|event| matches!(event, InstallEvent::StageStarted { stage: Stage::Mount })));
    assert!(matches!(
        sink.0.last(),
        Some(InstallEvent::RunFailed { .. })
    ));

    drop(installer);
    let _ = peer.await;
}
