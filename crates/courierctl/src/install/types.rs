//! Installation run types and progress events.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One step of the fixed installation sequence.
///
/// The sequence is strictly linear; a stage runs only after every earlier
/// stage returned SUCCESS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Hello,
    DetectDisks,
    Partition,
    Format,
    Mount,
    Download,
    Install,
    Configure,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Hello => "hello",
            Stage::DetectDisks => "detect_disks",
            Stage::Partition => "partition",
            Stage::Format => "format",
            Stage::Mount => "mount",
            Stage::Download => "download",
            Stage::Install => "install",
            Stage::Configure => "configure",
        }
    }

    /// Human-readable description for presentation.
    pub fn describe(&self) -> &'static str {
        match self {
            Stage::Hello => "handshake with peer",
            Stage::DetectDisks => "detecting disks",
            Stage::Partition => "partitioning target disk",
            Stage::Format => "formatting partitions",
            Stage::Mount => "mounting filesystems",
            Stage::Download => "downloading base system",
            Stage::Install => "installing packages",
            Stage::Configure => "configuring system",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resources discovered during a run and consumed by later stages.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// Disk identifiers reported by DETECT_DISKS, in peer order. The first
    /// entry is the partitioning target.
    pub disks: Vec<String>,
}

/// Why a stage halted the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FailureReason {
    /// The peer answered with an ERROR status; `detail` is its reason text.
    Peer { detail: String },
    /// The exchange itself failed: write error, read error, timeout, or an
    /// undecodable frame.
    Link { message: String },
    /// A host-side precondition failed before any further command was
    /// issued (e.g. the peer reported no disks to install onto).
    Policy { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Peer { detail } => write!(f, "peer reported: {detail}"),
            FailureReason::Link { message } => write!(f, "link failure: {message}"),
            FailureReason::Policy { message } => f.write_str(message),
        }
    }
}

/// Terminal result of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RunOutcome {
    Completed,
    Failed { stage: Stage, reason: FailureReason },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

/// Result of a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub success: bool,
    /// Peer detail on success, failure reason otherwise.
    pub detail: String,
}

/// Full record of one run, from HELLO to DONE or FAILED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub stages: Vec<StageReport>,
}

/// Structured progress events emitted during a run.
///
/// Presentation only: sinks have no effect on control flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InstallEvent {
    RunStarted {
        run_id: Uuid,
    },
    StageStarted {
        stage: Stage,
    },
    StageProgress {
        stage: Stage,
        percent: u32,
        detail: String,
    },
    StageCompleted {
        stage: Stage,
        detail: String,
    },
    RunCompleted,
    RunFailed {
        stage: Stage,
        reason: FailureReason,
    },
}

/// Receives installation events for presentation.
pub trait EventSink {
    fn emit(&mut self, event: InstallEvent);
}
