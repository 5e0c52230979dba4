//! Installation orchestrator - drives the staged remote procedure.
//!
//! A run walks the stage table strictly in order: HELLO, DETECT_DISKS,
//! PARTITION, FORMAT, MOUNT, DOWNLOAD, INSTALL, CONFIGURE. A stage runs
//! only after the previous one returned SUCCESS. Any peer-reported error,
//! link failure, or policy violation halts the run with the failing stage
//! and reason; there is no retry, no rollback, and no resumption - a failed
//! run starts over from HELLO on a fresh connection, and partially applied
//! changes on the target (e.g. a written partition table) are not undone.

pub mod journal;
mod stages;
pub mod types;

use std::path::PathBuf;

use courier_common::plan::InstallPlan;
use courier_common::wire::{Command, Status};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};
use uuid::Uuid;

use crate::link::CommandLink;
use self::journal::RunLogEntry;
use self::stages::{StageSpec, STAGES};

pub use self::types::{
    EventSink, FailureReason, InstallEvent, RunOutcome, RunReport, Stage, StageReport,
};
use self::types::RunContext;

/// Drives one installation run over an exclusively owned link.
pub struct Installer<S> {
    link: CommandLink<S>,
    plan: InstallPlan,
    journal_dir: Option<PathBuf>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Installer<S> {
    pub fn new(link: CommandLink<S>, plan: InstallPlan) -> Self {
        Self {
            link,
            plan,
            journal_dir: None,
        }
    }

    /// Journal each stage outcome under `dir` as JSONL.
    pub fn with_journal_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.journal_dir = Some(dir.into());
        self
    }

    /// Execute the full stage sequence and return the run's record.
    ///
    /// Never returns an `Err`: every failure mode ends up in the report's
    /// outcome so the caller always learns which stage halted the run.
    pub async fn run(&mut self, sink: &mut dyn EventSink) -> RunReport {
        let run_id = Uuid::new_v4();
        let mut ctx = RunContext::default();
        let mut reports = Vec::with_capacity(STAGES.len());

        sink.emit(InstallEvent::RunStarted { run_id });
        info!(%run_id, "installation run started");

        for spec in STAGES {
            sink.emit(InstallEvent::StageStarted { stage: spec.stage });

            match self.run_stage(spec, &mut ctx, sink).await {
                Ok(detail) => {
                    info!(stage = spec.stage.as_str(), "stage completed");
                    reports.push(StageReport {
                        stage: spec.stage,
                        success: true,
                        detail: detail.clone(),
                    });
                    self.journal(run_id, spec.stage, true, &detail).await;
                    sink.emit(InstallEvent::StageCompleted {
                        stage: spec.stage,
                        detail,
                    });
                }
                Err(reason) => {
                    warn!(stage = spec.stage.as_str(), %reason, "stage failed, aborting run");
                    let detail = reason.to_string();
                    reports.push(StageReport {
                        stage: spec.stage,
                        success: false,
                        detail: detail.clone(),
                    });
                    self.journal(run_id, spec.stage, false, &detail).await;
                    sink.emit(InstallEvent::RunFailed {
                        stage: spec.stage,
                        reason: reason.clone(),
                    });
                    return RunReport {
                        run_id,
                        outcome: RunOutcome::Failed {
                            stage: spec.stage,
                            reason,
                        },
                        stages: reports,
                    };
                }
            }
        }

        info!(%run_id, "installation run completed");
        sink.emit(InstallEvent::RunCompleted);
        RunReport {
            run_id,
            outcome: RunOutcome::Completed,
            stages: reports,
        }
    }

    async fn run_stage(
        &mut self,
        spec: &StageSpec,
        ctx: &mut RunContext,
        sink: &mut dyn EventSink,
    ) -> Result<String, FailureReason> {
        let payload = (spec.build)(&self.plan, ctx)?;
        let command = Command::new(spec.opcode, payload);

        let response = self
            .link
            .execute(&command, spec.poll, |progress| {
                sink.emit(InstallEvent::StageProgress {
                    stage: spec.stage,
                    percent: progress.progress,
                    detail: progress.detail.clone(),
                });
            })
            .await
            .map_err(|err| FailureReason::Link {
                message: err.to_string(),
            })?;

        match response.status {
            Status::Success => {
                if let Some(absorb) = spec.absorb {
                    absorb(ctx, &response)?;
                }
                Ok(response.detail)
            }
            Status::Error(_) => Err(FailureReason::Peer {
                detail: response.detail,
            }),
            Status::Progress => Err(FailureReason::Link {
                message: "link returned a non-terminal response".to_string(),
            }),
        }
    }

    async fn journal(&self, run_id: Uuid, stage: Stage, success: bool, detail: &str) {
        let Some(dir) = &self.journal_dir else {
            return;
        };
        let entry = RunLogEntry::new(run_id, stage, success, detail.to_string());
        if let Err(err) = entry.append(dir).await {
            warn!("failed to write run journal: {err:#}");
        }
    }
}
