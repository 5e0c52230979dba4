//! Declarative stage table for the installation sequence.
//!
//! Each stage carries its opcode, progress-poll interval, payload builder,
//! and an optional rule that absorbs the peer's answer into the run
//! context. The orchestrator iterates this table in order; nothing else
//! decides what runs when.

use std::time::Duration;

use courier_common::plan::InstallPlan;
use courier_common::wire::{self, Opcode, Response, HELLO_TOKEN};

use super::types::{FailureReason, RunContext, Stage};

/// Poll interval for stages whose work is quick disk bookkeeping.
const SHORT_POLL: Duration = Duration::from_millis(500);

/// Poll interval for stages that move real data (download, install).
const LONG_POLL: Duration = Duration::from_secs(1);

pub(crate) struct StageSpec {
    pub stage: Stage,
    pub opcode: Opcode,
    /// Pause between progress reads; stage policy, not a wire requirement.
    pub poll: Duration,
    pub build: fn(&InstallPlan, &RunContext) -> Result<String, FailureReason>,
    /// Runs after a SUCCESS response; may harvest context or reject the run.
    pub absorb: Option<fn(&mut RunContext, &Response) -> Result<(), FailureReason>>,
}

pub(crate) const STAGES: &[StageSpec] = &[
    StageSpec {
        stage: Stage::Hello,
        opcode: Opcode::Hello,
        poll: SHORT_POLL,
        build: hello_payload,
        absorb: None,
    },
    StageSpec {
        stage: Stage::DetectDisks,
        opcode: Opcode::DetectDisks,
        poll: SHORT_POLL,
        build: empty_payload,
        absorb: Some(absorb_disks),
    },
    StageSpec {
        stage: Stage::Partition,
        opcode: Opcode::Partition,
        poll: SHORT_POLL,
        build: partition_payload,
        absorb: None,
    },
    StageSpec {
        stage: Stage::Format,
        opcode: Opcode::Format,
        poll: SHORT_POLL,
        build: format_payload,
        absorb: None,
    },
    StageSpec {
        stage: Stage::Mount,
        opcode: Opcode::Mount,
        poll: SHORT_POLL,
        build: mount_payload,
        absorb: None,
    },
    StageSpec {
        stage: Stage::Download,
        opcode: Opcode::Download,
        poll: LONG_POLL,
        build: download_payload,
        absorb: None,
    },
    StageSpec {
        stage: Stage::Install,
        opcode: Opcode::Install,
        poll: LONG_POLL,
        build: install_payload,
        absorb: None,
    },
    StageSpec {
        stage: Stage::Configure,
        opcode: Opcode::Configure,
        poll: SHORT_POLL,
        build: configure_payload,
        absorb: None,
    },
];

fn hello_payload(_plan: &InstallPlan, _ctx: &RunContext) -> Result<String, FailureReason> {
    Ok(HELLO_TOKEN.to_string())
}

fn empty_payload(_plan: &InstallPlan, _ctx: &RunContext) -> Result<String, FailureReason> {
    Ok(String::new())
}

fn partition_payload(plan: &InstallPlan, ctx: &RunContext) -> Result<String, FailureReason> {
    let disk = ctx.disks.first().ok_or_else(|| FailureReason::Policy {
        message: "no target disk selected for partitioning".to_string(),
    })?;
    Ok(plan.partition_payload(disk))
}

fn format_payload(plan: &InstallPlan, _ctx: &RunContext) -> Result<String, FailureReason> {
    Ok(plan.format_payload())
}

fn mount_payload(plan: &InstallPlan, _ctx: &RunContext) -> Result<String, FailureReason> {
    Ok(plan.mount_payload())
}

fn download_payload(plan: &InstallPlan, _ctx: &RunContext) -> Result<String, FailureReason> {
    Ok(plan.system.mirror.clone())
}

fn install_payload(plan: &InstallPlan, _ctx: &RunContext) -> Result<String, FailureReason> {
    Ok(plan.install_payload())
}

fn configure_payload(plan: &InstallPlan, _ctx: &RunContext) -> Result<String, FailureReason> {
    Ok(plan.configure_payload())
}

/// Harvest the disk list from DETECT_DISKS; an empty list halts the run
/// before PARTITION is ever issued.
fn absorb_disks(ctx: &mut RunContext, response: &Response) -> Result<(), FailureReason> {
    let disks = wire::parse_disk_list(&response.detail);
    if disks.is_empty() {
        return Err(FailureReason::Policy {
            message: "peer reported no installable disks".to_string(),
        });
    }
    ctx.disks = disks;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_common::wire::Status;

    fn success_response(detail: &str) -> Response {
        Response {
            opcode: Opcode::DetectDisks.as_u8(),
            status: Status::Success,
            progress: 0,
            detail: detail.to_string(),
        }
    }

    #[test]
    fn table_covers_the_linear_sequence_in_order() {
        let order: Vec<Stage> = STAGES.iter().map(|spec| spec.stage).collect();
        assert_eq!(
            order,
            vec![
                Stage::Hello,
                Stage::DetectDisks,
                Stage::Partition,
                Stage::Format,
                Stage::Mount,
                Stage::Download,
                Stage::Install,
                Stage::Configure,
            ]
        );
    }

    #[test]
    fn data_moving_stages_poll_slower() {
        for spec in STAGES {
            let expected = match spec.stage {
                Stage::Download | Stage::Install => LONG_POLL,
                _ => SHORT_POLL,
            };
            assert_eq!(spec.poll, expected, "poll interval for {}", spec.stage);
        }
    }

    #[test]
    fn partition_targets_the_first_discovered_disk() {
        let plan = InstallPlan::default();
        let mut ctx = RunContext::default();
        absorb_disks(&mut ctx, &success_response("/dev/sda;/dev/sdb")).unwrap();

        let payload = partition_payload(&plan, &ctx).unwrap();
        assert_eq!(payload, "/dev/sda:512M:2G:4G:remain");
    }

    #[test]
    fn partition_without_discovery_is_a_policy_failure() {
        let plan = InstallPlan::default();
        let ctx = RunContext::default();
        assert!(matches!(
            partition_payload(&plan, &ctx),
            Err(FailureReason::Policy { .. })
        ));
    }

    #[test]
    fn empty_disk_list_is_a_policy_failure() {
        let mut ctx = RunContext::default();
        let err = absorb_disks(&mut ctx, &success_response("")).unwrap_err();
        assert!(matches!(err, FailureReason::Policy { .. }));
        assert!(ctx.disks.is_empty());

        let err = absorb_disks(&mut ctx, &success_response(" ; ")).unwrap_err();
        assert!(matches!(err, FailureReason::Policy { .. }));
    }

    #[test]
    fn stage_payloads_follow_the_grammars() {
        let plan = InstallPlan::default();
        let ctx = RunContext {
            disks: vec!["/dev/sda".to_string()],
        };

        assert_eq!(hello_payload(&plan, &ctx).unwrap(), "PC_READY");
        assert_eq!(empty_payload(&plan, &ctx).unwrap(), "");
        assert_eq!(
            format_payload(&plan, &ctx).unwrap(),
            "ext4:/dev/sda1;btrfs:/dev/sda2"
        );
        assert_eq!(
            mount_payload(&plan, &ctx).unwrap(),
            "/dev/sda1:/mnt;/dev/sda2:/mnt/home"
        );
        assert_eq!(
            download_payload(&plan, &ctx).unwrap(),
            "https://mirror.rackspace.com/archlinux"
        );
        assert_eq!(
            install_payload(&plan, &ctx).unwrap(),
            "base,base-devel,linux,networkmanager"
        );
        assert_eq!(
            configure_payload(&plan, &ctx).unwrap(),
            "archlinux,UTC,en_US.UTF-8"
        );
    }
}
