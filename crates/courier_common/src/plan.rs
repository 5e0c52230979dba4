//! Installation plan configuration.
//!
//! The plan is host-side policy, not wire-protocol content: partition
//! layout, filesystem assignments, mirror, package set, and the
//! configuration tokens handed to the peer. It lives in a TOML file and
//! every field has a default mirroring the stock procedure, so a missing or
//! partial file still yields a runnable plan.
//!
//! Configuration lives in /etc/courier/plan.toml by default.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// System configuration directory
pub const SYSTEM_CONFIG_DIR: &str = "/etc/courier";

/// Default plan file inside [`SYSTEM_CONFIG_DIR`]
pub const PLAN_FILE: &str = "plan.toml";

/// Full installation plan for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallPlan {
    #[serde(default)]
    pub link: LinkSettings,

    #[serde(default)]
    pub disk: DiskPlan,

    #[serde(default)]
    pub system: SystemPlan,
}

/// Link settings: where the peer channel lives and how patient reads are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSettings {
    /// Socket path of the opened peer channel; `None` falls back to the
    /// COURIER_LINK environment variable, then the built-in default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,

    /// Seconds to wait for each response frame before the exchange is
    /// abandoned. Not part of the wire contract; bounds a silent peer.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            socket: None,
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl LinkSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

fn default_read_timeout_secs() -> u64 {
    30
}

/// Disk preparation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskPlan {
    /// Partition size tokens appended to the target disk path. The trailing
    /// `remain` token hands the rest of the disk to the last partition.
    #[serde(default = "default_layout")]
    pub layout: Vec<String>,

    /// Filesystem assignments, formatted as `fstype:device` pairs.
    #[serde(default = "default_formats")]
    pub formats: Vec<FormatSpec>,

    /// Mount assignments, formatted as `device:mountpoint` pairs.
    #[serde(default = "default_mounts")]
    pub mounts: Vec<MountSpec>,
}

impl Default for DiskPlan {
    fn default() -> Self {
        Self {
            layout: default_layout(),
            formats: default_formats(),
            mounts: default_mounts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSpec {
    pub fstype: String,
    pub device: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    pub device: String,
    pub mount_point: String,
}

fn default_layout() -> Vec<String> {
    vec![
        "512M".to_string(),
        "2G".to_string(),
        "4G".to_string(),
        "remain".to_string(),
    ]
}

fn default_formats() -> Vec<FormatSpec> {
    vec![
        FormatSpec {
            fstype: "ext4".to_string(),
            device: "/dev/sda1".to_string(),
        },
        FormatSpec {
            fstype: "btrfs".to_string(),
            device: "/dev/sda2".to_string(),
        },
    ]
}

fn default_mounts() -> Vec<MountSpec> {
    vec![
        MountSpec {
            device: "/dev/sda1".to_string(),
            mount_point: "/mnt".to_string(),
        },
        MountSpec {
            device: "/dev/sda2".to_string(),
            mount_point: "/mnt/home".to_string(),
        },
    ]
}

/// Base system policy: what gets downloaded, installed, and configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPlan {
    #[serde(default = "default_mirror")]
    pub mirror: String,

    #[serde(default = "default_packages")]
    pub packages: Vec<String>,

    #[serde(default = "default_hostname")]
    pub hostname: String,

    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_locale")]
    pub locale: String,
}

impl Default for SystemPlan {
    fn default() -> Self {
        Self {
            mirror: default_mirror(),
            packages: default_packages(),
            hostname: default_hostname(),
            timezone: default_timezone(),
            locale: default_locale(),
        }
    }
}

fn default_mirror() -> String {
    "https://mirror.rackspace.com/archlinux".to_string()
}

fn default_packages() -> Vec<String> {
    vec![
        "base".to_string(),
        "base-devel".to_string(),
        "linux".to_string(),
        "networkmanager".to_string(),
    ]
}

fn default_hostname() -> String {
    "archlinux".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_locale() -> String {
    "en_US.UTF-8".to_string()
}

impl InstallPlan {
    /// Load a plan from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read plan file {}", path.display()))?;
        let plan: InstallPlan = toml::from_str(&raw)
            .with_context(|| format!("failed to parse plan file {}", path.display()))?;
        Ok(plan)
    }

    /// Load the plan at `path` when given, otherwise the system plan file if
    /// present, otherwise the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let system_path = Path::new(SYSTEM_CONFIG_DIR).join(PLAN_FILE);
                if system_path.exists() {
                    Self::load(&system_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// PARTITION payload: `<disk>:<size>:...:remain`.
    pub fn partition_payload(&self, disk: &str) -> String {
        let mut parts = Vec::with_capacity(1 + self.disk.layout.len());
        parts.push(disk.to_string());
        parts.extend(self.disk.layout.iter().cloned());
        parts.join(":")
    }

    /// FORMAT payload: `<fstype>:<device>;...`.
    pub fn format_payload(&self) -> String {
        self.disk
            .formats
            .iter()
            .map(|spec| format!("{}:{}", spec.fstype, spec.device))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// MOUNT payload: `<device>:<mountpoint>;...`.
    pub fn mount_payload(&self) -> String {
        self.disk
            .mounts
            .iter()
            .map(|spec| format!("{}:{}", spec.device, spec.mount_point))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// INSTALL payload: comma-joined package list.
    pub fn install_payload(&self) -> String {
        self.system.packages.join(",")
    }

    /// CONFIGURE payload: comma-joined tokens the peer interprets.
    pub fn configure_payload(&self) -> String {
        [
            self.system.hostname.as_str(),
            self.system.timezone.as_str(),
            self.system.locale.as_str(),
        ]
        .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_procedure() {
        let plan = InstallPlan::default();
        assert_eq!(
            plan.partition_payload("/dev/sda"),
            "/dev/sda:512M:2G:4G:remain"
        );
        assert_eq!(plan.format_payload(), "ext4:/dev/sda1;btrfs:/dev/sda2");
        assert_eq!(plan.mount_payload(), "/dev/sda1:/mnt;/dev/sda2:/mnt/home");
        assert_eq!(
            plan.system.mirror,
            "https://mirror.rackspace.com/archlinux"
        );
        assert_eq!(
            plan.install_payload(),
            "base,base-devel,linux,networkmanager"
        );
        assert_eq!(plan.configure_payload(), "archlinux,UTC,en_US.UTF-8");
        assert_eq!(plan.link.read_timeout_secs, 30);
        assert!(plan.link.socket.is_none());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let plan: InstallPlan = toml::from_str(
            r#"
            [system]
            hostname = "workbench"
            packages = ["base", "linux-lts"]

            [link]
            read_timeout_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(plan.system.hostname, "workbench");
        assert_eq!(plan.install_payload(), "base,linux-lts");
        assert_eq!(plan.configure_payload(), "workbench,UTC,en_US.UTF-8");
        assert_eq!(plan.link.read_timeout(), Duration::from_secs(5));
        // Untouched sections keep the stock layout.
        assert_eq!(
            plan.partition_payload("/dev/nvme0n1"),
            "/dev/nvme0n1:512M:2G:4G:remain"
        );
    }

    #[test]
    fn empty_toml_is_the_default_plan() {
        let plan: InstallPlan = toml::from_str("").unwrap();
        assert_eq!(plan.format_payload(), InstallPlan::default().format_payload());
    }

    #[test]
    fn plan_serializes_back_to_toml() {
        let plan = InstallPlan::default();
        let raw = toml::to_string_pretty(&plan).unwrap();
        let reparsed: InstallPlan = toml::from_str(&raw).unwrap();
        assert_eq!(reparsed.install_payload(), plan.install_payload());
        assert_eq!(reparsed.mount_payload(), plan.mount_payload());
    }
}
