//! Run journal - structured stage records in JSONL.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{create_dir_all, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::types::Stage;

/// Default journal directory.
pub const DEFAULT_JOURNAL_DIR: &str = "/var/log/courier";

const JOURNAL_FILE: &str = "install.jsonl";

/// One journal line: the outcome of a single stage in a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    /// Timestamp (ISO 8601)
    pub ts: DateTime<Utc>,
    pub run_id: Uuid,
    pub stage: Stage,
    pub success: bool,
    /// Peer detail on success, failure reason otherwise.
    pub detail: String,
}

impl RunLogEntry {
    pub fn new(run_id: Uuid, stage: Stage, success: bool, detail: String) -> Self {
        Self {
            ts: Utc::now(),
            run_id,
            stage,
            success,
            detail,
        }
    }

    /// Append this entry to `<dir>/install.jsonl`, creating the directory
    /// if needed.
    pub async fn append(&self, dir: &Path) -> Result<()> {
        create_dir_all(dir)
            .await
            .context("failed to create journal directory")?;

        let path = dir.join(JOURNAL_FILE);
        let json = serde_json::to_string(self)? + "\n";

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context("failed to open run journal")?;

        file.write_all(json.as_bytes())
            .await
            .context("failed to write journal entry")?;

        file.sync_all()
            .await
            .context("failed to sync run journal")?;

        Ok(())
    }
}
