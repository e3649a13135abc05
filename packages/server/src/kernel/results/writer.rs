//! Append-only, line-delimited result writer.
//!
//! Layout: `<root>/<YYYY-MM-DD>/job_<platform>_<jobId>.jsonl`. The first
//! line is a header meta-record; each subsequent line is one result record;
//! a footer meta-record with the summary closes the file. Every line is
//! flushed as written so a crash leaves a parseable header-plus-records
//! prefix that readers classify as incomplete.

use std::path::{Path, PathBuf};

use chrono::Utc;
use scanner::Platform;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::kernel::jobs::JobStatus;

/// Classification of one record line, mirrored into the summary counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Success,
    Failed,
    NotFound,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Success => "success",
            RecordStatus::Failed => "failed",
            RecordStatus::NotFound => "not_found",
        }
    }
}

/// Incremental counters; `total == success + failed + not_found`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounters {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub not_found: u64,
}

impl RecordCounters {
    fn bump(&mut self, status: RecordStatus) {
        self.total += 1;
        match status {
            RecordStatus::Success => self.success += 1,
            RecordStatus::Failed => self.failed += 1,
            RecordStatus::NotFound => self.not_found += 1,
        }
    }

    /// Share of successful records, derived at finalize time.
    pub fn match_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64
        }
    }
}

pub struct ResultWriter {
    file: fs::File,
    path: PathBuf,
    counters: RecordCounters,
    finalized: bool,
}

impl ResultWriter {
    /// Create the date-bucketed file and write the header line.
    pub async fn open(
        root: impl AsRef<Path>,
        platform: Platform,
        job_id: Uuid,
        workflow_id: &str,
    ) -> std::io::Result<Self> {
        let started_at = Utc::now();
        let dir = root.as_ref().join(started_at.format("%Y-%m-%d").to_string());
        fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("job_{platform}_{job_id}.jsonl"));
        let mut file = fs::File::create(&path).await?;

        let header = json!({
            "_meta": true,
            "type": "header",
            "job_id": job_id,
            "platform": platform,
            "workflow_id": workflow_id,
            "started_at": started_at,
        });
        write_line(&mut file, &header).await?;

        tracing::debug!(path = %path.display(), "result file opened");
        Ok(Self {
            file,
            path,
            counters: RecordCounters::default(),
            finalized: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn counters(&self) -> RecordCounters {
        self.counters
    }

    /// Append one record line. The record's `status` field is forced to the
    /// given status so file contents and counters cannot disagree.
    pub async fn append(
        &mut self,
        status: RecordStatus,
        record: Value,
    ) -> std::io::Result<()> {
        let mut record = match record {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        record.insert(
            "status".to_string(),
            Value::String(status.as_str().to_string()),
        );

        write_line(&mut self.file, &Value::Object(record)).await?;
        self.counters.bump(status);
        Ok(())
    }

    /// Write the footer with the terminal status and summary. Idempotent.
    pub async fn finalize(&mut self, job_status: JobStatus) -> std::io::Result<()> {
        if self.finalized {
            return Ok(());
        }
        let footer = json!({
            "_meta": true,
            "type": "footer",
            "completed_at": Utc::now(),
            "status": job_status.to_string(),
            "summary": {
                "total": self.counters.total,
                "success": self.counters.success,
                "failed": self.counters.failed,
                "not_found": self.counters.not_found,
                "match_rate": self.counters.match_rate(),
            },
        });
        write_line(&mut self.file, &footer).await?;
        self.file.sync_all().await?;
        self.finalized = true;
        tracing::debug!(path = %self.path.display(), total = self.counters.total, "result file finalized");
        Ok(())
    }
}

async fn write_line(file: &mut fs::File, value: &Value) -> std::io::Result<()> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    file.write_all(&line).await?;
    file.flush().await
}
