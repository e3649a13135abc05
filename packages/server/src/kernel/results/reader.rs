//! Result-file classifier.
//!
//! A file without a footer is incomplete but still parseable record by
//! record; this reader is what downstream review tooling and the tests use
//! to interpret partial output from crashed or killed workers.

use std::path::Path;

use serde_json::Value;

use super::writer::RecordCounters;

#[derive(Debug, Clone)]
pub struct FileReport {
    pub header: Value,
    pub records: Vec<Value>,
    /// Footer meta-record, present only on finalized files.
    pub footer: Option<Value>,
    /// Record lines that failed to parse (a crash can truncate the tail).
    pub malformed_lines: usize,
}

impl FileReport {
    pub fn is_complete(&self) -> bool {
        self.footer.is_some()
    }

    /// Counters recomputed from the record lines.
    pub fn recount(&self) -> RecordCounters {
        let mut counters = RecordCounters::default();
        for record in &self.records {
            counters.total += 1;
            match record.get("status").and_then(Value::as_str) {
                Some("success") => counters.success += 1,
                Some("not_found") => counters.not_found += 1,
                _ => counters.failed += 1,
            }
        }
        counters
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("file has no header line")]
    MissingHeader,
}

/// Parse and classify a result file.
pub async fn classify(path: impl AsRef<Path>) -> Result<FileReport, ReadError> {
    let raw = tokio::fs::read_to_string(path.as_ref()).await?;
    let mut lines = raw.lines();

    let header = lines
        .next()
        .and_then(|l| serde_json::from_str::<Value>(l).ok())
        .filter(|v| v["_meta"] == true && v["type"] == "header")
        .ok_or(ReadError::MissingHeader)?;

    let mut records = Vec::new();
    let mut footer = None;
    let mut malformed_lines = 0;

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) if value["_meta"] == true && value["type"] == "footer" => {
                footer = Some(value);
            }
            Ok(value) => records.push(value),
            Err(_) => malformed_lines += 1,
        }
    }

    Ok(FileReport {
        header,
        records,
        footer,
        malformed_lines,
    })
}
