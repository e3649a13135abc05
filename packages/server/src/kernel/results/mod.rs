//! Streaming per-job result files: header line, one JSON record per line,
//! footer line with the incremental summary.

mod reader;
mod writer;

pub use reader::{classify, FileReport, ReadError};
pub use writer::{RecordCounters, RecordStatus, ResultWriter};
