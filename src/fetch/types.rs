// ── Types ─────────────────────────────────────────────────────────────────────

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FetchError {
    /// TCP, handshake, authentication or sub-channel failure. Aborts the whole
    /// in-flight operation.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The remote search command could not be dispatched or its streams could
    /// not be read. Zero matches is NOT a search error.
    #[error("search failed: {0}")]
    Search(String),

    /// A submission was rejected because an operation of the same kind is
    /// still running. The in-flight operation is unaffected.
    #[error("a {0} operation is already running")]
    AlreadyRunning(OperationKind),

    #[error("search pattern must not be empty")]
    EmptyPattern,

    #[error("transfer requires at least one file")]
    EmptyTransfer,

    #[error("invalid remote path '{0}'")]
    InvalidPath(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    Search,
    Transfer,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Search => write!(f, "search"),
            OperationKind::Transfer => write!(f, "transfer"),
        }
    }
}

// ── Remote file reference ────────────────────────────────────────────────────

/// One discovered remote file. The absolute path is the only stored field;
/// everything else is derived on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFileRef {
    full_path: String,
}

impl RemoteFileRef {
    /// The path must be absolute and have at least one parent directory
    /// segment, otherwise the derived destination name is undefined.
    pub fn new(full_path: impl Into<String>) -> Result<Self, FetchError> {
        let full_path = full_path.into();
        if !full_path.starts_with('/') {
            return Err(FetchError::InvalidPath(full_path));
        }
        let (parent, name) = match full_path.rsplit_once('/') {
            Some(split) => split,
            None => return Err(FetchError::InvalidPath(full_path)),
        };
        if name.is_empty() || parent.rsplit('/').next().unwrap_or("").is_empty() {
            return Err(FetchError::InvalidPath(full_path));
        }
        Ok(RemoteFileRef { full_path })
    }

    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    /// Final path segment.
    pub fn file_name(&self) -> &str {
        self.full_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.full_path)
    }

    /// Name of the immediate parent directory.
    pub fn directory_leaf(&self) -> &str {
        let (parent, _) = self.full_path.rsplit_once('/').unwrap_or(("", ""));
        parent.rsplit('/').next().unwrap_or("")
    }

    /// File name without its extension. A leading dot does not start an
    /// extension (`.bashrc` has no extension).
    pub fn base_name(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        }
    }

    /// Extension including the leading dot, empty if none.
    pub fn extension(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 => &name[idx..],
            _ => "",
        }
    }

    /// Local destination name: `{base}_{parentDir}{ext}`. Files sharing a
    /// basename in different remote directories never collide locally.
    pub fn destination_name(&self) -> String {
        format!(
            "{}_{}{}",
            self.base_name(),
            self.directory_leaf(),
            self.extension()
        )
    }

    /// `user@host:'<path>'` form, for diagnostics.
    pub fn scp_target(&self, username: &str, host: &str) -> String {
        format!("{}@{}:'{}'", username, host, self.full_path)
    }
}

// ── Search result ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub search_id: String,
    pub pattern: String,
    /// Matches in the order the remote listing returned them (not sorted).
    pub files: Vec<RemoteFileRef>,
    /// Benign remote noise (stderr lines, unparseable listing lines). Never
    /// turns a result into a failure.
    pub diagnostics: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

// ── Transfer job ─────────────────────────────────────────────────────────────

/// Terminal outcome of one copy attempt. A missing remote file is an expected
/// batch condition, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CopyOutcome {
    Copied { bytes: u64 },
    NotFound,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub remote_path: String,
    pub destination_name: String,
    pub outcome: CopyOutcome,
}

/// The ordered batch of copy attempts and their per-item outcomes. Outcomes
/// are append-only; no single failure aborts the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferJob {
    pub job_id: String,
    pub destination_dir: String,
    pub outcomes: Vec<FileOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl TransferJob {
    pub fn copied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, CopyOutcome::Copied { .. }))
            .count()
    }

    pub fn not_found(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == CopyOutcome::NotFound)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, CopyOutcome::Failed { .. }))
            .count()
    }

    pub fn bytes_copied(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| match o.outcome {
                CopyOutcome::Copied { bytes } => Some(bytes),
                _ => None,
            })
            .sum()
    }
}

// ── Events ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// The one ordered channel between background operations and the caller.
/// Every submitted operation emits exactly one terminal event
/// (`SearchFinished`/`SearchFailed` or `TransferFinished`/`TransferFailed`),
/// and the terminal event is the last event that operation emits.
///
/// Every operation event carries the id of the operation it belongs to (the
/// id returned by the submission call), so events from back-to-back
/// operations of the same kind are always attributable. `Log` lines are
/// free-form and carry none.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FetchEvent {
    Log {
        level: LogLevel,
        message: String,
    },
    SearchStarted {
        search_id: String,
        pattern: String,
    },
    SearchFinished {
        result: SearchResult,
    },
    SearchFailed {
        search_id: String,
        error: String,
    },
    TransferStarted {
        job_id: String,
        total: usize,
    },
    /// Emitted with a 1-based index BEFORE each copy attempt, so a slow read
    /// still shows which file is in flight.
    TransferProgress {
        job_id: String,
        index: usize,
        total: usize,
        file: RemoteFileRef,
    },
    TransferFinished {
        job: TransferJob,
    },
    TransferFailed {
        job_id: String,
        error: String,
    },
}
