// ── Batch SFTP download with per-file outcome isolation ──────────────────────

use crate::fetch::types::{CopyOutcome, FileOutcome, RemoteFileRef, TransferJob};
use chrono::Utc;
use log::{error, info};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const CHUNK_SIZE: usize = 65536;

// SSH_FX_NO_SUCH_FILE
const SFTP_NO_SUCH_FILE: i32 = 2;

/// Copies a batch of remote files into one local destination directory,
/// strictly in order, one at a time over a single SFTP channel. A failed item
/// never aborts the batch.
#[derive(Debug, Clone)]
pub struct TransferOperation {
    destination_dir: PathBuf,
}

pub(crate) enum CopyError {
    NotFound,
    Other(String),
}

impl TransferOperation {
    pub fn new(destination_dir: impl Into<PathBuf>) -> Self {
        TransferOperation {
            destination_dir: destination_dir.into(),
        }
    }

    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    /// Never fails as a whole; every input file gets exactly one outcome.
    /// The job carries the caller-assigned id. Re-running the same job
    /// overwrites prior output deterministically.
    pub fn run(
        &self,
        job_id: &str,
        files: &[RemoteFileRef],
        sftp: &ssh2::Sftp,
        on_progress: impl FnMut(usize, usize, &RemoteFileRef),
    ) -> TransferJob {
        self.execute(
            job_id,
            files,
            |file, dest| copy_remote_file(sftp, file, dest),
            on_progress,
        )
    }

    /// Core loop with the per-file copy injected, so failure isolation is
    /// testable without a live server.
    fn execute(
        &self,
        job_id: &str,
        files: &[RemoteFileRef],
        mut copy: impl FnMut(&RemoteFileRef, &Path) -> Result<u64, CopyError>,
        mut on_progress: impl FnMut(usize, usize, &RemoteFileRef),
    ) -> TransferJob {
        let started = Utc::now();
        let total = files.len();
        let mut outcomes = Vec::with_capacity(total);

        // Creating the destination (with parents) is idempotent. If even that
        // fails, the job still completes with every item recorded as failed.
        if let Err(e) = std::fs::create_dir_all(&self.destination_dir) {
            error!(
                "cannot create destination directory {}: {}",
                self.destination_dir.display(),
                e
            );
            let reason = format!("destination directory unavailable: {}", e);
            for (index, file) in files.iter().enumerate() {
                on_progress(index + 1, total, file);
                outcomes.push(FileOutcome {
                    remote_path: file.full_path().to_string(),
                    destination_name: file.destination_name(),
                    outcome: CopyOutcome::Failed {
                        reason: reason.clone(),
                    },
                });
            }
            return self.finish(job_id, outcomes, started);
        }

        for (index, file) in files.iter().enumerate() {
            // 1-based, and before the attempt, so a slow network read still
            // shows which file is in flight.
            on_progress(index + 1, total, file);

            let dest = self.destination_dir.join(file.destination_name());
            let outcome = match copy(file, &dest) {
                Ok(bytes) => {
                    info!(
                        "copied {} -> {} ({} bytes)",
                        file.full_path(),
                        dest.display(),
                        bytes
                    );
                    CopyOutcome::Copied { bytes }
                }
                Err(CopyError::NotFound) => {
                    error!("remote file not found: {}", file.full_path());
                    CopyOutcome::NotFound
                }
                Err(CopyError::Other(reason)) => {
                    error!("failed to copy {}: {}", file.full_path(), reason);
                    CopyOutcome::Failed { reason }
                }
            };
            outcomes.push(FileOutcome {
                remote_path: file.full_path().to_string(),
                destination_name: file.destination_name(),
                outcome,
            });
        }

        self.finish(job_id, outcomes, started)
    }

    fn finish(
        &self,
        job_id: &str,
        outcomes: Vec<FileOutcome>,
        started: chrono::DateTime<Utc>,
    ) -> TransferJob {
        let finished = Utc::now();
        let duration_ms = (finished - started).num_milliseconds().max(1) as u64;
        TransferJob {
            job_id: job_id.to_string(),
            destination_dir: self.destination_dir.to_string_lossy().to_string(),
            outcomes,
            started_at: started,
            finished_at: finished,
            duration_ms,
        }
    }
}

/// Byte-for-byte copy of one remote file. `File::create` truncates, so
/// retrying a batch overwrites prior output.
fn copy_remote_file(
    sftp: &ssh2::Sftp,
    file: &RemoteFileRef,
    dest: &Path,
) -> Result<u64, CopyError> {
    let mut remote = sftp
        .open(Path::new(file.full_path()))
        .map_err(classify_open_error)?;
    let mut local = File::create(dest)
        .map_err(|e| CopyError::Other(format!("cannot create '{}': {}", dest.display(), e)))?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut copied = 0u64;
    loop {
        let n = remote
            .read(&mut buf)
            .map_err(|e| CopyError::Other(format!("remote read error: {}", e)))?;
        if n == 0 {
            break;
        }
        local
            .write_all(&buf[..n])
            .map_err(|e| CopyError::Other(format!("local write error: {}", e)))?;
        copied += n as u64;
    }
    local
        .flush()
        .map_err(|e| CopyError::Other(format!("flush error: {}", e)))?;
    Ok(copied)
}

fn classify_open_error(e: ssh2::Error) -> CopyError {
    if e.code() == ssh2::ErrorCode::SFTP(SFTP_NO_SUCH_FILE) {
        CopyError::NotFound
    } else {
        CopyError::Other(e.to_string())
    }
}
