// ── Remote filename search over an exec channel ──────────────────────────────

use crate::fetch::session::RemoteSession;
use crate::fetch::types::{FetchError, RemoteFileRef, SearchResult};
use chrono::Utc;
use log::{info, warn};
use std::io::Read;

/// Recursive, case-insensitive lookup of regular `*.txt` files under one
/// fixed remote base directory.
#[derive(Debug, Clone)]
pub struct SearchOperation {
    base_dir: String,
}

impl SearchOperation {
    pub fn new(base_dir: impl Into<String>) -> Self {
        SearchOperation {
            base_dir: base_dir.into(),
        }
    }

    /// Run the lookup on an open session under the caller-assigned operation
    /// id. Zero matches is a valid empty result; only dispatch/stream
    /// failures are errors.
    pub fn run(
        &self,
        search_id: &str,
        pattern: &str,
        session: &RemoteSession,
    ) -> Result<SearchResult, FetchError> {
        let started = Utc::now();
        let command = find_command(&self.base_dir, pattern);
        info!("running remote search: {}", command);

        let mut channel = session
            .channel_session()
            .map_err(|e| FetchError::Search(format!("failed to open exec channel: {}", e)))?;
        channel
            .exec(&command)
            .map_err(|e| FetchError::Search(format!("failed to dispatch '{}': {}", command, e)))?;

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .map_err(|e| FetchError::Search(format!("failed to read search output: {}", e)))?;

        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .map_err(|e| FetchError::Search(format!("failed to read search stderr: {}", e)))?;

        // find exits non-zero when subtrees are unreadable; matches already on
        // stdout are still valid, so the exit status is deliberately ignored.
        let _ = channel.wait_close();

        let (files, mut diagnostics) = parse_listing(&stdout);
        for line in stderr.lines().map(str::trim).filter(|l| !l.is_empty()) {
            warn!("search stderr: {}", line);
            diagnostics.push(line.to_string());
        }

        info!("search for '{}' matched {} file(s)", pattern, files.len());
        Ok(SearchResult {
            search_id: search_id.to_string(),
            pattern: pattern.to_string(),
            files,
            diagnostics,
            started_at: started,
            finished_at: Utc::now(),
        })
    }
}

/// `find <base> -type f -iname '*<pattern>*.txt'`, with both arguments
/// shell-quoted.
fn find_command(base_dir: &str, pattern: &str) -> String {
    let glob = format!("*{}*.txt", pattern);
    format!(
        "find {} -type f -iname {}",
        shell_escape::escape(base_dir.into()),
        shell_escape::escape(glob.into())
    )
}

/// One RemoteFileRef per non-empty trimmed stdout line, in listing order.
/// Lines that fail path validation become diagnostics, not failures.
fn parse_listing(stdout: &str) -> (Vec<RemoteFileRef>, Vec<String>) {
    let mut files = Vec::new();
    let mut diagnostics = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match RemoteFileRef::new(line) {
            Ok(file) => files.push(file),
            Err(e) => diagnostics.push(format!("skipped listing line: {}", e)),
        }
    }
    (files, diagnostics)
}
