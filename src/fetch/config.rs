// ── Engine configuration ──────────────────────────────────────────────────────
//
// Supplied by the host application (config loading is an external collaborator);
// the engine treats these as given constants for the duration of one run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_port() -> u16 {
    22
}
fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    /// Private key presented for authentication. Key-only: no agent, no
    /// password fallback.
    pub private_key_path: PathBuf,
    /// Remote directory the search is rooted at.
    pub remote_base_dir: String,
    /// Local directory transfers are written into (created on demand).
    pub destination_dir: PathBuf,
    /// Bounds the TCP connect and every blocking call on the session.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl FetchConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
