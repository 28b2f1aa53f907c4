// ── sshfetch / fetch module ───────────────────────────────────────────────────
//
// Remote file search-and-fetch engine:
//   • Value types, events and error taxonomy
//   • Session factory (key-only auth, one session per operation)
//   • Remote filename search over an SSH exec channel
//   • Batch SFTP download with per-file outcome isolation
//   • Task coordinator serialising background operations onto an event channel

pub mod config;
pub mod coordinator;
pub mod search;
pub mod session;
pub mod transfer;
pub mod types;

pub use config::FetchConfig;
pub use coordinator::TaskCoordinator;
pub use search::SearchOperation;
pub use session::{RemoteSession, SessionFactory};
pub use transfer::TransferOperation;
pub use types::*;
