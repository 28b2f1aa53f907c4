//! # sshfetch
//!
//! Background search-and-fetch engine for text files on a remote host:
//!   • Key-only authenticated SSH sessions with a bounded connect timeout
//!   • Recursive, case-insensitive remote filename search over an exec channel
//!   • Sequential SFTP downloads with per-file failure isolation
//!   • Collision-safe local naming (`{base}_{parentDir}{ext}`)
//!   • At most one search and one transfer in flight, reported through an
//!     ordered event stream the caller drains on its own schedule

pub mod fetch;

pub use fetch::config::FetchConfig;
pub use fetch::coordinator::TaskCoordinator;
pub use fetch::search::SearchOperation;
pub use fetch::session::{RemoteSession, SessionFactory};
pub use fetch::transfer::TransferOperation;
pub use fetch::types::{
    CopyOutcome, FetchError, FetchEvent, FileOutcome, LogLevel, OperationKind, RemoteFileRef,
    SearchResult, TransferJob,
};
