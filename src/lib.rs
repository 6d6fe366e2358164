pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod storage;

pub use config::Settings;
pub use core::{BatchReport, Catalog, SyncDecision, SyncEngine, SyncPlanner};
pub use error::{Result, SyncError};
pub use storage::{BlobBackend, RemoteObject};
