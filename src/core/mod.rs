pub mod catalog;
pub mod engine;
pub mod inventory;
pub mod planner;
pub mod transfer;

pub use catalog::{Catalog, ListOptions, RemoteCatalog};
pub use engine::{BatchReport, SyncEngine};
pub use inventory::{LocalFile, LocalInventory};
pub use planner::{ActionSummary, SyncDecision, SyncPlanner};
pub use transfer::TransferEngine;
