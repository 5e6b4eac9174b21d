//! # ribbon-store
//!
//! Local, append-only journal of badge set snapshots.
//!
//! Every snapshot is written once under a unique, sequence-numbered name and
//! never modified afterwards; the most recent one is the recovery point for
//! a failed merge or publish. Retention keeps a bounded number of the newest
//! snapshots.

pub mod backup;

mod error;

pub use backup::{BackupSnapshot, BackupStore, SnapshotEntry};
pub use error::{Result, StoreError};
