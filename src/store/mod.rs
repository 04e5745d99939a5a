//! Persistence collaborators. The core never performs I/O itself; a
//! [`Session`](crate::session::Session) drives one of these.

use serde_json::Value;
use thiserror::Error;

use crate::{
    group::{GroupState, GroupSummary},
    mutation::Change,
};

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceMode {
    /// Whole-document storage; entries may be deleted outright.
    Local,
    /// Entity-addressed storage; history is kept and entries are only marked paid.
    Durable,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("group `{0}` not found")]
    NotFound(String),

    #[error("group `{0}` already exists")]
    AlreadyExists(String),

    #[error("`{0}` is not a valid group id")]
    InvalidGroupId(String),

    #[error("group `{0}` no longer holds what the change addresses")]
    Conflict(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("stored group is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait Store {
    fn mode(&self) -> PersistenceMode;

    /// Raw stored payload, in whatever shape it was written.
    fn fetch(&self, group: &str) -> Result<Value, StoreError>;

    /// Every stored group, newest first. Groups without a creation time come last.
    fn list(&self) -> Result<Vec<GroupSummary>, StoreError>;

    fn create(&mut self, group: &str, state: &GroupState) -> Result<(), StoreError>;

    /// Writes one mutation. `state` is the state after the change, for
    /// stores that write whole documents.
    fn persist(&mut self, group: &str, change: &Change, state: &GroupState) -> Result<(), StoreError>;
}

fn newest_first(mut groups: Vec<GroupSummary>) -> Vec<GroupSummary> {
    groups.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    groups
}
