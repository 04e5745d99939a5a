use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use super::{newest_first, PersistenceMode, Store, StoreError};
use crate::{
    group::{GroupState, GroupSummary},
    mutation::Change,
};

/// In-process stand-in for a row-based backend: every change is applied by
/// entity id, and every accepted write is logged.
#[derive(Default)]
pub struct MemoryStore {
    groups: HashMap<String, GroupState>,
    writes: Vec<(String, Change)>,
    failure: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group<G: Into<String>>(mut self, group: G, state: GroupState) -> Self {
        self.groups.insert(group.into(), state);
        self
    }

    pub fn group(&self, group: &str) -> Option<&GroupState> {
        self.groups.get(group)
    }

    /// Lets another writer change the stored copy behind a session's back.
    pub fn group_mut(&mut self, group: &str) -> Option<&mut GroupState> {
        self.groups.get_mut(group)
    }

    pub fn writes(&self) -> &[(String, Change)] {
        &self.writes
    }

    /// Every write fails with `reason` until cleared with `None`.
    pub fn fail_writes(&mut self, reason: Option<&str>) {
        self.failure = reason.map(str::to_string);
    }
}

impl Store for MemoryStore {
    fn mode(&self) -> PersistenceMode {
        PersistenceMode::Durable
    }

    fn fetch(&self, group: &str) -> Result<Value, StoreError> {
        let state = self
            .groups
            .get(group)
            .ok_or_else(|| StoreError::NotFound(group.to_string()))?;

        Ok(serde_json::to_value(state)?)
    }

    fn list(&self) -> Result<Vec<GroupSummary>, StoreError> {
        let groups = self
            .groups
            .iter()
            .map(|(id, state)| GroupSummary {
                id: id.clone(),
                name: state.name.clone(),
                created_at: state.created_at,
            })
            .collect();

        Ok(newest_first(groups))
    }

    fn create(&mut self, group: &str, state: &GroupState) -> Result<(), StoreError> {
        if let Some(reason) = &self.failure {
            return Err(StoreError::Unavailable(reason.clone()));
        }

        if self.groups.contains_key(group) {
            return Err(StoreError::AlreadyExists(group.to_string()));
        }

        self.groups.insert(group.to_string(), state.clone());

        Ok(())
    }

    fn persist(&mut self, group: &str, change: &Change, _state: &GroupState) -> Result<(), StoreError> {
        if let Some(reason) = &self.failure {
            return Err(StoreError::Unavailable(reason.clone()));
        }

        let stored = self
            .groups
            .get_mut(group)
            .ok_or_else(|| StoreError::NotFound(group.to_string()))?;

        if !change.apply(stored) {
            warn!(group, ?change, "change addresses a row that is gone");
            return Err(StoreError::Conflict(group.to_string()));
        }

        self.writes.push((group.to_string(), change.clone()));

        Ok(())
    }
}
