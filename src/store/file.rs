use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::{newest_first, PersistenceMode, Store, StoreError};
use crate::{
    group::{GroupState, GroupSummary},
    migrate::migrate_summary,
    mutation::Change,
};

/// One `<group>.json` document per group under a data directory. Every write
/// replaces the whole document.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, group: &str) -> Result<PathBuf, StoreError> {
        let valid = !group.is_empty()
            && group
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if !valid {
            return Err(StoreError::InvalidGroupId(group.to_string()));
        }

        Ok(self.dir.join(format!("{}.json", group)))
    }

    /// The stored text as-is, for diagnostics that point into it.
    pub fn read_source(&self, group: &str) -> Result<(PathBuf, String), StoreError> {
        let path = self.path(group)?;

        match fs::read_to_string(&path) {
            Ok(text) => Ok((path, text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(group.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, group: &str, state: &GroupState) -> Result<(), StoreError> {
        let path = self.path(group)?;
        let tmp = path.with_extension("json.tmp");

        fs::create_dir_all(&self.dir)?;
        fs::write(&tmp, state.to_json()?)?;
        fs::rename(&tmp, &path)?;

        debug!(path = %path.display(), "group written");

        Ok(())
    }
}

impl Store for JsonFileStore {
    fn mode(&self) -> PersistenceMode {
        PersistenceMode::Local
    }

    fn fetch(&self, group: &str) -> Result<Value, StoreError> {
        let (_, text) = self.read_source(group)?;

        Ok(serde_json::from_str(&text)?)
    }

    /// Scans the data directory for `<group>.json` documents. Unreadable ones
    /// are skipped.
    fn list(&self) -> Result<Vec<GroupSummary>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut groups = vec![];

        for entry in entries {
            let path = entry?.path();

            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let id = match path.file_stem().and_then(|s| s.to_str()) {
                Some(id) if self.path(id).is_ok() => id,
                _ => continue,
            };

            let summary = self
                .fetch(id)
                .map_err(|e| e.to_string())
                .and_then(|raw| migrate_summary(id, &raw).map_err(|e| e.to_string()));

            match summary {
                Ok(summary) => groups.push(summary),
                Err(error) => warn!(path = %path.display(), %error, "skipping unreadable group"),
            }
        }

        Ok(newest_first(groups))
    }

    fn create(&mut self, group: &str, state: &GroupState) -> Result<(), StoreError> {
        if self.path(group)?.exists() {
            return Err(StoreError::AlreadyExists(group.to_string()));
        }

        self.write(group, state)?;
        info!(group, dir = %self.dir.display(), "group created");

        Ok(())
    }

    fn persist(&mut self, group: &str, _change: &Change, state: &GroupState) -> Result<(), StoreError> {
        if !self.path(group)?.exists() {
            return Err(StoreError::NotFound(group.to_string()));
        }

        self.write(group, state)
    }
}
