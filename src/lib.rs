use anyhow::{Context, Result};
use chrono::prelude::*;

pub mod aggregate;
pub mod blob;
pub mod config;
pub mod entry;
pub mod group;
pub mod ledger;
pub mod member;
pub mod migrate;
pub mod mutation;
pub mod render;
pub mod session;
pub mod store;
pub mod utils;
pub mod validate;

use group::GroupState;

/// Parses stored group text of any supported shape into current state.
pub fn load_group(input: &str, now: DateTime<Utc>) -> Result<GroupState> {
    let raw: serde_json::Value = serde_json::from_str(input).context("stored group is not valid JSON")?;

    Ok(migrate::migrate_group(&raw, now)?)
}
