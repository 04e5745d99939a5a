//! Normalizes stored group payloads of any historical shape into a [`GroupState`].
//!
//! Two bucket shapes are in the wild: the legacy per-pair count (`"A->B": 3`)
//! and the current entry sequence. Anything else degrades to an empty bucket
//! instead of failing the whole load.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    entry::DebtEntry,
    group::{GroupState, GroupSummary},
    ledger::Ledger,
    member::{Member, MemberId, Pair, PairKeyError, PAIR_SEPARATOR},
    utils::{millis_to_datetime, parse_timestamp, truncate_to_millis},
};

/// Namespace for ids derived from entries that were stored without one.
const ENTRY_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a0e_8b4d_4c1e_9a57_3d2f_e0b8_1c44);

/// Largest legacy per-pair count taken at face value. Anything above is
/// treated as corrupt.
pub const MAX_LEGACY_COUNT: u64 = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("stored group is not a JSON object")]
    NotAnObject,

    #[error("stored group has no valid `{0}` field")]
    MissingField(&'static str),

    #[error("member #{0} is neither a name nor a `{{\"id\": ...}}` object")]
    InvalidMember(usize),
}

/// The shape of one stored bucket, decided once at the ingestion boundary.
#[derive(Debug, PartialEq)]
pub enum RawBucket<'a> {
    LegacyCount(u64),
    Entries(&'a [Value]),
    Unrecognized,
}

impl<'a> RawBucket<'a> {
    pub fn classify(value: &'a Value) -> Self {
        match value {
            Value::Number(n) => match n.as_u64() {
                Some(count) if count <= MAX_LEGACY_COUNT => Self::LegacyCount(count),
                _ => Self::Unrecognized,
            },
            Value::Array(items) => Self::Entries(items),
            _ => Self::Unrecognized,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Fractional(f64),
    Text(String),
}

impl RawTimestamp {
    fn resolve(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Millis(ms) => millis_to_datetime(*ms),
            Self::Fractional(ms) if ms.is_finite() => millis_to_datetime(ms.trunc() as i64),
            Self::Fractional(_) => None,
            Self::Text(text) => parse_timestamp(text),
        }
    }
}

#[derive(Deserialize)]
struct RawEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default, alias = "createdAt", alias = "created_at")]
    timestamp: Option<RawTimestamp>,
    #[serde(default)]
    paid: Option<bool>,
    #[serde(default, alias = "photoRef")]
    photo: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMember {
    Name(String),
    Profile {
        id: String,
        #[serde(default, alias = "avatar_url")]
        avatar: Option<String>,
    },
}

impl From<RawMember> for Member {
    fn from(raw: RawMember) -> Self {
        match raw {
            RawMember::Name(name) => Member::new(name),
            RawMember::Profile { id, avatar } => Member { id: id.into(), avatar },
        }
    }
}

fn derived_id(pair: &Pair, position: usize, created_at: DateTime<Utc>) -> Uuid {
    let seed = format!("{}#{}#{}", pair, position, created_at.timestamp_millis());

    Uuid::new_v5(&ENTRY_NAMESPACE, seed.as_bytes())
}

fn migrate_entry(pair: &Pair, position: usize, item: &Value, now: DateTime<Utc>) -> Option<DebtEntry> {
    let raw: RawEntry = match serde_json::from_value(item.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(%pair, position, error = %e, "dropping unreadable entry");
            return None;
        }
    };

    let created_at = raw
        .timestamp
        .as_ref()
        .and_then(RawTimestamp::resolve)
        .unwrap_or(now);

    let id = raw
        .id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id).ok())
        .unwrap_or_else(|| derived_id(pair, position, created_at));

    Some(DebtEntry {
        id,
        note: raw.note.unwrap_or_default(),
        created_at,
        paid: raw.paid.unwrap_or(false),
        photo_ref: raw.photo,
    })
}

/// Migrates one stored bucket. Never fails: unreadable data becomes an empty bucket.
pub fn migrate_bucket(pair: &Pair, value: &Value, now: DateTime<Utc>) -> Vec<DebtEntry> {
    let now = truncate_to_millis(now);

    let mut entries = match RawBucket::classify(value) {
        RawBucket::LegacyCount(count) => {
            debug!(%pair, count, "expanding legacy pint count");

            (0..count as usize)
                .map(|i| DebtEntry::with_id(derived_id(pair, i, now), "", now))
                .collect::<Vec<_>>()
        }
        RawBucket::Entries(items) => items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| migrate_entry(pair, i, item, now))
            .collect(),
        RawBucket::Unrecognized => {
            warn!(%pair, "unrecognized bucket shape, treating as empty");
            vec![]
        }
    };

    entries.sort_by_key(|e| e.created_at);
    entries
}

/// Splits a bucket key. When an id itself holds the separator the key is
/// ambiguous, so the split naming two known members wins over the first one.
fn parse_key(key: &str, members: &[MemberId]) -> Result<Pair, PairKeyError> {
    key.match_indices(PAIR_SEPARATOR)
        .map(|(i, sep)| Pair::new(&key[..i], &key[i + sep.len()..]))
        .find(|pair| members.contains(&pair.debtor) && members.contains(&pair.creditor))
        .map(Ok)
        .unwrap_or_else(|| key.parse())
}

pub fn migrate_ledger(raw: &Map<String, Value>, members: &[MemberId], now: DateTime<Utc>) -> Ledger {
    let mut ledger = Ledger::new();

    for (key, value) in raw {
        let pair = match parse_key(key, members) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "dropping bucket with malformed key");
                continue;
            }
        };

        let entries = migrate_bucket(&pair, value, now);

        if !entries.is_empty() {
            ledger.set_bucket(pair, entries);
        }
    }

    ledger
}

fn group_name(object: &Map<String, Value>) -> Result<&str, MigrationError> {
    object
        .get("groupName")
        .or_else(|| object.get("name"))
        .and_then(Value::as_str)
        .ok_or(MigrationError::MissingField("groupName"))
}

fn group_created_at(object: &Map<String, Value>) -> Option<DateTime<Utc>> {
    object
        .get("createdAt")
        .and_then(|v| RawTimestamp::deserialize(v).ok())
        .and_then(|t| t.resolve())
}

/// Just enough of a stored group to list it.
pub fn migrate_summary(id: &str, raw: &Value) -> Result<GroupSummary, MigrationError> {
    let object = raw.as_object().ok_or(MigrationError::NotAnObject)?;

    Ok(GroupSummary {
        id: id.to_string(),
        name: group_name(object)?.to_string(),
        created_at: group_created_at(object),
    })
}

/// Migrates a whole stored group. The ledger part fails open; a payload without
/// a name or member list is refused outright.
pub fn migrate_group(raw: &Value, now: DateTime<Utc>) -> Result<GroupState, MigrationError> {
    let object = raw.as_object().ok_or(MigrationError::NotAnObject)?;
    let name = group_name(object)?;

    let raw_members = object
        .get("members")
        .and_then(Value::as_array)
        .ok_or(MigrationError::MissingField("members"))?;

    let mut members: Vec<Member> = Vec::with_capacity(raw_members.len());

    for (i, item) in raw_members.iter().enumerate() {
        let member: Member = serde_json::from_value::<RawMember>(item.clone())
            .map_err(|_| MigrationError::InvalidMember(i))?
            .into();

        if member.id.contains_separator() {
            warn!(member = %member.id, "member id contains `{}`, its bucket keys are ambiguous", PAIR_SEPARATOR);
        }

        if members.iter().any(|m| m.id == member.id) {
            debug!(member = %member.id, "collapsing duplicate member");
            continue;
        }

        members.push(member);
    }

    let ids: Vec<MemberId> = members.iter().map(|m| m.id.clone()).collect();

    let ledger = match object.get("pints") {
        Some(Value::Object(map)) => migrate_ledger(map, &ids, now),
        None | Some(Value::Null) => Ledger::new(),
        Some(_) => {
            warn!("`pints` is not an object, starting from an empty ledger");
            Ledger::new()
        }
    };

    Ok(GroupState::new(name, members, ledger).created(group_created_at(object)))
}
