use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::utils::truncate_to_millis;

/// One recorded pint. Debtor and creditor are implied by the bucket holding it.
#[derive(Debug, PartialEq, Eq, Clone, Hash, Serialize)]
pub struct DebtEntry {
    pub id: Uuid,
    pub note: String,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub paid: bool,
    #[serde(rename = "photo", skip_serializing_if = "Option::is_none")]
    pub photo_ref: Option<String>,
}

impl DebtEntry {
    pub fn new<N: Into<String>>(note: N, created_at: DateTime<Utc>) -> Self {
        Self::with_id(Uuid::new_v4(), note, created_at)
    }

    pub fn with_id<N: Into<String>>(id: Uuid, note: N, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            note: note.into(),
            created_at: truncate_to_millis(created_at),
            paid: false,
            photo_ref: None,
        }
    }

    pub fn with_photo(mut self, photo_ref: Option<String>) -> Self {
        self.photo_ref = photo_ref;
        self
    }

    pub fn is_unpaid(&self) -> bool {
        !self.paid
    }
}

impl std::fmt::Display for DebtEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let state = if self.paid { "paid" } else { "unpaid" };

        if self.note.is_empty() {
            write!(f, "({})", state)
        } else {
            write!(f, "{:?} ({})", self.note, state)
        }
    }
}

/// Addresses one entry of a bucket: by position for local data, by id for durable data.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EntryRef {
    Index(usize),
    Id(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::TimeZone;

    #[test]
    fn test_entry_serializes_with_legacy_field_names() -> Result<()> {
        let id = Uuid::nil();
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let entry = DebtEntry::with_id(id, "lost bet", at);

        assert_eq!(
            serde_json::to_value(&entry)?,
            serde_json::json!({
                "id": "00000000-0000-0000-0000-000000000000",
                "note": "lost bet",
                "timestamp": 1_700_000_000_000_i64,
                "paid": false,
            })
        );

        Ok(())
    }

    #[test]
    fn test_entry_display() {
        let at = Utc.timestamp_millis_opt(0).unwrap();

        assert_eq!(DebtEntry::new("darts", at).to_string(), "\"darts\" (unpaid)");
        assert_eq!(DebtEntry::new("", at).to_string(), "(unpaid)");
    }
}
