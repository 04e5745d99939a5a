use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    ledger::Ledger,
    member::{Member, MemberId},
};

/// Aggregate root for one group: name, ordered members and the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupState {
    #[serde(rename = "groupName")]
    pub name: String,
    pub members: Vec<Member>,
    #[serde(rename = "pints")]
    pub ledger: Ledger,
    /// Unknown for groups stored before creation times were kept.
    #[serde(
        rename = "createdAt",
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

/// What a group listing shows for one stored group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl GroupState {
    pub fn new<N: Into<String>>(name: N, members: Vec<Member>, ledger: Ledger) -> Self {
        Self {
            name: name.into(),
            members,
            ledger,
            created_at: None,
        }
    }

    pub fn created(mut self, created_at: Option<DateTime<Utc>>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn member(&self, id: &MemberId) -> Option<&Member> {
        self.members.iter().find(|m| &m.id == id)
    }

    pub fn is_member(&self, id: &MemberId) -> bool {
        self.member(id).is_some()
    }

    pub fn member_ids(&self) -> Vec<MemberId> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
