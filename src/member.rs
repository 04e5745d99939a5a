use std::{
    fmt::{self, Display},
    str::FromStr,
};

use serde::Serialize;
use thiserror::Error;

/// Separator between debtor and creditor in a persisted bucket key.
pub const PAIR_SEPARATOR: &str = "->";

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash, Serialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl MemberId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An id holding the separator cannot be told apart inside a bucket key.
    pub fn contains_separator(&self) -> bool {
        self.0.contains(PAIR_SEPARATOR)
    }
}

impl Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(val: &str) -> Self {
        Self(val.to_string())
    }
}

impl From<String> for MemberId {
    fn from(val: String) -> Self {
        Self(val)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Hash, Serialize)]
pub struct Member {
    pub id: MemberId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Member {
    pub fn new<I: Into<MemberId>>(id: I) -> Self {
        Self {
            id: id.into(),
            avatar: None,
        }
    }

    pub fn with_avatar<A: Into<String>>(mut self, avatar: A) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

impl Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&self.id, f)
    }
}

/// A directed (debtor, creditor) pair. `(A, B)` and `(B, A)` are different buckets.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub struct Pair {
    pub debtor: MemberId,
    pub creditor: MemberId,
}

impl Pair {
    pub fn new<D: Into<MemberId>, C: Into<MemberId>>(debtor: D, creditor: C) -> Self {
        Self {
            debtor: debtor.into(),
            creditor: creditor.into(),
        }
    }

    pub fn is_self_pair(&self) -> bool {
        self.debtor == self.creditor
    }

    pub fn involves(&self, member: &MemberId) -> bool {
        &self.debtor == member || &self.creditor == member
    }
}

impl Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}{}", self.debtor, PAIR_SEPARATOR, self.creditor)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("`{0}` is not a `debtor->creditor` key")]
pub struct PairKeyError(pub String);

impl FromStr for Pair {
    type Err = PairKeyError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        match key.split_once(PAIR_SEPARATOR) {
            Some((debtor, creditor)) if !debtor.is_empty() && !creditor.is_empty() => {
                Ok(Self::new(debtor, creditor))
            }
            _ => Err(PairKeyError(key.to_string())),
        }
    }
}
