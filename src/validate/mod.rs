use std::collections::HashSet;

use thiserror::Error;

use crate::{config::Limits, group::GroupState, member::PAIR_SEPARATOR};

mod runner;
pub use runner::Runner;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Validation error")]
    WithTrace(Vec<Trace>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub message: String,
    pub details: String,
    /// Text to point at in the stored document, usually a bucket key.
    pub anchor: Option<String>,
    pub found: Option<String>,
    pub expected: Option<String>,
}

type Validator = fn(&GroupState, &Limits) -> Result<(), ValidationError>;

pub static ALL_VALIDATORS: &[(&str, Validator)] = &[
    ("validate that the group name is usable", validate_group_name),
    ("validate that member ids fit in bucket keys", validate_member_ids),
    (
        "validate that every bucket is between current members",
        validate_buckets_reference_members,
    ),
    ("validate that nobody owes themself", validate_no_self_debts),
    ("validate that notes fit the length limit", validate_note_lengths),
    ("validate that pint ids are unique", validate_unique_ids),
];

fn collect(traces: Vec<Trace>) -> Result<(), ValidationError> {
    if traces.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::WithTrace(traces))
    }
}

fn validate_group_name(state: &GroupState, limits: &Limits) -> Result<(), ValidationError> {
    let length = state.name.trim().chars().count();

    if length > 0 && length <= limits.max_group_name_len {
        return Ok(());
    }

    collect(vec![Trace {
        message: "Group name is unusable".into(),
        details: "Group names must be non-empty and fit the length limit.".into(),
        anchor: Some("groupName".into()),
        found: Some(format!("{} characters", length)),
        expected: Some(format!("1 to {} characters", limits.max_group_name_len)),
    }])
}

fn validate_member_ids(state: &GroupState, _: &Limits) -> Result<(), ValidationError> {
    let traces = state
        .members
        .iter()
        .filter(|m| m.id.contains_separator())
        .map(|m| Trace {
            message: "Member id contains the bucket key separator".into(),
            details: format!("Keys of pints involving {} can be split the wrong way.", m.id),
            anchor: Some(m.id.to_string()),
            found: Some(m.id.to_string()),
            expected: Some(format!("an id without `{}`", PAIR_SEPARATOR)),
        })
        .collect();

    collect(traces)
}

fn validate_buckets_reference_members(state: &GroupState, _: &Limits) -> Result<(), ValidationError> {
    let traces = state
        .ledger
        .buckets()
        .filter(|(pair, _)| !state.is_member(&pair.debtor) || !state.is_member(&pair.creditor))
        .map(|(pair, bucket)| {
            let stranger = if state.is_member(&pair.debtor) {
                &pair.creditor
            } else {
                &pair.debtor
            };

            Trace {
                message: "Pints recorded against someone outside the group".into(),
                details: format!("{} is not a member, these pints are left out of every tally", stranger),
                anchor: Some(pair.to_string()),
                found: Some(format!("{} entries", bucket.len())),
                expected: None,
            }
        })
        .collect();

    collect(traces)
}

fn validate_no_self_debts(state: &GroupState, _: &Limits) -> Result<(), ValidationError> {
    let traces = state
        .ledger
        .buckets()
        .filter(|(pair, bucket)| pair.is_self_pair() && !bucket.is_empty())
        .map(|(pair, bucket)| Trace {
            message: "Member owes themself".into(),
            details: "Self-debts never show up in the matrix or the tallies.".into(),
            anchor: Some(pair.to_string()),
            found: Some(format!("{} entries", bucket.len())),
            expected: Some("0 entries".into()),
        })
        .collect();

    collect(traces)
}

fn validate_note_lengths(state: &GroupState, limits: &Limits) -> Result<(), ValidationError> {
    let traces = state
        .ledger
        .buckets()
        .flat_map(|(pair, bucket)| bucket.iter().map(move |entry| (pair, entry)))
        .filter(|(_, entry)| entry.note.chars().count() > limits.max_note_len)
        .map(|(pair, entry)| Trace {
            message: "Note is too long".into(),
            details: format!("A pint between {} has an oversized note.", pair),
            anchor: Some(entry.note.clone()),
            found: Some(format!("{} characters", entry.note.chars().count())),
            expected: Some(format!("at most {}", limits.max_note_len)),
        })
        .collect();

    collect(traces)
}

fn validate_unique_ids(state: &GroupState, _: &Limits) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    let mut traces = vec![];

    for (pair, bucket) in state.ledger.buckets() {
        for entry in bucket {
            if !seen.insert(entry.id) {
                traces.push(Trace {
                    message: "Duplicate pint id".into(),
                    details: format!("Updates addressed to this id are ambiguous (seen again in {}).", pair),
                    anchor: Some(entry.id.to_string()),
                    found: Some(entry.id.to_string()),
                    expected: None,
                });
            }
        }
    }

    collect(traces)
}
