//! The only operations that change a [`GroupState`].
//!
//! Every operation borrows the current state and returns a [`Mutation`]: the
//! new state plus the single [`Change`] a persistence collaborator has to apply.
//! A `None` change means there was nothing to do.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::{
    config::Limits,
    entry::{DebtEntry, EntryRef},
    group::GroupState,
    ledger::Ledger,
    member::{Member, MemberId, Pair},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("a group needs at least {0} members")]
    TooFewMembers(usize),

    #[error("`{0}` is not a member of this group")]
    UnknownMember(MemberId),

    #[error("member name cannot be empty")]
    EmptyMemberName,

    #[error("member name `{0}` cannot contain `->`")]
    SeparatorInMemberName(MemberId),

    #[error("group name cannot be empty")]
    EmptyGroupName,

    #[error("group name is longer than {0} characters")]
    GroupNameTooLong(usize),

    #[error("note is longer than {0} characters")]
    NoteTooLong(usize),

    #[error("no such pint between {0}")]
    UnknownEntry(Pair),

    #[error("pints are never deleted from durable storage, mark them paid instead")]
    DeletionUnsupported,
}

/// The write a collaborator must perform for one mutation. Entries are
/// always addressed by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    InsertEntry { pair: Pair, entry: DebtEntry },
    UpdatePaid { pair: Pair, id: Uuid, paid: bool },
    DeleteEntry { pair: Pair, id: Uuid },
    InsertMember(Member),
    DeleteMember { id: MemberId, purged: Vec<Pair> },
    UpdateGroupName(String),
    UpdateMemberAvatar { id: MemberId, avatar: Option<String> },
}

impl Change {
    /// Replays this change onto `state`. Returns `false` when the addressed
    /// entry or member no longer exists there.
    pub fn apply(&self, state: &mut GroupState) -> bool {
        match self {
            Change::InsertEntry { pair, entry } => {
                state.ledger.insert(pair.clone(), entry.clone());
                true
            }
            Change::UpdatePaid { pair, id, paid } => {
                match state
                    .ledger
                    .position(pair, EntryRef::Id(*id))
                    .and_then(|i| state.ledger.get_mut(pair, i))
                {
                    Some(entry) => {
                        entry.paid = *paid;
                        true
                    }
                    None => false,
                }
            }
            Change::DeleteEntry { pair, id } => match state.ledger.position(pair, EntryRef::Id(*id)) {
                Some(i) => state.ledger.remove(pair, i).is_some(),
                None => false,
            },
            Change::InsertMember(member) => {
                if !state.is_member(&member.id) {
                    state.members.push(member.clone());
                }
                true
            }
            Change::DeleteMember { id, .. } => {
                let before = state.members.len();
                state.members.retain(|m| &m.id != id);
                state.ledger.purge_member(id);
                state.members.len() < before
            }
            Change::UpdateGroupName(name) => {
                state.name = name.clone();
                true
            }
            Change::UpdateMemberAvatar { id, avatar } => {
                match state.members.iter_mut().find(|m| &m.id == id) {
                    Some(member) => {
                        member.avatar = avatar.clone();
                        true
                    }
                    None => false,
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub state: GroupState,
    pub change: Option<Change>,
}

impl Mutation {
    fn unchanged(state: &GroupState) -> Self {
        Self {
            state: state.clone(),
            change: None,
        }
    }

    fn applied(state: &GroupState, change: Change) -> Self {
        let mut next = state.clone();
        change.apply(&mut next);

        Self {
            state: next,
            change: Some(change),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.change.is_none()
    }
}

fn checked_group_name(name: &str, limits: &Limits) -> Result<String, MutationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(MutationError::EmptyGroupName);
    }

    if trimmed.chars().count() > limits.max_group_name_len {
        return Err(MutationError::GroupNameTooLong(limits.max_group_name_len));
    }

    Ok(trimmed.to_string())
}

fn checked_member(member: Member) -> Result<Member, MutationError> {
    let id = MemberId::from(member.id.as_str().trim());

    if id.as_str().is_empty() {
        return Err(MutationError::EmptyMemberName);
    }

    if id.contains_separator() {
        return Err(MutationError::SeparatorInMemberName(id));
    }

    Ok(Member { id, ..member })
}

fn require_member(state: &GroupState, id: &MemberId) -> Result<(), MutationError> {
    if state.is_member(id) {
        Ok(())
    } else {
        Err(MutationError::UnknownMember(id.clone()))
    }
}

/// A fresh group whose only member is its creator.
pub fn create_group(
    name: &str,
    creator: Member,
    now: DateTime<Utc>,
    limits: &Limits,
) -> Result<GroupState, MutationError> {
    let name = checked_group_name(name, limits)?;
    let creator = checked_member(creator)?;

    Ok(GroupState::new(name, vec![creator], Ledger::new()).created(Some(now)))
}

pub fn add_entry(
    state: &GroupState,
    pair: &Pair,
    note: &str,
    photo_ref: Option<String>,
    now: DateTime<Utc>,
    limits: &Limits,
) -> Result<Mutation, MutationError> {
    require_member(state, &pair.debtor)?;
    require_member(state, &pair.creditor)?;

    let note = note.trim();

    if note.chars().count() > limits.max_note_len {
        return Err(MutationError::NoteTooLong(limits.max_note_len));
    }

    let entry = DebtEntry::new(note, now).with_photo(photo_ref);

    Ok(Mutation::applied(
        state,
        Change::InsertEntry {
            pair: pair.clone(),
            entry,
        },
    ))
}

/// Sets the paid flag of one entry. An unknown entry, or one already in the
/// requested state, leaves everything as it was.
pub fn set_paid(state: &GroupState, pair: &Pair, entry: EntryRef, paid: bool) -> Mutation {
    let found = state
        .ledger
        .position(pair, entry)
        .map(|i| &state.ledger.bucket(pair)[i]);

    match found {
        Some(e) if e.paid != paid => Mutation::applied(
            state,
            Change::UpdatePaid {
                pair: pair.clone(),
                id: e.id,
                paid,
            },
        ),
        Some(_) => {
            debug!(%pair, ?entry, paid, "pint already in requested state");
            Mutation::unchanged(state)
        }
        None => {
            debug!(%pair, ?entry, "no such pint, nothing to update");
            Mutation::unchanged(state)
        }
    }
}

/// Marks the most recent unpaid entry of the bucket as paid.
pub fn clear_most_recent_unpaid(state: &GroupState, pair: &Pair) -> Mutation {
    match state.ledger.most_recent_unpaid(pair) {
        Some(i) => set_paid(state, pair, EntryRef::Index(i), true),
        None => {
            debug!(%pair, "no unpaid pints to clear");
            Mutation::unchanged(state)
        }
    }
}

pub fn remove_entry(state: &GroupState, pair: &Pair, entry: EntryRef) -> Result<Mutation, MutationError> {
    let i = state
        .ledger
        .position(pair, entry)
        .ok_or_else(|| MutationError::UnknownEntry(pair.clone()))?;

    let id = state.ledger.bucket(pair)[i].id;

    Ok(Mutation::applied(
        state,
        Change::DeleteEntry {
            pair: pair.clone(),
            id,
        },
    ))
}

/// Appends a member. Adding someone already present does nothing.
pub fn add_member(state: &GroupState, member: Member) -> Result<Mutation, MutationError> {
    let member = checked_member(member)?;

    if state.is_member(&member.id) {
        debug!(member = %member.id, "already a member");
        return Ok(Mutation::unchanged(state));
    }

    Ok(Mutation::applied(state, Change::InsertMember(member)))
}

/// Removes a member together with every bucket where they owe or are owed.
pub fn remove_member(state: &GroupState, id: &MemberId, limits: &Limits) -> Result<Mutation, MutationError> {
    require_member(state, id)?;

    if state.members.len() - 1 < limits.min_members {
        return Err(MutationError::TooFewMembers(limits.min_members));
    }

    let purged = state
        .ledger
        .buckets()
        .map(|(pair, _)| pair)
        .filter(|pair| pair.involves(id))
        .cloned()
        .collect();

    Ok(Mutation::applied(
        state,
        Change::DeleteMember {
            id: id.clone(),
            purged,
        },
    ))
}

pub fn rename_group(state: &GroupState, name: &str, limits: &Limits) -> Result<Mutation, MutationError> {
    let name = checked_group_name(name, limits)?;

    if name == state.name {
        return Ok(Mutation::unchanged(state));
    }

    Ok(Mutation::applied(state, Change::UpdateGroupName(name)))
}

pub fn set_member_avatar(
    state: &GroupState,
    id: &MemberId,
    avatar: Option<String>,
) -> Result<Mutation, MutationError> {
    let member = state
        .member(id)
        .ok_or_else(|| MutationError::UnknownMember(id.clone()))?;

    if member.avatar == avatar {
        return Ok(Mutation::unchanged(state));
    }

    Ok(Mutation::applied(
        state,
        Change::UpdateMemberAvatar {
            id: id.clone(),
            avatar,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{self, Cell, Standing};
    use anyhow::Result;
    use chrono::{Duration, TimeZone};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap() + Duration::seconds(seconds)
    }

    fn crew(names: &[&str]) -> GroupState {
        GroupState::new(
            "The Pub Crew",
            names.iter().map(|n| Member::new(*n)).collect(),
            Ledger::new(),
        )
    }

    fn ab() -> Pair {
        Pair::new("Alice", "Bob")
    }

    #[test]
    fn test_end_to_end_scenario() -> Result<()> {
        let limits = Limits::default();
        let state = crew(&["Alice", "Bob", "Charlie"]);

        let state = add_entry(&state, &ab(), "lost bet", None, at(0), &limits)?.state;
        let state = add_entry(&state, &ab(), "darts", None, at(1), &limits)?.state;

        assert_eq!(aggregate::cell(&state.ledger, &"Alice".into(), &"Bob".into()), Cell::Count(2));

        let cleared = clear_most_recent_unpaid(&state, &ab());
        let state = cleared.state;
        let bucket = state.ledger.bucket(&ab());

        assert!(matches!(cleared.change, Some(Change::UpdatePaid { paid: true, .. })));
        assert_eq!(bucket[1].note, "darts");
        assert!(bucket[1].paid);
        assert!(!bucket[0].paid);
        assert_eq!(aggregate::cell(&state.ledger, &"Alice".into(), &"Bob".into()), Cell::Count(1));

        let tallies = aggregate::tallies(&state.ledger, &state.member_ids());
        assert_eq!((tallies[0].owes, tallies[0].owed), (1, 0));
        assert_eq!((tallies[1].owes, tallies[1].owed), (0, 1));
        assert_eq!((tallies[2].owes, tallies[2].owed), (0, 0));

        let board = aggregate::leaderboard(&tallies).unwrap();
        assert_eq!(board.king, Standing { member: "Bob".into(), count: 1 });
        assert_eq!(board.clown, Standing { member: "Alice".into(), count: 1 });

        Ok(())
    }

    #[test]
    fn test_mutations_leave_input_untouched() -> Result<()> {
        let state = crew(&["Alice", "Bob", "Charlie"]);
        let before = state.clone();

        let next = add_entry(&state, &ab(), "", None, at(0), &Limits::default())?;

        assert_eq!(state, before);
        assert_eq!(next.state.ledger.len(), 1);

        Ok(())
    }

    #[test]
    fn test_add_entry_trims_note_and_allows_self_pair() -> Result<()> {
        let state = crew(&["Alice", "Bob"]);
        let pair = Pair::new("Alice", "Alice");

        let next = add_entry(&state, &pair, "  quiz night  ", Some("p.jpg".into()), at(0), &Limits::default())?;
        let entry = &next.state.ledger.bucket(&pair)[0];

        assert_eq!(entry.note, "quiz night");
        assert_eq!(entry.photo_ref.as_deref(), Some("p.jpg"));
        assert!(!entry.paid);

        Ok(())
    }

    #[test]
    fn test_add_entry_preconditions() {
        let state = crew(&["Alice", "Bob"]);
        let limits = Limits::default();
        let long = "x".repeat(101);

        assert_eq!(
            add_entry(&state, &Pair::new("Alice", "Dave"), "", None, at(0), &limits),
            Err(MutationError::UnknownMember("Dave".into()))
        );
        assert_eq!(
            add_entry(&state, &ab(), &long, None, at(0), &limits),
            Err(MutationError::NoteTooLong(100))
        );
        assert!(add_entry(&state, &ab(), &"x".repeat(100), None, at(0), &limits).is_ok());
    }

    #[test]
    fn test_set_paid_out_of_range_is_noop() -> Result<()> {
        let state = crew(&["Alice", "Bob"]);
        let state = add_entry(&state, &ab(), "", None, at(0), &Limits::default())?.state;

        let next = set_paid(&state, &ab(), EntryRef::Index(5), true);

        assert!(next.is_noop());
        assert_eq!(next.state, state);

        Ok(())
    }

    #[test]
    fn test_set_paid_toggles_by_index_and_id() -> Result<()> {
        let state = crew(&["Alice", "Bob"]);
        let state = add_entry(&state, &ab(), "", None, at(0), &Limits::default())?.state;
        let id = state.ledger.bucket(&ab())[0].id;

        let paid = set_paid(&state, &ab(), EntryRef::Index(0), true);
        assert_eq!(paid.change, Some(Change::UpdatePaid { pair: ab(), id, paid: true }));

        let again = set_paid(&paid.state, &ab(), EntryRef::Id(id), true);
        assert!(again.is_noop());

        let unpaid = set_paid(&paid.state, &ab(), EntryRef::Id(id), false);
        assert!(!unpaid.state.ledger.bucket(&ab())[0].paid);

        Ok(())
    }

    #[test]
    fn test_clear_most_recent_unpaid_skips_paid_and_handles_empty() -> Result<()> {
        let limits = Limits::default();
        let state = crew(&["Alice", "Bob"]);

        assert!(clear_most_recent_unpaid(&state, &ab()).is_noop());

        let state = add_entry(&state, &ab(), "one", None, at(0), &limits)?.state;
        let state = add_entry(&state, &ab(), "two", None, at(1), &limits)?.state;
        let state = set_paid(&state, &ab(), EntryRef::Index(1), true).state;

        let state = clear_most_recent_unpaid(&state, &ab()).state;
        assert!(state.ledger.bucket(&ab()).iter().all(|e| e.paid));

        assert!(clear_most_recent_unpaid(&state, &ab()).is_noop());

        Ok(())
    }

    #[test]
    fn test_remove_entry() -> Result<()> {
        let state = crew(&["Alice", "Bob"]);
        let state = add_entry(&state, &ab(), "", None, at(0), &Limits::default())?.state;

        assert_eq!(
            remove_entry(&state, &ab(), EntryRef::Index(1)),
            Err(MutationError::UnknownEntry(ab()))
        );

        let next = remove_entry(&state, &ab(), EntryRef::Index(0))?;
        assert!(next.state.ledger.is_empty());

        Ok(())
    }

    #[test]
    fn test_add_member() -> Result<()> {
        let state = crew(&["Alice", "Bob"]);

        let next = add_member(&state, Member::new("  Dave "))?;
        assert_eq!(next.state.member_ids(), vec!["Alice".into(), "Bob".into(), MemberId::from("Dave")]);

        assert!(add_member(&next.state, Member::new("Dave"))?.is_noop());
        assert_eq!(add_member(&state, Member::new("   ")), Err(MutationError::EmptyMemberName));

        Ok(())
    }

    #[test]
    fn test_member_names_cannot_hold_the_key_separator() {
        let state = crew(&["Alice", "Bob"]);

        assert_eq!(
            add_member(&state, Member::new(" A->B ")),
            Err(MutationError::SeparatorInMemberName("A->B".into()))
        );
        assert_eq!(
            create_group("Darts Club", Member::new("A->B"), at(0), &Limits::default()),
            Err(MutationError::SeparatorInMemberName("A->B".into()))
        );
        assert!(add_member(&state, Member::new("A-B")).is_ok());
    }

    #[test]
    fn test_remove_member_needs_two_left() {
        let state = crew(&["Alice", "Bob"]);

        assert_eq!(
            remove_member(&state, &"Bob".into(), &Limits::default()),
            Err(MutationError::TooFewMembers(2))
        );
        assert_eq!(
            remove_member(&state, &"Dave".into(), &Limits::default()),
            Err(MutationError::UnknownMember("Dave".into()))
        );
    }

    #[test]
    fn test_remove_member_purges_only_their_buckets() -> Result<()> {
        let limits = Limits::default();
        let mut state = crew(&["Alice", "Bob", "Charlie"]);

        for (i, (from, to)) in [("Alice", "Bob"), ("Bob", "Charlie"), ("Charlie", "Alice"), ("Alice", "Charlie")]
            .iter()
            .enumerate()
        {
            state = add_entry(&state, &Pair::new(*from, *to), "", None, at(i as i64), &limits)?.state;
        }

        let next = remove_member(&state, &"Bob".into(), &limits)?;

        assert_eq!(next.state.member_ids(), vec![MemberId::from("Alice"), "Charlie".into()]);
        assert_eq!(
            next.change,
            Some(Change::DeleteMember {
                id: "Bob".into(),
                purged: vec![ab(), Pair::new("Bob", "Charlie")],
            })
        );
        assert_eq!(next.state.ledger.bucket(&Pair::new("Charlie", "Alice")), state.ledger.bucket(&Pair::new("Charlie", "Alice")));
        assert_eq!(next.state.ledger.bucket(&Pair::new("Alice", "Charlie")), state.ledger.bucket(&Pair::new("Alice", "Charlie")));
        assert_eq!(next.state.ledger.len(), 2);

        Ok(())
    }

    #[test]
    fn test_rename_group() -> Result<()> {
        let limits = Limits::default();
        let state = crew(&["Alice", "Bob"]);

        assert_eq!(rename_group(&state, "", &limits), Err(MutationError::EmptyGroupName));
        assert_eq!(rename_group(&state, "   ", &limits), Err(MutationError::EmptyGroupName));
        assert_eq!(
            rename_group(&state, &"x".repeat(51), &limits),
            Err(MutationError::GroupNameTooLong(50))
        );
        assert_eq!(state.name, "The Pub Crew");

        let next = rename_group(&state, " The Snug ", &limits)?;
        assert_eq!(next.state.name, "The Snug");
        assert!(rename_group(&next.state, "The Snug", &limits)?.is_noop());

        Ok(())
    }

    #[test]
    fn test_create_group_and_avatar() -> Result<()> {
        let limits = Limits::default();

        assert_eq!(
            create_group(" ", Member::new("Alice"), at(0), &limits),
            Err(MutationError::EmptyGroupName)
        );

        let state = create_group("Darts Club", Member::new(" Alice "), at(0), &limits)?;
        assert_eq!(state.member_ids(), vec![MemberId::from("Alice")]);
        assert_eq!(state.created_at, Some(at(0)));

        let next = set_member_avatar(&state, &"Alice".into(), Some("a.png".into()))?;
        assert_eq!(next.state.members[0].avatar.as_deref(), Some("a.png"));
        assert!(set_member_avatar(&next.state, &"Alice".into(), Some("a.png".into()))?.is_noop());
        assert_eq!(
            set_member_avatar(&state, &"Bob".into(), None),
            Err(MutationError::UnknownMember("Bob".into()))
        );

        Ok(())
    }

    #[test]
    fn test_change_replay_matches_mutation() -> Result<()> {
        let limits = Limits::default();
        let state = crew(&["Alice", "Bob", "Charlie"]);
        let added = add_entry(&state, &ab(), "", None, at(0), &limits)?;

        let mut replayed = state.clone();
        assert!(added.change.as_ref().unwrap().apply(&mut replayed));
        assert_eq!(replayed, added.state);

        let stale = Change::UpdatePaid { pair: ab(), id: Uuid::nil(), paid: true };
        assert!(!stale.apply(&mut replayed));

        Ok(())
    }
}
