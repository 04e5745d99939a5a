//! Sequencing between the pure core and a persistence collaborator.
//!
//! A mutation is computed against the latest local state, its [`Change`] is
//! written to the store, and the new state is committed only once the write
//! succeeded. A failed write leaves the session exactly as it was; callers
//! reconcile with [`Session::reload`].

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    aggregate::{self, History, Leaderboard, Matrix, Tally},
    blob::BlobStore,
    config::Limits,
    entry::EntryRef,
    group::GroupState,
    member::{Member, MemberId, Pair},
    migrate::{migrate_group, MigrationError},
    mutation::{self, Change, Mutation, MutationError},
    store::{PersistenceMode, Store, StoreError},
    utils::{Clock, SystemClock},
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Rejected(#[from] MutationError),

    #[error("stored group could not be read: {0}")]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct Session<S: Store, C: Clock = SystemClock> {
    group: String,
    state: GroupState,
    store: S,
    clock: C,
    limits: Limits,
}

impl<S: Store, C: Clock> Session<S, C> {
    pub fn open(store: S, group: &str, clock: C, limits: Limits) -> Result<Self, SessionError> {
        let raw = store.fetch(group)?;
        let state = migrate_group(&raw, clock.now())?;

        info!(group, members = state.members.len(), pints = state.ledger.len(), "group loaded");

        Ok(Self {
            group: group.to_string(),
            state,
            store,
            clock,
            limits,
        })
    }

    pub fn create(
        mut store: S,
        group: &str,
        name: &str,
        creator: Member,
        clock: C,
        limits: Limits,
    ) -> Result<Self, SessionError> {
        let state = mutation::create_group(name, creator, clock.now(), &limits)?;
        store.create(group, &state)?;

        Ok(Self {
            group: group.to_string(),
            state,
            store,
            clock,
            limits,
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn state(&self) -> &GroupState {
        &self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Replaces local state with what the store holds now.
    pub fn reload(&mut self) -> Result<(), SessionError> {
        let raw = self.store.fetch(&self.group)?;
        self.state = migrate_group(&raw, self.clock.now())?;

        Ok(())
    }

    fn commit(&mut self, mutation: Mutation) -> Result<Option<Change>, SessionError> {
        let Mutation { state, change } = mutation;

        if let Some(change) = &change {
            self.store.persist(&self.group, change, &state)?;
            info!(group = %self.group, ?change, "change committed");
        }

        self.state = state;

        Ok(change)
    }

    pub fn add_entry(&mut self, pair: &Pair, note: &str, photo_ref: Option<String>) -> Result<Option<Change>, SessionError> {
        let mutation = mutation::add_entry(&self.state, pair, note, photo_ref, self.clock.now(), &self.limits)?;

        self.commit(mutation)
    }

    /// Uploads the photo first, then records the entry pointing at it.
    pub fn add_entry_with_photo<B: BlobStore>(
        &mut self,
        pair: &Pair,
        note: &str,
        photo: &[u8],
        extension: &str,
        blobs: &mut B,
    ) -> Result<Option<Change>, SessionError> {
        let photo_ref = blobs.put(photo, extension)?;

        self.add_entry(pair, note, Some(photo_ref))
    }

    pub fn set_paid(&mut self, pair: &Pair, entry: EntryRef, paid: bool) -> Result<Option<Change>, SessionError> {
        let mutation = mutation::set_paid(&self.state, pair, entry, paid);

        self.commit(mutation)
    }

    pub fn clear_most_recent_unpaid(&mut self, pair: &Pair) -> Result<Option<Change>, SessionError> {
        let mutation = mutation::clear_most_recent_unpaid(&self.state, pair);

        self.commit(mutation)
    }

    /// Only local stores delete; durable ones keep history and expect `set_paid`.
    pub fn remove_entry(&mut self, pair: &Pair, entry: EntryRef) -> Result<Option<Change>, SessionError> {
        if self.store.mode() != PersistenceMode::Local {
            return Err(MutationError::DeletionUnsupported.into());
        }

        let mutation = mutation::remove_entry(&self.state, pair, entry)?;

        self.commit(mutation)
    }

    pub fn add_member(&mut self, member: Member) -> Result<Option<Change>, SessionError> {
        let mutation = mutation::add_member(&self.state, member)?;

        self.commit(mutation)
    }

    pub fn remove_member(&mut self, id: &MemberId) -> Result<Option<Change>, SessionError> {
        let mutation = mutation::remove_member(&self.state, id, &self.limits)?;

        self.commit(mutation)
    }

    pub fn rename_group(&mut self, name: &str) -> Result<Option<Change>, SessionError> {
        let mutation = mutation::rename_group(&self.state, name, &self.limits)?;

        self.commit(mutation)
    }

    pub fn set_member_avatar(&mut self, id: &MemberId, avatar: Option<String>) -> Result<Option<Change>, SessionError> {
        let mutation = mutation::set_member_avatar(&self.state, id, avatar)?;

        self.commit(mutation)
    }

    /// Uploads the new image, points the member at it, then deletes the image
    /// it replaced. `None` clears the avatar.
    pub fn replace_avatar<B: BlobStore>(
        &mut self,
        id: &MemberId,
        image: Option<(&[u8], &str)>,
        blobs: &mut B,
    ) -> Result<Option<Change>, SessionError> {
        let previous = self
            .state
            .member(id)
            .ok_or_else(|| MutationError::UnknownMember(id.clone()))?
            .avatar
            .clone();

        let avatar = match image {
            Some((bytes, extension)) => Some(blobs.put(bytes, extension)?),
            None => None,
        };

        let change = match self.set_member_avatar(id, avatar.clone()) {
            Ok(change) => change,
            Err(e) => {
                if let Some(avatar) = &avatar {
                    discard_blob(blobs, avatar);
                }
                return Err(e);
            }
        };

        if change.is_some() {
            if let Some(previous) = &previous {
                discard_blob(blobs, previous);
            }
        }

        Ok(change)
    }

    pub fn matrix(&self) -> Matrix {
        aggregate::matrix(&self.state.ledger, &self.state.member_ids())
    }

    pub fn tallies(&self) -> Vec<Tally> {
        aggregate::tallies(&self.state.ledger, &self.state.member_ids())
    }

    pub fn leaderboard(&self) -> Option<Leaderboard> {
        aggregate::leaderboard(&self.tallies())
    }

    pub fn history(&self, pair: &Pair) -> History<'_> {
        aggregate::history(&self.state.ledger, pair)
    }
}

/// The committed state no longer points at `reference`, so a failed delete
/// only leaves an orphan behind.
fn discard_blob<B: BlobStore>(blobs: &mut B, reference: &str) {
    if let Err(error) = blobs.remove(reference) {
        warn!(reference, %error, "could not delete blob");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregate::Cell,
        blob::FileBlobStore,
        ledger::Ledger,
        store::JsonFileStore,
        utils::SteppingClock,
    };
    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    fn clock() -> SteppingClock {
        SteppingClock::new(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(), Duration::seconds(1))
    }

    fn crew() -> GroupState {
        GroupState::new(
            "The Pub Crew",
            vec![Member::new("Alice"), Member::new("Bob"), Member::new("Charlie")],
            Ledger::new(),
        )
    }

    fn memory_session() -> Result<Session<crate::store::MemoryStore, SteppingClock>> {
        let store = crate::store::MemoryStore::new().with_group("pub", crew());

        Ok(Session::open(store, "pub", clock(), Limits::default())?)
    }

    fn ab() -> Pair {
        Pair::new("Alice", "Bob")
    }

    #[test]
    fn test_mutations_reach_the_store_by_id() -> Result<()> {
        let mut session = memory_session()?;

        session.add_entry(&ab(), "lost bet", None)?;
        session.add_entry(&ab(), "darts", None)?;
        session.clear_most_recent_unpaid(&ab())?;

        let darts = session.state().ledger.bucket(&ab())[1].clone();
        assert!(darts.paid);

        let writes = session.store().writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(
            writes[2].1,
            Change::UpdatePaid { pair: ab(), id: darts.id, paid: true }
        );
        assert_eq!(session.store().group("pub"), Some(session.state()));

        Ok(())
    }

    #[test]
    fn test_noop_mutations_do_not_write() -> Result<()> {
        let mut session = memory_session()?;

        assert_eq!(session.set_paid(&ab(), EntryRef::Index(9), true)?, None);
        assert_eq!(session.clear_most_recent_unpaid(&ab())?, None);
        assert_eq!(session.add_member(Member::new("Alice"))?, None);
        assert!(session.store().writes().is_empty());

        Ok(())
    }

    #[test]
    fn test_failed_write_leaves_state_unchanged() -> Result<()> {
        let mut session = memory_session()?;
        let before = session.state().clone();

        session.store_mut().fail_writes(Some("offline"));

        assert!(matches!(
            session.add_entry(&ab(), "", None),
            Err(SessionError::Store(StoreError::Unavailable(_)))
        ));
        assert!(matches!(session.rename_group("The Snug"), Err(SessionError::Store(_))));
        assert_eq!(session.state(), &before);

        session.store_mut().fail_writes(None);
        session.add_entry(&ab(), "", None)?;
        assert_eq!(session.state().ledger.len(), 1);

        Ok(())
    }

    #[test]
    fn test_rejections_are_distinct_from_store_failures() -> Result<()> {
        let mut session = memory_session()?;

        assert!(matches!(
            session.rename_group(""),
            Err(SessionError::Rejected(MutationError::EmptyGroupName))
        ));
        assert_eq!(session.state().name, "The Pub Crew");

        session.remove_member(&"Charlie".into())?;
        assert!(matches!(
            session.remove_member(&"Bob".into()),
            Err(SessionError::Rejected(MutationError::TooFewMembers(2)))
        ));

        Ok(())
    }

    #[test]
    fn test_durable_store_refuses_deletion() -> Result<()> {
        let mut session = memory_session()?;
        session.add_entry(&ab(), "", None)?;

        assert!(matches!(
            session.remove_entry(&ab(), EntryRef::Index(0)),
            Err(SessionError::Rejected(MutationError::DeletionUnsupported))
        ));
        assert_eq!(session.state().ledger.len(), 1);

        Ok(())
    }

    #[test]
    fn test_conflict_then_reload() -> Result<()> {
        let mut session = memory_session()?;
        session.add_entry(&ab(), "", None)?;

        let pair = ab();
        let stored = session.store_mut().group_mut("pub").unwrap();
        let id = stored.ledger.bucket(&pair)[0].id;
        Change::DeleteEntry { pair: pair.clone(), id }.apply(stored);

        assert!(matches!(
            session.set_paid(&pair, EntryRef::Index(0), true),
            Err(SessionError::Store(StoreError::Conflict(_)))
        ));
        assert_eq!(session.state().ledger.len(), 1);

        session.reload()?;
        assert!(session.state().ledger.is_empty());

        Ok(())
    }

    #[test]
    fn test_local_file_session_migrates_legacy_data() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(
            dir.path().join("pub.json"),
            serde_json::to_string(&json!({
                "groupName": "The Pub Crew",
                "members": ["Alice", "Bob", "Charlie"],
                "pints": {"Alice->Bob": 3, "Bob->Charlie": [{"note": "quiz", "timestamp": 1}]},
            }))?,
        )?;

        let mut session = Session::open(JsonFileStore::new(dir.path()), "pub", clock(), Limits::default())?;

        assert_eq!(session.matrix().get(&"Alice".into(), &"Bob".into()), Some(Cell::Count(3)));
        assert_eq!(session.history(&Pair::new("Bob", "Charlie")).entries[0].note, "quiz");

        session.remove_entry(&ab(), EntryRef::Index(0))?;
        session.clear_most_recent_unpaid(&Pair::new("Bob", "Charlie"))?;

        let reopened = Session::open(JsonFileStore::new(dir.path()), "pub", clock(), Limits::default())?;
        assert_eq!(reopened.state(), session.state());
        assert_eq!(reopened.tallies()[0].owes, 2);
        assert_eq!(reopened.leaderboard().unwrap().king.member, MemberId::from("Bob"));

        Ok(())
    }

    #[test]
    fn test_create_and_photo_upload() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut blobs = FileBlobStore::new(dir.path().join("photos"));

        let mut session = Session::create(
            JsonFileStore::new(dir.path()),
            "darts",
            "Darts Club",
            Member::new("Alice"),
            clock(),
            Limits::default(),
        )?;
        session.add_member(Member::new("Bob"))?;
        session.add_entry_with_photo(&ab(), "bullseye", b"img", "png", &mut blobs)?;

        let entry = &session.state().ledger.bucket(&ab())[0];
        let photo = entry.photo_ref.clone().unwrap();
        assert_eq!(std::fs::read(photo)?, b"img");

        assert!(matches!(
            Session::create(JsonFileStore::new(dir.path()), "darts", "Again", Member::new("Bob"), clock(), Limits::default()),
            Err(SessionError::Store(StoreError::AlreadyExists(_)))
        ));

        Ok(())
    }
    #[test]
    fn test_replacing_an_avatar_deletes_the_old_image() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut blobs = FileBlobStore::new(dir.path().join("photos"));
        let mut session = memory_session()?;
        let alice = MemberId::from("Alice");

        session.replace_avatar(&alice, Some((&b"first"[..], "png")), &mut blobs)?;
        let first = session.state().member(&alice).unwrap().avatar.clone().unwrap();

        session.replace_avatar(&alice, Some((&b"second"[..], "png")), &mut blobs)?;
        let second = session.state().member(&alice).unwrap().avatar.clone().unwrap();

        assert!(!std::path::Path::new(&first).exists());
        assert_eq!(std::fs::read(&second)?, b"second");

        session.replace_avatar(&alice, None, &mut blobs)?;
        assert_eq!(session.state().member(&alice).unwrap().avatar, None);
        assert!(!std::path::Path::new(&second).exists());

        session.store_mut().fail_writes(Some("offline"));
        assert!(session.replace_avatar(&alice, Some((&b"third"[..], "png")), &mut blobs).is_err());
        assert_eq!(std::fs::read_dir(dir.path().join("photos"))?.count(), 0);

        Ok(())
    }
}
