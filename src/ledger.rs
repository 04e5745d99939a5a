use std::collections::{btree_map, BTreeMap};

use serde::{Serialize, Serializer};

use crate::{
    entry::{DebtEntry, EntryRef},
    member::{MemberId, Pair},
};

/// All buckets of a group, keyed by directed pair. Each bucket is ordered by
/// `created_at` ascending, ties kept in insertion order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Ledger {
    buckets: BTreeMap<Pair, Vec<DebtEntry>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, pair: &Pair) -> &[DebtEntry] {
        self.buckets.get(pair).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn buckets(&self) -> btree_map::Iter<'_, Pair, Vec<DebtEntry>> {
        self.buckets.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn unpaid_count(&self, pair: &Pair) -> usize {
        self.bucket(pair).iter().filter(|e| e.is_unpaid()).count()
    }

    /// Inserts after every entry that is not newer, keeping the bucket sorted
    /// even when the clock steps backwards.
    pub fn insert(&mut self, pair: Pair, entry: DebtEntry) {
        let bucket = self.buckets.entry(pair).or_default();
        let at = bucket.partition_point(|e| e.created_at <= entry.created_at);

        bucket.insert(at, entry);
    }

    /// Replaces a whole bucket; the entries are stably sorted by `created_at`.
    pub fn set_bucket(&mut self, pair: Pair, mut entries: Vec<DebtEntry>) {
        entries.sort_by_key(|e| e.created_at);
        self.buckets.insert(pair, entries);
    }

    pub fn position(&self, pair: &Pair, entry: EntryRef) -> Option<usize> {
        let bucket = self.bucket(pair);

        match entry {
            EntryRef::Index(i) if i < bucket.len() => Some(i),
            EntryRef::Index(_) => None,
            EntryRef::Id(id) => bucket.iter().position(|e| e.id == id),
        }
    }

    pub fn get_mut(&mut self, pair: &Pair, index: usize) -> Option<&mut DebtEntry> {
        self.buckets.get_mut(pair).and_then(|b| b.get_mut(index))
    }

    pub fn remove(&mut self, pair: &Pair, index: usize) -> Option<DebtEntry> {
        let bucket = self.buckets.get_mut(pair)?;

        if index >= bucket.len() {
            return None;
        }

        let removed = bucket.remove(index);

        if bucket.is_empty() {
            self.buckets.remove(pair);
        }

        Some(removed)
    }

    /// Position of the most recent unpaid entry; a later position wins a timestamp tie.
    pub fn most_recent_unpaid(&self, pair: &Pair) -> Option<usize> {
        self.bucket(pair)
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_unpaid())
            .max_by(|(i, a), (j, b)| a.created_at.cmp(&b.created_at).then(i.cmp(j)))
            .map(|(i, _)| i)
    }

    /// Drops every bucket where `member` is the debtor or the creditor.
    pub fn purge_member(&mut self, member: &MemberId) -> Vec<Pair> {
        let purged: Vec<Pair> = self
            .buckets
            .keys()
            .filter(|pair| pair.involves(member))
            .cloned()
            .collect();

        for pair in &purged {
            self.buckets.remove(pair);
        }

        purged
    }

    /// Unpaid entries per creditor where `member` is the debtor.
    pub fn owed_by<'a>(&'a self, member: &'a MemberId) -> impl Iterator<Item = (&'a Pair, usize)> + 'a {
        self.buckets
            .keys()
            .filter(move |pair| &pair.debtor == member)
            .map(move |pair| (pair, self.unpaid_count(pair)))
    }

    /// Unpaid entries per debtor where `member` is the creditor.
    pub fn owed_to<'a>(&'a self, member: &'a MemberId) -> impl Iterator<Item = (&'a Pair, usize)> + 'a {
        self.buckets
            .keys()
            .filter(move |pair| &pair.creditor == member)
            .map(move |pair| (pair, self.unpaid_count(pair)))
    }
}

impl Serialize for Ledger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.buckets
                .iter()
                .filter(|(_, bucket)| !bucket.is_empty())
                .map(|(pair, bucket)| (pair.to_string(), bucket)),
        )
    }
}
