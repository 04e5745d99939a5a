//! Derived views over a ledger: matrix cells, per-member tallies and the
//! king/clown leaderboard. Only buckets between two distinct current members
//! are counted, so every view agrees with the matrix.

use crate::{
    entry::DebtEntry,
    ledger::Ledger,
    member::{MemberId, Pair},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cell {
    /// A member and themself; rendered as a non-interactive cell.
    NotApplicable,
    Count(usize),
}

impl Cell {
    pub fn count(&self) -> Option<usize> {
        match self {
            Cell::NotApplicable => None,
            Cell::Count(n) => Some(*n),
        }
    }
}

pub fn cell(ledger: &Ledger, from: &MemberId, to: &MemberId) -> Cell {
    if from == to {
        return Cell::NotApplicable;
    }

    Cell::Count(ledger.unpaid_count(&Pair::new(from.clone(), to.clone())))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    pub members: Vec<MemberId>,
    /// `rows[i][j]` is what `members[i]` owes `members[j]`.
    pub rows: Vec<Vec<Cell>>,
}

impl Matrix {
    pub fn get(&self, from: &MemberId, to: &MemberId) -> Option<Cell> {
        let i = self.members.iter().position(|m| m == from)?;
        let j = self.members.iter().position(|m| m == to)?;

        Some(self.rows[i][j])
    }

    pub fn total(&self) -> usize {
        self.rows
            .iter()
            .flatten()
            .filter_map(Cell::count)
            .sum()
    }
}

pub fn matrix(ledger: &Ledger, members: &[MemberId]) -> Matrix {
    let rows = members
        .iter()
        .map(|from| members.iter().map(|to| cell(ledger, from, to)).collect())
        .collect();

    Matrix {
        members: members.to_vec(),
        rows,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    pub member: MemberId,
    /// Unpaid pints this member owes.
    pub owes: usize,
    /// Unpaid pints owed to this member.
    pub owed: usize,
}

/// One tally per member, in member order. Members with no pints get zeros.
pub fn tallies(ledger: &Ledger, members: &[MemberId]) -> Vec<Tally> {
    let counts = |pair: &Pair, n: usize| {
        if pair.is_self_pair() || !members.contains(&pair.debtor) || !members.contains(&pair.creditor) {
            0
        } else {
            n
        }
    };

    members
        .iter()
        .map(|member| Tally {
            member: member.clone(),
            owes: ledger.owed_by(member).map(|(p, n)| counts(p, n)).sum(),
            owed: ledger.owed_to(member).map(|(p, n)| counts(p, n)).sum(),
        })
        .collect()
}

/// Members by pints owed, highest first. Ties keep member order.
pub fn rank_debtors(tallies: &[Tally]) -> Vec<Tally> {
    let mut ranked = tallies.to_vec();
    ranked.sort_by(|a, b| b.owes.cmp(&a.owes));
    ranked
}

/// Members by pints owed to them, highest first. Ties keep member order.
pub fn rank_creditors(tallies: &[Tally]) -> Vec<Tally> {
    let mut ranked = tallies.to_vec();
    ranked.sort_by(|a, b| b.owed.cmp(&a.owed));
    ranked
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub member: MemberId,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaderboard {
    /// Most unpaid pints owed to them.
    pub king: Standing,
    /// Most unpaid pints they owe.
    pub clown: Standing,
}

fn first_max<F: Fn(&Tally) -> usize>(tallies: &[Tally], key: F) -> Option<Standing> {
    let mut best: Option<Standing> = None;

    for tally in tallies {
        let count = key(tally);

        if best.as_ref().map_or(true, |b| count > b.count) {
            best = Some(Standing {
                member: tally.member.clone(),
                count,
            });
        }
    }

    best
}

/// `None` when nobody owes anything, in which case the leaderboard is not shown.
pub fn leaderboard(tallies: &[Tally]) -> Option<Leaderboard> {
    let king = first_max(tallies, |t| t.owed)?;
    let clown = first_max(tallies, |t| t.owes)?;

    if king.count == 0 && clown.count == 0 {
        return None;
    }

    Some(Leaderboard { king, clown })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History<'a> {
    pub pair: Pair,
    pub entries: &'a [DebtEntry],
    pub unpaid: usize,
    pub paid: usize,
}

pub fn history<'a>(ledger: &'a Ledger, pair: &Pair) -> History<'a> {
    let entries = ledger.bucket(pair);
    let unpaid = entries.iter().filter(|e| e.is_unpaid()).count();

    History {
        pair: pair.clone(),
        entries,
        unpaid,
        paid: entries.len() - unpaid,
    }
}
