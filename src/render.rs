//! Plain-text views for the command-line tools.

use crate::{
    aggregate::{rank_debtors, Cell, History, Leaderboard, Matrix, Tally},
    utils::{pluralize, short_datetime},
};

pub fn matrix(m: &Matrix) -> String {
    let width = m
        .members
        .iter()
        .map(|id| id.as_str().chars().count())
        .max()
        .unwrap_or(0)
        .max(7);

    let header = std::iter::once(format!("{:width$}", "owes ↓", width = width))
        .chain(m.members.iter().map(|id| format!("{:>width$}", id, width = width)));

    let rows = m.members.iter().zip(&m.rows).map(|(from, row)| {
        std::iter::once(format!("{:width$}", from, width = width))
            .chain(row.iter().map(|cell| {
                let text = match cell {
                    Cell::NotApplicable => "-".to_string(),
                    Cell::Count(n) => n.to_string(),
                };

                format!("{:>width$}", text, width = width)
            }))
            .collect::<Vec<_>>()
            .join(" | ")
    });

    std::iter::once(header.collect::<Vec<_>>().join(" | "))
        .chain(rows)
        .map(|line| line + "\n")
        .collect()
}

/// "Owes most" ranking; members owing nothing are left out.
pub fn tally(tallies: &[Tally]) -> String {
    let ranked = rank_debtors(tallies);

    if ranked.first().map(|t| t.owes).unwrap_or(0) == 0 {
        return "All square! Nobody owes a pint.\n".to_string();
    }

    ranked
        .iter()
        .enumerate()
        .filter(|(_, t)| t.owes > 0)
        .map(|(i, t)| format!("#{} {} owes {}\n", i + 1, t.member, pluralize(t.owes, "pint")))
        .collect()
}

pub fn leaderboard(board: &Leaderboard) -> String {
    format!(
        "King:  {} ({} owed to them)\nClown: {} ({} they owe)\n",
        board.king.member,
        pluralize(board.king.count, "pint"),
        board.clown.member,
        pluralize(board.clown.count, "pint"),
    )
}

pub fn history(h: &History) -> String {
    let summary = format!(
        "{} owes {}: {} unpaid, {} paid\n",
        h.pair.debtor, h.pair.creditor, h.unpaid, h.paid
    );

    let lines = h
        .entries
        .iter()
        .enumerate()
        .map(|(i, entry)| format!("  [{}] {}  {}\n", i, short_datetime(entry.created_at), entry));

    std::iter::once(summary).chain(lines).collect()
}
