//! Quorum predicates for the decision engine.
//!
//! A check's fate is decided from its *ballot*: the most recent result from
//! each probe that has ever reported for it. A strict majority of down votes
//! is required, and every down voter must additionally show two consecutive
//! down observations before an incident may open.

use crate::db::BallotEntry;

/// How many consecutive down observations a probe must show before its down
/// vote counts toward opening an incident.
pub const CONSECUTIVE_DOWN_REQUIRED: usize = 2;

/// Number of down votes in the ballot.
pub fn count_down(ballot: &[BallotEntry]) -> usize {
    ballot.iter().filter(|entry| !entry.up).count()
}

/// True when a strict majority of the ballot reports down.
///
/// Ties lose: 2 down out of 4 is not a majority.
pub fn majority_down(ballot: &[BallotEntry]) -> bool {
    count_down(ballot) * 2 > ballot.len()
}

/// True when a probe's history shows an unbroken run of down observations
/// long enough to count. `history` is newest first; a short history (a probe
/// whose first-ever report is down) never qualifies.
pub fn all_consecutively_down(history: &[bool]) -> bool {
    history.len() >= CONSECUTIVE_DOWN_REQUIRED && history.iter().all(|up| !*up)
}
