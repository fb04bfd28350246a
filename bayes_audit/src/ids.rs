//! Identifier and vote normalization.
//!
//! Every identifier in the system (contest ids, collection ids, selection
//! ids, ballot ids) is stored in *reduced* form; votes are canonicalized to
//! sorted, deduplicated tuples of reduced selection ids so that value
//! equality means set equality.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, UnknownSelectionSnafu};
use crate::model::{Contest, WriteinsPolicy};

/// Reported-vote sentinel for ballots in collections without cast-vote
/// records.
pub const NOCVR_SELID: &str = "-noCVR";

/// Selection id recorded when a CVR ballot carries no entry for a contest.
pub const NORECORD_SELID: &str = "-NoRecord";

/// Return `id` with leading/trailing whitespace stripped, internal
/// whitespace runs collapsed to a single blank, and control characters
/// removed. Idempotent.
pub fn reduce(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for mut c in id.chars() {
        // Whitespace controls (tab, newline, CR) collapse like any other
        // whitespace; only non-whitespace controls are dropped outright.
        if c.is_control() && !c.is_whitespace() {
            continue;
        }
        if c.is_whitespace() {
            c = ' ';
        }
        if c == ' ' && out.ends_with(' ') {
            continue;
        }
        out.push(c);
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out.trim_start().to_string()
}

/// Reduce `id` for use as a filename component: every character outside
/// letters, digits, `+`, `-`, `_` and `.` is removed. Idempotent.
pub fn file_safe(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_' | '.'))
        .collect()
}

/// Selections beginning with `+` are write-ins.
pub fn is_writein_selid(selid: &str) -> bool {
    selid.starts_with('+')
}

/// Selections beginning with `-` denote non-choice outcomes
/// (`-Invalid`, `-Undervote`, `-Overvote`, `-Absent`, ...).
pub fn is_special_selid(selid: &str) -> bool {
    selid.starts_with('-')
}

/// A hand- or scanner-interpreted vote in one contest.
///
/// The plurality representation is an unordered *set* of selection ids,
/// held as a sorted, deduplicated vector so that equal sets compare and
/// hash equal. Rank-ordered marks are a second representation reserved for
/// preferential contest types.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash, Serialize, Deserialize)]
pub enum Vote {
    /// Unordered selection set; sorted and deduplicated.
    Set(Vec<String>),
    /// Rank-ordered selections (most preferred first). Reserved.
    Ranked(Vec<String>),
}

impl Vote {
    /// Canonical set vote from any iterable of selection ids.
    pub fn set<I, S>(selids: I) -> Vote
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sels: Vec<String> = selids.into_iter().map(|s| reduce(s.as_ref())).collect();
        sels.sort();
        sels.dedup();
        Vote::Set(sels)
    }

    /// The empty selection set.
    pub fn undervote() -> Vote {
        Vote::Set(Vec::new())
    }

    /// The reported-vote sentinel for noCVR collections.
    pub fn no_cvr() -> Vote {
        Vote::Set(vec![NOCVR_SELID.to_string()])
    }

    /// The reported-vote sentinel for CVR ballots without a record for the
    /// contest.
    pub fn no_record() -> Vote {
        Vote::Set(vec![NORECORD_SELID.to_string()])
    }

    pub fn selids(&self) -> &[String] {
        match self {
            Vote::Set(sels) | Vote::Ranked(sels) => sels,
        }
    }

    pub fn is_undervote(&self) -> bool {
        matches!(self, Vote::Set(sels) if sels.is_empty())
    }

    /// The single selection id, when the vote is a one-element set.
    pub fn single_selid(&self) -> Option<&str> {
        match self {
            Vote::Set(sels) if sels.len() == 1 => Some(&sels[0]),
            _ => None,
        }
    }

    pub fn has_writein(&self) -> bool {
        self.selids().iter().any(|s| is_writein_selid(s))
    }

    pub fn has_special(&self) -> bool {
        self.selids().iter().any(|s| is_special_selid(s))
    }
}

impl std::fmt::Display for Vote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Vote::Set(sels) => write!(f, "{{{}}}", sels.join(";")),
            Vote::Ranked(sels) => write!(f, "[{}]", sels.join(";")),
        }
    }
}

/// Parse the selection fields of a CSV row into a canonical vote.
///
/// Each field is trimmed and reduced; fully blank trailing fields are
/// discarded. An empty field list is an undervote.
pub fn parse_vote<S: AsRef<str>>(selections: &[S]) -> Vote {
    let mut sels: Vec<String> = selections.iter().map(|s| reduce(s.as_ref())).collect();
    while sels.last().map_or(false, |s| s.is_empty()) {
        sels.pop();
    }
    Vote::set(sels)
}

/// Classification of a vote against a contest's selection set and write-in
/// policy.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum VoteKind {
    Valid,
    Undervote,
    Overvote,
    InvalidWritein,
    Special,
}

/// Classify `vote` for `contest`.
///
/// Assumes the vote already passed [`validate_selids`]; unknown selection
/// ids are a hard error there, not a classification.
pub fn classify_vote(contest: &Contest, vote: &Vote) -> VoteKind {
    if matches!(vote, Vote::Ranked(_)) {
        // Rank-ordered marks cannot count in a plurality tally.
        return VoteKind::Special;
    }
    let sels = vote.selids();
    if sels.is_empty() {
        return VoteKind::Undervote;
    }
    if sels.iter().any(|s| is_special_selid(s)) {
        return VoteKind::Special;
    }
    if sels.len() > contest.winners as usize {
        return VoteKind::Overvote;
    }
    if vote.has_writein() {
        let allowed = match contest.writeins {
            WriteinsPolicy::No => false,
            WriteinsPolicy::Qualified => sels
                .iter()
                .filter(|s| is_writein_selid(s))
                .all(|s| contest.qualified_writeins.contains(s.as_str())),
            WriteinsPolicy::Arbitrary => true,
        };
        if !allowed {
            return VoteKind::InvalidWritein;
        }
    }
    VoteKind::Valid
}

/// Check that every selection id in `vote` is either declared for the
/// contest, a write-in, or a special outcome.
pub fn validate_selids(contest: &Contest, vote: &Vote) -> Result<()> {
    for selid in vote.selids() {
        if is_writein_selid(selid) || is_special_selid(selid) {
            continue;
        }
        if !contest.selids.contains(selid.as_str()) {
            return UnknownSelectionSnafu {
                cid: contest.cid.clone(),
                selid: selid.clone(),
            }
            .fail();
        }
    }
    Ok(())
}

/// Expand a compact manifest field into `num` consecutive values.
///
/// The trailing decimal run of `start` is incremented, preserving its
/// width (`B-0001` -> `B-0002`, `XY-9` -> `XY-10`). Without trailing
/// digits a counter starting at 1 is appended, but only when more than one
/// value is requested.
pub fn count_on(start: &str, num: usize) -> Vec<String> {
    if num == 0 {
        return Vec::new();
    }
    if num == 1 {
        return vec![start.to_string()];
    }
    let digits_at = start
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + start[i..].chars().next().map_or(1, char::len_utf8))
        .unwrap_or(0);
    let (prefix, digits) = start.split_at(digits_at);
    let (counter, width) = if digits.is_empty() {
        (1u64, 1)
    } else {
        (digits.parse::<u64>().unwrap_or(0), digits.len())
    };
    (0..num as u64)
        .map(|i| format!("{}{:0width$}", prefix, counter + i, width = width))
        .collect()
}
