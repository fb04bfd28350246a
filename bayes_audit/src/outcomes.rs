//! Outcome computation ("social choice functions").
//!
//! Only plurality is implemented; the contest type is matched so that
//! preferential rules slot in next to it later.

use std::collections::BTreeSet;

use crate::ids::{is_special_selid, Vote};
use crate::model::{Contest, ContestType};

/// Winner set for `contest` given a tally over vote categories.
///
/// Plurality: the top-`winners` selection ids by count. Only single-id
/// votes whose id is not a special outcome can win; undervotes, overvotes
/// and `-`-prefixed categories never do. Ties break lexicographically on
/// the reduced selection id, which keeps seeded simulations reproducible.
pub fn compute_winners<'a, I>(contest: &Contest, tally: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = (&'a Vote, f64)>,
{
    match contest.contest_type {
        ContestType::Plurality => plurality_winners(contest.winners, tally),
    }
}

fn plurality_winners<'a, I>(winners: u32, tally: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = (&'a Vote, f64)>,
{
    let mut candidates: Vec<(&str, f64)> = tally
        .into_iter()
        .filter_map(|(vote, count)| match vote.single_selid() {
            Some(selid) if !is_special_selid(selid) => Some((selid, count)),
            _ => None,
        })
        .collect();
    candidates.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    candidates
        .into_iter()
        .take(winners as usize)
        .map(|(selid, _)| selid.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::two_way_contest;
    use std::collections::BTreeMap;

    fn tally(entries: &[(Vote, f64)]) -> BTreeMap<Vote, f64> {
        entries.iter().cloned().collect()
    }

    #[test]
    fn plurality_picks_the_largest_count() {
        let contest = two_way_contest("C");
        let t = tally(&[
            (Vote::set(["0"]), 40.0),
            (Vote::set(["1"]), 60.0),
            (Vote::undervote(), 10.0),
        ]);
        let winners = compute_winners(&contest, t.iter().map(|(v, c)| (v, *c)));
        assert_eq!(winners, ["1".to_string()].into_iter().collect());
    }

    #[test]
    fn specials_and_overvotes_cannot_win() {
        let contest = two_way_contest("C");
        let t = tally(&[
            (Vote::set(["-Invalid"]), 900.0),
            (Vote::set(["0", "1"]), 500.0),
            (Vote::set(["0"]), 1.0),
        ]);
        let winners = compute_winners(&contest, t.iter().map(|(v, c)| (v, *c)));
        assert_eq!(winners, ["0".to_string()].into_iter().collect());
    }

    #[test]
    fn ties_break_lexicographically() {
        let contest = two_way_contest("C");
        let t = tally(&[(Vote::set(["0"]), 5.0), (Vote::set(["1"]), 5.0)]);
        let winners = compute_winners(&contest, t.iter().map(|(v, c)| (v, *c)));
        assert_eq!(winners, ["0".to_string()].into_iter().collect());
    }

    #[test]
    fn multi_winner_takes_top_w() {
        let mut contest = two_way_contest("C");
        contest.winners = 2;
        contest.selids.insert("2".to_string());
        let t = tally(&[
            (Vote::set(["0"]), 10.0),
            (Vote::set(["1"]), 30.0),
            (Vote::set(["2"]), 20.0),
        ]);
        let winners = compute_winners(&contest, t.iter().map(|(v, c)| (v, *c)));
        assert_eq!(
            winners,
            ["1".to_string(), "2".to_string()].into_iter().collect()
        );
    }
}
