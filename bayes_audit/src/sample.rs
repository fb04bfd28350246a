//! Audited-vote ingestion and sample tallies.
//!
//! Audited-vote transcripts are cumulative: each upload carries every
//! ballot hand-interpreted so far for its collection. Ingestion
//! cross-validates the transcript against the manifest and the sampling
//! order, then joins it with the reported votes into the cross-tab
//! `counts[cid][pbcid][reported vote][audited vote]` the risk estimator
//! consumes.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;

use crate::errors::{AuditError, OutOfOrderSampleSnafu, Result};
use crate::ids::{self, Vote};
use crate::model::{CvrType, Election};

/// Hand-interpreted votes, keyed `pbcid -> bid -> cid -> vote`.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct AuditedVotes {
    pub by_collection: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vote>>>,
}

impl AuditedVotes {
    pub fn insert(&mut self, pbcid: &str, bid: &str, cid: &str, vote: Vote) {
        self.by_collection
            .entry(pbcid.to_string())
            .or_default()
            .entry(bid.to_string())
            .or_default()
            .insert(cid.to_string(), vote);
    }

    /// Ballots audited so far in `pbcid`.
    pub fn audited_count(&self, pbcid: &str) -> u64 {
        self.by_collection.get(pbcid).map_or(0, |b| b.len() as u64)
    }
}

/// Per-stage sample tallies, derived from the audited votes as of the
/// stage snapshot. Re-derivable; never persisted.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct SampleCounts {
    /// cid -> pbcid -> reported vote -> audited vote -> count.
    pub counts: BTreeMap<String, BTreeMap<String, BTreeMap<Vote, BTreeMap<Vote, u64>>>>,
    /// Ballots audited so far, per collection.
    pub audited: BTreeMap<String, u64>,
}

impl SampleCounts {
    pub fn stratum(&self, cid: &str, pbcid: &str, rvote: &Vote) -> Option<&BTreeMap<Vote, u64>> {
        self.counts
            .get(cid)
            .and_then(|per_coll| per_coll.get(pbcid))
            .and_then(|per_rvote| per_rvote.get(rvote))
    }

    /// Audited ballots relevant to `cid` across its collections.
    pub fn sample_total(&self, election: &Election, cid: &str) -> u64 {
        election
            .rel(cid)
            .iter()
            .map(|pbcid| self.audited.get(*pbcid).copied().unwrap_or(0))
            .sum()
    }
}

/// Validate the audited votes against the manifests and sampling orders,
/// then build the sample tallies.
///
/// `orders` maps each collection to its manifest-index permutation. The
/// audited ballots of a collection must form an initial segment of that
/// order: a transcript that reaches position `k` while missing an earlier
/// position fails with [`AuditError::OutOfOrderSample`].
pub fn build_sample_counts(
    election: &Election,
    orders: &BTreeMap<String, Vec<usize>>,
    audited: &AuditedVotes,
) -> Result<SampleCounts> {
    let mut out = SampleCounts::default();
    for pbcid in election.collections.keys() {
        out.audited.insert(pbcid.clone(), 0);
    }

    for (pbcid, ballots) in &audited.by_collection {
        let coll = election.collections.get(pbcid).ok_or_else(|| {
            AuditError::ModelConsistency {
                detail: format!("audited votes for undeclared collection `{}`", pbcid),
            }
        })?;
        let manifest = election.manifests.get(pbcid).ok_or_else(|| {
            AuditError::ModelConsistency {
                detail: format!("audited votes for unmanifested collection `{}`", pbcid),
            }
        })?;
        let order = orders.get(pbcid).ok_or_else(|| AuditError::ModelConsistency {
            detail: format!("no sampling order for collection `{}`", pbcid),
        })?;

        let manifest_bids: BTreeSet<&str> =
            manifest.entries.iter().map(|e| e.bid.as_str()).collect();
        for bid in ballots.keys() {
            if !manifest_bids.contains(bid.as_str()) {
                return Err(AuditError::ModelConsistency {
                    detail: format!(
                        "collection `{}` audited ballot `{}` is not in the manifest",
                        pbcid, bid
                    ),
                });
            }
        }

        check_initial_segment(pbcid, order, manifest, ballots)?;

        for (bid, votes) in ballots {
            for (cid, avote) in votes {
                let contest = election.contests.get(cid).ok_or_else(|| {
                    AuditError::ModelConsistency {
                        detail: format!("audited vote for undeclared contest `{}`", cid),
                    }
                })?;
                if !coll.cids.iter().any(|c| c == cid) {
                    return Err(AuditError::ModelConsistency {
                        detail: format!(
                            "collection `{}` audited a vote for contest `{}` it does not carry",
                            pbcid, cid
                        ),
                    });
                }
                ids::validate_selids(contest, avote)?;

                let rvote = match coll.cvr_type {
                    CvrType::Cvr => election.reported_vote(pbcid, bid, cid),
                    CvrType::NoCvr => Vote::no_cvr(),
                };
                *out.counts
                    .entry(cid.clone())
                    .or_default()
                    .entry(pbcid.clone())
                    .or_default()
                    .entry(rvote)
                    .or_default()
                    .entry(avote.clone())
                    .or_insert(0) += 1;
            }
        }
        out.audited.insert(pbcid.clone(), ballots.len() as u64);
    }

    for (cid, per_coll) in &out.counts {
        for (pbcid, per_rvote) in per_coll {
            for (rvote, tally) in per_rvote {
                debug!(
                    "sample counts {}.{}[{}]: {} audited",
                    cid,
                    pbcid,
                    rvote,
                    tally.values().sum::<u64>()
                );
            }
        }
    }
    Ok(out)
}

fn check_initial_segment(
    pbcid: &str,
    order: &[usize],
    manifest: &crate::model::Manifest,
    ballots: &BTreeMap<String, BTreeMap<String, Vote>>,
) -> Result<()> {
    if order.len() != manifest.len() {
        return Err(AuditError::ModelConsistency {
            detail: format!(
                "sampling order for `{}` covers {} ballots, manifest has {}",
                pbcid,
                order.len(),
                manifest.len()
            ),
        });
    }
    let mut boundary: Option<usize> = None;
    for (pos, &idx) in order.iter().enumerate() {
        let bid = &manifest.entries[idx].bid;
        match (ballots.contains_key(bid), boundary) {
            (true, Some(first_missing)) => {
                let missing_bid = manifest.entries[order[first_missing]].bid.clone();
                return OutOfOrderSampleSnafu {
                    pbcid,
                    missing_bid,
                }
                .fail();
            }
            (false, None) => boundary = Some(pos),
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::small_cvr_election;
    use crate::model::AuditSeed;
    use crate::sampling::sampling_order;

    fn orders_for(e: &Election) -> BTreeMap<String, Vec<usize>> {
        let seed = AuditSeed::parse("13456201235197891138").unwrap();
        e.manifests
            .iter()
            .map(|(pbcid, m)| (pbcid.clone(), sampling_order(&seed, pbcid, m.len())))
            .collect()
    }

    fn audit_prefix(e: &Election, orders: &BTreeMap<String, Vec<usize>>, n: usize) -> AuditedVotes {
        let mut av = AuditedVotes::default();
        let manifest = &e.manifests["J"];
        for &idx in orders["J"].iter().take(n) {
            let bid = &manifest.entries[idx].bid;
            let vote = e.reported_vote("J", bid, "C");
            av.insert("J", bid, "C", vote);
        }
        av
    }

    #[test]
    fn prefix_of_the_order_is_accepted() {
        let e = small_cvr_election();
        let orders = orders_for(&e);
        let av = audit_prefix(&e, &orders, 2);
        let counts = build_sample_counts(&e, &orders, &av).unwrap();
        assert_eq!(counts.audited["J"], 2);
        let total: u64 = counts.counts["C"]["J"]
            .values()
            .flat_map(|t| t.values())
            .sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn matching_interpretations_land_on_the_diagonal() {
        let e = small_cvr_election();
        let orders = orders_for(&e);
        let av = audit_prefix(&e, &orders, 4);
        let counts = build_sample_counts(&e, &orders, &av).unwrap();
        for (rvote, tally) in &counts.counts["C"]["J"] {
            for (avote, n) in tally {
                assert_eq!(rvote, avote);
                assert!(*n > 0);
            }
        }
    }

    #[test]
    fn skipped_order_position_is_rejected() {
        let e = small_cvr_election();
        let orders = orders_for(&e);
        let mut av = AuditedVotes::default();
        let manifest = &e.manifests["J"];
        // Audit position 3 of the order while skipping positions 1 and 2.
        let idx = orders["J"][2];
        let bid = &manifest.entries[idx].bid;
        av.insert("J", bid, "C", Vote::set(["1"]));
        let err = build_sample_counts(&e, &orders, &av).unwrap_err();
        let expected_missing = manifest.entries[orders["J"][0]].bid.clone();
        assert_eq!(
            err,
            AuditError::OutOfOrderSample {
                pbcid: "J".to_string(),
                missing_bid: expected_missing
            }
        );
    }

    #[test]
    fn unknown_ballot_id_is_rejected() {
        let e = small_cvr_election();
        let orders = orders_for(&e);
        let mut av = AuditedVotes::default();
        av.insert("J", "ghost", "C", Vote::set(["1"]));
        let err = build_sample_counts(&e, &orders, &av).unwrap_err();
        assert!(matches!(err, AuditError::ModelConsistency { .. }));
    }

    #[test]
    fn empty_transcripts_yield_zero_counts() {
        let e = small_cvr_election();
        let orders = orders_for(&e);
        let counts = build_sample_counts(&e, &orders, &AuditedVotes::default()).unwrap();
        assert_eq!(counts.audited["J"], 0);
        assert!(counts.counts.is_empty());
    }
}
