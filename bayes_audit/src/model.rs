//! Typed in-memory representation of an election under audit: structure,
//! ballot manifests, reported votes and outcomes, and audit parameters.
//!
//! The model is built once per stage by the file layer, checked for
//! consistency, and then read-only for the rest of the stage.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::{
    ManifestArithmeticSnafu, ModelConsistencySnafu, ParameterOutOfRangeSnafu, Result,
    SeedInvalidSnafu,
};
use crate::ids::{self, Vote};

#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ElectionMeta {
    pub name: String,
    pub dirname: String,
    pub date: String,
    pub url: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ContestType {
    Plurality,
    // Preferential types are reserved; they need rank-ordered votes.
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum WriteinsPolicy {
    No,
    Qualified,
    Arbitrary,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Contest {
    pub cid: String,
    pub contest_type: ContestType,
    /// Number of winners; at least 1.
    pub winners: u32,
    pub writeins: WriteinsPolicy,
    /// Declared non-write-in selection ids.
    pub selids: BTreeSet<String>,
    /// Pre-qualified write-in selection ids (each starting with `+`).
    pub qualified_writeins: BTreeSet<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum CvrType {
    Cvr,
    NoCvr,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Collection {
    pub pbcid: String,
    /// Contact for the collection manager.
    pub manager: String,
    pub cvr_type: CvrType,
    /// Contests whose ballots this collection may carry.
    pub cids: Vec<String>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ManifestEntry {
    pub boxid: String,
    /// 1-based position within the box.
    pub position: u32,
    pub stamp: String,
    pub bid: String,
    pub comments: String,
}

/// Expanded ballot manifest for one collection; one entry per paper ballot.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reported votes: per-ballot records for CVR collections, per-contest
/// tallies for noCVR collections.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct ReportedVotes {
    /// pbcid -> bid -> cid -> vote.
    pub cvr: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vote>>>,
    /// pbcid -> cid -> vote -> count.
    pub tallies: BTreeMap<String, BTreeMap<String, BTreeMap<Vote, u64>>>,
}

/// The public audit seed: a decimal string of at least 20 digits produced
/// by a public die-roll ceremony. Constant across the audit.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct AuditSeed(String);

impl AuditSeed {
    pub fn parse(raw: &str) -> Result<AuditSeed> {
        let seed = ids::reduce(raw);
        if seed.len() < 20 || !seed.chars().all(|c| c.is_ascii_digit()) {
            return SeedInvalidSnafu { seed }.fail();
        }
        Ok(AuditSeed(seed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum RiskMethod {
    Bayes,
}

impl std::fmt::Display for RiskMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskMethod::Bayes => write!(f, "Bayes"),
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SamplingMode {
    /// Drives sample-size growth in its collections.
    Active,
    /// Measured, but never a reason to draw more ballots.
    Opportunistic,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ContestStatus {
    Open,
    Passed,
    Upset,
    Off,
}

impl ContestStatus {
    /// Passed and Upset are terminal; Off never measures.
    pub fn is_terminal(self) -> bool {
        matches!(self, ContestStatus::Passed | ContestStatus::Upset)
    }
}

impl std::fmt::Display for ContestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContestStatus::Open => "Open",
            ContestStatus::Passed => "Passed",
            ContestStatus::Upset => "Upset",
            ContestStatus::Off => "Off",
        };
        write!(f, "{}", s)
    }
}

/// Per-contest audit parameters.
#[derive(PartialEq, Debug, Clone)]
pub struct ContestAudit {
    pub method: RiskMethod,
    /// Risk at or below which the contest passes.
    pub risk_limit: f64,
    /// Risk at or above which a full hand count is required.
    pub upset_threshold: f64,
    pub sampling_mode: SamplingMode,
    pub initial_status: ContestStatus,
    /// Dirichlet concentration for the prior over vote categories.
    pub pseudocount_base: f64,
    /// Concentration when the category equals the stratum's reported vote.
    pub pseudocount_match: f64,
}

/// Election-wide audit parameters.
#[derive(PartialEq, Debug, Clone)]
pub struct GlobalAudit {
    pub max_audit_stages: u32,
    /// Monte-Carlo trials per measured contest.
    pub n_trials: u64,
    /// Worker threads for the risk estimator; 0 means one per core.
    pub n_workers: usize,
    /// Relative weight of reported tallies as prior observations in noCVR
    /// strata.
    pub nocvr_tally_weight: f64,
}

impl Default for GlobalAudit {
    fn default() -> GlobalAudit {
        GlobalAudit {
            max_audit_stages: 20,
            n_trials: 100_000,
            n_workers: 0,
            nocvr_tally_weight: 1.0,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct AuditSpec {
    pub global: GlobalAudit,
    pub contests: BTreeMap<String, ContestAudit>,
    /// Max ballots audited per stage, per collection.
    pub audit_rates: BTreeMap<String, u64>,
    pub seed: AuditSeed,
}

/// Everything loaded for one election, after reduction and expansion.
#[derive(PartialEq, Debug, Clone)]
pub struct Election {
    pub meta: ElectionMeta,
    pub contests: BTreeMap<String, Contest>,
    pub collections: BTreeMap<String, Collection>,
    pub manifests: BTreeMap<String, Manifest>,
    pub reported: ReportedVotes,
    /// Reported outcome: ordered winner selection ids per contest.
    pub outcomes: BTreeMap<String, Vec<String>>,
}

impl Election {
    /// Collections that may carry ballots for `cid`, in id order.
    pub fn rel(&self, cid: &str) -> Vec<&str> {
        self.collections
            .values()
            .filter(|coll| coll.cids.iter().any(|c| c == cid))
            .map(|coll| coll.pbcid.as_str())
            .collect()
    }

    /// Number of paper ballots in the collection's manifest.
    pub fn ballot_count(&self, pbcid: &str) -> u64 {
        self.manifests.get(pbcid).map_or(0, |m| m.len() as u64)
    }

    /// Reported vote of a CVR ballot for a contest; `-NoRecord` when the
    /// scanner recorded nothing for it.
    pub fn reported_vote(&self, pbcid: &str, bid: &str, cid: &str) -> Vote {
        self.reported
            .cvr
            .get(pbcid)
            .and_then(|ballots| ballots.get(bid))
            .and_then(|votes| votes.get(cid))
            .cloned()
            .unwrap_or_else(Vote::no_record)
    }

    /// Reported stratum sizes for `(cid, pbcid)`: ballots per reported
    /// vote for CVR collections, the whole collection behind the `-noCVR`
    /// sentinel otherwise.
    pub fn reported_strata(&self, cid: &str, pbcid: &str) -> BTreeMap<Vote, u64> {
        let mut strata = BTreeMap::new();
        match self.collections.get(pbcid).map(|coll| coll.cvr_type) {
            Some(CvrType::Cvr) => {
                if let Some(manifest) = self.manifests.get(pbcid) {
                    for entry in &manifest.entries {
                        let rvote = self.reported_vote(pbcid, &entry.bid, cid);
                        *strata.entry(rvote).or_insert(0) += 1;
                    }
                }
            }
            Some(CvrType::NoCvr) => {
                strata.insert(Vote::no_cvr(), self.ballot_count(pbcid));
            }
            None => {}
        }
        strata
    }

    /// Fail with `ModelConsistency` (or a more specific error) before any
    /// sampling if the loaded tables disagree.
    pub fn check_consistency(&self) -> Result<()> {
        check_structure(&self.contests, &self.collections)?;

        for coll in self.collections.values() {
            if !self.manifests.contains_key(&coll.pbcid) {
                return inconsistency(format!("collection `{}` has no ballot manifest", coll.pbcid));
            }
        }
        for pbcid in self.manifests.keys() {
            if !self.collections.contains_key(pbcid) {
                return inconsistency(format!("manifest for undeclared collection `{}`", pbcid));
            }
        }

        self.check_manifests()?;
        self.check_reported()?;
        self.check_outcomes()?;
        Ok(())
    }

    fn check_manifests(&self) -> Result<()> {
        for (pbcid, manifest) in &self.manifests {
            let mut bids = BTreeSet::new();
            let mut by_box: BTreeMap<&str, Vec<&ManifestEntry>> = BTreeMap::new();
            for entry in &manifest.entries {
                check_id(&entry.bid)?;
                if !bids.insert(entry.bid.as_str()) {
                    return inconsistency(format!(
                        "collection `{}` manifest repeats ballot id `{}`",
                        pbcid, entry.bid
                    ));
                }
                by_box.entry(entry.boxid.as_str()).or_default().push(entry);
            }
            for (boxid, entries) in by_box {
                let mut positions: Vec<u32> = entries.iter().map(|e| e.position).collect();
                positions.sort_unstable();
                if positions
                    .iter()
                    .enumerate()
                    .any(|(i, &p)| p != i as u32 + 1)
                {
                    return inconsistency(format!(
                        "collection `{}` box `{}` positions are not dense from 1",
                        pbcid, boxid
                    ));
                }
                let stamps: BTreeSet<&str> = entries
                    .iter()
                    .filter(|e| !e.stamp.is_empty())
                    .map(|e| e.stamp.as_str())
                    .collect();
                let stamped = entries.iter().filter(|e| !e.stamp.is_empty()).count();
                if stamps.len() != stamped {
                    return inconsistency(format!(
                        "collection `{}` box `{}` repeats a stamp",
                        pbcid, boxid
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_reported(&self) -> Result<()> {
        for pbcid in self.reported.cvr.keys() {
            match self.collections.get(pbcid) {
                None => return inconsistency(format!("CVRs for undeclared collection `{}`", pbcid)),
                Some(coll) if coll.cvr_type == CvrType::NoCvr => {
                    return inconsistency(format!(
                        "per-ballot CVRs reported for noCVR collection `{}`",
                        pbcid
                    ));
                }
                Some(_) => {}
            }
        }
        for pbcid in self.reported.tallies.keys() {
            match self.collections.get(pbcid) {
                None => {
                    return inconsistency(format!("tallies for undeclared collection `{}`", pbcid))
                }
                Some(coll) if coll.cvr_type == CvrType::Cvr => {
                    return inconsistency(format!(
                        "reported tallies given for CVR collection `{}`",
                        pbcid
                    ));
                }
                Some(_) => {}
            }
        }

        for (pbcid, coll) in &self.collections {
            let manifest_total = self.ballot_count(pbcid);
            match coll.cvr_type {
                CvrType::Cvr => {
                    let ballots = self.reported.cvr.get(pbcid);
                    let declared = ballots.map_or(0, |b| b.len() as u64);
                    if declared != manifest_total {
                        return ManifestArithmeticSnafu {
                            pbcid: pbcid.clone(),
                            manifest_total,
                            declared,
                        }
                        .fail();
                    }
                    let manifest_bids: BTreeSet<&str> = self
                        .manifests
                        .get(pbcid)
                        .map(|m| m.entries.iter().map(|e| e.bid.as_str()).collect())
                        .unwrap_or_default();
                    if let Some(ballots) = ballots {
                        for (bid, votes) in ballots {
                            if !manifest_bids.contains(bid.as_str()) {
                                return inconsistency(format!(
                                    "collection `{}` reports CVR for ballot `{}` not in manifest",
                                    pbcid, bid
                                ));
                            }
                            for (cid, vote) in votes {
                                let contest = self.contest_for(pbcid, cid, coll)?;
                                ids::validate_selids(contest, vote)?;
                            }
                        }
                    }
                }
                CvrType::NoCvr => {
                    if let Some(tallies) = self.reported.tallies.get(pbcid) {
                        for (cid, tally) in tallies {
                            let contest = self.contest_for(pbcid, cid, coll)?;
                            let mut declared = 0u64;
                            for (vote, count) in tally {
                                ids::validate_selids(contest, vote)?;
                                declared += count;
                            }
                            if declared != manifest_total {
                                return ManifestArithmeticSnafu {
                                    pbcid: pbcid.clone(),
                                    manifest_total,
                                    declared,
                                }
                                .fail();
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn check_outcomes(&self) -> Result<()> {
        for cid in self.contests.keys() {
            if !self.outcomes.contains_key(cid) {
                return inconsistency(format!("no reported outcome for contest `{}`", cid));
            }
        }
        for (cid, winners) in &self.outcomes {
            let contest = match self.contests.get(cid) {
                Some(c) => c,
                None => {
                    return inconsistency(format!("reported outcome for undeclared contest `{}`", cid))
                }
            };
            if winners.len() != contest.winners as usize {
                return inconsistency(format!(
                    "contest `{}` reports {} winners, expected {}",
                    cid,
                    winners.len(),
                    contest.winners
                ));
            }
            for selid in winners {
                let known = contest.selids.contains(selid.as_str())
                    || contest.qualified_writeins.contains(selid.as_str())
                    || (contest.writeins == WriteinsPolicy::Arbitrary
                        && ids::is_writein_selid(selid));
                if !known {
                    return inconsistency(format!(
                        "contest `{}` reported winner `{}` is not a valid selection",
                        cid, selid
                    ));
                }
            }
        }
        Ok(())
    }

    fn contest_for<'a>(&'a self, pbcid: &str, cid: &str, coll: &Collection) -> Result<&'a Contest> {
        if !coll.cids.iter().any(|c| c == cid) {
            return Err(crate::errors::AuditError::ModelConsistency {
                detail: format!(
                    "collection `{}` reports votes for contest `{}` it does not carry",
                    pbcid, cid
                ),
            });
        }
        self.contests.get(cid).ok_or_else(|| {
            crate::errors::AuditError::ModelConsistency {
                detail: format!("reported votes for undeclared contest `{}`", cid),
            }
        })
    }
}

impl AuditSpec {
    /// Range checks for every audit parameter, against the election they
    /// will drive.
    pub fn check(&self, election: &Election) -> Result<()> {
        let g = &self.global;
        if g.max_audit_stages < 1 {
            return param_error("global", "max_audit_stages", g.max_audit_stages);
        }
        if g.n_trials < 1 {
            return param_error("global", "n_trials", g.n_trials);
        }
        if !(g.nocvr_tally_weight >= 0.0) {
            return param_error("global", "nocvr_tally_weight", g.nocvr_tally_weight);
        }

        for cid in election.contests.keys() {
            if !self.contests.contains_key(cid) {
                return inconsistency(format!("no audit parameters for contest `{}`", cid));
            }
        }
        for (cid, params) in &self.contests {
            if !election.contests.contains_key(cid) {
                return inconsistency(format!("audit parameters for undeclared contest `{}`", cid));
            }
            if !(0.0..=1.0).contains(&params.risk_limit) {
                return param_error(cid, "risk_limit", params.risk_limit);
            }
            if !(0.0..=1.0).contains(&params.upset_threshold) {
                return param_error(cid, "upset_threshold", params.upset_threshold);
            }
            if params.upset_threshold < params.risk_limit {
                return param_error(cid, "upset_threshold", params.upset_threshold);
            }
            if !(params.pseudocount_base > 0.0) {
                return param_error(cid, "pseudocount", params.pseudocount_base);
            }
            if !(params.pseudocount_match > 0.0) {
                return param_error(cid, "pseudocount_match", params.pseudocount_match);
            }
        }

        for pbcid in election.collections.keys() {
            if !self.audit_rates.contains_key(pbcid) {
                return inconsistency(format!("no audit rate for collection `{}`", pbcid));
            }
        }
        for (pbcid, rate) in &self.audit_rates {
            if !election.collections.contains_key(pbcid) {
                return inconsistency(format!("audit rate for undeclared collection `{}`", pbcid));
            }
            if *rate == 0 {
                return param_error(pbcid, "max_audit_rate", rate);
            }
        }
        Ok(())
    }
}

/// Structural checks that need no reported data: declared contests and
/// collections alone.
pub fn check_structure(
    contests: &BTreeMap<String, Contest>,
    collections: &BTreeMap<String, Collection>,
) -> Result<()> {
    if contests.is_empty() {
        return inconsistency("no contests declared");
    }
    if collections.is_empty() {
        return inconsistency("no paper ballot collections declared");
    }

    for contest in contests.values() {
        check_id(&contest.cid)?;
        if contest.winners < 1 {
            return ParameterOutOfRangeSnafu {
                scope: contest.cid.clone(),
                name: "winners",
                value: contest.winners.to_string(),
            }
            .fail();
        }
        for selid in &contest.selids {
            check_id(selid)?;
            if ids::is_special_selid(selid) || ids::is_writein_selid(selid) {
                return inconsistency(format!(
                    "contest `{}` declares `{}` among plain selections",
                    contest.cid, selid
                ));
            }
        }
        for selid in &contest.qualified_writeins {
            if !ids::is_writein_selid(selid) {
                return inconsistency(format!(
                    "contest `{}` qualified write-in `{}` must start with `+`",
                    contest.cid, selid
                ));
            }
        }
    }

    for coll in collections.values() {
        check_id(&coll.pbcid)?;
        for cid in &coll.cids {
            if !contests.contains_key(cid) {
                return inconsistency(format!(
                    "collection `{}` lists undeclared contest `{}`",
                    coll.pbcid, cid
                ));
            }
        }
    }
    Ok(())
}

fn inconsistency<T>(detail: impl Into<String>) -> Result<T> {
    ModelConsistencySnafu {
        detail: detail.into(),
    }
    .fail()
}

fn param_error<T>(scope: &str, name: &str, value: impl ToString) -> Result<T> {
    ParameterOutOfRangeSnafu {
        scope,
        name,
        value: value.to_string(),
    }
    .fail()
}

/// Identifiers travel through comma-separated files; an embedded comma
/// would corrupt every row it appears in.
fn check_id(id: &str) -> Result<()> {
    if id.contains(',') {
        return inconsistency(format!("identifier `{}` contains a comma", id));
    }
    if id.is_empty() {
        return inconsistency("empty identifier");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::AuditError;

    pub(crate) fn two_way_contest(cid: &str) -> Contest {
        Contest {
            cid: cid.to_string(),
            contest_type: ContestType::Plurality,
            winners: 1,
            writeins: WriteinsPolicy::No,
            selids: ["0", "1"].iter().map(|s| s.to_string()).collect(),
            qualified_writeins: BTreeSet::new(),
        }
    }

    fn manifest(n: usize) -> Manifest {
        Manifest {
            entries: (0..n)
                .map(|i| ManifestEntry {
                    boxid: "B1".to_string(),
                    position: i as u32 + 1,
                    stamp: format!("S{:04}", i + 1),
                    bid: format!("B-{:04}", i + 1),
                    comments: String::new(),
                })
                .collect(),
        }
    }

    pub(crate) fn small_cvr_election() -> Election {
        let manifest = manifest(4);
        let mut cvr = BTreeMap::new();
        let mut ballots = BTreeMap::new();
        for (i, entry) in manifest.entries.iter().enumerate() {
            let vote = Vote::set([if i == 0 { "0" } else { "1" }]);
            let mut votes = BTreeMap::new();
            votes.insert("C".to_string(), vote);
            ballots.insert(entry.bid.clone(), votes);
        }
        cvr.insert("J".to_string(), ballots);

        Election {
            meta: ElectionMeta::default(),
            contests: [("C".to_string(), two_way_contest("C"))].into_iter().collect(),
            collections: [(
                "J".to_string(),
                Collection {
                    pbcid: "J".to_string(),
                    manager: "abe@example.org".to_string(),
                    cvr_type: CvrType::Cvr,
                    cids: vec!["C".to_string()],
                },
            )]
            .into_iter()
            .collect(),
            manifests: [("J".to_string(), manifest)].into_iter().collect(),
            reported: ReportedVotes {
                cvr,
                tallies: BTreeMap::new(),
            },
            outcomes: [("C".to_string(), vec!["1".to_string()])].into_iter().collect(),
        }
    }

    #[test]
    fn consistent_model_passes() {
        small_cvr_election().check_consistency().unwrap();
    }

    #[test]
    fn rel_follows_collection_contest_lists() {
        let e = small_cvr_election();
        assert_eq!(e.rel("C"), vec!["J"]);
        assert!(e.rel("missing").is_empty());
    }

    #[test]
    fn manifest_mismatch_is_rejected() {
        let mut e = small_cvr_election();
        e.manifests.get_mut("J").unwrap().entries.pop();
        // Dense positions still hold after popping the tail.
        let err = e.check_consistency().unwrap_err();
        assert!(matches!(err, AuditError::ManifestArithmetic { .. }));
    }

    #[test]
    fn unknown_reported_selection_is_rejected() {
        let mut e = small_cvr_election();
        e.reported
            .cvr
            .get_mut("J")
            .unwrap()
            .get_mut("B-0001")
            .unwrap()
            .insert("C".to_string(), Vote::set(["9"]));
        let err = e.check_consistency().unwrap_err();
        assert!(matches!(err, AuditError::UnknownSelection { .. }));
    }

    #[test]
    fn undeclared_contest_in_collection_is_rejected() {
        let mut e = small_cvr_election();
        e.collections
            .get_mut("J")
            .unwrap()
            .cids
            .push("ghost".to_string());
        let err = e.check_consistency().unwrap_err();
        assert!(matches!(err, AuditError::ModelConsistency { .. }));
    }

    #[test]
    fn seed_must_be_twenty_digits() {
        assert!(AuditSeed::parse("13456201235197891138").is_ok());
        assert!(matches!(
            AuditSeed::parse("1234").unwrap_err(),
            AuditError::SeedInvalid { .. }
        ));
        assert!(matches!(
            AuditSeed::parse("1345620123519789113x").unwrap_err(),
            AuditError::SeedInvalid { .. }
        ));
    }

    #[test]
    fn reported_strata_for_cvr_count_by_reported_vote() {
        let e = small_cvr_election();
        let strata = e.reported_strata("C", "J");
        assert_eq!(strata.get(&Vote::set(["1"])), Some(&3));
        assert_eq!(strata.get(&Vote::set(["0"])), Some(&1));
    }

    pub(crate) fn default_audit(e: &Election) -> AuditSpec {
        AuditSpec {
            global: GlobalAudit {
                n_trials: 200,
                ..GlobalAudit::default()
            },
            contests: e
                .contests
                .keys()
                .map(|cid| {
                    (
                        cid.clone(),
                        ContestAudit {
                            method: RiskMethod::Bayes,
                            risk_limit: 0.05,
                            upset_threshold: 0.99,
                            sampling_mode: SamplingMode::Active,
                            initial_status: ContestStatus::Open,
                            pseudocount_base: 1.0,
                            pseudocount_match: 1.0,
                        },
                    )
                })
                .collect(),
            audit_rates: e.collections.keys().map(|p| (p.clone(), 2)).collect(),
            seed: AuditSeed::parse("13456201235197891138").unwrap(),
        }
    }

    #[test]
    fn parameter_ranges_are_enforced() {
        let e = small_cvr_election();
        let mut audit = default_audit(&e);
        audit.check(&e).unwrap();

        audit.contests.get_mut("C").unwrap().risk_limit = 1.5;
        assert!(matches!(
            audit.check(&e).unwrap_err(),
            AuditError::ParameterOutOfRange { .. }
        ));

        let mut audit = default_audit(&e);
        audit.contests.get_mut("C").unwrap().upset_threshold = 0.01;
        assert!(matches!(
            audit.check(&e).unwrap_err(),
            AuditError::ParameterOutOfRange { .. }
        ));

        let mut audit = default_audit(&e);
        audit.contests.get_mut("C").unwrap().pseudocount_base = 0.0;
        assert!(matches!(
            audit.check(&e).unwrap_err(),
            AuditError::ParameterOutOfRange { .. }
        ));
    }
}
