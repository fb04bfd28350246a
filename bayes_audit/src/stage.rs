//! Multi-stage audit control.
//!
//! A stage moves through `initializing -> sampling_order_frozen ->
//! ingesting -> risks_computed -> plan_emitted -> finalized`; the file
//! layer drives the I/O edges and this module supplies the decisions in
//! between: risk measurement, status transitions, the stopping rule, and
//! the next-stage sampling plan. Stage `000` performs setup only.
//!
//! State that must survive between stages (audited counts, statuses, the
//! plan, measured risks) travels as a [`StageState`]; everything else is
//! recomputed from the stage's input snapshot.

use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

use crate::errors::{FileIntegritySnafu, Result};
use crate::model::{AuditSpec, ContestStatus, Election, SamplingMode};
use crate::risk::measure_risks;
use crate::sample::SampleCounts;

/// Zero-padded stage label as used in file names (`000`, `001`, ...).
pub fn stage_label(stage: u32) -> String {
    format!("{:03}", stage)
}

/// Between-stage state, persisted by the file layer after each stage.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StageState {
    pub stage: u32,
    /// Ballots audited so far, per collection.
    pub audited: BTreeMap<String, u64>,
    pub statuses: BTreeMap<String, ContestStatus>,
    /// Cumulative target sample size for the next stage, per collection.
    pub plan: BTreeMap<String, u64>,
    /// Risks measured this stage (empty at stage 0).
    pub risks: BTreeMap<String, f64>,
}

/// One row of the per-contest audit output file.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct OutputRow {
    pub cid: String,
    pub method: String,
    pub measured_risk: f64,
    pub risk_limit: f64,
    pub upset_threshold: f64,
    pub status_after: ContestStatus,
    pub sample_total: u64,
}

/// One row of the per-collection audit plan file.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct PlanRow {
    pub pbcid: String,
    pub audited_so_far: u64,
    pub next_stage_increment: u64,
    pub estimated_total_needed: u64,
}

/// One row of the content snapshot binding a stage to its inputs.
#[derive(Eq, PartialEq, Debug, Clone, Serialize)]
pub struct SnapshotEntry {
    pub path: String,
    pub sha256: String,
}

/// Everything a finished stage hands back to the file layer.
#[derive(PartialEq, Debug, Clone)]
pub struct StageReport {
    pub state: StageState,
    pub outputs: Vec<OutputRow>,
    pub plan: Vec<PlanRow>,
    /// True when every contest reached a terminal status or no open
    /// active contest remains to drive further sampling.
    pub done: bool,
}

/// Initial state written by stage `000`: nothing audited, statuses as
/// configured, first plan equal to each collection's audit rate.
pub fn initial_state(election: &Election, audit: &AuditSpec) -> StageState {
    let audited: BTreeMap<String, u64> = election
        .collections
        .keys()
        .map(|pbcid| (pbcid.clone(), 0))
        .collect();
    let plan = election
        .collections
        .keys()
        .map(|pbcid| {
            let rate = audit.audit_rates.get(pbcid).copied().unwrap_or(0);
            (pbcid.clone(), rate.min(election.ballot_count(pbcid)))
        })
        .collect();
    let statuses = audit
        .contests
        .iter()
        .map(|(cid, params)| (cid.clone(), params.initial_status))
        .collect();
    StageState {
        stage: 0,
        audited,
        statuses,
        plan,
        risks: BTreeMap::new(),
    }
}

/// Run the decision core of stage `stage`: measure risks against the
/// ingested sample, update statuses, and plan the next stage.
pub fn run_stage(
    election: &Election,
    audit: &AuditSpec,
    prev: &StageState,
    counts: &SampleCounts,
    stage: u32,
) -> Result<StageReport> {
    let risks = measure_risks(election, audit, &prev.statuses, counts, stage)?;

    // Status transitions are atomic per stage, and terminal statuses are
    // sticky: once passed or upset, later inputs cannot reopen a contest.
    let mut statuses = prev.statuses.clone();
    for (cid, risk) in &risks {
        let params = &audit.contests[cid];
        if let Some(status) = statuses.get_mut(cid) {
            if *status != ContestStatus::Open {
                continue;
            }
            if *risk <= params.risk_limit {
                *status = ContestStatus::Passed;
            } else if *risk >= params.upset_threshold {
                *status = ContestStatus::Upset;
            }
        }
    }

    let outputs: Vec<OutputRow> = risks
        .iter()
        .map(|(cid, risk)| {
            let params = &audit.contests[cid];
            OutputRow {
                cid: cid.clone(),
                method: params.method.to_string(),
                measured_risk: *risk,
                risk_limit: params.risk_limit,
                upset_threshold: params.upset_threshold,
                status_after: statuses[cid],
                sample_total: counts.sample_total(election, cid),
            }
        })
        .collect();

    let plan = compute_plan(election, audit, &statuses, counts, &risks, prev);
    let done = is_done(audit, &statuses);
    if done {
        info!("audit complete at stage {}", stage_label(stage));
    }

    let plan_targets = plan
        .iter()
        .map(|row| (row.pbcid.clone(), row.audited_so_far + row.next_stage_increment))
        .collect();
    Ok(StageReport {
        state: StageState {
            stage,
            audited: counts.audited.clone(),
            statuses,
            plan: plan_targets,
            risks,
        },
        outputs,
        plan,
        done,
    })
}

/// The audit stops when no contest can change status anymore: every
/// contest terminal or off, or only opportunistic contests still open
/// (those never drive sampling, so their increments are all zero).
fn is_done(audit: &AuditSpec, statuses: &BTreeMap<String, ContestStatus>) -> bool {
    statuses.iter().all(|(cid, status)| match status {
        ContestStatus::Open => audit
            .contests
            .get(cid)
            .map_or(true, |p| p.sampling_mode == SamplingMode::Opportunistic),
        _ => true,
    })
}

/// True when `cid` makes its collections draw more ballots next stage.
fn drives_sampling(
    audit: &AuditSpec,
    statuses: &BTreeMap<String, ContestStatus>,
    cid: &str,
) -> bool {
    statuses.get(cid) == Some(&ContestStatus::Open)
        && audit
            .contests
            .get(cid)
            .map_or(false, |p| p.sampling_mode == SamplingMode::Active)
}

fn compute_plan(
    election: &Election,
    audit: &AuditSpec,
    statuses: &BTreeMap<String, ContestStatus>,
    counts: &SampleCounts,
    risks: &BTreeMap<String, f64>,
    prev: &StageState,
) -> Vec<PlanRow> {
    let mut rows = Vec::new();
    for pbcid in election.collections.keys() {
        let audited = counts.audited.get(pbcid).copied().unwrap_or(0);
        let total = election.ballot_count(pbcid);
        let rate = audit.audit_rates.get(pbcid).copied().unwrap_or(0);

        let drivers: Vec<&str> = election
            .contests
            .keys()
            .filter(|cid| drives_sampling(audit, statuses, cid))
            .filter(|cid| election.rel(cid).contains(&pbcid.as_str()))
            .map(String::as_str)
            .collect();

        let target = if drivers.is_empty() {
            audited
        } else {
            (audited + rate).min(total)
        };

        let estimated = if drivers.is_empty() {
            audited
        } else {
            drivers
                .iter()
                .map(|cid| estimate_total_needed(audit, risks, prev, cid, audited, rate, total))
                .max()
                .unwrap_or(total)
        };

        rows.push(PlanRow {
            pbcid: pbcid.clone(),
            audited_so_far: audited,
            next_stage_increment: target - audited,
            estimated_total_needed: estimated,
        });
    }
    rows
}

/// Advisory workload estimate by geometric extrapolation on the last two
/// stages' risk reduction, floored at one more stage at the audit rate and
/// capped at the collection size.
fn estimate_total_needed(
    audit: &AuditSpec,
    risks: &BTreeMap<String, f64>,
    prev: &StageState,
    cid: &str,
    audited: u64,
    rate: u64,
    total: u64,
) -> u64 {
    let floor = (audited + rate).min(total);
    let current = match risks.get(cid) {
        Some(&r) if r > 0.0 => r,
        _ => return floor,
    };
    let previous = match prev.risks.get(cid) {
        Some(&r) if r > 0.0 => r,
        _ => return total,
    };
    let ratio = current / previous;
    if ratio >= 1.0 {
        return total;
    }
    let limit = match audit.contests.get(cid) {
        Some(params) if params.risk_limit > 0.0 => params.risk_limit,
        _ => return total,
    };
    let stages = ((limit / current).ln() / ratio.ln()).ceil().max(1.0);
    let extra = (stages as u64).saturating_mul(rate);
    audited.saturating_add(extra).min(total).max(floor)
}

/// Reject snapshots in which two distinct paths carry identical content;
/// a duplicate input file is almost always a versioning mistake.
pub fn check_snapshot(entries: &[SnapshotEntry]) -> Result<()> {
    let mut by_hash: BTreeMap<&str, &str> = BTreeMap::new();
    for entry in entries {
        if let Some(earlier) = by_hash.insert(entry.sha256.as_str(), entry.path.as_str()) {
            return FileIntegritySnafu {
                path_a: earlier,
                path_b: entry.path.as_str(),
            }
            .fail();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{default_audit, small_cvr_election};
    use crate::model::{ContestStatus, SamplingMode};
    use crate::sample::{build_sample_counts, AuditedVotes};
    use crate::sampling::sampling_order;

    fn counts_for(
        e: &Election,
        audit: &AuditSpec,
        n: usize,
        flip: bool,
    ) -> SampleCounts {
        let orders: BTreeMap<String, Vec<usize>> = e
            .manifests
            .iter()
            .map(|(p, m)| (p.clone(), sampling_order(&audit.seed, p, m.len())))
            .collect();
        let mut av = AuditedVotes::default();
        let m = &e.manifests["J"];
        for &idx in orders["J"].iter().take(n) {
            let bid = &m.entries[idx].bid;
            let reported = e.reported_vote("J", bid, "C");
            let vote = if flip {
                let selid = if reported == crate::ids::Vote::set(["1"]) { "0" } else { "1" };
                crate::ids::Vote::set([selid])
            } else {
                reported
            };
            av.insert("J", bid, "C", vote);
        }
        build_sample_counts(e, &orders, &av).unwrap()
    }

    #[test]
    fn stage_zero_plans_the_audit_rate() {
        let e = small_cvr_election();
        let audit = default_audit(&e);
        let state = initial_state(&e, &audit);
        assert_eq!(state.stage, 0);
        assert_eq!(state.audited["J"], 0);
        assert_eq!(state.plan["J"], 2);
        assert_eq!(state.statuses["C"], ContestStatus::Open);
    }

    #[test]
    fn agreeing_sample_passes_and_stops() {
        let e = small_cvr_election();
        let audit = default_audit(&e);
        let prev = initial_state(&e, &audit);
        let counts = counts_for(&e, &audit, 4, false);
        let report = run_stage(&e, &audit, &prev, &counts, 1).unwrap();
        assert_eq!(report.state.statuses["C"], ContestStatus::Passed);
        assert!(report.done);
        // A passed contest stops driving the plan.
        assert_eq!(report.plan[0].next_stage_increment, 0);
        let risk = report.outputs[0].measured_risk;
        assert!((0.0..=1.0).contains(&risk));
    }

    #[test]
    fn terminal_statuses_are_sticky() {
        let e = small_cvr_election();
        let audit = default_audit(&e);
        let mut prev = initial_state(&e, &audit);
        prev.stage = 1;
        prev.statuses.insert("C".to_string(), ContestStatus::Passed);
        // Even a flipped sample cannot reopen a passed contest.
        let counts = counts_for(&e, &audit, 4, true);
        let report = run_stage(&e, &audit, &prev, &counts, 2).unwrap();
        assert_eq!(report.state.statuses["C"], ContestStatus::Passed);
        assert!(report.outputs.is_empty());
        assert!(report.done);
    }

    #[test]
    fn open_contest_keeps_sampling_at_the_audit_rate() {
        let e = small_cvr_election();
        let mut audit = default_audit(&e);
        // Force the contest to stay open by making the limits unreachable.
        audit.contests.get_mut("C").unwrap().risk_limit = 0.0;
        audit.contests.get_mut("C").unwrap().upset_threshold = 1.0;
        let prev = initial_state(&e, &audit);
        let counts = counts_for(&e, &audit, 2, false);
        let report = run_stage(&e, &audit, &prev, &counts, 1).unwrap();
        assert_eq!(report.state.statuses["C"], ContestStatus::Open);
        assert!(!report.done);
        assert_eq!(report.plan[0].audited_so_far, 2);
        // Rate 2, collection of 4: cumulative target 4.
        assert_eq!(report.plan[0].next_stage_increment, 2);
        assert_eq!(report.state.plan["J"], 4);
    }

    #[test]
    fn opportunistic_contests_do_not_drive_sampling() {
        let e = small_cvr_election();
        let mut audit = default_audit(&e);
        let params = audit.contests.get_mut("C").unwrap();
        params.sampling_mode = SamplingMode::Opportunistic;
        params.risk_limit = 0.0;
        params.upset_threshold = 1.0;
        let prev = initial_state(&e, &audit);
        let counts = counts_for(&e, &audit, 2, false);
        let report = run_stage(&e, &audit, &prev, &counts, 1).unwrap();
        // Still open, still measured, but nothing drives collection J.
        assert_eq!(report.state.statuses["C"], ContestStatus::Open);
        assert_eq!(report.outputs.len(), 1);
        assert_eq!(report.plan[0].next_stage_increment, 0);
        assert!(report.done);
    }

    #[test]
    fn advisory_estimate_extrapolates_geometrically() {
        let e = small_cvr_election();
        let mut audit = default_audit(&e);
        audit.audit_rates.insert("J".to_string(), 1);
        let mut prev = initial_state(&e, &audit);
        prev.risks.insert("C".to_string(), 0.4);
        let mut risks = BTreeMap::new();
        risks.insert("C".to_string(), 0.2);
        // limit 0.05, ratio 0.5: two more halvings.
        let est = estimate_total_needed(&audit, &risks, &prev, "C", 2, 1, 4);
        assert_eq!(est, 4);
        let est = estimate_total_needed(&audit, &risks, &prev, "C", 0, 1, 100);
        assert_eq!(est, 2);
    }

    #[test]
    fn duplicate_snapshot_content_is_rejected() {
        let entries = vec![
            SnapshotEntry {
                path: "a.csv".to_string(),
                sha256: "00".to_string(),
            },
            SnapshotEntry {
                path: "b.csv".to_string(),
                sha256: "00".to_string(),
            },
        ];
        let err = check_snapshot(&entries).unwrap_err();
        assert!(matches!(
            err,
            crate::errors::AuditError::FileIntegrity { .. }
        ));
        assert!(check_snapshot(&entries[..1]).is_ok());
    }
}
