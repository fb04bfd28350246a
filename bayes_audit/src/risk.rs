//! Bayesian risk measurement.
//!
//! For every open contest the estimator runs a Monte-Carlo simulation of
//! the posterior over the full (mostly unseen) set of paper ballots and
//! reports the fraction of trials in which the simulated outcome differs
//! from the reported one. Comparison and ballot-polling audits blend here:
//! a noCVR collection simply contributes a single `-noCVR` stratum whose
//! prior is seeded from the reported tally.
//!
//! Each stratum's posterior is the Polya urn over its outcome categories,
//! realized through its gamma representation: one Dirichlet draw per
//! stratum and trial, with the unseen ballot mass allocated from the draw.
//! All randomness comes from the seeded counter-mode stream in domain
//! `risk:<cid>:<stage>`; each trial owns a disjoint counter range, so the
//! measured risk is independent of worker count and scheduling.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use log::{debug, info};

use crate::errors::{AuditError, Result};
use crate::ids::{self, Vote, VoteKind};
use crate::model::{AuditSpec, Contest, ContestStatus, CvrType, Election, WriteinsPolicy};
use crate::outcomes::compute_winners;
use crate::prng::Prng;
use crate::sample::SampleCounts;

/// Counter range reserved per Monte-Carlo trial. A trial consumes a few
/// draws per stratum category, far below this.
const TRIAL_COUNTER_STRIDE: u64 = 1 << 32;

/// Trials handed to a worker at a time.
const TRIAL_CHUNK: u64 = 1024;

/// Urn category absorbing arbitrary (unlisted) write-ins.
const WRITEIN_CATEGORY: &str = "+write-in";

/// Measure the risk of every contest whose status is `Open`.
///
/// Returns `cid -> risk`, with risks in `[0, 1]`. Contests with a
/// terminal or `Off` status are not measured.
pub fn measure_risks(
    election: &Election,
    audit: &AuditSpec,
    statuses: &BTreeMap<String, ContestStatus>,
    counts: &SampleCounts,
    stage: u32,
) -> Result<BTreeMap<String, f64>> {
    let mut tasks = Vec::new();
    for (cid, contest) in &election.contests {
        if statuses.get(cid).copied() != Some(ContestStatus::Open) {
            continue;
        }
        tasks.push(build_task(election, audit, contest, counts, stage)?);
    }
    if tasks.is_empty() {
        return Ok(BTreeMap::new());
    }

    let n_trials = audit.global.n_trials;
    let mut chunks: Vec<(usize, u64, u64)> = Vec::new();
    for task_index in 0..tasks.len() {
        let mut lo = 0;
        while lo < n_trials {
            let hi = (lo + TRIAL_CHUNK).min(n_trials);
            chunks.push((task_index, lo, hi));
            lo = hi;
        }
    }

    let failures: Vec<AtomicU64> = tasks.iter().map(|_| AtomicU64::new(0)).collect();
    let next_chunk = AtomicUsize::new(0);
    let seed = audit.seed.as_str();
    let workers = effective_workers(audit.global.n_workers).min(chunks.len()).max(1);
    debug!(
        "risk measurement: {} contests x {} trials on {} workers",
        tasks.len(),
        n_trials,
        workers
    );

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let k = next_chunk.fetch_add(1, Ordering::Relaxed);
                if k >= chunks.len() {
                    break;
                }
                let (task_index, lo, hi) = chunks[k];
                let wrong = run_trials(&tasks[task_index], seed, lo, hi);
                failures[task_index].fetch_add(wrong, Ordering::Relaxed);
            });
        }
    });

    let mut risks = BTreeMap::new();
    for (task, fails) in tasks.iter().zip(&failures) {
        let risk = fails.load(Ordering::Relaxed) as f64 / n_trials as f64;
        info!("risk {}: {:.6}", task.cid, risk);
        risks.insert(task.cid.clone(), risk);
    }
    Ok(risks)
}

/// Worker-thread count; 0 requests one per available core.
fn effective_workers(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

struct Stratum {
    /// Ballots of this stratum not yet audited.
    unseen: f64,
    /// Dirichlet hyperparameters per category: audited counts plus
    /// pseudocounts plus (noCVR only) the weighted reported tally.
    weights: Vec<f64>,
}

struct ContestTask {
    cid: String,
    domain: String,
    contest: Contest,
    reported_winners: BTreeSet<String>,
    categories: Vec<Vote>,
    /// Trial-tally mass fixed across trials: per category, the audited
    /// counts plus pseudocounts summed over strata.
    base_tally: Vec<f64>,
    strata: Vec<Stratum>,
}

fn build_task(
    election: &Election,
    audit: &AuditSpec,
    contest: &Contest,
    counts: &SampleCounts,
    stage: u32,
) -> Result<ContestTask> {
    let cid = &contest.cid;
    let params = audit
        .contests
        .get(cid)
        .ok_or_else(|| AuditError::ModelConsistency {
            detail: format!("no audit parameters for contest `{}`", cid),
        })?;

    let mut category_set: BTreeSet<Vote> = BTreeSet::new();
    category_set.insert(Vote::undervote());
    category_set.insert(Vote::set(["-Invalid"]));
    category_set.insert(Vote::set(["-Overvote"]));
    for selid in &contest.selids {
        category_set.insert(Vote::set([selid.as_str()]));
    }
    for selid in &contest.qualified_writeins {
        category_set.insert(Vote::set([selid.as_str()]));
    }
    if contest.writeins == WriteinsPolicy::Arbitrary {
        category_set.insert(Vote::set([WRITEIN_CATEGORY]));
    }
    // Observed interpretations and reported tallies can introduce further
    // special categories (e.g. `-Absent`); fold them in so the urn covers
    // everything seen.
    for pbcid in election.rel(cid) {
        if let Some(per_rvote) = counts.counts.get(cid).and_then(|c| c.get(pbcid)) {
            for tally in per_rvote.values() {
                for avote in tally.keys() {
                    category_set.insert(category_of(contest, avote));
                }
            }
        }
        if let Some(tally) = election
            .reported
            .tallies
            .get(pbcid)
            .and_then(|per_cid| per_cid.get(cid))
        {
            for vote in tally.keys() {
                category_set.insert(category_of(contest, vote));
            }
        }
    }
    let categories: Vec<Vote> = category_set.into_iter().collect();
    let index_of: BTreeMap<&Vote, usize> =
        categories.iter().enumerate().map(|(i, v)| (v, i)).collect();

    let mut base_tally = vec![0.0; categories.len()];
    let mut strata = Vec::new();
    for pbcid in election.rel(cid) {
        let coll = &election.collections[pbcid];
        let mut stratum_sizes = election.reported_strata(cid, pbcid);
        // Defensive union: audited strata the reported data never named.
        if let Some(per_rvote) = counts.counts.get(cid).and_then(|c| c.get(pbcid)) {
            for rvote in per_rvote.keys() {
                stratum_sizes.entry(rvote.clone()).or_insert(0);
            }
        }

        for (rvote, size) in stratum_sizes {
            let mut observed = vec![0u64; categories.len()];
            if let Some(tally) = counts.stratum(cid, pbcid, &rvote) {
                for (avote, n) in tally {
                    observed[index_of[&category_of(contest, avote)]] += n;
                }
            }
            let sample_size: u64 = observed.iter().sum();

            let mut weights = vec![0.0; categories.len()];
            for (i, category) in categories.iter().enumerate() {
                let pseudo = if *category == rvote {
                    params.pseudocount_match
                } else {
                    params.pseudocount_base
                };
                weights[i] = observed[i] as f64 + pseudo;
                base_tally[i] += observed[i] as f64 + pseudo;
            }
            if coll.cvr_type == CvrType::NoCvr {
                if let Some(tally) = election
                    .reported
                    .tallies
                    .get(pbcid)
                    .and_then(|per_cid| per_cid.get(cid))
                {
                    for (vote, n) in tally {
                        weights[index_of[&category_of(contest, vote)]] +=
                            audit.global.nocvr_tally_weight * *n as f64;
                    }
                }
            }

            strata.push(Stratum {
                unseen: size.saturating_sub(sample_size) as f64,
                weights,
            });
        }
    }

    let reported_winners: BTreeSet<String> = election
        .outcomes
        .get(cid)
        .ok_or_else(|| AuditError::ModelConsistency {
            detail: format!("no reported outcome for contest `{}`", cid),
        })?
        .iter()
        .cloned()
        .collect();
    Ok(ContestTask {
        cid: cid.clone(),
        domain: format!("risk:{}:{:03}", cid, stage),
        contest: contest.clone(),
        reported_winners,
        categories,
        base_tally,
        strata,
    })
}

/// Map an audited vote onto its urn category.
fn category_of(contest: &Contest, vote: &Vote) -> Vote {
    match ids::classify_vote(contest, vote) {
        VoteKind::Undervote => Vote::undervote(),
        VoteKind::Overvote => Vote::set(["-Overvote"]),
        VoteKind::InvalidWritein => Vote::set(["-Invalid"]),
        VoteKind::Special => vote.clone(),
        VoteKind::Valid => {
            if vote.has_writein() && contest.writeins == WriteinsPolicy::Arbitrary {
                Vote::set([WRITEIN_CATEGORY])
            } else {
                vote.clone()
            }
        }
    }
}

/// Run trials `lo..hi` for one contest; return how many simulated
/// outcomes contradicted the reported one.
fn run_trials(task: &ContestTask, seed: &str, lo: u64, hi: u64) -> u64 {
    let mut tally = vec![0.0; task.categories.len()];
    let mut wrong = 0;
    for trial in lo..hi {
        let mut prng =
            Prng::with_counter_base(seed, &task.domain, trial * TRIAL_COUNTER_STRIDE);
        tally.copy_from_slice(&task.base_tally);
        for stratum in &task.strata {
            dirichlet_into(&mut prng, &stratum.weights, stratum.unseen, &mut tally);
        }
        let winners = compute_winners(&task.contest, task.categories.iter().zip(tally.iter().copied()));
        if winners != task.reported_winners {
            wrong += 1;
        }
    }
    wrong
}

/// Draw from the Dirichlet with the given hyperparameters and add
/// `scale` times the normalized draw into `tally`.
fn dirichlet_into(prng: &mut Prng, weights: &[f64], scale: f64, tally: &mut [f64]) {
    let mut draws = vec![0.0; weights.len()];
    let mut total = 0.0;
    for (draw, &w) in draws.iter_mut().zip(weights) {
        *draw = gamma_draw(prng, w);
        total += *draw;
    }
    if total <= 0.0 {
        return;
    }
    for (slot, draw) in tally.iter_mut().zip(draws) {
        *slot += scale * draw / total;
    }
}

/// Gamma variate with shape `k` (mean `k`), from the deterministic stream.
/// `k == 0` yields 0, so empty hyperparameters contribute nothing.
fn gamma_draw(prng: &mut Prng, k: f64) -> f64 {
    if k <= 0.0 {
        return 0.0;
    }
    if k < 1.0 {
        // Boost: Gamma(k) = Gamma(k + 1) * U^(1/k).
        let boost = prng.uniform_f64().powf(1.0 / k);
        return gamma_at_least_one(prng, k + 1.0) * boost;
    }
    gamma_at_least_one(prng, k)
}

/// Marsaglia-Tsang squeeze method, valid for `k >= 1`.
fn gamma_at_least_one(prng: &mut Prng, k: f64) -> f64 {
    let d = k - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let x = normal_draw(prng);
        let t = 1.0 + c * x;
        if t <= 0.0 {
            continue;
        }
        let v = t * t * t;
        let u = prng.uniform_f64();
        if u < 1.0 - 0.0331 * x * x * x * x {
            return d * v;
        }
        if u.ln() < 0.5 * x * x + d - d * v + d * v.ln() {
            return d * v;
        }
    }
}

/// Standard normal via Box-Muller on two uniform draws.
fn normal_draw(prng: &mut Prng) -> f64 {
    let u1 = prng.uniform_f64();
    let u2 = prng.uniform_f64();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}
