//! Orchestration of the audit commands over an election directory.
//!
//! Directory layout (each leaf follows the versioned-file discipline:
//! the operative file of a prefix/suffix family is the one with the
//! lexicographically greatest version label):
//!
//! ```text
//! <dir>/
//!   1-election-spec/
//!     11-election.csv  12-contests.csv  13-collections.csv
//!   2-reported/
//!     21-ballot-manifests/manifest-<pbcid>.csv
//!     22-reported-cvrs/reported-cvrs-<pbcid>.csv
//!     23-reported-outcomes.csv
//!   3-audit/
//!     31-audit-spec/
//!       311-audit-seed.csv
//!       10-audit-parameters-global.csv
//!       11-audit-parameters-contest.csv
//!       12-audit-parameters-collection.csv
//!     32-audit-orders/audit-order-<pbcid>.csv
//!     33-audited-votes/audited-votes-<pbcid>.csv
//!     34-audit-output/
//!       20-audit-snapshot-<stage>.csv
//!       30-audit-output-<stage>.csv
//!       40-audit-plan-<stage>.csv
//!       audit-stage-state-<stage>.json
//! ```

pub mod files;
pub mod io_audit_spec;
pub mod io_audited;
pub mod io_orders;
pub mod io_output;
pub mod io_reported;
pub mod io_structure;
pub mod readers;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result as AHResult;
use log::info;
use snafu::Snafu;

use bayes_audit::model::{check_structure, AuditSpec, Collection, Contest, ElectionMeta};
use bayes_audit::stage;
use bayes_audit::{
    build_sample_counts, initial_state, sampling_order, stage_label, AuditError, Election,
};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CliError {
    #[snafu(display("no file `{prefix}*{suffix}` in {}", dir.display()))]
    MissingInput {
        dir: PathBuf,
        prefix: String,
        suffix: String,
    },

    #[snafu(display("could not read `{}`: {source}", path.display()))]
    OpeningFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("could not write `{}`: {source}", path.display()))]
    WritingFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("could not parse `{}`: {source}", path.display()))]
    CsvParse { path: PathBuf, source: csv::Error },

    #[snafu(display(
        "`{}`: header {found:?} does not start with expected fields {expected:?}",
        path.display()
    ))]
    BadHeader {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[snafu(display("`{}` row {lineno}: {detail}", path.display()))]
    BadRow {
        path: PathBuf,
        lineno: usize,
        detail: String,
    },

    #[snafu(display("could not parse `{}`: {source}", path.display()))]
    JsonParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("{source}"))]
    Engine { source: AuditError },
}

pub type BCliResult<T> = Result<T, Box<CliError>>;

/// Loaded structure tables, before any reported data exists.
pub struct Structure {
    pub meta: ElectionMeta,
    pub contests: BTreeMap<String, Contest>,
    pub collections: BTreeMap<String, Collection>,
}

fn load_structure(dir: &Path) -> BCliResult<Structure> {
    let spec_dir = dir.join("1-election-spec");
    let meta = io_structure::read_election_meta(&spec_dir)?;
    let contests = io_structure::read_contests(&spec_dir)?;
    let collections = io_structure::read_collections(&spec_dir)?;
    check_structure(&contests, &collections)
        .map_err(|source| Box::new(CliError::Engine { source }))?;
    Ok(Structure {
        meta,
        contests,
        collections,
    })
}

fn load_election(dir: &Path) -> BCliResult<Election> {
    let structure = load_structure(dir)?;
    let manifests = io_reported::read_manifests(dir, &structure.collections)?;
    let reported = io_reported::read_reported_cvrs(dir, &structure.collections)?;
    let outcomes = io_reported::read_reported_outcomes(dir)?;
    let election = Election {
        meta: structure.meta,
        contests: structure.contests,
        collections: structure.collections,
        manifests,
        reported,
        outcomes,
    };
    election
        .check_consistency()
        .map_err(|source| Box::new(CliError::Engine { source }))?;
    Ok(election)
}

fn load_audit_spec(dir: &Path, election: &Election) -> BCliResult<AuditSpec> {
    let spec = io_audit_spec::read_audit_spec(dir)?;
    spec.check(election)
        .map_err(|source| Box::new(CliError::Engine { source }))?;
    Ok(spec)
}

fn compute_orders(election: &Election, audit: &AuditSpec) -> BTreeMap<String, Vec<usize>> {
    election
        .manifests
        .iter()
        .map(|(pbcid, manifest)| {
            (
                pbcid.clone(),
                sampling_order(&audit.seed, pbcid, manifest.len()),
            )
        })
        .collect()
}

/// `read-structure`: load and check the election, contests, and
/// collections tables.
pub fn run_read_structure(dir: &Path) -> AHResult<()> {
    let structure = load_structure(dir)?;
    info!("election: {}", structure.meta.name);
    info!("{} contests:", structure.contests.len());
    for contest in structure.contests.values() {
        info!(
            "    {} ({} winner(s), {} selections)",
            contest.cid,
            contest.winners,
            contest.selids.len()
        );
    }
    info!("{} paper ballot collections:", structure.collections.len());
    for coll in structure.collections.values() {
        info!(
            "    {} ({:?}, manager {})",
            coll.pbcid, coll.cvr_type, coll.manager
        );
    }
    Ok(())
}

/// `read-reported`: load reported CVRs, ballot manifests, and reported
/// outcomes, then run the full consistency check.
pub fn run_read_reported(dir: &Path) -> AHResult<()> {
    let election = load_election(dir)?;
    for (pbcid, manifest) in &election.manifests {
        info!("collection {}: {} ballots in manifest", pbcid, manifest.len());
    }
    for (cid, winners) in &election.outcomes {
        info!("reported outcome {}: {}", cid, winners.join(", "));
    }
    Ok(())
}

/// `read-seed`: load and validate the public audit seed.
pub fn run_read_seed(dir: &Path) -> AHResult<()> {
    let election = load_election(dir)?;
    let audit = load_audit_spec(dir, &election)?;
    info!("audit seed: {}", audit.seed.as_str());
    Ok(())
}

/// `make-audit-orders`: derive and write the per-collection sampling
/// orders from the audit seed.
pub fn run_make_audit_orders(dir: &Path) -> AHResult<()> {
    let election = load_election(dir)?;
    let audit = load_audit_spec(dir, &election)?;
    let orders = compute_orders(&election, &audit);
    io_orders::write_audit_orders(dir, &election, &orders)?;
    for (pbcid, order) in &orders {
        info!("audit order for {}: {} ballots", pbcid, order.len());
    }
    Ok(())
}

/// `read-audited`: load the audited-vote transcripts and validate them
/// against the manifests and sampling orders.
pub fn run_read_audited(dir: &Path) -> AHResult<()> {
    let election = load_election(dir)?;
    let audit = load_audit_spec(dir, &election)?;
    let orders = compute_orders(&election, &audit);
    io_orders::verify_audit_orders(dir, &election, &orders)?;
    let audited = io_audited::read_audited_votes(dir, &election)?;
    let counts = build_sample_counts(&election, &orders, &audited)
        .map_err(|source| Box::new(CliError::Engine { source }))?;
    for (pbcid, n) in &counts.audited {
        info!("collection {}: {} ballots audited", pbcid, n);
    }
    Ok(())
}

/// `stage NNN`: run one audit stage end to end. Stage `000` performs
/// setup only: seed read, sampling orders written, initial plan emitted.
pub fn run_stage(dir: &Path, stage_index: u32) -> AHResult<()> {
    let election = load_election(dir)?;
    let audit = load_audit_spec(dir, &election)?;

    if stage_index == 0 {
        return run_setup_stage(dir, &election, &audit);
    }
    if stage_index > audit.global.max_audit_stages {
        anyhow::bail!(
            "stage {} exceeds max_audit_stages {}",
            stage_index,
            audit.global.max_audit_stages
        );
    }

    // Bind the stage to a content snapshot of every input file.
    let prev_label = stage_label(stage_index - 1);
    let prev_state_path = io_output::state_path(dir, &prev_label);
    let snapshot = files::snapshot_inputs(dir, &prev_state_path)?;
    stage::check_snapshot(&snapshot).map_err(|source| Box::new(CliError::Engine { source }))?;

    let prev = io_output::read_state(&prev_state_path)?;
    if prev.stage + 1 != stage_index {
        anyhow::bail!(
            "stage {} cannot follow recorded stage {}",
            stage_index,
            prev.stage
        );
    }

    let orders = compute_orders(&election, &audit);
    io_orders::verify_audit_orders(dir, &election, &orders)?;
    let audited = io_audited::read_audited_votes(dir, &election)?;
    let counts = build_sample_counts(&election, &orders, &audited)
        .map_err(|source| Box::new(CliError::Engine { source }))?;

    let report = stage::run_stage(&election, &audit, &prev, &counts, stage_index)
        .map_err(|source| Box::new(CliError::Engine { source }))?;

    // Nothing is written until every artifact is ready; each file lands
    // atomically via a temp file in the output directory.
    let label = stage_label(stage_index);
    io_output::write_snapshot(dir, &label, &snapshot)?;
    io_output::write_outputs(dir, &label, &report.outputs)?;
    io_output::write_plan(dir, &label, &report.plan)?;
    io_output::write_state(dir, &label, &report.state)?;

    for row in &report.outputs {
        info!(
            "stage {} contest {}: risk {:.6} (limits {}, {}) -> {}",
            label, row.cid, row.measured_risk, row.risk_limit, row.upset_threshold, row.status_after
        );
    }
    for row in &report.plan {
        info!(
            "stage {} collection {}: {} audited, +{} next stage (est. total {})",
            label, row.pbcid, row.audited_so_far, row.next_stage_increment,
            row.estimated_total_needed
        );
    }
    if report.done {
        info!("audit complete: every contest has reached a final status or stopped driving");
    } else {
        info!("audit continues into stage {}", stage_label(stage_index + 1));
    }
    Ok(())
}

fn run_setup_stage(dir: &Path, election: &Election, audit: &AuditSpec) -> AHResult<()> {
    let orders = compute_orders(election, audit);
    io_orders::write_audit_orders(dir, election, &orders)?;

    let state = initial_state(election, audit);
    let plan_rows: Vec<stage::PlanRow> = state
        .plan
        .iter()
        .map(|(pbcid, target)| stage::PlanRow {
            pbcid: pbcid.clone(),
            audited_so_far: 0,
            next_stage_increment: *target,
            estimated_total_needed: *target,
        })
        .collect();
    let label = stage_label(0);
    io_output::write_plan(dir, &label, &plan_rows)?;
    io_output::write_state(dir, &label, &state)?;
    info!("setup stage complete; first-stage plan written");
    Ok(())
}
