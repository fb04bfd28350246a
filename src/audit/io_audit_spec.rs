//! Readers for the audit specification in `3-audit/31-audit-spec/`: the
//! public seed and the global / per-contest / per-collection parameters.

use std::collections::BTreeMap;
use std::path::Path;

use log::info;

use bayes_audit::model::{
    AuditSeed, AuditSpec, ContestAudit, ContestStatus, GlobalAudit, RiskMethod, SamplingMode,
};

use crate::audit::{files, readers, BCliResult, CliError};

/// Jeffreys-style default when `param_1` is left blank.
const DEFAULT_PSEUDOCOUNT: f64 = 0.5;

pub fn read_audit_spec(dir: &Path) -> BCliResult<AuditSpec> {
    let spec_dir = dir.join("3-audit").join("31-audit-spec");
    let seed = read_seed(&spec_dir)?;
    let global = read_global(&spec_dir)?;
    let contests = read_contest_params(&spec_dir)?;
    let audit_rates = read_collection_params(&spec_dir)?;
    Ok(AuditSpec {
        global,
        contests,
        audit_rates,
        seed,
    })
}

/// `311-audit-seed.csv`: a single cell holding the seed digits.
fn read_seed(spec_dir: &Path) -> BCliResult<AuditSeed> {
    let path = files::greatest_name(spec_dir, "311-audit-seed", ".csv")?;
    info!("reading audit seed {}", path.display());
    let table = readers::read_table(&path, &["audit_seed"], false)?;
    let row = table.rows.first().ok_or_else(|| {
        Box::new(CliError::BadRow {
            path: path.clone(),
            lineno: 2,
            detail: "missing seed row".to_string(),
        })
    })?;
    AuditSeed::parse(row.field(0)).map_err(|source| Box::new(CliError::Engine { source }))
}

/// `10-audit-parameters-global.csv`. The first two columns are required;
/// `n_workers` and `nocvr_tally_weight` are optional extensions.
fn read_global(spec_dir: &Path) -> BCliResult<GlobalAudit> {
    let path = files::greatest_name(spec_dir, "10-audit-parameters-global", ".csv")?;
    info!("reading global audit parameters {}", path.display());
    let table = readers::read_table(&path, &["max_audit_stages", "n_trials"], false)?;
    let row = table.rows.first().ok_or_else(|| {
        Box::new(CliError::BadRow {
            path: path.clone(),
            lineno: 2,
            detail: "missing parameter row".to_string(),
        })
    })?;

    let mut global = GlobalAudit {
        max_audit_stages: row
            .field(0)
            .parse()
            .map_err(|_| table.bad_row(row, format!("bad max_audit_stages `{}`", row.field(0))))?,
        n_trials: row
            .field(1)
            .parse()
            .map_err(|_| table.bad_row(row, format!("bad n_trials `{}`", row.field(1))))?,
        ..GlobalAudit::default()
    };
    if let Some(idx) = table.column("n_workers") {
        let raw = row.field(idx);
        if !raw.is_empty() {
            global.n_workers = raw
                .parse()
                .map_err(|_| table.bad_row(row, format!("bad n_workers `{}`", raw)))?;
        }
    }
    if let Some(idx) = table.column("nocvr_tally_weight") {
        let raw = row.field(idx);
        if !raw.is_empty() {
            global.nocvr_tally_weight = raw
                .parse()
                .map_err(|_| table.bad_row(row, format!("bad nocvr_tally_weight `{}`", raw)))?;
        }
    }
    Ok(global)
}

/// `11-audit-parameters-contest.csv`. `param_1` is the Dirichlet
/// pseudocount; `param_2` optionally sharpens the prior for categories
/// matching the reported vote.
fn read_contest_params(spec_dir: &Path) -> BCliResult<BTreeMap<String, ContestAudit>> {
    let path = files::greatest_name(spec_dir, "11-audit-parameters-contest", ".csv")?;
    info!("reading contest audit parameters {}", path.display());
    let table = readers::read_table(
        &path,
        &[
            "cid",
            "method",
            "risk_limit",
            "upset_threshold",
            "sampling_mode",
            "status",
        ],
        true,
    )?;

    let mut contests = BTreeMap::new();
    for row in &table.rows {
        let method = match row.field(1) {
            "Bayes" => RiskMethod::Bayes,
            other => {
                return Err(table.bad_row(row, format!("unknown risk method `{}`", other)))
            }
        };
        let risk_limit: f64 = row
            .field(2)
            .parse()
            .map_err(|_| table.bad_row(row, format!("bad risk_limit `{}`", row.field(2))))?;
        let upset_threshold: f64 = row
            .field(3)
            .parse()
            .map_err(|_| table.bad_row(row, format!("bad upset_threshold `{}`", row.field(3))))?;
        let sampling_mode = match row.field(4) {
            "Active" => SamplingMode::Active,
            "Opportunistic" => SamplingMode::Opportunistic,
            other => {
                return Err(table.bad_row(row, format!("unknown sampling mode `{}`", other)))
            }
        };
        let initial_status = match row.field(5) {
            "Open" => ContestStatus::Open,
            "Passed" => ContestStatus::Passed,
            "Upset" => ContestStatus::Upset,
            "Off" => ContestStatus::Off,
            other => return Err(table.bad_row(row, format!("unknown status `{}`", other))),
        };

        let params = row.tail(6);
        let pseudocount_base = match params.first().map(String::as_str) {
            None | Some("") => DEFAULT_PSEUDOCOUNT,
            Some(raw) => raw
                .parse()
                .map_err(|_| table.bad_row(row, format!("bad pseudocount `{}`", raw)))?,
        };
        let pseudocount_match = match params.get(1).map(String::as_str) {
            None | Some("") => pseudocount_base,
            Some(raw) => raw
                .parse()
                .map_err(|_| table.bad_row(row, format!("bad pseudocount_match `{}`", raw)))?,
        };

        if contests
            .insert(
                row.field(0).to_string(),
                ContestAudit {
                    method,
                    risk_limit,
                    upset_threshold,
                    sampling_mode,
                    initial_status,
                    pseudocount_base,
                    pseudocount_match,
                },
            )
            .is_some()
        {
            return Err(table.bad_row(
                row,
                format!("contest `{}` has two parameter rows", row.field(0)),
            ));
        }
    }
    Ok(contests)
}

/// `12-audit-parameters-collection.csv`: max per-stage audit rate.
fn read_collection_params(spec_dir: &Path) -> BCliResult<BTreeMap<String, u64>> {
    let path = files::greatest_name(spec_dir, "12-audit-parameters-collection", ".csv")?;
    info!("reading collection audit parameters {}", path.display());
    let table = readers::read_table(&path, &["pbcid", "max_audit_rate"], false)?;

    let mut rates = BTreeMap::new();
    for row in &table.rows {
        let rate: u64 = row
            .field(1)
            .parse()
            .map_err(|_| table.bad_row(row, format!("bad max_audit_rate `{}`", row.field(1))))?;
        rates.insert(row.field(0).to_string(), rate);
    }
    Ok(rates)
}
