//! Writers for the per-stage artifacts in `3-audit/34-audit-output/`,
//! plus the persisted between-stage state.
//!
//! Artifacts carry the stage label as their version label and contain no
//! timestamps, so re-running a stage against the same snapshot rewrites
//! byte-identical files.

use std::path::{Path, PathBuf};

use log::info;
use snafu::ResultExt;

use bayes_audit::stage::{OutputRow, PlanRow, SnapshotEntry, StageState};

use crate::audit::{files, BCliResult, CliError, JsonParseSnafu};

fn output_dir(dir: &Path) -> PathBuf {
    dir.join("3-audit").join("34-audit-output")
}

pub fn state_path(dir: &Path, label: &str) -> PathBuf {
    output_dir(dir).join(format!("audit-stage-state-{}.json", label))
}

/// `20-audit-snapshot-<stage>.csv`: the `(path, sha256)` rows binding the
/// stage to its inputs.
pub fn write_snapshot(dir: &Path, label: &str, entries: &[SnapshotEntry]) -> BCliResult<()> {
    let path = output_dir(dir).join(format!("20-audit-snapshot-{}.csv", label));
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["path", "sha256"])
        .map_err(|source| csv_error(&path, source))?;
    for entry in entries {
        writer
            .write_record([entry.path.as_str(), entry.sha256.as_str()])
            .map_err(|source| csv_error(&path, source))?;
    }
    write_out(&path, writer)?;
    info!("wrote snapshot {}", path.display());
    Ok(())
}

/// `30-audit-output-<stage>.csv`: measured risk and resulting status per
/// contest. Risks are written with six decimal digits.
pub fn write_outputs(dir: &Path, label: &str, rows: &[OutputRow]) -> BCliResult<()> {
    let path = output_dir(dir).join(format!("30-audit-output-{}.csv", label));
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "cid",
            "method",
            "measured_risk",
            "risk_limit",
            "upset_threshold",
            "status_after",
            "sample_total",
        ])
        .map_err(|source| csv_error(&path, source))?;
    for row in rows {
        let risk = format!("{:.6}", row.measured_risk);
        let limit = format!("{}", row.risk_limit);
        let upset = format!("{}", row.upset_threshold);
        let status = row.status_after.to_string();
        let total = row.sample_total.to_string();
        writer
            .write_record([
                row.cid.as_str(),
                row.method.as_str(),
                risk.as_str(),
                limit.as_str(),
                upset.as_str(),
                status.as_str(),
                total.as_str(),
            ])
            .map_err(|source| csv_error(&path, source))?;
    }
    write_out(&path, writer)?;
    info!("wrote audit output {}", path.display());
    Ok(())
}

/// `40-audit-plan-<stage>.csv`: next-stage sampling workload per
/// collection.
pub fn write_plan(dir: &Path, label: &str, rows: &[PlanRow]) -> BCliResult<()> {
    let path = output_dir(dir).join(format!("40-audit-plan-{}.csv", label));
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "pbcid",
            "audited_so_far",
            "next_stage_increment",
            "estimated_total_needed",
        ])
        .map_err(|source| csv_error(&path, source))?;
    for row in rows {
        let audited = row.audited_so_far.to_string();
        let increment = row.next_stage_increment.to_string();
        let estimated = row.estimated_total_needed.to_string();
        writer
            .write_record([
                row.pbcid.as_str(),
                audited.as_str(),
                increment.as_str(),
                estimated.as_str(),
            ])
            .map_err(|source| csv_error(&path, source))?;
    }
    write_out(&path, writer)?;
    info!("wrote audit plan {}", path.display());
    Ok(())
}

/// Persist the between-stage state as pretty JSON.
pub fn write_state(dir: &Path, label: &str, state: &StageState) -> BCliResult<()> {
    let path = state_path(dir, label);
    let bytes = serde_json::to_vec_pretty(state).context(JsonParseSnafu { path: &path })?;
    files::atomic_write(&path, &bytes)?;
    info!("wrote stage state {}", path.display());
    Ok(())
}

pub fn read_state(path: &Path) -> BCliResult<StageState> {
    let bytes = files::read_bytes(path)?;
    serde_json::from_slice(&bytes)
        .context(JsonParseSnafu { path })
        .map_err(Box::new)
}

fn write_out(path: &Path, writer: csv::Writer<Vec<u8>>) -> BCliResult<()> {
    let bytes = writer
        .into_inner()
        .map_err(|e| csv_error(path, e.into_error().into()))?;
    files::atomic_write(path, &bytes)
}

fn csv_error(path: &Path, source: csv::Error) -> Box<CliError> {
    Box::new(CliError::CsvParse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bayes_audit::ContestStatus;

    #[test]
    fn state_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let state = StageState {
            stage: 3,
            audited: [("J".to_string(), 120u64)].into_iter().collect(),
            statuses: [("C".to_string(), ContestStatus::Passed)].into_iter().collect(),
            plan: [("J".to_string(), 120u64)].into_iter().collect(),
            risks: [("C".to_string(), 0.0123)].into_iter().collect(),
        };
        write_state(dir.path(), "003", &state).unwrap();
        let loaded = read_state(&state_path(dir.path(), "003")).unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn output_rows_have_fixed_precision_risks() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![OutputRow {
            cid: "C".to_string(),
            method: "Bayes".to_string(),
            measured_risk: 0.00017,
            risk_limit: 0.05,
            upset_threshold: 0.99,
            status_after: ContestStatus::Passed,
            sample_total: 40,
        }];
        write_outputs(dir.path(), "001", &rows).unwrap();
        let content = std::fs::read_to_string(
            output_dir(dir.path()).join("30-audit-output-001.csv"),
        )
        .unwrap();
        assert!(content.contains("C,Bayes,0.000170,0.05,0.99,Passed,40"));
    }

    #[test]
    fn rewriting_identical_rows_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![PlanRow {
            pbcid: "J".to_string(),
            audited_so_far: 40,
            next_stage_increment: 40,
            estimated_total_needed: 120,
        }];
        write_plan(dir.path(), "001", &rows).unwrap();
        let path = output_dir(dir.path()).join("40-audit-plan-001.csv");
        let first = std::fs::read(&path).unwrap();
        write_plan(dir.path(), "001", &rows).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }

    #[test]
    fn snapshot_rows_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![SnapshotEntry {
            path: "1-election-spec/11-election.csv".to_string(),
            sha256: "ab".repeat(32),
        }];
        write_snapshot(dir.path(), "002", &entries).unwrap();
        let content = std::fs::read_to_string(
            output_dir(dir.path()).join("20-audit-snapshot-002.csv"),
        )
        .unwrap();
        assert!(content.starts_with("path,sha256\n"));
        assert!(content.contains("11-election.csv"));
    }
}
