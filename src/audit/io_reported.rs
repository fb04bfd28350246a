//! Readers for the reported election data in `2-reported/`: ballot
//! manifests, reported CVRs (or tallies), and reported outcomes.

use std::collections::BTreeMap;
use std::path::Path;

use log::info;

use bayes_audit::ids::{count_on, file_safe, parse_vote};
use bayes_audit::model::{Collection, CvrType, Manifest, ManifestEntry, ReportedVotes};

use crate::audit::{files, readers, BCliResult};

/// `21-ballot-manifests/manifest-<pbcid>.csv`, one file per collection.
///
/// A row with `number_of_ballots > 1` is a compact batch: position, stamp
/// and ballot id auto-increment their trailing digit runs.
pub fn read_manifests(
    dir: &Path,
    collections: &BTreeMap<String, Collection>,
) -> BCliResult<BTreeMap<String, Manifest>> {
    let manifest_dir = dir.join("2-reported").join("21-ballot-manifests");
    let mut manifests = BTreeMap::new();
    for pbcid in collections.keys() {
        let prefix = format!("manifest-{}", file_safe(pbcid));
        let path = files::greatest_name(&manifest_dir, &prefix, ".csv")?;
        info!("reading ballot manifest {}", path.display());
        let table = readers::read_table(
            &path,
            &[
                "pbcid",
                "box",
                "position",
                "stamp",
                "bid",
                "number_of_ballots",
                "comments",
            ],
            false,
        )?;

        let mut entries = Vec::new();
        for row in &table.rows {
            if row.field(0) != pbcid {
                return Err(table.bad_row(
                    row,
                    format!("row names collection `{}`, file is for `{}`", row.field(0), pbcid),
                ));
            }
            let num: usize = row.field(5).parse().map_err(|_| {
                table.bad_row(row, format!("bad number_of_ballots `{}`", row.field(5)))
            })?;
            if num < 1 {
                return Err(table.bad_row(row, "number_of_ballots must be at least 1"));
            }
            let positions = count_on(row.field(2), num);
            let stamps = if row.field(3).is_empty() {
                vec![String::new(); num]
            } else {
                count_on(row.field(3), num)
            };
            let bids = count_on(row.field(4), num);
            for i in 0..num {
                let position: u32 = positions[i].parse().map_err(|_| {
                    table.bad_row(row, format!("bad position `{}`", positions[i]))
                })?;
                entries.push(ManifestEntry {
                    boxid: row.field(1).to_string(),
                    position,
                    stamp: stamps[i].clone(),
                    bid: bids[i].clone(),
                    comments: row.field(6).to_string(),
                });
            }
        }
        manifests.insert(pbcid.clone(), Manifest { entries });
    }
    Ok(manifests)
}

/// `22-reported-cvrs/reported-cvrs-<pbcid>.csv`.
///
/// CVR collections report one row per (ballot, contest) with the ballot
/// id in the third column; noCVR collections report tallies with an
/// integer count there instead.
pub fn read_reported_cvrs(
    dir: &Path,
    collections: &BTreeMap<String, Collection>,
) -> BCliResult<ReportedVotes> {
    let cvr_dir = dir.join("2-reported").join("22-reported-cvrs");
    let mut reported = ReportedVotes::default();
    for (pbcid, coll) in collections {
        let prefix = format!("reported-cvrs-{}", file_safe(pbcid));
        let path = files::greatest_name(&cvr_dir, &prefix, ".csv")?;
        info!("reading reported votes {}", path.display());
        match coll.cvr_type {
            CvrType::Cvr => {
                let table = readers::read_table(
                    &path,
                    &["pbcid", "scanner", "bid", "cid"],
                    true,
                )?;
                let ballots = reported.cvr.entry(pbcid.clone()).or_default();
                for row in &table.rows {
                    let vote = parse_vote(row.tail(4));
                    ballots
                        .entry(row.field(2).to_string())
                        .or_default()
                        .insert(row.field(3).to_string(), vote);
                }
            }
            CvrType::NoCvr => {
                let table = readers::read_table(
                    &path,
                    &["pbcid", "scanner", "tally", "cid"],
                    true,
                )?;
                let tallies = reported.tallies.entry(pbcid.clone()).or_default();
                for row in &table.rows {
                    let count: u64 = row.field(2).parse().map_err(|_| {
                        table.bad_row(row, format!("bad tally `{}`", row.field(2)))
                    })?;
                    let vote = parse_vote(row.tail(4));
                    *tallies
                        .entry(row.field(3).to_string())
                        .or_default()
                        .entry(vote)
                        .or_insert(0) += count;
                }
            }
        }
    }
    Ok(reported)
}

/// `23-reported-outcomes.csv`: ordered winner list per contest.
pub fn read_reported_outcomes(dir: &Path) -> BCliResult<BTreeMap<String, Vec<String>>> {
    let reported_dir = dir.join("2-reported");
    let path = files::greatest_name(&reported_dir, "23-reported-outcomes", ".csv")?;
    info!("reading reported outcomes {}", path.display());
    let table = readers::read_table(&path, &["cid"], true)?;

    let mut outcomes = BTreeMap::new();
    for row in &table.rows {
        let winners: Vec<String> = row
            .tail(1)
            .iter()
            .filter(|w| !w.is_empty())
            .cloned()
            .collect();
        if outcomes
            .insert(row.field(0).to_string(), winners)
            .is_some()
        {
            return Err(table.bad_row(
                row,
                format!("contest `{}` has two reported outcomes", row.field(0)),
            ));
        }
    }
    Ok(outcomes)
}
