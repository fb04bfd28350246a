//! Readers for the election-structure tables in `1-election-spec/`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use log::info;

use bayes_audit::model::{
    Collection, Contest, ContestType, CvrType, ElectionMeta, WriteinsPolicy,
};
use bayes_audit::reduce;

use crate::audit::{files, readers, BCliResult};

/// `11-election.csv`: attribute/value pairs.
pub fn read_election_meta(spec_dir: &Path) -> BCliResult<ElectionMeta> {
    let path = files::greatest_name(spec_dir, "11-election", ".csv")?;
    info!("reading election attributes from {}", path.display());
    let table = readers::read_table(&path, &["attribute", "value"], false)?;

    let mut meta = ElectionMeta::default();
    let mut seen = BTreeSet::new();
    for row in &table.rows {
        let attribute = row.field(0);
        let value = row.field(1).to_string();
        seen.insert(attribute.to_string());
        match attribute {
            "Election name" => meta.name = value,
            "Election dirname" => meta.dirname = value,
            "Election date" => meta.date = value,
            "Election URL" => meta.url = value,
            _ => {}
        }
    }
    for required in ["Election name", "Election dirname", "Election date", "Election URL"] {
        if !seen.contains(required) {
            return Err(Box::new(crate::audit::CliError::BadRow {
                path: table.path.clone(),
                lineno: 1,
                detail: format!("missing required attribute `{}`", required),
            }));
        }
    }
    Ok(meta)
}

/// `12-contests.csv`: one contest per row, selections in the tail.
/// Selections starting with `+` are pre-qualified write-ins.
pub fn read_contests(spec_dir: &Path) -> BCliResult<BTreeMap<String, Contest>> {
    let path = files::greatest_name(spec_dir, "12-contests", ".csv")?;
    info!("reading contests from {}", path.display());
    let table = readers::read_table(&path, &["cid", "type", "winners", "writeins"], true)?;

    let mut contests = BTreeMap::new();
    for row in &table.rows {
        let cid = reduce(row.field(0));
        if contests.contains_key(&cid) {
            return Err(table.bad_row(row, format!("contest `{}` declared twice", cid)));
        }
        let contest_type = match row.field(1).to_lowercase().as_str() {
            "plurality" => ContestType::Plurality,
            other => {
                return Err(table.bad_row(row, format!("unsupported contest type `{}`", other)))
            }
        };
        let winners: u32 = row
            .field(2)
            .parse()
            .map_err(|_| table.bad_row(row, format!("bad winners count `{}`", row.field(2))))?;
        let writeins = match row.field(3).to_lowercase().as_str() {
            "no" => WriteinsPolicy::No,
            "qualified" => WriteinsPolicy::Qualified,
            "arbitrary" => WriteinsPolicy::Arbitrary,
            other => {
                return Err(table.bad_row(row, format!("bad write-ins policy `{}`", other)))
            }
        };

        let mut selids = BTreeSet::new();
        let mut qualified_writeins = BTreeSet::new();
        for raw in row.tail(4) {
            let selid = reduce(raw);
            if selid.is_empty() {
                continue;
            }
            if selid.starts_with('+') {
                qualified_writeins.insert(selid);
            } else {
                selids.insert(selid);
            }
        }

        contests.insert(
            cid.clone(),
            Contest {
                cid,
                contest_type,
                winners,
                writeins,
                selids,
                qualified_writeins,
            },
        );
    }
    Ok(contests)
}

/// `13-collections.csv`: one collection per row, its contests in the
/// tail.
pub fn read_collections(spec_dir: &Path) -> BCliResult<BTreeMap<String, Collection>> {
    let path = files::greatest_name(spec_dir, "13-collections", ".csv")?;
    info!("reading collections from {}", path.display());
    let table = readers::read_table(&path, &["pbcid", "manager", "cvr_type"], true)?;

    let mut collections = BTreeMap::new();
    for row in &table.rows {
        let pbcid = reduce(row.field(0));
        if collections.contains_key(&pbcid) {
            return Err(table.bad_row(row, format!("collection `{}` declared twice", pbcid)));
        }
        let cvr_type = match row.field(2) {
            "CVR" => CvrType::Cvr,
            "noCVR" => CvrType::NoCvr,
            other => return Err(table.bad_row(row, format!("bad cvr_type `{}`", other))),
        };
        let mut cids: Vec<String> = row
            .tail(3)
            .iter()
            .map(|c| reduce(c))
            .filter(|c| !c.is_empty())
            .collect();
        cids.dedup();
        collections.insert(
            pbcid.clone(),
            Collection {
                pbcid,
                manager: row.field(1).to_string(),
                cvr_type,
                cids,
            },
        );
    }
    Ok(collections)
}
