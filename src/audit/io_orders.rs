//! Writer for the public sampling-order files in
//! `3-audit/32-audit-orders/`.

use std::collections::BTreeMap;
use std::path::Path;

use log::info;

use bayes_audit::ids::file_safe;
use bayes_audit::Election;

use crate::audit::{files, BCliResult, CliError};

/// Write `audit-order-<pbcid>.csv` for every collection: the manifest
/// rows in sampling order, with a dense 1-based `order` column. The
/// permutation is a pure function of the seed, so rewriting the file is
/// byte-identical.
pub fn write_audit_orders(
    dir: &Path,
    election: &Election,
    orders: &BTreeMap<String, Vec<usize>>,
) -> BCliResult<()> {
    let orders_dir = dir.join("3-audit").join("32-audit-orders");
    for (pbcid, order) in orders {
        let manifest = match election.manifests.get(pbcid) {
            Some(m) => m,
            None => continue,
        };
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["order", "pbcid", "box", "position", "stamp", "bid", "comments"])
            .map_err(|source| box_csv_error(&orders_dir, source))?;
        for (position, &idx) in order.iter().enumerate() {
            let entry = &manifest.entries[idx];
            let order_field = (position + 1).to_string();
            let position_field = entry.position.to_string();
            writer
                .write_record([
                    order_field.as_str(),
                    pbcid.as_str(),
                    entry.boxid.as_str(),
                    position_field.as_str(),
                    entry.stamp.as_str(),
                    entry.bid.as_str(),
                    entry.comments.as_str(),
                ])
                .map_err(|source| box_csv_error(&orders_dir, source))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| box_csv_error(&orders_dir, e.into_error().into()))?;
        let path = orders_dir.join(format!("audit-order-{}.csv", file_safe(pbcid)));
        files::atomic_write(&path, &bytes)?;
        info!("wrote sampling order {}", path.display());
    }
    Ok(())
}

fn box_csv_error(dir: &Path, source: csv::Error) -> Box<CliError> {
    Box::new(CliError::CsvParse {
        path: dir.to_path_buf(),
        source,
    })
}

/// Check every published `audit-order-<pbcid>.csv` against the
/// seed-derived permutation.
///
/// The order files are public artifacts that collection managers work
/// from; a stale or edited file would silently desynchronize the paper
/// trail from the engine, so any mismatch stops the stage. Collections
/// without a published order yet are skipped.
pub fn verify_audit_orders(
    dir: &Path,
    election: &Election,
    orders: &BTreeMap<String, Vec<usize>>,
) -> BCliResult<()> {
    let orders_dir = dir.join("3-audit").join("32-audit-orders");
    for (pbcid, order) in orders {
        let path = orders_dir.join(format!("audit-order-{}.csv", file_safe(pbcid)));
        if !path.is_file() {
            continue;
        }
        let manifest = match election.manifests.get(pbcid) {
            Some(m) => m,
            None => continue,
        };
        let table = crate::audit::readers::read_table(
            &path,
            &["order", "pbcid", "box", "position", "stamp", "bid", "comments"],
            false,
        )?;
        if table.rows.len() != order.len() {
            return Err(Box::new(CliError::BadRow {
                path,
                lineno: 1,
                detail: format!(
                    "order file lists {} ballots, sampling order has {}",
                    table.rows.len(),
                    order.len()
                ),
            }));
        }
        for (pos, (row, &idx)) in table.rows.iter().zip(order).enumerate() {
            let expected_bid = &manifest.entries[idx].bid;
            if row.field(0) != (pos + 1).to_string() || row.field(5) != expected_bid {
                return Err(table.bad_row(
                    row,
                    format!(
                        "order position {} should be ballot `{}`, found `{}`",
                        pos + 1,
                        expected_bid,
                        row.field(5)
                    ),
                ));
            }
        }
    }
    Ok(())
}
