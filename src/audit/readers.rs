//! Generic CSV table reading.
//!
//! All tables are UTF-8 CSV with one header row. Fields are reduced
//! (trimmed, internal whitespace collapsed) on the way in and blank
//! trailing fields are dropped, so `a, b ,,` and `a,b` are the same row.
//! Tables may be *varlen*: the columns after the fixed prefix hold a
//! variable number of values (selections, winners, contest lists).

use std::path::{Path, PathBuf};

use log::{debug, warn};
use snafu::ResultExt;

use bayes_audit::reduce;

use crate::audit::{files, BCliResult, BadHeaderSnafu, CliError, CsvParseSnafu};

#[derive(Debug)]
pub struct Table {
    pub path: PathBuf,
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

#[derive(Debug)]
pub struct Row {
    /// 1-based line number in the file, header included.
    pub lineno: usize,
    pub fields: Vec<String>,
}

impl Table {
    /// Index of a header column by (reduced) name.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    pub fn bad_row(&self, row: &Row, detail: impl Into<String>) -> Box<CliError> {
        Box::new(CliError::BadRow {
            path: self.path.clone(),
            lineno: row.lineno,
            detail: detail.into(),
        })
    }
}

impl Row {
    /// Field at `idx`, empty when the row is shorter.
    pub fn field(&self, idx: usize) -> &str {
        self.fields.get(idx).map_or("", String::as_str)
    }

    /// The variable-length tail after the fixed columns.
    pub fn tail(&self, fixed: usize) -> &[String] {
        self.fields.get(fixed..).unwrap_or(&[])
    }
}

/// Read `path`, checking that the header starts with `expected` (reduced
/// comparison). For fixed-width tables (`varlen == false`) rows are
/// padded to the header length and longer rows lose their excess with a
/// warning; varlen rows are kept as-is.
pub fn read_table(path: &Path, expected: &[&str], varlen: bool) -> BCliResult<Table> {
    let bytes = files::read_bytes(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record.context(CsvParseSnafu { path })?;
        let mut fields: Vec<String> = record.iter().map(reduce).collect();
        while fields.last().map_or(false, |s| s.is_empty()) {
            fields.pop();
        }
        records.push(fields);
    }
    debug!("read {}: {} records", path.display(), records.len());

    let header = match records.first() {
        Some(h) => h.clone(),
        None => {
            return Err(Box::new(CliError::BadRow {
                path: path.to_path_buf(),
                lineno: 1,
                detail: "missing header row".to_string(),
            }))
        }
    };
    let expected_reduced: Vec<String> = expected.iter().map(|e| reduce(e)).collect();
    if header.len() < expected_reduced.len()
        || header[..expected_reduced.len()] != expected_reduced[..]
    {
        return BadHeaderSnafu {
            path,
            expected: expected_reduced,
            found: header,
        }
        .fail()
        .map_err(Box::new);
    }

    let mut rows = Vec::new();
    for (idx, mut fields) in records.into_iter().skip(1).enumerate() {
        let lineno = idx + 2;
        if fields.is_empty() {
            continue;
        }
        if !varlen {
            if fields.len() > header.len() {
                warn!(
                    "{} line {}: ignoring {} extra value(s)",
                    path.display(),
                    lineno,
                    fields.len() - header.len()
                );
                fields.truncate(header.len());
            }
            fields.resize(header.len(), String::new());
        }
        rows.push(Row { lineno, fields });
    }
    Ok(Table {
        path: path.to_path_buf(),
        header,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_csv(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn fixed_rows_are_padded_and_trimmed() {
        let (_dir, path) = write_csv("a, b ,c\n 1 ,2,3\n4,5\n");
        let table = read_table(&path, &["a", "b", "c"], false).unwrap();
        assert_eq!(table.header, vec!["a", "b", "c"]);
        assert_eq!(table.rows[0].fields, vec!["1", "2", "3"]);
        assert_eq!(table.rows[1].fields, vec!["4", "5", ""]);
        assert_eq!(table.rows[1].lineno, 3);
    }

    #[test]
    fn varlen_tail_is_preserved() {
        let (_dir, path) = write_csv("cid,type,sels\nC,plurality,x,y,z\nD,plurality\n");
        let table = read_table(&path, &["cid", "type"], true).unwrap();
        assert_eq!(table.rows[0].tail(2), &["x", "y", "z"]);
        assert!(table.rows[1].tail(2).is_empty());
    }

    #[test]
    fn header_mismatch_is_rejected() {
        let (_dir, path) = write_csv("x,y\n1,2\n");
        let err = read_table(&path, &["a", "b"], false).unwrap_err();
        assert!(matches!(*err, CliError::BadHeader { .. }));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let (_dir, path) = write_csv("a,b\n1,2\n\n ,\n3,4\n");
        let table = read_table(&path, &["a", "b"], false).unwrap();
        assert_eq!(table.rows.len(), 2);
    }
}
