//! File handling: versioned-file resolution, retried reads, atomic
//! writes, and content snapshots.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use sha2::{Digest, Sha256};
use snafu::ResultExt;

use bayes_audit::stage::SnapshotEntry;

use crate::audit::{BCliResult, CliError, OpeningFileSnafu, WritingFileSnafu};

/// Attempts for a read before the I/O error is surfaced.
const READ_ATTEMPTS: u32 = 3;

/// Find the operative file for `(prefix, suffix)` in `dir`: the match
/// whose version label (the part between prefix and suffix) is
/// lexicographically greatest. The empty label sorts below all others.
pub fn greatest_name(dir: &Path, prefix: &str, suffix: &str) -> BCliResult<PathBuf> {
    greatest_name_opt(dir, prefix, suffix)?.ok_or_else(|| {
        Box::new(CliError::MissingInput {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    })
}

pub fn greatest_name_opt(dir: &Path, prefix: &str, suffix: &str) -> BCliResult<Option<PathBuf>> {
    let mut best: Option<(String, PathBuf)> = None;
    if !dir.is_dir() {
        return Ok(None);
    }
    let entries = std::fs::read_dir(dir).context(OpeningFileSnafu { path: dir })?;
    for entry in entries {
        let entry = entry.context(OpeningFileSnafu { path: dir })?;
        if !entry.path().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let label = match name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(suffix))
        {
            Some(label) => label.to_string(),
            None => continue,
        };
        let better = match &best {
            Some((best_label, _)) => label > *best_label,
            None => true,
        };
        if better {
            best = Some((label, entry.path()));
        }
    }
    Ok(best.map(|(_, path)| path))
}

/// Read a whole file, retrying transient I/O errors a bounded number of
/// times before surfacing them.
pub fn read_bytes(path: &Path) -> BCliResult<Vec<u8>> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match std::fs::read(path) {
            Ok(bytes) => return Ok(bytes),
            Err(err) if attempt < READ_ATTEMPTS && err.kind() != std::io::ErrorKind::NotFound => {
                warn!(
                    "read of {} failed (attempt {}): {}; retrying",
                    path.display(),
                    attempt,
                    err
                );
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                return Err(Box::new(CliError::OpeningFile {
                    path: path.to_path_buf(),
                    source: err,
                }))
            }
        }
    }
}

/// Hex SHA-256 of a file's content.
pub fn sha256_hex(path: &Path) -> BCliResult<String> {
    let bytes = read_bytes(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Write `bytes` to `path` through a temporary file in the same
/// directory, renamed into place once complete. Earlier versions are
/// never modified; re-running a stage rewrites identical bytes.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> BCliResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context(WritingFileSnafu { path })?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes).context(WritingFileSnafu { path: &tmp })?;
    std::fs::rename(&tmp, path).context(WritingFileSnafu { path })?;
    Ok(())
}

/// The input directories a stage snapshot covers, relative to the
/// election directory.
const INPUT_DIRS: &[&str] = &[
    "1-election-spec",
    "2-reported",
    "3-audit/31-audit-spec",
    "3-audit/32-audit-orders",
    "3-audit/33-audited-votes",
];

/// Hash every input file plus the previous stage's state, as sorted
/// `(relative path, sha256)` rows.
pub fn snapshot_inputs(dir: &Path, prev_state: &Path) -> BCliResult<Vec<SnapshotEntry>> {
    let mut paths = Vec::new();
    for sub in INPUT_DIRS {
        collect_files(&dir.join(sub), &mut paths)?;
    }
    if prev_state.is_file() {
        paths.push(prev_state.to_path_buf());
    }
    paths.sort();

    let mut entries = Vec::with_capacity(paths.len());
    for path in paths {
        let relative = path
            .strip_prefix(dir)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        entries.push(SnapshotEntry {
            path: relative,
            sha256: sha256_hex(&path)?,
        });
    }
    Ok(entries)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> BCliResult<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    let entries = std::fs::read_dir(dir).context(OpeningFileSnafu { path: dir })?;
    for entry in entries {
        let entry = entry.context(OpeningFileSnafu { path: dir })?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
