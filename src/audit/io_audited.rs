//! Reader for the cumulative audited-vote transcripts in
//! `3-audit/33-audited-votes/`.

use std::path::Path;

use log::{info, warn};

use bayes_audit::ids::{file_safe, parse_vote};
use bayes_audit::{AuditedVotes, Election};

use crate::audit::{files, readers, BCliResult};

/// `audited-votes-<pbcid>.csv`, the latest version per collection.
///
/// Each upload contains every ballot audited so far, so only the
/// operative file of a collection matters; earlier versions are archival.
/// A collection without a transcript yet simply contributes no audited
/// ballots.
pub fn read_audited_votes(dir: &Path, election: &Election) -> BCliResult<AuditedVotes> {
    let votes_dir = dir.join("3-audit").join("33-audited-votes");
    let mut audited = AuditedVotes::default();
    for pbcid in election.collections.keys() {
        let prefix = format!("audited-votes-{}", file_safe(pbcid));
        let path = match files::greatest_name_opt(&votes_dir, &prefix, ".csv")? {
            Some(path) => path,
            None => {
                warn!("no audited votes yet for collection {}", pbcid);
                continue;
            }
        };
        info!("reading audited votes {}", path.display());
        let table = readers::read_table(&path, &["pbcid", "bid", "cid"], true)?;
        for row in &table.rows {
            if row.field(0) != pbcid {
                return Err(table.bad_row(
                    row,
                    format!("row names collection `{}`, file is for `{}`", row.field(0), pbcid),
                ));
            }
            let vote = parse_vote(row.tail(3));
            audited.insert(pbcid, row.field(1), row.field(2), vote);
        }
    }
    Ok(audited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bayes_audit::Vote;
    use std::collections::BTreeMap;

    use bayes_audit::model::{
        Collection, Contest, ContestType, CvrType, ElectionMeta, Manifest, ReportedVotes,
        WriteinsPolicy,
    };

    fn election() -> Election {
        Election {
            meta: ElectionMeta::default(),
            contests: [(
                "C".to_string(),
                Contest {
                    cid: "C".to_string(),
                    contest_type: ContestType::Plurality,
                    winners: 1,
                    writeins: WriteinsPolicy::No,
                    selids: ["0", "1"].iter().map(|s| s.to_string()).collect(),
                    qualified_writeins: Default::default(),
                },
            )]
            .into_iter()
            .collect(),
            collections: [(
                "J".to_string(),
                Collection {
                    pbcid: "J".to_string(),
                    manager: "mgr@example.org".to_string(),
                    cvr_type: CvrType::Cvr,
                    cids: vec!["C".to_string()],
                },
            )]
            .into_iter()
            .collect(),
            manifests: [("J".to_string(), Manifest::default())].into_iter().collect(),
            reported: ReportedVotes::default(),
            outcomes: BTreeMap::new(),
        }
    }

    #[test]
    fn latest_version_wins() {
        let dir = tempfile::tempdir().unwrap();
        let vdir = dir.path().join("3-audit").join("33-audited-votes");
        std::fs::create_dir_all(&vdir).unwrap();
        std::fs::write(
            vdir.join("audited-votes-J-2017-11-21.csv"),
            "pbcid,bid,cid,sel_1\nJ,B-0001,C,1\n",
        )
        .unwrap();
        std::fs::write(
            vdir.join("audited-votes-J-2017-11-22.csv"),
            "pbcid,bid,cid,sel_1\nJ,B-0001,C,1\nJ,B-0002,C,0\n",
        )
        .unwrap();
        let audited = read_audited_votes(dir.path(), &election()).unwrap();
        assert_eq!(audited.audited_count("J"), 2);
        assert_eq!(
            audited.by_collection["J"]["B-0002"]["C"],
            Vote::set(["0"])
        );
    }

    #[test]
    fn missing_transcript_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let audited = read_audited_votes(dir.path(), &election()).unwrap();
        assert_eq!(audited.audited_count("J"), 0);
    }
}
