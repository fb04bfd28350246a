/*!

Engine for Bayesian post-election audits of plurality elections with
multiple contests and multiple, separately managed paper ballot
collections.

The crate owns the in-memory election model, the seeded sampling machinery,
and the per-stage decision logic; reading and writing the election
directory is the caller's job. A typical stage:

1. load and consistency-check the election ([`model::Election`]),
2. recompute the per-collection sampling orders ([`sampling`]),
3. ingest the cumulative audited-vote transcripts ([`sample`]),
4. measure per-contest risks and update statuses ([`risk`], [`stage`]),
5. persist the returned snapshot, output, plan, and state rows.

Everything random flows through a SHA-256 counter-mode generator seeded by
the public audit seed ([`prng`]), so two runs over the same inputs produce
byte-identical artifacts.

*/

pub mod errors;
pub mod ids;
pub mod model;
pub mod outcomes;
pub mod prng;
pub mod risk;
pub mod sample;
pub mod sampling;
pub mod stage;

pub use errors::AuditError;
pub use ids::{classify_vote, file_safe, parse_vote, reduce, Vote, VoteKind};
pub use model::{
    AuditSeed, AuditSpec, Collection, Contest, ContestStatus, CvrType, Election, Manifest,
    SamplingMode,
};
pub use sample::{build_sample_counts, AuditedVotes, SampleCounts};
pub use sampling::sampling_order;
pub use stage::{initial_state, run_stage, stage_label, StageReport, StageState};
