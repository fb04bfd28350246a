use clap::{Parser, Subcommand};

/// Bayesian post-election audit support for an election with multiple
/// contests and multiple paper ballot collections.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,

    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load and check the election structure (election, contests, collections).
    ReadStructure {
        /// (directory path) The election directory.
        #[clap(value_parser)]
        dir: String,
    },
    /// Load reported CVRs, ballot manifests, and reported outcomes.
    ReadReported {
        #[clap(value_parser)]
        dir: String,
    },
    /// Load and validate the public audit seed.
    ReadSeed {
        #[clap(value_parser)]
        dir: String,
    },
    /// Produce the initial audit-order file for each collection.
    MakeAuditOrders {
        #[clap(value_parser)]
        dir: String,
    },
    /// Load and validate the audited-votes transcripts.
    ReadAudited {
        #[clap(value_parser)]
        dir: String,
    },
    /// Run one audit stage end to end. Stage 000 performs setup only.
    Stage {
        /// Stage number, e.g. 000, 001, 002.
        #[clap(value_parser)]
        stage: String,
        #[clap(value_parser)]
        dir: String,
    },
}
