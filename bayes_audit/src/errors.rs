use snafu::Snafu;

/// Errors that stop the current audit stage.
///
/// None of these are recovered silently: the caller reports the offending
/// file and row alongside the reduced identifiers carried here.
#[derive(Debug, Snafu, Clone, PartialEq)]
#[snafu(visibility(pub))]
pub enum AuditError {
    #[snafu(display("election model inconsistency: {detail}"))]
    ModelConsistency { detail: String },

    #[snafu(display("unknown selection `{selid}` for contest `{cid}`"))]
    UnknownSelection { cid: String, selid: String },

    #[snafu(display(
        "collection `{pbcid}`: manifest lists {manifest_total} ballots \
         but reported data accounts for {declared}"
    ))]
    ManifestArithmetic {
        pbcid: String,
        manifest_total: u64,
        declared: u64,
    },

    #[snafu(display(
        "collection `{pbcid}`: audited votes skip ballot `{missing_bid}` of the sampling order"
    ))]
    OutOfOrderSample { pbcid: String, missing_bid: String },

    #[snafu(display("parameter `{name}` = {value} out of range for `{scope}`"))]
    ParameterOutOfRange {
        scope: String,
        name: String,
        value: String,
    },

    #[snafu(display("audit seed `{seed}` is not a decimal string of at least 20 digits"))]
    SeedInvalid { seed: String },

    #[snafu(display("`{path_a}` and `{path_b}` have identical content"))]
    FileIntegrity { path_a: String, path_b: String },
}

pub type Result<T, E = AuditError> = std::result::Result<T, E>;
