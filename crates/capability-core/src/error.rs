use thiserror::Error;

/// Error taxonomy surfaced by the capability learning core (spec §7).
///
/// `ParseError` is deliberately absent: a failed parse never propagates past the Analyzer
/// boundary (`analyze` returns an empty `StaticStructure` and logs a warning instead), so it
/// is not a variant callers of `save_capability` can observe.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("capability reference {reference:?} did not resolve against the registry: {reason}")]
    TransformResolution { reference: String, reason: String },

    #[error("embedding provider failed: {0}")]
    Embedding(String),

    #[error("persistence operation failed: {0}")]
    Persistence(String),

    #[error("invalid dependency {from} -> {to} ({edge_type}): {reason}")]
    InvalidDependency {
        from: String,
        to: String,
        edge_type: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("capability {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// A non-fatal condition surfaced via the logger rather than propagated, per spec §7's policy
/// table for `LiteralTransformError` and `CycleWarning`. Callers may still want to inspect these
/// (e.g. to report them alongside a successful save), so pipelines collect them as `Warning`s
/// instead of discarding them outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The transformer hit a literal-lifting exception; the original source was kept (§7).
    LiteralTransform { message: String },
    /// A reverse `contains` edge already existed when a new one was inserted (§4.5, §7).
    ContainsCycle { from: String, to: String },
    /// The analyzer could not parse the input; an empty structure was returned (§4.1, §7).
    ParseFailed { message: String },
}
