use thiserror::Error;

/// Error types for the srfit-rs library.
#[derive(Error, Debug)]
pub enum FitError {
    /// A symbol with this name already exists in the namespace.
    #[error("Name collision: '{0}' is already in use")]
    NameCollision(String),

    /// Removal or lookup of an entity that is not present.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An expression references symbols that cannot be resolved.
    #[error("Unresolved variable(s): {}", names.join(", "))]
    UnresolvedVariable { names: Vec<String> },

    /// An operation needs a bound profile.
    #[error("Profile not set; assign the profile first")]
    ProfileNotSet,

    /// An operation needs a main equation.
    #[error("Equation not set; assign the profile equation first")]
    EquationNotSet,

    /// Adding an edge would create a propagation or evaluation cycle.
    #[error("Cycle detected: {0}")]
    CycleDetected(String),

    /// Objects created from different change trackers were linked.
    #[error("Tracker mismatch: '{0}' belongs to a different change tracker")]
    TrackerMismatch(String),

    /// Arrays of incompatible lengths were combined.
    #[error("Shape mismatch: expected length {expected}, got {found}")]
    ShapeMismatch { expected: usize, found: usize },

    /// Malformed expression string.
    #[error("Failed to parse expression at '{token}': {message}")]
    Parse { token: String, message: String },

    /// Expression is well formed but cannot be built into a graph.
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    /// Error raised while evaluating a node, generator or calculator.
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// A constrained parameter was requested as an independent variable.
    #[error("Parameter '{0}' is constrained and cannot be varied")]
    ConstrainedVariable(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for srfit-rs operations.
pub type Result<T> = std::result::Result<T, FitError>;

impl FitError {
    pub(crate) fn unresolved<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        FitError::UnresolvedVariable { names }
    }
}
