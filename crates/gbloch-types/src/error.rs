use thiserror::Error;

/// Failures of simulations, fits and analyses.
#[derive(Error, Debug)]
pub enum GblochError {
    /// An iterative solve (root finding, Monte-Carlo refits) gave up.
    #[error("Solver diverged at iteration {iteration}: {message}")]
    SolverDiverged { iteration: usize, message: String },

    /// Invalid configuration or call arguments.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Tissue parameters or results outside their physical range.
    #[error("Physics constraint violated: {0}")]
    PhysicsViolation(String),

    /// Malformed pulse sequence or segment.
    #[error("Sequence error: {0}")]
    Sequence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Singular or non-finite matrices.
    #[error("Linear algebra error: {0}")]
    LinAlg(String),
}

pub type GblochResult<T> = Result<T, GblochError>;
