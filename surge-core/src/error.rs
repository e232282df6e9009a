pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("run has no scenarios")]
    NoScenarios,

    #[error("duplicate scenario name: `{0}`")]
    DuplicateScenario(String),

    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("invalid `executor` (expected `constant-vus` or `ramping-vus`)")]
    InvalidExecutor,

    #[error("`stages` must be a non-empty list of {{ duration, target }} with a non-zero total duration")]
    InvalidStages,

    #[error("invalid threshold on `{metric}`: {reason}")]
    InvalidThreshold { metric: String, reason: String },

    #[error("setup failed: {0}")]
    Setup(String),
}
