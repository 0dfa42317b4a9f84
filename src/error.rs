//! nmt-search error types

/// nmt-search result type
pub type Result<T> = std::result::Result<T, Error>;

/// nmt-search errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid strategy configuration, detected before any scorer call
    #[error("invalid search configuration: {reason}")]
    Config {
        /// Why the configuration is rejected
        reason: String,
    },

    /// Failure inside the scoring model, propagated unchanged to the caller
    #[error("scorer error: {0}")]
    Scorer(#[from] Box<dyn std::error::Error + Send + Sync>),

    /// Vocabulary misuse
    #[error("vocabulary error: {reason}")]
    Vocab {
        /// What went wrong
        reason: String,
    },
}
