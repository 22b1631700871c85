use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChallengeError {
    #[error("Challenge {challenge} does not have segment GPX data available")]
    ConfigurationMissing { challenge: String },

    #[error("Malformed track: {0}")]
    MalformedTrack(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] validator::ValidationErrors),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Failures reported by an [`EffortStore`](crate::efforts::EffortStore) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A concurrent writer already holds a different record for the same key.
    #[error("Conflicting effort for segment {segment_id} and athlete {athlete_id}")]
    Conflict { segment_id: i64, athlete_id: i64 },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
