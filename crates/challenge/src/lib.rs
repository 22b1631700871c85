pub mod categories;
pub mod config;
pub mod distance;
pub mod efforts;
pub mod errors;
pub mod gpx_processor;
pub mod leaderboard;
pub mod models;
pub mod segment_matching;

pub use crate::{
    categories::{Category, CategoryClassifier, CategoryKind, GenderBucket},
    config::MatchConfig,
    efforts::{
        EffortContext, EffortService, EffortStore, InMemoryEffortStore, Resolution, SyncSummary,
        resolve_effort, resolve_synced_effort,
    },
    errors::{ChallengeError, StoreError},
    gpx_processor::{parse_track, parse_track_str},
    leaderboard::{LeaderboardRow, UnrankedAthlete, athletes_without_time, compute_leaderboard},
    segment_matching::{
        FailureReason, MatchDiagnostics, MatchFailure, MatchOutcome, MatchResult, compute_match,
    },
};
