//! Alignment of an uploaded ride against a challenge's reference route.
//!
//! Matching walks the route points in order while a cursor moves forward through the ride.
//! Unmatched route points are skipped up to a budget; exceeding it, or failing to reach the final
//! route point, restarts the search one ride point further along. A ride that cannot be aligned
//! produces [`MatchOutcome::Failed`], never a partial result.

mod cursor;
mod diagnostics;
mod state;

use time::Duration;
use validator::Validate;

pub use cursor::RideCursor;
pub use diagnostics::MatchDiagnostics;

use crate::config::MatchConfig;
use crate::errors::ChallengeError;
use crate::models::{Track, TrackPoint};
use cursor::Ride;
use state::Matcher;

/// A successful alignment of a ride with a route.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Ride point matched to the first route point.
    pub start: TrackPoint,
    /// Ride point matched to the last route point.
    pub end: TrackPoint,
    pub start_cursor: RideCursor,
    pub end_cursor: RideCursor,
    pub elapsed: Duration,
    /// Elapsed time minus intervals spent below the stationary speed.
    pub moving: Duration,
    pub stopped: Duration,
    pub matched_points: usize,
    pub skipped_points: usize,
    pub restarts: u32,
    pub iterations: u64,
    pub diagnostics: Option<MatchDiagnostics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// No ride point came within tolerance of the first route point.
    StartNotFound,
    /// The ride ran out before the route was completed.
    RouteNotCompleted,
    /// The hard step ceiling was reached.
    IterationBudgetExceeded,
}

impl FailureReason {
    /// Stable diagnostic code.
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::StartNotFound => "start_not_found",
            FailureReason::RouteNotCompleted => "route_not_completed",
            FailureReason::IterationBudgetExceeded => "iteration_budget_exceeded",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchFailure {
    pub reason: FailureReason,
    pub restarts: u32,
    pub iterations: u64,
    /// Paths of the last abandoned attempt, if diagnostics were collected.
    pub diagnostics: Option<MatchDiagnostics>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched(MatchResult),
    Failed(MatchFailure),
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched(_))
    }

    pub fn as_match(&self) -> Option<&MatchResult> {
        match self {
            MatchOutcome::Matched(result) => Some(result),
            MatchOutcome::Failed(_) => None,
        }
    }

    pub fn diagnostics(&self) -> Option<&MatchDiagnostics> {
        match self {
            MatchOutcome::Matched(result) => result.diagnostics.as_ref(),
            MatchOutcome::Failed(failure) => failure.diagnostics.as_ref(),
        }
    }
}

/// Decides whether `ride` traces `route`.
///
/// Only malformed input is an error: an invalid configuration or a route without points.
/// An empty ride simply fails to match.
pub fn compute_match(
    route: &Track,
    ride: &Track,
    config: &MatchConfig,
) -> Result<MatchOutcome, ChallengeError> {
    config.validate()?;

    let route_points: Vec<&TrackPoint> = route.points().collect();
    if route_points.is_empty() {
        return Err(ChallengeError::MalformedTrack(
            "Route has no track points".to_string(),
        ));
    }

    Ok(Matcher::new(route_points, Ride::new(ride), config).run())
}
