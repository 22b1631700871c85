//! Matcher configuration.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Default maximum distance in meters for a ride point to count as "at" a route point.
pub const DEFAULT_TOLERANCE_M: f64 = 20.0;
/// Default fraction of route points that may go unmatched before a restart.
pub const DEFAULT_MAX_SKIP_FRACTION: f64 = 0.10;
/// Default speed below which time between ride points is not moving time (~1 mph).
pub const DEFAULT_STATIONARY_SPEED_MPS: f64 = 0.447;
/// Default hard ceiling on matcher steps, independent of input size.
pub const DEFAULT_MAX_ITERATIONS: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MatchConfig {
    #[validate(range(exclusive_min = 0.0))]
    pub tolerance_m: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub max_skip_fraction: f64,
    #[validate(range(min = 0.0))]
    pub stationary_speed_mps: f64,
    #[validate(range(min = 1))]
    pub max_iterations: u64,
    /// Record route-relative polylines for visual debugging.
    pub collect_diagnostics: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tolerance_m: DEFAULT_TOLERANCE_M,
            max_skip_fraction: DEFAULT_MAX_SKIP_FRACTION,
            stationary_speed_mps: DEFAULT_STATIONARY_SPEED_MPS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            collect_diagnostics: false,
        }
    }
}

impl MatchConfig {
    /// Reads overrides from `MATCH_*` environment variables, keeping defaults for anything
    /// missing or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tolerance_m: env_or("MATCH_TOLERANCE_M", defaults.tolerance_m),
            max_skip_fraction: env_or("MATCH_MAX_SKIP_FRACTION", defaults.max_skip_fraction),
            stationary_speed_mps: env_or(
                "MATCH_STATIONARY_SPEED_MPS",
                defaults.stationary_speed_mps,
            ),
            max_iterations: env_or("MATCH_MAX_ITERATIONS", defaults.max_iterations),
            collect_diagnostics: env_or("MATCH_DIAGNOSTICS", defaults.collect_diagnostics),
        }
    }

    pub fn with_diagnostics(mut self) -> Self {
        self.collect_diagnostics = true;
        self
    }

    /// Distance beyond which a forward scan gives up on a route point.
    pub fn too_far_m(&self) -> f64 {
        self.tolerance_m * 100.0
    }

    /// Number of skipped route points tolerated for a route of `route_points` points.
    pub fn skip_budget(&self, route_points: usize) -> f64 {
        self.max_skip_fraction * route_points as f64
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
