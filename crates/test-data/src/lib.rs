//! Test data generation for segment challenges.
//!
//! Procedural routes, rides simulated over them with realistic GPS noise, athletes with
//! demographics, synced efforts with realistic time distributions, and a scenario builder
//! that resolves all of it through the challenge effort service.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use test_data::prelude::*;
//!
//! let mut rng = StdRng::seed_from_u64(7);
//! let scenario = ScenarioBuilder::leaderboard_test().build(&mut rng).await?;
//! let rows = scenario.leaderboard();
//! ```

pub mod builders;
pub mod config;
pub mod generators;
pub mod gpx;
pub mod profiles;
pub mod sources;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::builders::{ScenarioBuilder, ScenarioMetrics, ScenarioResult, SimulatedRide};
    pub use crate::config::{BoundingBox, EffortChannel, Region, SkillDistribution};
    pub use crate::generators::{AthleteGenerator, EffortGenerator};
    pub use crate::gpx::generate_gpx;
    pub use crate::profiles::{AthleteProfile, CyclistProfile, sample_variance, speed_at_grade};
    pub use crate::sources::{RideSimulator, RouteGenerator};
    pub use rand::{SeedableRng, rngs::StdRng};
}
