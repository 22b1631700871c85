//! Entity generators for test data.
//!
//! - [`AthleteGenerator`]: athletes with demographics, and their challenge registrations
//! - [`EffortGenerator`]: synced segment efforts with realistic time distributions

pub mod athlete;
pub mod effort;

pub use athlete::{AthleteGenConfig, AthleteGenerator};
pub use effort::{EffortGenConfig, EffortGenerator};
