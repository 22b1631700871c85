//! Fluent builder APIs for test scenarios.
//!
//! The [`ScenarioBuilder`] assembles a complete challenge: route, athletes, registrations,
//! simulated uploads and synced efforts, resolved into timing records.

mod scenario;

pub use scenario::{
    ScenarioBuilder, ScenarioMetrics, ScenarioResult, SimulatedRide, SyncedBatch, UploadSummary,
};
