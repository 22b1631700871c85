//! Rider performance profiles.
//!
//! A profile turns terrain grade into a riding speed, which the ride simulator uses to space
//! out timestamps.

mod cyclist;

pub use cyclist::CyclistProfile;

use rand_distr::{Distribution, Normal};

/// How fast a rider goes on a given grade.
pub trait AthleteProfile: Send + Sync {
    /// Speed on flat road in meters per second.
    fn base_speed_mps(&self) -> f64;

    /// Speed multiplier for a grade expressed as a fraction (0.05 = 5%).
    ///
    /// Below 1.0 on climbs, above 1.0 on descents.
    fn grade_factor(&self, grade: f64) -> f64;

    /// Day-to-day form as a coefficient of variation (0.1 = ±10%).
    fn variance(&self) -> f64;
}

/// Target speed on `grade`, scaled by a sampled form factor. Never below 0.5 m/s.
pub fn speed_at_grade(profile: &dyn AthleteProfile, grade: f64, variance_factor: f64) -> f64 {
    let target = profile.base_speed_mps() * profile.grade_factor(grade);
    (target * variance_factor).max(0.5)
}

/// Samples today's form: a multiplier around 1.0, clamped to [0.7, 1.4].
pub fn sample_variance(profile: &dyn AthleteProfile, rng: &mut impl rand::Rng) -> f64 {
    match Normal::new(1.0, profile.variance()) {
        Ok(normal) if profile.variance() > 0.0 => normal.sample(rng).clamp(0.7, 1.4),
        _ => 1.0,
    }
}
