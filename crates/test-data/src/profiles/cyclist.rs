//! Road and gravel cyclist profile.

use super::AthleteProfile;

/// A rider doing 8 m/s on flat road unless a preset says otherwise.
///
/// Each percent of climb takes a quarter off that pace down to a crawl; each percent of descent
/// adds 15% up to two and a half times flat speed.
#[derive(Debug, Clone)]
pub struct CyclistProfile {
    base_speed: f64,
    variance: f64,
}

impl Default for CyclistProfile {
    fn default() -> Self {
        Self {
            base_speed: 8.0,
            variance: 0.10,
        }
    }
}

impl CyclistProfile {
    pub fn with_speed(speed_kmh: f64) -> Self {
        Self {
            base_speed: speed_kmh / 3.6,
            ..Default::default()
        }
    }

    /// Race-fit rider (~35 km/h).
    pub fn elite() -> Self {
        Self::with_speed(35.0)
    }

    /// Weekend rider (~22 km/h).
    pub fn recreational() -> Self {
        Self::with_speed(22.0)
    }

    /// Loose surfaces: slower and less consistent.
    pub fn gravel() -> Self {
        Self {
            base_speed: 5.5,
            variance: 0.15,
        }
    }

    /// Picks a preset from a skill multiplier on segment time (below 1.0 is faster).
    pub fn for_skill(skill_factor: f64) -> Self {
        Self::with_speed(28.0 / skill_factor.max(0.1))
    }
}

impl AthleteProfile for CyclistProfile {
    fn base_speed_mps(&self) -> f64 {
        self.base_speed
    }

    fn grade_factor(&self, grade: f64) -> f64 {
        const CLIMB_PENALTY: f64 = 25.0;
        const DESCENT_GAIN: f64 = 15.0;

        match grade {
            g if g < 0.0 => (1.0 + DESCENT_GAIN * -g).min(2.5),
            g => (1.0 - CLIMB_PENALTY * g).max(0.15),
        }
    }

    fn variance(&self) -> f64 {
        self.variance
    }
}
