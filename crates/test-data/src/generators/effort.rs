//! Pre-timed segment efforts, as the activity source reports them on sync.

use challenge::distance::haversine_distance;
use challenge::models::{Challenge, SyncedEffort, Track, TrackPoint};
use rand::Rng;
use rand_distr::{Distribution, LogNormal, Normal};
use time::{Duration, OffsetDateTime};

use crate::config::SkillDistribution;
use crate::profiles::AthleteProfile;

#[derive(Debug, Clone)]
pub struct EffortGenConfig {
    pub skill_distribution: SkillDistribution,
    /// Coefficient of variation between one athlete's efforts.
    pub time_variance: f64,
    /// Probability that moving time is shorter than elapsed time.
    pub pause_probability: f64,
    /// Pause time as a fraction of elapsed time.
    pub pause_fraction_range: (f64, f64),
    /// Probability that an effort was ridden outside the challenge window.
    pub outside_window_rate: f64,
}

impl Default for EffortGenConfig {
    fn default() -> Self {
        Self {
            skill_distribution: SkillDistribution::power_law(),
            time_variance: 0.15,
            pause_probability: 0.1,
            pause_fraction_range: (0.02, 0.15),
            outside_window_rate: 0.1,
        }
    }
}

/// Generates segment efforts as the activity source would report them.
#[derive(Debug, Clone, Default)]
pub struct EffortGenerator {
    config: EffortGenConfig,
}

impl EffortGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EffortGenConfig) -> Self {
        Self { config }
    }

    /// One synced effort on the challenge segment.
    ///
    /// `expected_time` is an average rider's time; `skill_factor` scales it for this athlete.
    pub fn synced_effort(
        &self,
        challenge: &Challenge,
        effort_id: i64,
        activity_id: i64,
        expected_time: f64,
        skill_factor: f64,
        rng: &mut impl Rng,
    ) -> SyncedEffort {
        let elapsed = expected_time * skill_factor * self.sample_variance(rng);

        let moving = if rng.r#gen::<f64>() < self.config.pause_probability {
            let (low, high) = self.config.pause_fraction_range;
            elapsed * (1.0 - rng.gen_range(low..high))
        } else {
            elapsed
        };

        let started_at = if rng.r#gen::<f64>() < self.config.outside_window_rate {
            challenge.starts_at - Duration::days(rng.gen_range(1..30))
        } else {
            self.start_time_within(challenge, rng)
        };

        SyncedEffort {
            effort_id,
            activity_id,
            segment_id: challenge.segment_id,
            started_at,
            elapsed_seconds: elapsed.round() as i64,
            moving_seconds: moving.round() as i64,
        }
    }

    /// A random start time inside the challenge window, at least an hour before it closes.
    pub fn start_time_within(&self, challenge: &Challenge, rng: &mut impl Rng) -> OffsetDateTime {
        let window = (challenge.ends_at - challenge.starts_at - Duration::HOUR).whole_seconds();
        if window <= 0 {
            return challenge.starts_at;
        }
        challenge.starts_at + Duration::seconds(rng.gen_range(0..window))
    }

    /// Seconds an average rider on `profile` needs for the route, from its length and net grade.
    pub fn expected_time(route: &Track, profile: &dyn AthleteProfile) -> f64 {
        let points: Vec<&TrackPoint> = route.points().collect();
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return 0.0;
        };

        let distance: f64 = points
            .windows(2)
            .map(|w| haversine_distance(w[0].lat, w[0].lon, w[1].lat, w[1].lon))
            .sum();
        if distance <= 0.0 {
            return 0.0;
        }

        let climb = last.elevation.unwrap_or(0.0) - first.elevation.unwrap_or(0.0);
        let speed = profile.base_speed_mps() * profile.grade_factor(climb / distance);
        distance / speed.max(0.5)
    }

    /// Multiplier on expected time: below 1.0 is faster than average.
    pub fn sample_skill_factor(&self, rng: &mut impl Rng) -> f64 {
        match self.config.skill_distribution {
            SkillDistribution::Uniform => rng.gen_range(0.7..1.5),

            SkillDistribution::Normal { mean, std_dev } => match Normal::new(mean, std_dev) {
                Ok(normal) => normal.sample(rng).clamp(0.5, 2.0),
                Err(_) => mean.clamp(0.5, 2.0),
            },

            SkillDistribution::PowerLaw { alpha } => {
                // Log-normal with mean 1.0 and a heavy right tail.
                let sigma = 0.4 / alpha.sqrt();
                let mu = -0.5 * sigma * sigma;
                match LogNormal::new(mu, sigma) {
                    Ok(log_normal) => log_normal.sample(rng).clamp(0.5, 3.0),
                    Err(_) => 1.0,
                }
            }
        }
    }

    fn sample_variance(&self, rng: &mut impl Rng) -> f64 {
        match Normal::new(1.0, self.config.time_variance) {
            Ok(normal) => normal.sample(rng).clamp(0.8, 1.3),
            Err(_) => 1.0,
        }
    }
}
