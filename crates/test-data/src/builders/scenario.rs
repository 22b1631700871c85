//! Fluent builder for constructing challenge scenarios.

use std::ops::RangeInclusive;
use std::time::Instant;

use bytes::Bytes;
use challenge::{
    ChallengeError, EffortService, EffortStore as _, InMemoryEffortStore, LeaderboardRow,
    MatchConfig, Resolution, SyncSummary, compute_leaderboard,
    models::{
        AgeGroup, Athlete, Challenge, ChallengeType, Registration, SpecialCategory, SyncedEffort,
        TimingRecord, Track,
    },
};
use rand::Rng;
use time::{OffsetDateTime, macros::datetime};
use tracing::{debug, info};

use crate::config::{BoundingBox, EffortChannel, Region, SkillDistribution};
use crate::generators::{AthleteGenConfig, AthleteGenerator, EffortGenConfig, EffortGenerator};
use crate::gpx::generate_gpx;
use crate::profiles::CyclistProfile;
use crate::sources::{RideSimulator, RouteGenerator};

/// A simulated GPX upload.
#[derive(Debug, Clone)]
pub struct SimulatedRide {
    pub athlete_id: i64,
    pub name: String,
    pub track: Track,
    /// The rider left the route part way; the upload should be rejected.
    pub diverges: bool,
    /// Whether the matcher accepted it. `None` until the scenario has been built.
    pub matched: Option<bool>,
}

/// Efforts the activity source reports for one athlete.
#[derive(Debug, Clone)]
pub struct SyncedBatch {
    pub athlete_id: i64,
    pub efforts: Vec<SyncedEffort>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub matched: usize,
    pub rejected: usize,
}

/// Everything a built scenario produced.
#[derive(Debug)]
pub struct ScenarioResult {
    pub challenge: Challenge,
    pub athletes: Vec<Athlete>,
    pub registrations: Vec<Registration>,
    pub rides: Vec<SimulatedRide>,
    pub synced: Vec<SyncedBatch>,
    /// Store contents after every upload and sync went through the effort service.
    pub records: Vec<TimingRecord>,
    pub uploads: UploadSummary,
    pub sync: SyncSummary,
    /// Populated if metrics tracking is enabled.
    pub metrics: Option<ScenarioMetrics>,
}

impl ScenarioResult {
    pub fn leaderboard(&self) -> Vec<LeaderboardRow> {
        compute_leaderboard(
            &self.challenge,
            &self.records,
            &self.registrations,
            &self.athletes,
        )
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioMetrics {
    /// Time spent generating routes, rides and efforts (milliseconds).
    pub generation_time_ms: u64,
    /// Time spent matching uploads and resolving efforts (milliseconds).
    pub resolution_time_ms: u64,
    pub athlete_count: usize,
    pub ride_count: usize,
    pub synced_effort_count: usize,
    /// Total points across all simulated rides.
    pub total_track_points: usize,
}

/// Builder for complete challenge scenarios.
///
/// # Example
///
/// ```rust,ignore
/// let result = ScenarioBuilder::new()
///     .with_athletes(40)
///     .with_region(Region::BERNESE_OBERLAND)
///     .with_route_distance(4000.0)
///     .with_challenge_type(ChallengeType::MostLaps)
///     .with_efforts_per_athlete(1..=4)
///     .build(&mut rng)
///     .await?;
/// ```
pub struct ScenarioBuilder {
    // Athletes
    athlete_count: usize,
    athlete_config: AthleteGenConfig,

    // Route
    region: BoundingBox,
    route_distance: f64,
    route_grade: f64,

    // Challenge
    challenge_id: i64,
    challenge_name: String,
    segment_id: i64,
    starts_at: OffsetDateTime,
    ends_at: OffsetDateTime,
    challenge_type: ChallengeType,
    use_moving_time: bool,
    age_groups: Vec<AgeGroup>,
    special_categories: Vec<SpecialCategory>,

    // Efforts
    efforts_per_athlete: RangeInclusive<usize>,
    skill_distribution: SkillDistribution,
    channel: EffortChannel,
    divergent_ride_rate: f64,
    messy_ride_rate: f64,

    // Misc
    match_config: MatchConfig,
    track_metrics: bool,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioBuilder {
    pub fn new() -> Self {
        Self {
            athlete_count: 30,
            athlete_config: AthleteGenConfig::default(),
            region: Region::BOULDER,
            route_distance: 3000.0,
            route_grade: 0.03,
            challenge_id: 1,
            challenge_name: "hill-climb".to_string(),
            segment_id: 1000,
            starts_at: datetime!(2024-07-01 00:00 UTC),
            ends_at: datetime!(2024-07-31 23:59:59 UTC),
            challenge_type: ChallengeType::Fastest,
            use_moving_time: false,
            age_groups: default_age_groups(),
            special_categories: Vec::new(),
            efforts_per_athlete: 1..=2,
            skill_distribution: SkillDistribution::power_law(),
            channel: EffortChannel::default(),
            divergent_ride_rate: 0.1,
            messy_ride_rate: 0.3,
            match_config: MatchConfig::default(),
            track_metrics: false,
        }
    }

    pub fn with_athletes(mut self, count: usize) -> Self {
        self.athlete_count = count;
        self
    }

    pub fn with_athlete_config(mut self, config: AthleteGenConfig) -> Self {
        self.athlete_config = config;
        self
    }

    pub fn with_region(mut self, region: BoundingBox) -> Self {
        self.region = region;
        self
    }

    pub fn with_route_distance(mut self, meters: f64) -> Self {
        self.route_distance = meters;
        self
    }

    pub fn with_route_grade(mut self, grade: f64) -> Self {
        self.route_grade = grade;
        self
    }

    pub fn with_challenge(mut self, id: i64, name: impl Into<String>, segment_id: i64) -> Self {
        self.challenge_id = id;
        self.challenge_name = name.into();
        self.segment_id = segment_id;
        self
    }

    pub fn with_window(mut self, starts_at: OffsetDateTime, ends_at: OffsetDateTime) -> Self {
        self.starts_at = starts_at;
        self.ends_at = ends_at;
        self
    }

    pub fn with_challenge_type(mut self, challenge_type: ChallengeType) -> Self {
        self.challenge_type = challenge_type;
        self
    }

    pub fn with_moving_time(mut self, enabled: bool) -> Self {
        self.use_moving_time = enabled;
        self
    }

    pub fn with_age_groups(mut self, age_groups: Vec<AgeGroup>) -> Self {
        self.age_groups = age_groups;
        self
    }

    pub fn with_special_category(mut self, id: i32, name: impl Into<String>) -> Self {
        self.special_categories.push(SpecialCategory {
            special_category_id: id,
            category_name: name.into(),
        });
        self
    }

    pub fn with_efforts_per_athlete(mut self, range: RangeInclusive<usize>) -> Self {
        self.efforts_per_athlete = range;
        self
    }

    pub fn with_skill_distribution(mut self, dist: SkillDistribution) -> Self {
        self.skill_distribution = dist;
        self
    }

    pub fn with_channel(mut self, channel: EffortChannel) -> Self {
        self.channel = channel;
        self
    }

    /// Fraction of uploads where the rider leaves the route and never completes it.
    pub fn with_divergent_rides(mut self, rate: f64) -> Self {
        self.divergent_ride_rate = rate;
        self
    }

    /// Fraction of uploads with warm-ups, pauses, a roll back through the start or a split
    /// recording.
    pub fn with_messy_rides(mut self, rate: f64) -> Self {
        self.messy_ride_rate = rate;
        self
    }

    pub fn with_match_config(mut self, config: MatchConfig) -> Self {
        self.match_config = config;
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.track_metrics = enabled;
        self
    }

    /// Generates the challenge, athletes, rides and synced efforts without resolving any.
    pub fn build_data(&self, rng: &mut impl Rng) -> ScenarioResult {
        let start_time = self.track_metrics.then(Instant::now);

        let route = RouteGenerator::for_region(self.region)
            .with_distance(self.route_distance)
            .with_grade(self.route_grade)
            .generate(rng);
        let challenge = self.challenge(route.clone());

        let athlete_gen = AthleteGenerator::with_config(self.athlete_config.clone());
        let athletes = athlete_gen.generate_batch(1, self.athlete_count, rng);
        let registrations: Vec<Registration> = athletes
            .iter()
            .map(|athlete| athlete_gen.register(&challenge, athlete, rng))
            .collect();

        let effort_gen = EffortGenerator::with_config(EffortGenConfig {
            skill_distribution: self.skill_distribution,
            ..Default::default()
        });
        let expected_time = EffortGenerator::expected_time(&route, &CyclistProfile::default());

        let mut rides = Vec::new();
        let mut synced = Vec::new();

        for athlete in &athletes {
            let skill = effort_gen.sample_skill_factor(rng);
            let count = rng.gen_range(self.efforts_per_athlete.clone());

            let uploads = match self.channel {
                EffortChannel::Upload => true,
                EffortChannel::Sync => false,
                EffortChannel::Mixed => rng.gen_bool(0.5),
            };

            if uploads {
                let profile = CyclistProfile::for_skill(skill);
                for lap in 0..count {
                    let started_at = effort_gen.start_time_within(&challenge, rng);
                    rides.push(self.simulate_ride(&route, athlete, lap, &profile, started_at, rng));
                }
            } else {
                let efforts = (0..count as i64)
                    .map(|lap| {
                        let id = athlete.id * 100 + lap;
                        effort_gen.synced_effort(&challenge, id, id, expected_time, skill, rng)
                    })
                    .collect();
                synced.push(SyncedBatch {
                    athlete_id: athlete.id,
                    efforts,
                });
            }
        }

        let metrics = start_time.map(|start| ScenarioMetrics {
            generation_time_ms: start.elapsed().as_millis() as u64,
            resolution_time_ms: 0,
            athlete_count: athletes.len(),
            ride_count: rides.len(),
            synced_effort_count: synced.iter().map(|batch| batch.efforts.len()).sum(),
            total_track_points: rides.iter().map(|ride| ride.track.point_count()).sum(),
        });

        ScenarioResult {
            challenge,
            athletes,
            registrations,
            rides,
            synced,
            records: Vec::new(),
            uploads: UploadSummary::default(),
            sync: SyncSummary::default(),
            metrics,
        }
    }

    /// Generates the scenario and pushes every ride and synced effort through the effort
    /// service, as the live system would.
    pub async fn build(self, rng: &mut impl Rng) -> Result<ScenarioResult, ChallengeError> {
        let mut result = self.build_data(rng);
        let resolution_start = Instant::now();

        let service = EffortService::new(InMemoryEffortStore::new(), self.match_config.clone());

        for ride in &mut result.rides {
            let gpx = Bytes::from(generate_gpx(&ride.track, &ride.name));
            let resolution = service
                .upload_ride(&result.challenge, ride.athlete_id, &gpx)
                .await?;

            let matched = !matches!(resolution, Resolution::NoMatch(_));
            if matched {
                result.uploads.matched += 1;
            } else {
                result.uploads.rejected += 1;
            }
            ride.matched = Some(matched);
        }

        for batch in &result.synced {
            let summary = service
                .sync_efforts(&result.challenge, batch.athlete_id, &batch.efforts)
                .await?;
            result.sync.created += summary.created;
            result.sync.updated += summary.updated;
            result.sync.ignored += summary.ignored;
        }

        result.records = service
            .store()
            .efforts_for_segment(result.challenge.segment_id)
            .await?;

        if let Some(metrics) = result.metrics.as_mut() {
            metrics.resolution_time_ms = resolution_start.elapsed().as_millis() as u64;
        }

        info!(
            "Built scenario {}: {} athletes, {} uploads ({} matched), {} synced efforts ({} ignored), {} records",
            result.challenge.name,
            result.athletes.len(),
            result.rides.len(),
            result.uploads.matched,
            result.synced.iter().map(|b| b.efforts.len()).sum::<usize>(),
            result.sync.ignored,
            result.records.len()
        );

        Ok(result)
    }

    fn challenge(&self, route: Track) -> Challenge {
        Challenge {
            id: self.challenge_id,
            name: self.challenge_name.clone(),
            display_name: Some(title_case(&self.challenge_name)),
            segment_id: self.segment_id,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            challenge_type: self.challenge_type,
            use_moving_time: self.use_moving_time,
            route: Some(route),
            age_groups: self.age_groups.clone(),
            special_categories: self.special_categories.clone(),
        }
    }

    fn simulate_ride(
        &self,
        route: &Track,
        athlete: &Athlete,
        lap: usize,
        profile: &CyclistProfile,
        started_at: OffsetDateTime,
        rng: &mut impl Rng,
    ) -> SimulatedRide {
        let mut simulator = RideSimulator::new().starting_at(started_at);

        if rng.gen_bool(self.messy_ride_rate.clamp(0.0, 1.0)) {
            simulator = match rng.gen_range(0..4) {
                0 => simulator.with_warm_up(rng.gen_range(10..40)),
                1 => simulator.with_pause(rng.gen_range(0.2..0.8), rng.gen_range(60..300)),
                2 => simulator.with_start_recrossing(2_500.0),
                _ => simulator.split_into(rng.gen_range(2..4)),
            };
        }

        let diverges = rng.gen_bool(self.divergent_ride_rate.clamp(0.0, 1.0));
        if diverges {
            simulator = simulator.diverging_at(rng.gen_range(0.3..0.7));
        }

        let name = format!("{} lap {}", athlete.display_name(), lap + 1);
        debug!("Simulating {name} (diverges: {diverges})");

        SimulatedRide {
            athlete_id: athlete.id,
            track: simulator.simulate(route, profile, rng),
            name,
            diverges,
            matched: None,
        }
    }
}

fn default_age_groups() -> Vec<AgeGroup> {
    [(29, "Under 30"), (39, "30-39"), (49, "40-49"), (150, "50 and over")]
        .into_iter()
        .map(|(maximum_age, description)| AgeGroup {
            maximum_age,
            description: description.to_string(),
        })
        .collect()
}

fn title_case(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Preset scenarios for common testing needs.
impl ScenarioBuilder {
    /// Fastest-time challenge with a power-law field and clean uploads only.
    pub fn leaderboard_test() -> Self {
        Self::new()
            .with_athletes(60)
            .with_efforts_per_athlete(1..=3)
            .with_skill_distribution(SkillDistribution::power_law())
            .with_divergent_rides(0.0)
            .with_messy_rides(0.0)
    }

    /// Most-laps challenge where athletes log several efforts each.
    pub fn most_laps_test() -> Self {
        Self::new()
            .with_athletes(25)
            .with_challenge(2, "lap-attack", 2000)
            .with_challenge_type(ChallengeType::MostLaps)
            .with_route_distance(1500.0)
            .with_efforts_per_athlete(1..=6)
            .with_channel(EffortChannel::Sync)
    }

    /// Uploads only, with plenty of warm-ups, stops, restarts and abandoned rides.
    pub fn messy_uploads_test() -> Self {
        Self::new()
            .with_athletes(20)
            .with_channel(EffortChannel::Upload)
            .with_divergent_rides(0.25)
            .with_messy_rides(0.8)
            .with_metrics(true)
    }

    /// Alpine climb with special categories, moving time and both effort channels.
    pub fn comprehensive_test() -> Self {
        Self::new()
            .with_athletes(75)
            .with_region(Region::BERNESE_OBERLAND)
            .with_challenge(3, "grosse-scheidegg", 3000)
            .with_route_distance(5000.0)
            .with_route_grade(0.05)
            .with_moving_time(true)
            .with_special_category(1, "Single Speed")
            .with_special_category(2, "E-Bike")
            .with_efforts_per_athlete(1..=3)
            .with_metrics(true)
    }
}
