//! Procedural routes and simulated rides over them.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use challenge::distance::haversine_distance;
use challenge::models::{Track, TrackPoint};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use time::{Duration, OffsetDateTime, macros::datetime};

use crate::config::{BoundingBox, Region};
use crate::profiles::{self, AthleteProfile};

/// Rough meters per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_000.0;
/// Route points carry nominal timestamps one second apart from here.
const ROUTE_EPOCH: OffsetDateTime = datetime!(2024-01-01 00:00 UTC);
/// Spacing of fixes while rolling back through the start.
const RECROSS_STEP_M: f64 = 10.0;
/// Warm-up laps happen this far from the route start.
const WARM_UP_DISTANCE_M: f64 = 5_000.0;
/// Recording gap between the last warm-up fix and the first fix at the route start.
const WARM_UP_LEAD_S: i64 = 600;
/// A stopped head unit still logs a fix this often.
const PAUSE_FIX_INTERVAL_S: i64 = 10;

/// Configuration for procedural route generation.
#[derive(Debug, Clone)]
pub struct RouteConfig {
    /// Target distance in meters.
    pub distance_meters: f64,
    /// Starting point (lat, lon). If None, random within bounds.
    pub start_point: Option<(f64, f64)>,
    pub bounds: BoundingBox,
    /// Approximate distance between route points in meters.
    pub point_spacing_m: f64,
    /// Largest heading change between two route points, in radians.
    pub heading_wander: f64,
    /// Average climbing grade as a fraction.
    pub average_grade: f64,
    pub base_elevation_m: f64,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            distance_meters: 3000.0,
            start_point: None,
            bounds: Region::BOULDER,
            point_spacing_m: 10.0,
            heading_wander: 0.3,
            average_grade: 0.02,
            base_elevation_m: 1650.0,
        }
    }
}

/// Generates challenge routes as a random walk with momentum.
#[derive(Debug, Clone, Default)]
pub struct RouteGenerator {
    config: RouteConfig,
}

impl RouteGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_region(bounds: BoundingBox) -> Self {
        Self {
            config: RouteConfig {
                bounds,
                ..Default::default()
            },
        }
    }

    pub fn with_distance(mut self, meters: f64) -> Self {
        self.config.distance_meters = meters;
        self
    }

    pub fn with_start(mut self, lat: f64, lon: f64) -> Self {
        self.config.start_point = Some((lat, lon));
        self
    }

    pub fn with_point_spacing(mut self, meters: f64) -> Self {
        self.config.point_spacing_m = meters;
        self
    }

    pub fn with_heading_wander(mut self, radians: f64) -> Self {
        self.config.heading_wander = radians;
        self
    }

    pub fn with_grade(mut self, grade: f64) -> Self {
        self.config.average_grade = grade;
        self
    }

    /// Generates a single-segment route with elevations and nominal timestamps.
    pub fn generate(&self, rng: &mut impl Rng) -> Track {
        let start = self
            .config
            .start_point
            .unwrap_or_else(|| self.config.bounds.random_point(rng));
        let path = self.generate_path(start, rng);

        let mut distance = 0.0;
        let mut points = Vec::with_capacity(path.len());
        for (i, &(lat, lon)) in path.iter().enumerate() {
            if let Some(&(prev_lat, prev_lon)) = i.checked_sub(1).and_then(|p| path.get(p)) {
                distance += haversine_distance(prev_lat, prev_lon, lat, lon);
            }
            points.push(TrackPoint {
                elevation: Some(self.elevation_at(distance)),
                ..TrackPoint::new(lat, lon, ROUTE_EPOCH + Duration::seconds(i as i64))
            });
        }

        Track::from_points(points)
    }

    /// Coordinates only. Bounces off the edges of the bounding box.
    pub fn generate_path(&self, start: (f64, f64), rng: &mut impl Rng) -> Vec<(f64, f64)> {
        let mut path = vec![start];
        let mut current = start;
        let mut total_distance = 0.0;
        let mut heading = rng.gen_range(0.0..TAU);
        let wander = self.config.heading_wander.abs();

        while total_distance < self.config.distance_meters {
            if wander > 0.0 {
                heading += rng.gen_range(-wander..wander);
            }
            let step = self.config.point_spacing_m * rng.gen_range(0.8..1.2);
            let (lat, lon) = offset(current, heading, step);

            let (lat, lon, bounced_heading) = self.apply_bounds(lat, lon, heading);
            heading = bounced_heading;

            current = (lat, lon);
            path.push(current);
            total_distance += step;
        }

        path
    }

    /// Reflects a step that left the region back inside it and mirrors the heading.
    fn apply_bounds(&self, lat: f64, lon: f64, heading: f64) -> (f64, f64, f64) {
        let b = &self.config.bounds;
        let (lat, lat_hit) = reflect(lat, b.min_lat, b.max_lat);
        let (lon, lon_hit) = reflect(lon, b.min_lon, b.max_lon);

        let heading = match (lat_hit, lon_hit) {
            (true, true) => heading + PI,
            (true, false) => PI - heading,
            (false, true) => -heading,
            (false, false) => heading,
        };
        (lat, lon, heading)
    }

    /// A steady climb with gentle rollers on top.
    fn elevation_at(&self, distance: f64) -> f64 {
        self.config.base_elevation_m
            + self.config.average_grade * distance
            + 8.0 * (distance / 400.0).sin()
    }
}

/// A stop at some point of the ride.
#[derive(Debug, Clone, Copy)]
pub struct Pause {
    /// Position along the ride as a fraction of its fixes.
    pub at_fraction: f64,
    pub seconds: i64,
}

/// How a simulated rider deviates from a clean pass over the route.
#[derive(Debug, Clone)]
pub struct RideConfig {
    /// Time of the first fix at the route start.
    pub start_time: OffsetDateTime,
    /// GPS position jitter standard deviation in meters.
    pub gps_jitter_m: f64,
    /// Fixes recorded per route step; above 1 adds interpolated fixes.
    pub fixes_per_step: usize,
    pub pauses: Vec<Pause>,
    /// Fixes recorded far from the route before the rider gets there.
    pub warm_up_points: usize,
    /// Roll backwards through the start this far, then turn round and start properly.
    pub start_recrossing_m: Option<f64>,
    /// Leave the route at this fraction of it and never come back.
    pub diverge_at: Option<f64>,
    /// Number of track segments the recording is split into.
    pub segments: usize,
}

impl Default for RideConfig {
    fn default() -> Self {
        Self {
            start_time: datetime!(2024-07-01 08:00 UTC),
            gps_jitter_m: 3.0,
            fixes_per_step: 2,
            pauses: Vec::new(),
            warm_up_points: 0,
            start_recrossing_m: None,
            diverge_at: None,
            segments: 1,
        }
    }
}

/// Records a ride over a route the way a head unit would.
#[derive(Debug, Clone, Default)]
pub struct RideSimulator {
    config: RideConfig,
}

#[derive(Debug, Clone, Copy)]
struct Fix {
    lat: f64,
    lon: f64,
    elevation: f64,
}

impl Fix {
    fn from_point(point: &TrackPoint, fallback_elevation: f64) -> Self {
        Self {
            lat: point.lat,
            lon: point.lon,
            elevation: point.elevation.unwrap_or(fallback_elevation),
        }
    }

    fn position(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }

    fn moved(&self, (lat, lon): (f64, f64)) -> Self {
        Self { lat, lon, ..*self }
    }

    fn lerp(&self, other: &Fix, t: f64) -> Self {
        Self {
            lat: self.lat + (other.lat - self.lat) * t,
            lon: self.lon + (other.lon - self.lon) * t,
            elevation: self.elevation + (other.elevation - self.elevation) * t,
        }
    }
}

impl RideSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RideConfig) -> Self {
        Self { config }
    }

    pub fn starting_at(mut self, start_time: OffsetDateTime) -> Self {
        self.config.start_time = start_time;
        self
    }

    pub fn with_gps_jitter(mut self, meters: f64) -> Self {
        self.config.gps_jitter_m = meters;
        self
    }

    pub fn with_fixes_per_step(mut self, fixes: usize) -> Self {
        self.config.fixes_per_step = fixes;
        self
    }

    pub fn with_pause(mut self, at_fraction: f64, seconds: i64) -> Self {
        self.config.pauses.push(Pause {
            at_fraction,
            seconds,
        });
        self
    }

    pub fn with_warm_up(mut self, points: usize) -> Self {
        self.config.warm_up_points = points;
        self
    }

    pub fn with_start_recrossing(mut self, meters: f64) -> Self {
        self.config.start_recrossing_m = Some(meters);
        self
    }

    pub fn diverging_at(mut self, fraction: f64) -> Self {
        self.config.diverge_at = Some(fraction);
        self
    }

    pub fn split_into(mut self, segments: usize) -> Self {
        self.config.segments = segments;
        self
    }

    pub fn config(&self) -> &RideConfig {
        &self.config
    }

    /// Simulates one ride over `route`. An empty route gives an empty ride.
    pub fn simulate(
        &self,
        route: &Track,
        profile: &dyn AthleteProfile,
        rng: &mut impl Rng,
    ) -> Track {
        let route: Vec<Fix> = route
            .points()
            .map(|p| Fix::from_point(p, 0.0))
            .collect();
        let Some(first) = route.first().copied() else {
            return Track::default();
        };

        let mut path = Vec::new();
        if let Some(meters) = self.config.start_recrossing_m {
            roll_back_through_start(&route, meters, &mut path);
        }
        self.follow_route(&route, &mut path);

        let mut points = self.warm_up(&first, rng);
        points.extend(self.apply_timing(&path, profile, rng));

        self.split(points)
    }

    fn follow_route(&self, route: &[Fix], path: &mut Vec<Fix>) {
        let steps = self.config.fixes_per_step.max(1);
        let diverge_index = self
            .config
            .diverge_at
            .map(|f| ((route.len() - 1) as f64 * f.clamp(0.0, 1.0)) as usize);

        for (i, fix) in route.iter().enumerate() {
            path.push(*fix);
            if diverge_index == Some(i) {
                self.wander_off(route, i, path);
                return;
            }
            if let Some(next) = route.get(i + 1) {
                for s in 1..steps {
                    path.push(fix.lerp(next, s as f64 / steps as f64));
                }
            }
        }
    }

    /// Heads off at right angles from route point `at` for as far as the route had left.
    fn wander_off(&self, route: &[Fix], at: usize, path: &mut Vec<Fix>) {
        let remaining: f64 = route[at..]
            .windows(2)
            .map(|w| haversine_distance(w[0].lat, w[0].lon, w[1].lat, w[1].lon))
            .sum();
        let remaining_steps = route.len() - 1 - at;
        if remaining_steps == 0 {
            return;
        }

        let heading = match (at.checked_sub(1), route.get(at + 1)) {
            (Some(prev), _) => heading_between(route[prev].position(), route[at].position()),
            (None, Some(next)) => heading_between(route[at].position(), next.position()),
            (None, None) => 0.0,
        } + FRAC_PI_2;

        let fixes = remaining_steps * self.config.fixes_per_step.max(1);
        let step = remaining / fixes as f64;
        let origin = route[at];
        for k in 1..=fixes {
            path.push(origin.moved(offset(origin.position(), heading, step * k as f64)));
        }
    }

    /// Spaces fixes by the profile's speed and lays jitter and pauses on top.
    fn apply_timing(
        &self,
        path: &[Fix],
        profile: &dyn AthleteProfile,
        rng: &mut impl Rng,
    ) -> Vec<TrackPoint> {
        if path.is_empty() {
            return Vec::new();
        }

        let jitter = Normal::new(0.0, self.config.gps_jitter_m / METERS_PER_DEGREE).ok();
        let form = profiles::sample_variance(profile, rng);
        let last = (path.len() - 1) as f64;
        let pauses: Vec<(usize, i64)> = self
            .config
            .pauses
            .iter()
            .map(|p| ((last * p.at_fraction.clamp(0.0, 1.0)) as usize, p.seconds))
            .collect();

        let at = |elapsed: f64| {
            self.config.start_time + Duration::milliseconds((elapsed * 1000.0).round() as i64)
        };

        let mut elapsed = 0.0;
        let mut points = Vec::with_capacity(path.len());

        for (i, fix) in path.iter().enumerate() {
            if let Some(prev) = i.checked_sub(1).map(|p| &path[p]) {
                let distance = haversine_distance(prev.lat, prev.lon, fix.lat, fix.lon);
                let grade = if distance > 0.0 {
                    (fix.elevation - prev.elevation) / distance
                } else {
                    0.0
                };
                elapsed += distance / profiles::speed_at_grade(profile, grade, form);
            }

            let (lat, lon) = match &jitter {
                Some(noise) => (fix.lat + noise.sample(rng), fix.lon + noise.sample(rng)),
                None => (fix.lat, fix.lon),
            };
            let point = TrackPoint {
                elevation: Some(fix.elevation),
                ..TrackPoint::new(lat, lon, at(elapsed))
            };
            points.push(point.clone());

            for &(_, seconds) in pauses.iter().filter(|(index, _)| *index == i) {
                for _ in 0..seconds / PAUSE_FIX_INTERVAL_S {
                    elapsed += PAUSE_FIX_INTERVAL_S as f64;
                    points.push(TrackPoint {
                        time: at(elapsed),
                        ..point.clone()
                    });
                }
            }
        }

        points
    }

    /// Fixes logged while pottering about far from the route before the ride proper.
    fn warm_up(&self, near: &Fix, rng: &mut impl Rng) -> Vec<TrackPoint> {
        let count = self.config.warm_up_points;
        if count == 0 {
            return Vec::new();
        }

        let mut position = offset(near.position(), rng.gen_range(0.0..TAU), WARM_UP_DISTANCE_M);
        (0..count)
            .map(|i| {
                position = offset(position, rng.gen_range(0.0..TAU), rng.gen_range(0.0..15.0));
                let before = WARM_UP_LEAD_S + 5 * (count - i) as i64;
                TrackPoint {
                    elevation: Some(near.elevation),
                    ..TrackPoint::new(
                        position.0,
                        position.1,
                        self.config.start_time - Duration::seconds(before),
                    )
                }
            })
            .collect()
    }

    fn split(&self, points: Vec<TrackPoint>) -> Track {
        let size = points.len().div_ceil(self.config.segments.max(1)).max(1);
        Track::new(points.chunks(size).map(<[TrackPoint]>::to_vec).collect())
    }
}

/// Out-and-back behind the start, against the route's opening direction.
fn roll_back_through_start(route: &[Fix], meters: f64, path: &mut Vec<Fix>) {
    let (Some(start), Some(second)) = (route.first(), route.get(1)) else {
        return;
    };
    let back = heading_between(second.position(), start.position());
    let steps = (meters / RECROSS_STEP_M).ceil() as usize;

    path.push(*start);
    let leg = |k: usize| start.moved(offset(start.position(), back, RECROSS_STEP_M * k as f64));
    path.extend((1..=steps).map(leg));
    path.extend((1..steps).rev().map(leg));
}

/// Folds `value` back into `[min, max]`, by at most a thousandth of a degree.
fn reflect(value: f64, min: f64, max: f64) -> (f64, bool) {
    if value < min {
        (min + (min - value).min(0.001), true)
    } else if value > max {
        (max - (value - max).min(0.001), true)
    } else {
        (value, false)
    }
}

/// Moves `meters` along `heading` (radians clockwise from north).
fn offset((lat, lon): (f64, f64), heading: f64, meters: f64) -> (f64, f64) {
    (
        lat + meters * heading.cos() / METERS_PER_DEGREE,
        lon + meters * heading.sin() / (METERS_PER_DEGREE * lat.to_radians().cos()),
    )
}

fn heading_between(from: (f64, f64), to: (f64, f64)) -> f64 {
    let dlat = to.0 - from.0;
    let dlon = (to.1 - from.1) * from.0.to_radians().cos();
    dlon.atan2(dlat)
}
