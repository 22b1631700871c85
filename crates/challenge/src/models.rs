use geo::geometry::Point;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A single recorded GPS fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    /// Stored for completeness; matching ignores it.
    #[serde(default)]
    pub elevation: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

impl TrackPoint {
    pub fn new(lat: f64, lon: f64, time: OffsetDateTime) -> Self {
        Self {
            lat,
            lon,
            elevation: None,
            time,
        }
    }

    /// The point as a geo `Point` (x = longitude, y = latitude).
    pub fn point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

/// An ordered sequence of track segments, each an ordered sequence of points.
///
/// Timestamps are expected to be non-decreasing within a segment but this is not checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub segments: Vec<Vec<TrackPoint>>,
}

impl Track {
    pub fn new(segments: Vec<Vec<TrackPoint>>) -> Self {
        Self { segments }
    }

    /// Builds a single-segment track.
    pub fn from_points(points: Vec<TrackPoint>) -> Self {
        Self {
            segments: vec![points],
        }
    }

    /// All points in order, across segment boundaries.
    pub fn points(&self) -> impl Iterator<Item = &TrackPoint> {
        self.segments.iter().flatten()
    }

    pub fn point_count(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.point_count() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeType {
    /// Best single time wins.
    Fastest,
    /// Most laps wins, cumulative time breaks ties.
    MostLaps,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeGroup {
    pub maximum_age: i32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialCategory {
    pub special_category_id: i32,
    pub category_name: String,
}

/// A competition scoped to one segment and an inclusive date window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub segment_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ends_at: OffsetDateTime,
    pub challenge_type: ChallengeType,
    #[serde(default)]
    pub use_moving_time: bool,
    /// Reference route; matching is disabled when absent.
    #[serde(default)]
    pub route: Option<Track>,
    #[serde(default)]
    pub age_groups: Vec<AgeGroup>,
    #[serde(default)]
    pub special_categories: Vec<SpecialCategory>,
}

impl Challenge {
    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        instant >= self.starts_at && instant <= self.ends_at
    }

    pub fn start_year(&self) -> i32 {
        self.starts_at.year()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Athlete {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// Raw gender code as reported by the activity source (`M`, `F`, ...).
    #[serde(default)]
    pub gender: Option<char>,
    #[serde(default)]
    pub birth_year: Option<i32>,
}

impl Athlete {
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if !full.is_empty() {
            return full;
        }

        match self.username.as_deref() {
            Some(username) if !username.is_empty() => username.to_string(),
            _ => format!("User {}", self.id),
        }
    }

    /// Age by calendar-year subtraction, as used for category placement.
    pub fn racing_age(&self, year: i32) -> Option<i32> {
        self.birth_year.map(|birth_year| year - birth_year)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub challenge_id: i64,
    pub athlete_id: i64,
    #[serde(default)]
    pub special_category_id: Option<i32>,
}

/// Where a timing record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffortSource {
    /// Derived from a manually uploaded GPX track.
    Upload,
    /// Reported by the external activity source.
    Synced { activity_id: i64, effort_id: i64 },
}

/// One athlete's timed traversal of a segment.
///
/// `elapsed_seconds` holds moving time instead when the challenge is configured for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingRecord {
    pub id: Uuid,
    pub athlete_id: i64,
    pub segment_id: i64,
    pub source: EffortSource,
    pub elapsed_seconds: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
}

impl TimingRecord {
    pub fn external_activity_id(&self) -> Option<i64> {
        match self.source {
            EffortSource::Upload => None,
            EffortSource::Synced { activity_id, .. } => Some(activity_id),
        }
    }
}

/// A segment effort as reported by the external activity source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedEffort {
    pub effort_id: i64,
    pub activity_id: i64,
    pub segment_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub elapsed_seconds: i64,
    pub moving_seconds: i64,
}
