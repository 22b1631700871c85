//! Knobs shared by the route, ride and athlete generators.

use serde::{Deserialize, Serialize};

/// A lat/lon rectangle that generated routes stay inside.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Corners given south-west first, then north-east.
    pub const fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            min_lat: south,
            min_lon: west,
            max_lat: north,
            max_lon: east,
        }
    }

    pub fn random_point(&self, rng: &mut impl rand::Rng) -> (f64, f64) {
        (
            rng.gen_range(self.min_lat..self.max_lat),
            rng.gen_range(self.min_lon..self.max_lon),
        )
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.min_lat.midpoint(self.max_lat),
            self.min_lon.midpoint(self.max_lon),
        )
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// Pre-defined riding areas.
#[derive(Debug, Clone, Copy)]
pub struct Region;

impl Region {
    /// Bernese Oberland: long alpine climbs.
    pub const BERNESE_OBERLAND: BoundingBox = BoundingBox::new(46.45, 7.6, 46.75, 8.2);

    /// Boulder, CO foothills: short punchy climbs and canyon roads.
    pub const BOULDER: BoundingBox = BoundingBox::new(39.9, -105.5, 40.1, -105.2);
}

/// Spread of rider ability across a field, sampled as a multiplier on expected segment time.
#[derive(Debug, Clone, Copy)]
pub enum SkillDistribution {
    Uniform,
    Normal { mean: f64, std_dev: f64 },
    /// Log-normal: a handful of fast riders and a long slow tail.
    PowerLaw { alpha: f64 },
}

impl Default for SkillDistribution {
    fn default() -> Self {
        Self::power_law()
    }
}

impl SkillDistribution {
    pub fn power_law() -> Self {
        Self::PowerLaw { alpha: 2.0 }
    }
}

/// How a generated athlete's efforts reach the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EffortChannel {
    /// Every effort is a simulated GPX ride run through the matcher.
    Upload,
    /// Every effort arrives as a pre-timed effort from the activity source.
    Sync,
    /// Each athlete is assigned one channel at random.
    #[default]
    Mixed,
}
