//! Route-relative polylines describing how a ride was aligned against a route.

use std::fmt::Write as _;

use serde::Serialize;

use crate::models::TrackPoint;

/// Every n-th matched route point gets a bridge line to the ride point it matched.
const BRIDGE_EVERY: usize = 10;

/// Four SVG path strings in route-relative coordinates.
///
/// Coordinates are `(lon - start.lon) * 1000, (lat - start.lat) * -1000` relative to the ride
/// point the attempt started from, so north is up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchDiagnostics {
    pub route_path: String,
    pub skipped_path: String,
    pub ride_path: String,
    pub match_path: String,
}

impl MatchDiagnostics {
    /// Renders the paths as a standalone SVG document.
    pub fn to_svg(&self) -> String {
        let paths = [
            ("purple", &self.route_path),
            ("red", &self.skipped_path),
            ("green", &self.ride_path),
            ("blue", &self.match_path),
        ];

        let mut svg = String::from(
            "<?xml version=\"1.0\" encoding=\"utf-8\" standalone=\"yes\"?>\n\
             <svg xmlns=\"http://www.w3.org/2000/svg\">\n",
        );
        for (color, d) in paths {
            let _ = writeln!(
                svg,
                "  <path style=\"stroke: {color}; stroke-width: 0.1; fill: none\" d=\"{}\" />",
                d.trim()
            );
        }
        svg.push_str("</svg>\n");
        svg
    }
}

/// Incrementally records [`MatchDiagnostics`] for one match attempt.
#[derive(Debug, Clone)]
pub(crate) struct PathTrace {
    origin_lat: f64,
    origin_lon: f64,
    matches: usize,
    paths: MatchDiagnostics,
}

impl PathTrace {
    pub fn start(route_point: &TrackPoint, ride_start: &TrackPoint) -> Self {
        let mut trace = Self {
            origin_lat: ride_start.lat,
            origin_lon: ride_start.lon,
            matches: 1,
            paths: MatchDiagnostics::default(),
        };
        let route = trace.render(route_point);
        let ride = trace.render(ride_start);
        trace.paths.route_path = format!("M {route} L");
        trace.paths.ride_path = format!("M {ride} L");
        trace.paths.match_path = format!("M {route} L {ride}");
        trace
    }

    pub fn matched(&mut self, route_point: &TrackPoint, ride_point: &TrackPoint, was_skipping: bool) {
        let route = self.render(route_point);
        let ride = self.render(ride_point);

        let _ = write!(self.paths.ride_path, " {ride}");
        if was_skipping {
            let _ = write!(self.paths.skipped_path, " {route}");
            let _ = write!(self.paths.route_path, " M {route} L");
        } else {
            let _ = write!(self.paths.route_path, " {route}");
        }

        if self.matches % BRIDGE_EVERY == 0 {
            let _ = write!(self.paths.match_path, " M {route} L {ride}");
        }
        self.matches += 1;
    }

    pub fn skipped(&mut self, route_point: &TrackPoint, was_skipping: bool) {
        let route = self.render(route_point);
        if was_skipping {
            let _ = write!(self.paths.skipped_path, " {route}");
        } else {
            let _ = write!(self.paths.route_path, " {route}");
            let _ = write!(self.paths.skipped_path, " M {route} L");
        }
    }

    pub fn finish(self) -> MatchDiagnostics {
        self.paths
    }

    fn render(&self, point: &TrackPoint) -> String {
        format!(
            "{:.3},{:.3}",
            (point.lon - self.origin_lon) * 1000.0,
            (point.lat - self.origin_lat) * -1000.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn pt(lat: f64, lon: f64) -> TrackPoint {
        TrackPoint::new(lat, lon, datetime!(2024-01-01 0:00 UTC))
    }

    #[test]
    fn test_coordinates_are_relative_to_ride_start() {
        let trace = PathTrace::start(&pt(10.001, 20.0), &pt(10.0, 20.0));
        let paths = trace.finish();

        assert_eq!(paths.route_path, "M 0.000,-1.000 L");
        assert_eq!(paths.ride_path, "M 0.000,-0.000 L");
        assert_eq!(paths.match_path, "M 0.000,-1.000 L 0.000,-0.000");
    }

    #[test]
    fn test_skip_then_match_splits_route_path() {
        let mut trace = PathTrace::start(&pt(10.0, 20.0), &pt(10.0, 20.0));
        trace.skipped(&pt(10.0, 20.001), false);
        trace.skipped(&pt(10.0, 20.002), true);
        trace.matched(&pt(10.0, 20.003), &pt(10.0, 20.003), true);
        let paths = trace.finish();

        assert_eq!(
            paths.skipped_path,
            " M 1.000,-0.000 L 2.000,-0.000 3.000,-0.000"
        );
        assert!(paths.route_path.ends_with(" 1.000,-0.000 M 3.000,-0.000 L"));
        assert!(paths.ride_path.ends_with(" 3.000,-0.000"));
    }

    #[test]
    fn test_svg_contains_all_four_paths() {
        let svg = PathTrace::start(&pt(10.0, 20.0), &pt(10.0, 20.0))
            .finish()
            .to_svg();

        assert!(svg.starts_with("<?xml"));
        assert_eq!(svg.matches("<path ").count(), 4);
        for color in ["purple", "red", "green", "blue"] {
            assert!(svg.contains(color));
        }
    }
}
