//! GPX 1.1 writer for generated routes and rides.
//!
//! Output is what a GPS head unit would export, so it can be fed straight back through
//! `challenge::parse_track`.

use std::fmt::Write as _;

use challenge::models::{Track, TrackPoint};
use time::format_description::well_known::Rfc3339;

const GPX_NAMESPACES: &str = concat!(
    r#"xmlns="http://www.topografix.com/GPX/1/1" "#,
    r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
    r#"xsi:schemaLocation="http://www.topografix.com/GPX/1/1 http://www.topografix.com/GPX/1/1/gpx.xsd""#,
);

/// Writes a track as GPX 1.1, one `<trkseg>` per track segment.
pub fn generate_gpx(track: &Track, name: &str) -> Vec<u8> {
    let name = escape_xml(name);
    let mut gpx = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(gpx, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = writeln!(
        gpx,
        r#"<gpx version="1.1" creator="segment-challenge-test-data" {GPX_NAMESPACES}>"#
    );
    let _ = writeln!(gpx, "  <metadata><name>{name}</name></metadata>");
    let _ = writeln!(gpx, "  <trk>\n    <name>{name}</name>");

    for segment in &track.segments {
        let _ = writeln!(gpx, "    <trkseg>");
        for point in segment {
            write_point(&mut gpx, point);
        }
        let _ = writeln!(gpx, "    </trkseg>");
    }

    let _ = writeln!(gpx, "  </trk>\n</gpx>");
    gpx.into_bytes()
}

fn write_point(gpx: &mut String, point: &TrackPoint) {
    let _ = writeln!(gpx, r#"      <trkpt lat="{:.7}" lon="{:.7}">"#, point.lat, point.lon);
    if let Some(ele) = point.elevation {
        let _ = writeln!(gpx, "        <ele>{ele:.2}</ele>");
    }
    let time = point.time.format(&Rfc3339).unwrap_or_default();
    let _ = writeln!(gpx, "        <time>{time}</time>\n      </trkpt>");
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use time::macros::datetime;

    fn point(lat: f64, lon: f64, seconds: i64) -> TrackPoint {
        TrackPoint {
            elevation: Some(1650.0),
            ..TrackPoint::new(
                lat,
                lon,
                datetime!(2024-07-01 08:00 UTC) + time::Duration::seconds(seconds),
            )
        }
    }

    #[test]
    fn test_writes_points_with_elevation_and_time() {
        let track = Track::from_points(vec![
            point(40.0150, -105.2705, 0),
            point(40.0160, -105.2695, 60),
        ]);

        let gpx_str = String::from_utf8(generate_gpx(&track, "Flagstaff")).unwrap();

        assert!(gpx_str.contains(r#"version="1.1""#));
        assert!(gpx_str.contains("<metadata><name>Flagstaff</name></metadata>"));
        assert!(gpx_str.contains(r#"lat="40.0150000""#));
        assert!(gpx_str.contains(r#"lon="-105.2705000""#));
        assert!(gpx_str.contains("<ele>1650.00</ele>"));
        assert!(gpx_str.contains("<time>2024-07-01T08:01:00Z</time>"));
    }

    #[test]
    fn test_name_is_escaped() {
        let track = Track::from_points(vec![point(40.0, -105.0, 0)]);

        let gpx_str =
            String::from_utf8(generate_gpx(&track, "Hill & <Dale> \"TT\"")).unwrap();

        assert!(gpx_str.contains("Hill &amp; &lt;Dale&gt; &quot;TT&quot;"));
    }

    #[test]
    fn test_segments_survive_a_parse() {
        let track = Track::new(vec![
            vec![point(40.0, -105.0, 0), point(40.0001, -105.0, 5)],
            vec![point(40.0002, -105.0, 300)],
        ]);

        let parsed = challenge::parse_track(&Bytes::from(generate_gpx(&track, "split"))).unwrap();

        assert_eq!(parsed.segments.len(), 2);
        assert_eq!(parsed.point_count(), 3);
        assert_eq!(parsed.segments[1][0].time, track.segments[1][0].time);
    }
}
