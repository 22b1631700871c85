use bytes::{Buf as _, Bytes};
use gpx::{Gpx, read};
use time::OffsetDateTime;

use crate::{
    errors::ChallengeError,
    models::{Track, TrackPoint},
};

/// Parses GPX 1.0/1.1 bytes into a [`Track`].
///
/// Every `trk`/`trkseg` is kept in document order; empty segments are dropped. A point
/// without a `time` element, or a document without any points, is a malformed track.
pub fn parse_track(content: &Bytes) -> Result<Track, ChallengeError> {
    let gpx: Gpx = read(content.clone().reader())
        .map_err(|e| ChallengeError::MalformedTrack(format!("Failed to parse GPX: {e}")))?;

    let mut segments = Vec::new();
    let mut sequence = 0usize;

    for track in &gpx.tracks {
        for segment in &track.segments {
            let mut points = Vec::with_capacity(segment.points.len());
            for waypoint in &segment.points {
                let time = waypoint.time.ok_or_else(|| {
                    ChallengeError::MalformedTrack(format!(
                        "Track point {sequence} has no timestamp"
                    ))
                })?;
                let time: OffsetDateTime = time.into();
                let point = waypoint.point();

                points.push(TrackPoint {
                    lat: point.y(),
                    lon: point.x(),
                    elevation: waypoint.elevation,
                    time,
                });
                sequence += 1;
            }

            if !points.is_empty() {
                segments.push(points);
            }
        }
    }

    if segments.is_empty() {
        return Err(ChallengeError::MalformedTrack(
            "No track points found in GPX file".to_string(),
        ));
    }

    Ok(Track::new(segments))
}

/// Convenience wrapper for string input.
pub fn parse_track_str(content: &str) -> Result<Track, ChallengeError> {
    parse_track(&Bytes::copy_from_slice(content.as_bytes()))
}
