use serde::Serialize;

use crate::models::{Track, TrackPoint};

/// Position of a ride point: segment index and point index within that segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RideCursor {
    pub segment: usize,
    pub point: usize,
}

/// Forward-only view over the points of a ride track.
///
/// Cursors handed out by [`Ride::first`] and [`Ride::next`] always address an existing point.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ride<'a> {
    segments: &'a [Vec<TrackPoint>],
}

impl<'a> Ride<'a> {
    pub fn new(track: &'a Track) -> Self {
        Self {
            segments: &track.segments,
        }
    }

    pub fn first(&self) -> Option<RideCursor> {
        self.first_in_segment_from(0)
    }

    pub fn get(&self, cursor: RideCursor) -> &'a TrackPoint {
        &self.segments[cursor.segment][cursor.point]
    }

    /// The point after `cursor`, crossing into the next non-empty segment when needed.
    pub fn next(&self, cursor: RideCursor) -> Option<RideCursor> {
        if cursor.point + 1 < self.segments[cursor.segment].len() {
            Some(RideCursor {
                segment: cursor.segment,
                point: cursor.point + 1,
            })
        } else {
            self.first_in_segment_from(cursor.segment + 1)
        }
    }

    fn first_in_segment_from(&self, segment: usize) -> Option<RideCursor> {
        (segment..self.segments.len())
            .find(|&ix| !self.segments[ix].is_empty())
            .map(|segment| RideCursor { segment, point: 0 })
    }
}
