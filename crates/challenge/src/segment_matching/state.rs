//! Route-point-driven alignment state machine.
//!
//! The matcher walks the route points once. For each route point the current [`MatchState`]
//! is fed through [`Matcher::step`], which produces the next state, a restart, or a final
//! verdict. The ride cursor only ever moves forward, and every ride point examined counts
//! against the iteration ceiling.

use time::Duration;
use tracing::{debug, trace};

use super::cursor::{Ride, RideCursor};
use super::diagnostics::{MatchDiagnostics, PathTrace};
use super::{FailureReason, MatchFailure, MatchOutcome, MatchResult};
use crate::config::MatchConfig;
use crate::distance::distance_between;
use crate::models::TrackPoint;

/// Accumulated state of one attempt at aligning the ride with the route.
#[derive(Debug, Clone)]
pub(crate) struct Attempt {
    start: RideCursor,
    cursor: RideCursor,
    matched: usize,
    skipped: usize,
    gaps: Duration,
    trace: Option<PathTrace>,
}

impl Attempt {
    fn new(start: RideCursor, trace: Option<PathTrace>) -> Self {
        Self {
            start,
            cursor: start,
            matched: 1,
            skipped: 0,
            gaps: Duration::ZERO,
            trace,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum MatchState {
    /// Looking for the first ride point within tolerance of the first route point.
    SeekingStart { from: RideCursor },
    /// The previous route point was matched.
    Tracking(Attempt),
    /// One or more of the preceding route points could not be matched.
    Skipping(Attempt),
}

/// Result of feeding one route point through the state machine.
#[derive(Debug)]
pub(crate) enum Step {
    /// Continue with the next route point.
    Next(MatchState),
    /// Discard the attempt and seek the start again from this ride position.
    Restart(RideCursor),
    Complete(Attempt),
    Fail(FailureReason),
}

/// Outcome of scanning the ride forward for a single route point.
#[derive(Debug, PartialEq)]
pub(crate) enum Scan {
    Found { cursor: RideCursor, gap: Duration },
    Missed,
    /// While skipping, the ride came back to the start of the route.
    Recrossed(RideCursor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BudgetExceeded;

pub(crate) struct Matcher<'a> {
    route: Vec<&'a TrackPoint>,
    ride: Ride<'a>,
    config: &'a MatchConfig,
    iterations: u64,
    restarts: u32,
    last_trace: Option<MatchDiagnostics>,
}

impl<'a> Matcher<'a> {
    pub fn new(route: Vec<&'a TrackPoint>, ride: Ride<'a>, config: &'a MatchConfig) -> Self {
        Self {
            route,
            ride,
            config,
            iterations: 0,
            restarts: 0,
            last_trace: None,
        }
    }

    /// Drives the state machine over every route point until it completes or fails.
    pub fn run(mut self) -> MatchOutcome {
        let Some(first) = self.ride.first() else {
            return self.fail(FailureReason::StartNotFound);
        };

        let mut state = MatchState::SeekingStart { from: first };
        let mut index = 0;

        loop {
            let step = match self.step(state, index) {
                Ok(step) => step,
                Err(BudgetExceeded) => {
                    debug!(
                        iterations = self.iterations,
                        "Match abandoned: iteration budget exhausted"
                    );
                    return self.fail(FailureReason::IterationBudgetExceeded);
                }
            };

            match step {
                Step::Next(next) => {
                    state = next;
                    index += 1;
                }
                Step::Restart(from) => {
                    self.restarts += 1;
                    state = MatchState::SeekingStart { from };
                    index = 0;
                }
                Step::Complete(attempt) => return MatchOutcome::Matched(self.finish(attempt)),
                Step::Fail(reason) => return self.fail(reason),
            }
        }
    }

    /// The transition function: consumes the state for route point `index`.
    pub fn step(&mut self, state: MatchState, index: usize) -> Result<Step, BudgetExceeded> {
        self.tick()?;
        let last = index + 1 == self.route.len();

        match state {
            MatchState::SeekingStart { from } => {
                let Some(start) = self.seek_start(from)? else {
                    return Ok(Step::Fail(FailureReason::StartNotFound));
                };

                let trace = self
                    .config
                    .collect_diagnostics
                    .then(|| PathTrace::start(self.route[index], self.ride.get(start)));
                let attempt = Attempt::new(start, trace);

                if last {
                    Ok(Step::Complete(attempt))
                } else {
                    Ok(Step::Next(MatchState::Tracking(attempt)))
                }
            }
            MatchState::Tracking(attempt) => self.track(attempt, index, false, last),
            MatchState::Skipping(attempt) => self.track(attempt, index, true, last),
        }
    }

    fn track(
        &mut self,
        mut attempt: Attempt,
        index: usize,
        skipping: bool,
        last: bool,
    ) -> Result<Step, BudgetExceeded> {
        let route_point = self.route[index];

        match self.scan(attempt.cursor, route_point, skipping)? {
            Scan::Found { cursor, gap } => {
                if let Some(trace) = attempt.trace.as_mut() {
                    trace.matched(route_point, self.ride.get(cursor), skipping);
                }
                attempt.cursor = cursor;
                attempt.gaps += gap;
                attempt.matched += 1;

                if last {
                    Ok(Step::Complete(attempt))
                } else {
                    Ok(Step::Next(MatchState::Tracking(attempt)))
                }
            }
            Scan::Missed => {
                if let Some(trace) = attempt.trace.as_mut() {
                    trace.skipped(route_point, skipping);
                }
                attempt.skipped += 1;

                let over_budget =
                    attempt.skipped as f64 > self.config.skip_budget(self.route.len());
                if over_budget || last {
                    debug!(
                        route_index = index,
                        skipped = attempt.skipped,
                        over_budget,
                        "Restarting match one ride point further on"
                    );
                    Ok(self.restart_after(attempt))
                } else {
                    Ok(Step::Next(MatchState::Skipping(attempt)))
                }
            }
            Scan::Recrossed(cursor) => {
                debug!(
                    route_index = index,
                    segment = cursor.segment,
                    point = cursor.point,
                    "Ride re-crossed the start while skipping; starting over from there"
                );
                self.discard(attempt);
                Ok(Step::Restart(cursor))
            }
        }
    }

    /// Advances from `from` to the first ride point within tolerance of the first route point.
    fn seek_start(&mut self, from: RideCursor) -> Result<Option<RideCursor>, BudgetExceeded> {
        let start = self.route[0].point();
        let mut cursor = from;

        loop {
            self.tick()?;
            if distance_between(start, self.ride.get(cursor).point()) <= self.config.tolerance_m {
                return Ok(Some(cursor));
            }
            match self.ride.next(cursor) {
                Some(next) => cursor = next,
                None => return Ok(None),
            }
        }
    }

    /// Scans forward from `from` for the nearest ride point within tolerance of `route_point`,
    /// accumulating time spent below the stationary speed along the way.
    pub(crate) fn scan(
        &mut self,
        from: RideCursor,
        route_point: &TrackPoint,
        skipping: bool,
    ) -> Result<Scan, BudgetExceeded> {
        let tolerance = self.config.tolerance_m;
        let target = route_point.point();
        let route_start = self.route[0].point();

        let mut cursor = from;
        let mut current = self.ride.get(cursor);
        let mut distance = distance_between(target, current.point());
        let mut gap = Duration::ZERO;

        while distance > tolerance {
            if distance > self.config.too_far_m() {
                return Ok(Scan::Missed);
            }
            self.tick()?;
            let Some(next_cursor) = self.ride.next(cursor) else {
                return Ok(Scan::Missed);
            };
            let next = self.ride.get(next_cursor);
            gap += self.stationary_gap(current, next);
            cursor = next_cursor;
            current = next;
            distance = distance_between(target, current.point());

            if skipping
                && distance > tolerance
                && distance_between(route_start, current.point()) <= tolerance
            {
                return Ok(Scan::Recrossed(cursor));
            }
        }

        // Settle on the closest point of the run that is within tolerance.
        while let Some(next_cursor) = self.ride.next(cursor) {
            let next = self.ride.get(next_cursor);
            let next_distance = distance_between(target, next.point());
            if next_distance >= distance {
                break;
            }
            self.tick()?;
            gap += self.stationary_gap(current, next);
            cursor = next_cursor;
            current = next;
            distance = next_distance;
        }

        trace!(
            segment = cursor.segment,
            point = cursor.point,
            distance,
            "Matched route point"
        );
        Ok(Scan::Found { cursor, gap })
    }

    /// Time between two consecutive ride points if the rider was effectively stopped.
    fn stationary_gap(&self, previous: &TrackPoint, next: &TrackPoint) -> Duration {
        let interval = next.time - previous.time;
        if interval <= Duration::ZERO {
            return Duration::ZERO;
        }

        let speed = distance_between(previous.point(), next.point()) / interval.as_seconds_f64();
        if speed < self.config.stationary_speed_mps {
            interval
        } else {
            Duration::ZERO
        }
    }

    fn restart_after(&mut self, attempt: Attempt) -> Step {
        let next = self.ride.next(attempt.cursor);
        self.discard(attempt);
        match next {
            Some(cursor) => Step::Restart(cursor),
            None => Step::Fail(FailureReason::RouteNotCompleted),
        }
    }

    fn discard(&mut self, attempt: Attempt) {
        if let Some(trace) = attempt.trace {
            self.last_trace = Some(trace.finish());
        }
    }

    fn tick(&mut self) -> Result<(), BudgetExceeded> {
        if self.iterations >= self.config.max_iterations {
            return Err(BudgetExceeded);
        }
        self.iterations += 1;
        Ok(())
    }

    fn finish(self, attempt: Attempt) -> MatchResult {
        let start = self.ride.get(attempt.start).clone();
        let end = self.ride.get(attempt.cursor).clone();
        let elapsed = end.time - start.time;
        let moving = elapsed - attempt.gaps;

        debug!(
            elapsed_seconds = elapsed.whole_seconds(),
            moving_seconds = moving.whole_seconds(),
            skipped = attempt.skipped,
            restarts = self.restarts,
            iterations = self.iterations,
            "Ride matched route"
        );

        MatchResult {
            start,
            end,
            start_cursor: attempt.start,
            end_cursor: attempt.cursor,
            elapsed,
            moving,
            stopped: attempt.gaps,
            matched_points: attempt.matched,
            skipped_points: attempt.skipped,
            restarts: self.restarts,
            iterations: self.iterations,
            diagnostics: attempt.trace.map(PathTrace::finish),
        }
    }

    fn fail(self, reason: FailureReason) -> MatchOutcome {
        debug!(
            code = reason.code(),
            restarts = self.restarts,
            iterations = self.iterations,
            "Ride did not match route"
        );

        MatchOutcome::Failed(MatchFailure {
            reason,
            restarts: self.restarts,
            iterations: self.iterations,
            diagnostics: self.last_trace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Track;
    use time::OffsetDateTime;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2024-06-01 07:00 UTC);
    // Roughly 11 m per 0.0001 degree of latitude.
    const STEP: f64 = 0.0001;

    fn pt(lat_steps: f64, seconds: i64) -> TrackPoint {
        TrackPoint::new(47.0 + lat_steps * STEP, 8.0, T0 + Duration::seconds(seconds))
    }

    fn straight(n: usize) -> Vec<TrackPoint> {
        (0..n).map(|i| pt(i as f64, i as i64)).collect()
    }

    fn matcher<'a>(route: &'a Track, ride: &'a Track, config: &'a MatchConfig) -> Matcher<'a> {
        Matcher::new(route.points().collect(), Ride::new(ride), config)
    }

    #[test]
    fn test_seeking_start_moves_to_tracking() {
        let route = Track::from_points(straight(5));
        let ride = Track::from_points([vec![pt(-50.0, 0)], straight(5)].concat());
        let config = MatchConfig::default();
        let mut m = matcher(&route, &ride, &config);

        let from = Ride::new(&ride).first().unwrap();
        let step = m.step(MatchState::SeekingStart { from }, 0).unwrap();

        match step {
            Step::Next(MatchState::Tracking(attempt)) => {
                assert_eq!(attempt.start, RideCursor { segment: 0, point: 1 });
                assert_eq!(attempt.cursor, attempt.start);
            }
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn test_seeking_start_fails_when_ride_never_reaches_start() {
        let route = Track::from_points(straight(5));
        let ride = Track::from_points((0..5).map(|i| pt(100.0 + i as f64, i)).collect());
        let config = MatchConfig::default();
        let mut m = matcher(&route, &ride, &config);

        let from = Ride::new(&ride).first().unwrap();
        let step = m.step(MatchState::SeekingStart { from }, 0).unwrap();
        assert!(matches!(step, Step::Fail(FailureReason::StartNotFound)));
    }

    #[test]
    fn test_unmatched_point_enters_skipping_without_moving_cursor() {
        let route = Track::from_points(vec![pt(0.0, 0), pt(1.0, 1), pt(300.0, 2), pt(2.0, 3)]);
        let ride = Track::from_points(straight(30));
        let config = MatchConfig {
            max_skip_fraction: 0.5,
            ..Default::default()
        };
        let mut m = matcher(&route, &ride, &config);
        let start = RideCursor { segment: 0, point: 0 };
        let mut attempt = Attempt::new(start, None);
        attempt.cursor = RideCursor { segment: 0, point: 1 };

        let step = m.step(MatchState::Tracking(attempt), 2).unwrap();
        match step {
            Step::Next(MatchState::Skipping(attempt)) => {
                assert_eq!(attempt.skipped, 1);
                assert_eq!(attempt.cursor, RideCursor { segment: 0, point: 1 });
            }
            other => panic!("unexpected step {other:?}"),
        }
    }

    #[test]
    fn test_exceeding_skip_budget_restarts_one_point_further() {
        let mut route_points = straight(10);
        route_points[5] = pt(400.0, 5);
        let route = Track::from_points(route_points);
        let ride = Track::from_points(straight(10));
        // Ten route points at the default fraction tolerate a single skip.
        let config = MatchConfig::default();

        let mut attempt = Attempt::new(RideCursor { segment: 0, point: 0 }, None);
        attempt.cursor = RideCursor { segment: 0, point: 4 };

        let mut m = matcher(&route, &ride, &config);
        let step = m.step(MatchState::Tracking(attempt.clone()), 5).unwrap();
        assert!(matches!(step, Step::Next(MatchState::Skipping(_))));

        attempt.skipped = 1;
        let mut m = matcher(&route, &ride, &config);
        let step = m.step(MatchState::Skipping(attempt), 5).unwrap();
        assert!(matches!(
            step,
            Step::Restart(RideCursor { segment: 0, point: 5 })
        ));
    }

    #[test]
    fn test_skipping_last_route_point_restarts() {
        let route = Track::from_points(vec![pt(0.0, 0), pt(1.0, 1), pt(300.0, 2)]);
        let ride = Track::from_points(straight(5));
        let config = MatchConfig {
            max_skip_fraction: 1.0,
            ..Default::default()
        };
        let mut m = matcher(&route, &ride, &config);
        let mut attempt = Attempt::new(RideCursor { segment: 0, point: 0 }, None);
        attempt.cursor = RideCursor { segment: 0, point: 1 };

        let step = m.step(MatchState::Tracking(attempt), 2).unwrap();
        assert!(matches!(
            step,
            Step::Restart(RideCursor { segment: 0, point: 2 })
        ));
    }

    #[test]
    fn test_restart_at_end_of_ride_fails() {
        let route = Track::from_points(vec![pt(0.0, 0), pt(300.0, 1)]);
        let ride = Track::from_points(straight(3));
        let config = MatchConfig::default();
        let mut m = matcher(&route, &ride, &config);
        let mut attempt = Attempt::new(RideCursor { segment: 0, point: 0 }, None);
        attempt.cursor = RideCursor { segment: 0, point: 2 };

        let step = m.step(MatchState::Tracking(attempt), 1).unwrap();
        assert!(matches!(step, Step::Fail(FailureReason::RouteNotCompleted)));
    }

    #[test]
    fn test_scan_reports_recrossing_only_while_skipping() {
        // Ride goes out 5 steps, comes back through the start, then heads to route point 3.
        let mut ride_points: Vec<TrackPoint> =
            (0..6).map(|i| pt(-(i as f64) * 3.0, i as i64)).collect();
        ride_points.extend((0..6).map(|i| pt(-15.0 + i as f64 * 3.0, 6 + i as i64)));
        ride_points.extend((1..8).map(|i| pt(i as f64 * 3.0, 12 + i as i64)));
        let ride = Track::from_points(ride_points);
        let route = Track::from_points(vec![pt(0.0, 0), pt(3.0, 1), pt(6.0, 2), pt(9.0, 3)]);
        let config = MatchConfig::default();
        let from = RideCursor { segment: 0, point: 0 };

        let target = &route.segments[0][3];

        let mut m = matcher(&route, &ride, &config);
        let scan = m.scan(from, target, true).unwrap();
        assert_eq!(scan, Scan::Recrossed(RideCursor { segment: 0, point: 11 }));

        let mut m = matcher(&route, &ride, &config);
        let scan = m.scan(from, target, false).unwrap();
        assert!(matches!(scan, Scan::Found { cursor, .. } if cursor.point == 14));
    }

    #[test]
    fn test_scan_accumulates_stationary_gaps() {
        let ride = Track::from_points(vec![
            pt(0.0, 0),
            pt(1.0, 1),
            pt(1.0, 61),
            pt(2.0, 62),
            pt(3.0, 63),
        ]);
        let route = Track::from_points(vec![pt(0.0, 0), pt(3.0, 3)]);
        let config = MatchConfig::default();
        let mut m = matcher(&route, &ride, &config);

        let scan = m
            .scan(RideCursor { segment: 0, point: 0 }, &route.segments[0][1], false)
            .unwrap();
        assert_eq!(
            scan,
            Scan::Found {
                cursor: RideCursor { segment: 0, point: 4 },
                gap: Duration::seconds(60),
            }
        );
    }

    #[test]
    fn test_scan_gives_up_when_too_far() {
        let ride = Track::from_points(vec![pt(0.0, 0), pt(1.0, 1)]);
        let route = Track::from_points(vec![pt(0.0, 0), pt(5_000.0, 1)]);
        let config = MatchConfig::default();
        let mut m = matcher(&route, &ride, &config);

        let scan = m
            .scan(RideCursor { segment: 0, point: 0 }, &route.segments[0][1], false)
            .unwrap();
        assert_eq!(scan, Scan::Missed);
        assert_eq!(m.iterations, 0);
    }

    #[test]
    fn test_tick_enforces_ceiling() {
        let route = Track::from_points(straight(3));
        let ride = Track::from_points(straight(3));
        let config = MatchConfig {
            max_iterations: 2,
            ..Default::default()
        };
        let mut m = matcher(&route, &ride, &config);

        assert!(m.tick().is_ok());
        assert!(m.tick().is_ok());
        assert_eq!(m.tick(), Err(BudgetExceeded));
    }
}
