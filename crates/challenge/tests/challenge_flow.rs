//! End-to-end tests for a challenge: GPX uploads and synced efforts flow through the effort
//! service into the store, and the leaderboard is computed from what the store holds.

use bytes::Bytes;
use challenge::{
    EffortService, EffortStore, InMemoryEffortStore, MatchConfig, Resolution,
    athletes_without_time, compute_leaderboard,
    models::{AgeGroup, Athlete, Challenge, ChallengeType, Registration, SyncedEffort, TrackPoint},
    parse_track_str,
};
use time::format_description::well_known::Rfc3339;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

const SEGMENT_ID: i64 = 4242;

/// A gently curving 2 km climb, sampled every ~20 m.
fn route_points(start: OffsetDateTime, seconds_per_point: i64) -> Vec<TrackPoint> {
    (0..100)
        .map(|i| {
            let f = i as f64;
            TrackPoint::new(
                46.5 + f * 0.00018,
                7.9 + (f / 15.0).sin() * 0.0005,
                start + Duration::seconds(f as i64 * seconds_per_point),
            )
        })
        .collect()
}

fn to_gpx(points: &[TrackPoint]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <gpx version=\"1.1\" creator=\"challenge-tests\" xmlns=\"http://www.topografix.com/GPX/1/1\">\n\
         <trk><name>ride</name><trkseg>\n",
    );
    for p in points {
        let time = p.time.format(&Rfc3339).unwrap();
        xml.push_str(&format!(
            "<trkpt lat=\"{:.7}\" lon=\"{:.7}\"><ele>800.0</ele><time>{time}</time></trkpt>\n",
            p.lat, p.lon
        ));
    }
    xml.push_str("</trkseg></trk>\n</gpx>\n");
    xml
}

fn challenge() -> Challenge {
    let route_gpx = to_gpx(&route_points(datetime!(2024-01-01 00:00 UTC), 1));

    Challenge {
        id: 7,
        name: "col-de-test".into(),
        display_name: Some("Col de Test".into()),
        segment_id: SEGMENT_ID,
        starts_at: datetime!(2024-07-01 00:00 UTC),
        ends_at: datetime!(2024-07-31 23:59:59 UTC),
        challenge_type: ChallengeType::Fastest,
        use_moving_time: false,
        route: Some(parse_track_str(&route_gpx).unwrap()),
        age_groups: vec![
            AgeGroup {
                maximum_age: 39,
                description: "Under 40".into(),
            },
            AgeGroup {
                maximum_age: 150,
                description: "40 and over".into(),
            },
        ],
        special_categories: Vec::new(),
    }
}

fn athletes() -> Vec<Athlete> {
    let athlete = |id: i64, first: &str, gender: char, birth_year: i32| Athlete {
        id,
        username: Some(first.to_lowercase()),
        first_name: Some(first.into()),
        last_name: Some("Rider".into()),
        gender: Some(gender),
        birth_year: Some(birth_year),
    };
    vec![
        athlete(1, "Alma", 'F', 1992),
        athlete(2, "Bruno", 'M', 1979),
        athlete(3, "Carla", 'F', 1990),
        athlete(4, "Dario", 'M', 1985),
    ]
}

fn registrations(challenge: &Challenge) -> Vec<Registration> {
    athletes()
        .iter()
        .map(|a| Registration {
            challenge_id: challenge.id,
            athlete_id: a.id,
            special_category_id: None,
        })
        .collect()
}

fn ride(start: OffsetDateTime, seconds_per_point: i64) -> Bytes {
    Bytes::from(to_gpx(&route_points(start, seconds_per_point)))
}

#[tokio::test]
async fn test_uploads_and_syncs_feed_the_leaderboard() {
    let challenge = challenge();
    let service = EffortService::new(InMemoryEffortStore::new(), MatchConfig::default());

    // Alma uploads twice; the second, slower attempt replaces the first.
    let first = service
        .upload_ride(&challenge, 1, &ride(datetime!(2024-07-02 08:00 UTC), 4))
        .await
        .unwrap();
    assert!(matches!(first, Resolution::Created(ref r) if r.elapsed_seconds == 396));
    let second = service
        .upload_ride(&challenge, 1, &ride(datetime!(2024-07-09 08:00 UTC), 5))
        .await
        .unwrap();
    assert!(matches!(second, Resolution::Updated(ref r) if r.elapsed_seconds == 495));

    service
        .upload_ride(&challenge, 2, &ride(datetime!(2024-07-03 08:00 UTC), 4))
        .await
        .unwrap();

    // Carla's efforts come from the activity source.
    let summary = service
        .sync_efforts(
            &challenge,
            3,
            &[
                SyncedEffort {
                    effort_id: 900,
                    activity_id: 90,
                    segment_id: SEGMENT_ID,
                    started_at: datetime!(2024-07-05 07:00 UTC),
                    elapsed_seconds: 480,
                    moving_seconds: 470,
                },
                SyncedEffort {
                    effort_id: 901,
                    activity_id: 91,
                    segment_id: SEGMENT_ID,
                    started_at: datetime!(2024-07-06 07:00 UTC),
                    elapsed_seconds: 450,
                    moving_seconds: 440,
                },
            ],
        )
        .await
        .unwrap();
    assert_eq!(summary.created, 2);

    let records = service
        .store()
        .efforts_for_segment(SEGMENT_ID)
        .await
        .unwrap();
    assert_eq!(records.len(), 4);

    let athletes = athletes();
    let registrations = registrations(&challenge);
    let rows = compute_leaderboard(&challenge, &records, &registrations, &athletes);

    let summary: Vec<(i64, i64, bool)> = rows
        .iter()
        .map(|r| (r.athlete_id, r.elapsed_seconds, r.is_category_leader))
        .collect();
    assert_eq!(
        summary,
        vec![(2, 396, true), (3, 450, true), (1, 495, false)]
    );
    assert_eq!(rows[0].category_label, "Men 40 and over");
    assert_eq!(rows[1].record.external_activity_id(), Some(91));

    let waiting = athletes_without_time(&challenge, &registrations, &athletes, &rows);
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].athlete_name, "Dario Rider");
}

#[tokio::test]
async fn test_ride_on_another_road_never_touches_the_store() {
    let challenge = challenge();
    let service = EffortService::new(InMemoryEffortStore::new(), MatchConfig::default());

    let elsewhere: Vec<TrackPoint> = route_points(datetime!(2024-07-02 08:00 UTC), 4)
        .into_iter()
        .map(|p| TrackPoint {
            lat: p.lat - 0.05,
            ..p
        })
        .collect();

    let resolution = service
        .upload_ride(&challenge, 1, &Bytes::from(to_gpx(&elsewhere)))
        .await
        .unwrap();

    let Resolution::NoMatch(failure) = resolution else {
        panic!("expected no match");
    };
    assert_eq!(failure.reason.code(), "start_not_found");
    assert!(
        service
            .store()
            .efforts_for_segment(SEGMENT_ID)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_most_laps_over_a_multi_lap_ride() {
    let challenge = Challenge {
        challenge_type: ChallengeType::MostLaps,
        ..challenge()
    };
    let service = EffortService::new(InMemoryEffortStore::new(), MatchConfig::default());

    let laps: Vec<SyncedEffort> = (0..3)
        .map(|lap| SyncedEffort {
            effort_id: 500 + lap,
            activity_id: 50,
            segment_id: SEGMENT_ID,
            started_at: datetime!(2024-07-10 06:00 UTC) + Duration::minutes(20 * lap),
            elapsed_seconds: 400 + lap,
            moving_seconds: 390,
        })
        .collect();
    service.sync_efforts(&challenge, 4, &laps).await.unwrap();
    service
        .upload_ride(&challenge, 2, &ride(datetime!(2024-07-03 08:00 UTC), 4))
        .await
        .unwrap();

    let records = service
        .store()
        .efforts_for_segment(SEGMENT_ID)
        .await
        .unwrap();
    let rows = compute_leaderboard(
        &challenge,
        &records,
        &registrations(&challenge),
        &athletes(),
    );

    assert_eq!(rows[0].athlete_id, 4);
    assert_eq!(rows[0].lap_count, 3);
    assert_eq!(rows[0].elapsed_seconds, 1203);
    assert_eq!(rows[1].lap_count, 1);
}

#[test]
fn test_track_round_trips_through_gpx_text() {
    let points = route_points(datetime!(2024-07-01 10:00 UTC), 2);
    let track = parse_track_str(&to_gpx(&points)).unwrap();

    assert_eq!(track.point_count(), points.len());
    assert_eq!(track.segments.len(), 1);
    assert_eq!(track.segments[0][99].time, points[99].time);
    assert_eq!(track.segments[0][0].elevation, Some(800.0));
}
