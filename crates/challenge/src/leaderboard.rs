//! Category leaderboards computed on demand from timing records.
//!
//! Records are reduced per athlete (best time for Fastest, lap count and total time for
//! MostLaps), ranked inside each category to mark leaders, then ordered for display across
//! all categories.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::categories::{Category, CategoryClassifier, GenderBucket};
use crate::models::{Athlete, Challenge, ChallengeType, Registration, TimingRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    pub athlete_id: i64,
    pub athlete_name: String,
    pub gender: GenderBucket,
    pub age: Option<i32>,
    pub category: Category,
    pub category_label: String,
    /// The representative record: the best one for Fastest, the earliest lap for MostLaps.
    pub record: TimingRecord,
    pub lap_count: u32,
    /// Best time for Fastest, summed time over all laps for MostLaps.
    pub elapsed_seconds: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub is_category_leader: bool,
}

/// A registered, classifiable athlete without a qualifying time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnrankedAthlete {
    pub athlete_id: i64,
    pub athlete_name: String,
    pub gender: GenderBucket,
    pub age: Option<i32>,
    pub category: Category,
}

struct Reduced<'a> {
    athlete: &'a Athlete,
    category: Category,
    record: &'a TimingRecord,
    lap_count: u32,
    elapsed_seconds: i64,
}

impl Reduced<'_> {
    fn standing(&self) -> (u32, i64) {
        (self.lap_count, self.elapsed_seconds)
    }
}

/// Ranked, category-marked leaderboard for a challenge.
///
/// Only records for the challenge's segment that start inside its window, from registered
/// athletes that can be classified, take part.
pub fn compute_leaderboard(
    challenge: &Challenge,
    records: &[TimingRecord],
    registrations: &[Registration],
    athletes: &[Athlete],
) -> Vec<LeaderboardRow> {
    let classifier = CategoryClassifier::for_challenge(challenge);
    let registered = registrations_for(challenge, registrations);
    let athletes_by_id: BTreeMap<i64, &Athlete> = athletes.iter().map(|a| (a.id, a)).collect();

    let mut by_athlete: BTreeMap<i64, Vec<&TimingRecord>> = BTreeMap::new();
    for record in records {
        if record.segment_id == challenge.segment_id
            && challenge.contains(record.started_at)
            && registered.contains_key(&record.athlete_id)
        {
            by_athlete.entry(record.athlete_id).or_default().push(record);
        }
    }

    let mut reduced = Vec::with_capacity(by_athlete.len());
    for (athlete_id, athlete_records) in by_athlete {
        let Some(athlete) = athletes_by_id.get(&athlete_id).copied() else {
            continue;
        };
        let Some(category) = classifier.classify(athlete, registered.get(&athlete_id).copied())
        else {
            continue;
        };
        if let Some(row) = reduce(challenge.challenge_type, athlete, category, athlete_records) {
            reduced.push(row);
        }
    }

    reduced.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| Reverse(a.lap_count).cmp(&Reverse(b.lap_count)))
            .then_with(|| a.elapsed_seconds.cmp(&b.elapsed_seconds))
            .then_with(|| a.record.started_at.cmp(&b.record.started_at))
            .then_with(|| a.athlete.id.cmp(&b.athlete.id))
    });

    let start_year = challenge.start_year();
    let mut rows = Vec::with_capacity(reduced.len());
    let mut previous: Option<(&Category, (u32, i64))> = None;

    for entry in &reduced {
        // A row leads its category when it opens it, or when it ties the row just above it.
        let is_category_leader = match previous {
            Some((category, standing)) if *category == entry.category => {
                standing == entry.standing()
            }
            _ => true,
        };
        previous = Some((&entry.category, entry.standing()));

        rows.push(LeaderboardRow {
            athlete_id: entry.athlete.id,
            athlete_name: entry.athlete.display_name(),
            gender: entry.category.gender,
            age: entry.athlete.racing_age(start_year),
            category_label: entry.category.label(),
            category: entry.category.clone(),
            record: entry.record.clone(),
            lap_count: entry.lap_count,
            elapsed_seconds: entry.elapsed_seconds,
            started_at: entry.record.started_at,
            is_category_leader,
        });
    }

    rows.sort_by(|a, b| {
        Reverse(a.lap_count)
            .cmp(&Reverse(b.lap_count))
            .then_with(|| a.elapsed_seconds.cmp(&b.elapsed_seconds))
            .then_with(|| a.started_at.cmp(&b.started_at))
            .then_with(|| a.athlete_id.cmp(&b.athlete_id))
    });

    debug!(
        "Computed leaderboard for challenge {}: {} rows from {} records",
        challenge.name,
        rows.len(),
        records.len()
    );

    rows
}

fn reduce<'a>(
    challenge_type: ChallengeType,
    athlete: &'a Athlete,
    category: Category,
    mut records: Vec<&'a TimingRecord>,
) -> Option<Reduced<'a>> {
    match challenge_type {
        ChallengeType::Fastest => {
            let best = records
                .into_iter()
                .min_by_key(|r| (r.elapsed_seconds, r.started_at, r.id))?;
            Some(Reduced {
                athlete,
                category,
                record: best,
                lap_count: 1,
                elapsed_seconds: best.elapsed_seconds,
            })
        }
        ChallengeType::MostLaps => {
            records.sort_by_key(|r| (r.started_at, r.id));
            let first = *records.first()?;
            Some(Reduced {
                athlete,
                category,
                record: first,
                lap_count: records.len() as u32,
                elapsed_seconds: records.iter().map(|r| r.elapsed_seconds).sum(),
            })
        }
    }
}

fn registrations_for<'a>(
    challenge: &Challenge,
    registrations: &'a [Registration],
) -> BTreeMap<i64, &'a Registration> {
    registrations
        .iter()
        .filter(|r| r.challenge_id == challenge.id)
        .map(|r| (r.athlete_id, r))
        .collect()
}

/// Registered, classifiable athletes that have no row on the leaderboard, by name.
pub fn athletes_without_time(
    challenge: &Challenge,
    registrations: &[Registration],
    athletes: &[Athlete],
    rows: &[LeaderboardRow],
) -> Vec<UnrankedAthlete> {
    let classifier = CategoryClassifier::for_challenge(challenge);
    let registered = registrations_for(challenge, registrations);
    let ranked: BTreeSet<i64> = rows.iter().map(|row| row.athlete_id).collect();
    let start_year = challenge.start_year();

    let mut unranked: Vec<UnrankedAthlete> = athletes
        .iter()
        .filter(|a| !ranked.contains(&a.id))
        .filter_map(|athlete| {
            let registration = registered.get(&athlete.id)?;
            let category = classifier.classify(athlete, Some(*registration))?;
            Some(UnrankedAthlete {
                athlete_id: athlete.id,
                athlete_name: athlete.display_name(),
                gender: category.gender,
                age: athlete.racing_age(start_year),
                category,
            })
        })
        .collect();

    unranked.sort_by(|a, b| {
        a.athlete_name
            .cmp(&b.athlete_name)
            .then_with(|| a.athlete_id.cmp(&b.athlete_id))
    });
    unranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgeGroup, EffortSource, SpecialCategory};
    use time::Duration;
    use time::macros::datetime;
    use uuid::Uuid;

    const DAY_ONE: OffsetDateTime = datetime!(2024-06-01 08:00 UTC);

    fn challenge(challenge_type: ChallengeType) -> Challenge {
        Challenge {
            id: 1,
            name: "june".into(),
            display_name: Some("June Hill Climb".into()),
            segment_id: 500,
            starts_at: datetime!(2024-06-01 00:00 UTC),
            ends_at: datetime!(2024-06-30 23:59:59 UTC),
            challenge_type,
            use_moving_time: false,
            route: None,
            age_groups: vec![
                AgeGroup {
                    maximum_age: 39,
                    description: "Under 40".into(),
                },
                AgeGroup {
                    maximum_age: 200,
                    description: "40+".into(),
                },
            ],
            special_categories: vec![SpecialCategory {
                special_category_id: 7,
                category_name: "E-Bike".into(),
            }],
        }
    }

    fn athlete(id: i64, name: &str, gender: char, birth_year: i32) -> Athlete {
        Athlete {
            id,
            username: None,
            first_name: Some(name.into()),
            last_name: None,
            gender: Some(gender),
            birth_year: Some(birth_year),
        }
    }

    fn registered(athletes: &[Athlete]) -> Vec<Registration> {
        athletes
            .iter()
            .map(|a| Registration {
                challenge_id: 1,
                athlete_id: a.id,
                special_category_id: None,
            })
            .collect()
    }

    fn record(athlete_id: i64, seconds: i64, day: i64) -> TimingRecord {
        TimingRecord {
            id: Uuid::new_v4(),
            athlete_id,
            segment_id: 500,
            source: EffortSource::Upload,
            elapsed_seconds: seconds,
            started_at: DAY_ONE + Duration::days(day),
        }
    }

    #[test]
    fn test_fastest_keeps_best_record() {
        let athletes = vec![athlete(1, "Ana", 'F', 1990)];
        let records = vec![record(1, 90, 0), record(1, 85, 1), record(1, 95, 2)];

        let rows = compute_leaderboard(
            &challenge(ChallengeType::Fastest),
            &records,
            &registered(&athletes),
            &athletes,
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].elapsed_seconds, 85);
        assert_eq!(rows[0].lap_count, 1);
        assert_eq!(rows[0].record.id, records[1].id);
        assert!(rows[0].is_category_leader);
    }

    #[test]
    fn test_fastest_tie_prefers_earliest_start() {
        let athletes = vec![athlete(1, "Ana", 'F', 1990)];
        let records = vec![record(1, 85, 3), record(1, 85, 1)];

        let rows = compute_leaderboard(
            &challenge(ChallengeType::Fastest),
            &records,
            &registered(&athletes),
            &athletes,
        );
        assert_eq!(rows[0].started_at, DAY_ONE + Duration::days(1));
    }

    #[test]
    fn test_most_laps_sums_and_counts() {
        let athletes = vec![athlete(1, "Ana", 'F', 1990), athlete(2, "Bea", 'F', 1991)];
        let records = vec![
            record(1, 60, 0),
            record(1, 61, 1),
            record(1, 59, 2),
            record(2, 50, 0),
            record(2, 50, 1),
        ];

        let rows = compute_leaderboard(
            &challenge(ChallengeType::MostLaps),
            &records,
            &registered(&athletes),
            &athletes,
        );

        assert_eq!(rows[0].athlete_id, 1);
        assert_eq!(rows[0].lap_count, 3);
        assert_eq!(rows[0].elapsed_seconds, 180);
        assert_eq!(rows[0].started_at, DAY_ONE);
        assert!(rows[0].is_category_leader);

        assert_eq!(rows[1].lap_count, 2);
        assert_eq!(rows[1].elapsed_seconds, 100);
        assert!(!rows[1].is_category_leader);
    }

    #[test]
    fn test_leader_ties_propagate_to_adjacent_rows_only() {
        let athletes = vec![
            athlete(1, "Ana", 'F', 1990),
            athlete(2, "Bea", 'F', 1990),
            athlete(3, "Cat", 'F', 1990),
            // A different category whose rows happen to reuse the same times.
            athlete(4, "Dan", 'M', 1990),
            athlete(5, "Eli", 'M', 1990),
            athlete(6, "Fox", 'M', 1990),
        ];
        let records = vec![
            record(1, 100, 0),
            record(2, 100, 1),
            record(3, 110, 0),
            record(4, 90, 0),
            record(5, 95, 0),
            record(6, 110, 1),
        ];

        let rows = compute_leaderboard(
            &challenge(ChallengeType::Fastest),
            &records,
            &registered(&athletes),
            &athletes,
        );
        let leader = |id: i64| rows.iter().find(|r| r.athlete_id == id).unwrap().is_category_leader;

        assert!(leader(1));
        assert!(leader(2));
        assert!(!leader(3));
        assert!(leader(4));
        assert!(!leader(5));
        assert!(!leader(6));
    }

    #[test]
    fn test_tie_below_the_leader_is_also_marked() {
        // Adjacency is all that counts: equal second places are flagged too.
        let athletes = vec![
            athlete(1, "Ana", 'F', 1990),
            athlete(2, "Bea", 'F', 1990),
            athlete(3, "Cat", 'F', 1990),
        ];
        let records = vec![record(1, 100, 0), record(2, 105, 0), record(3, 105, 1)];

        let rows = compute_leaderboard(
            &challenge(ChallengeType::Fastest),
            &records,
            &registered(&athletes),
            &athletes,
        );
        let flags: Vec<bool> = rows.iter().map(|r| r.is_category_leader).collect();
        assert_eq!(flags, vec![true, false, true]);
    }

    #[test]
    fn test_display_order_spans_categories() {
        let athletes = vec![
            athlete(1, "Ana", 'F', 1990),
            athlete(2, "Dan", 'M', 1970),
            athlete(3, "Eli", 'M', 1995),
        ];
        let records = vec![record(1, 120, 0), record(2, 100, 0), record(3, 110, 0)];

        let rows = compute_leaderboard(
            &challenge(ChallengeType::Fastest),
            &records,
            &registered(&athletes),
            &athletes,
        );

        let order: Vec<i64> = rows.iter().map(|r| r.athlete_id).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert!(rows.iter().all(|r| r.is_category_leader));
        assert_eq!(rows[0].category_label, "Men 40+");
        assert_eq!(rows[0].age, Some(54));
        assert_eq!(rows[1].category_label, "Men Under 40");
    }

    #[test]
    fn test_filters_window_segment_and_registration() {
        let athletes = vec![
            athlete(1, "Ana", 'F', 1990),
            athlete(2, "Bea", 'F', 1990),
            Athlete {
                gender: None,
                ..athlete(3, "Cat", 'F', 1990)
            },
        ];
        // Athlete 2 is not registered.
        let registrations = registered(&athletes[..1])
            .into_iter()
            .chain(registered(&athletes[2..]))
            .collect::<Vec<_>>();

        let records = vec![
            TimingRecord {
                started_at: datetime!(2024-05-31 23:00 UTC),
                ..record(1, 10, 0)
            },
            TimingRecord {
                segment_id: 501,
                ..record(1, 20, 0)
            },
            record(1, 300, 29),
            record(2, 100, 0),
            record(3, 100, 0),
        ];

        let rows = compute_leaderboard(
            &challenge(ChallengeType::Fastest),
            &records,
            &registrations,
            &athletes,
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].athlete_id, 1);
        assert_eq!(rows[0].elapsed_seconds, 300);
    }

    #[test]
    fn test_special_category_ranks_separately() {
        let athletes = vec![athlete(1, "Ana", 'F', 1990), athlete(2, "Bea", 'F', 1990)];
        let mut registrations = registered(&athletes);
        registrations[1].special_category_id = Some(7);
        let records = vec![record(1, 100, 0), record(2, 90, 0)];

        let rows = compute_leaderboard(
            &challenge(ChallengeType::Fastest),
            &records,
            &registrations,
            &athletes,
        );

        assert_eq!(rows[0].category_label, "Women E-Bike");
        assert!(rows.iter().all(|r| r.is_category_leader));
    }

    #[test]
    fn test_athletes_without_time() {
        let athletes = vec![
            athlete(1, "Zoe", 'F', 1990),
            athlete(2, "Bea", 'F', 1990),
            athlete(3, "Ana", 'M', 1980),
            Athlete {
                birth_year: None,
                ..athlete(4, "Ned", 'M', 1980)
            },
            athlete(5, "Unregistered", 'M', 1980),
        ];
        let c = challenge(ChallengeType::Fastest);
        let registrations = registered(&athletes[..4]);
        let rows = compute_leaderboard(&c, &[record(2, 100, 0)], &registrations, &athletes);

        let waiting = athletes_without_time(&c, &registrations, &athletes, &rows);

        let names: Vec<&str> = waiting.iter().map(|a| a.athlete_name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Zoe"]);
        assert_eq!(waiting[0].category.label(), "Men 40+");
    }
}
