//! Turning matches and synced efforts into persisted timing records.
//!
//! Manual uploads keep exactly one record per (segment, athlete): a new successful upload
//! replaces the start and time of the existing row. Synced efforts get one row per external
//! effort. A failed match never writes anything.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::MatchConfig,
    errors::{ChallengeError, StoreError},
    gpx_processor::parse_track,
    models::{Challenge, EffortSource, SyncedEffort, TimingRecord},
    segment_matching::{MatchFailure, MatchOutcome, compute_match},
};

/// Who and what a resolved effort is recorded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffortContext {
    pub athlete_id: i64,
    pub segment_id: i64,
    pub use_moving_time: bool,
}

impl EffortContext {
    pub fn for_challenge(challenge: &Challenge, athlete_id: i64) -> Self {
        Self {
            athlete_id,
            segment_id: challenge.segment_id,
            use_moving_time: challenge.use_moving_time,
        }
    }
}

/// What the caller should persist, if anything.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Created(TimingRecord),
    Updated(TimingRecord),
    NoMatch(MatchFailure),
}

impl Resolution {
    pub fn record(&self) -> Option<&TimingRecord> {
        match self {
            Resolution::Created(record) | Resolution::Updated(record) => Some(record),
            Resolution::NoMatch(_) => None,
        }
    }
}

/// Resolves a match outcome against the athlete's existing upload record.
///
/// An `existing` row that came from a sync is never touched; the upload gets its own row.
pub fn resolve_effort(
    outcome: &MatchOutcome,
    context: &EffortContext,
    existing: Option<&TimingRecord>,
) -> Resolution {
    let result = match outcome {
        MatchOutcome::Matched(result) => result,
        MatchOutcome::Failed(failure) => return Resolution::NoMatch(failure.clone()),
    };
    let existing = existing.filter(|record| record.source == EffortSource::Upload);

    let effort = if context.use_moving_time {
        result.moving
    } else {
        result.elapsed
    };

    upsert(
        existing,
        context,
        EffortSource::Upload,
        effort.whole_seconds(),
        result.start.time,
    )
}

/// Resolves an externally reported effort. Returns `None` when the effort is for another
/// segment, reports a negative time, or does not fall entirely inside the challenge window.
///
/// `existing` only counts when it was created from this same external effort.
pub fn resolve_synced_effort(
    effort: &SyncedEffort,
    challenge: &Challenge,
    athlete_id: i64,
    existing: Option<&TimingRecord>,
) -> Option<Resolution> {
    if effort.segment_id != challenge.segment_id
        || effort.elapsed_seconds < 0
        || effort.moving_seconds < 0
    {
        return None;
    }

    // An end instant that does not fit the calendar is certainly outside the window.
    let finished_at = effort
        .started_at
        .checked_add(Duration::seconds(effort.elapsed_seconds))?;
    if effort.started_at < challenge.starts_at || finished_at > challenge.ends_at {
        return None;
    }

    let existing = existing.filter(|record| {
        matches!(record.source, EffortSource::Synced { effort_id, .. } if effort_id == effort.effort_id)
    });

    let context = EffortContext::for_challenge(challenge, athlete_id);
    let seconds = if context.use_moving_time {
        effort.moving_seconds
    } else {
        effort.elapsed_seconds
    };

    Some(upsert(
        existing,
        &context,
        EffortSource::Synced {
            activity_id: effort.activity_id,
            effort_id: effort.effort_id,
        },
        seconds,
        effort.started_at,
    ))
}

fn upsert(
    existing: Option<&TimingRecord>,
    context: &EffortContext,
    source: EffortSource,
    elapsed_seconds: i64,
    started_at: time::OffsetDateTime,
) -> Resolution {
    match existing {
        Some(existing) => Resolution::Updated(TimingRecord {
            elapsed_seconds,
            started_at,
            ..existing.clone()
        }),
        None => Resolution::Created(TimingRecord {
            id: Uuid::new_v4(),
            athlete_id: context.athlete_id,
            segment_id: context.segment_id,
            source,
            elapsed_seconds,
            started_at,
        }),
    }
}

/// Persistence collaborator for timing records.
#[async_trait]
pub trait EffortStore: Send + Sync {
    /// The manual-upload record for this athlete on this segment, if any.
    async fn find_upload(
        &self,
        segment_id: i64,
        athlete_id: i64,
    ) -> Result<Option<TimingRecord>, StoreError>;

    /// The record created from the given external effort, if any.
    async fn find_synced(
        &self,
        segment_id: i64,
        effort_id: i64,
    ) -> Result<Option<TimingRecord>, StoreError>;

    /// Inserts the record, or replaces the record with the same id.
    async fn save(&self, record: TimingRecord) -> Result<(), StoreError>;

    async fn efforts_for_segment(&self, segment_id: i64) -> Result<Vec<TimingRecord>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryEffortStore {
    records: RwLock<BTreeMap<Uuid, TimingRecord>>,
}

impl InMemoryEffortStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = TimingRecord>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().map(|r| (r.id, r)).collect()),
        }
    }

    /// Every stored record, ordered by start then id.
    pub async fn all(&self) -> Vec<TimingRecord> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by_key(|r| (r.started_at, r.id));
        records
    }
}

#[async_trait]
impl EffortStore for InMemoryEffortStore {
    async fn find_upload(
        &self,
        segment_id: i64,
        athlete_id: i64,
    ) -> Result<Option<TimingRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| {
                r.segment_id == segment_id
                    && r.athlete_id == athlete_id
                    && r.source == EffortSource::Upload
            })
            .cloned())
    }

    async fn find_synced(
        &self,
        segment_id: i64,
        effort_id: i64,
    ) -> Result<Option<TimingRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| {
                r.segment_id == segment_id
                    && matches!(r.source, EffortSource::Synced { effort_id: id, .. } if id == effort_id)
            })
            .cloned())
    }

    async fn save(&self, record: TimingRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;

        if record.source == EffortSource::Upload {
            let duplicate = records.values().any(|r| {
                r.id != record.id
                    && r.source == EffortSource::Upload
                    && r.segment_id == record.segment_id
                    && r.athlete_id == record.athlete_id
            });
            if duplicate {
                return Err(StoreError::Conflict {
                    segment_id: record.segment_id,
                    athlete_id: record.athlete_id,
                });
            }
        }

        records.insert(record.id, record);
        Ok(())
    }

    async fn efforts_for_segment(&self, segment_id: i64) -> Result<Vec<TimingRecord>, StoreError> {
        let records = self.records.read().await;
        let mut efforts: Vec<_> = records
            .values()
            .filter(|r| r.segment_id == segment_id)
            .cloned()
            .collect();
        efforts.sort_by_key(|r| (r.started_at, r.id));
        Ok(efforts)
    }
}

/// Counts from one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub ignored: usize,
}

/// Upload and sync flows over an [`EffortStore`].
///
/// Callers serialise concurrent refreshes for the same athlete and challenge; the store only
/// detects a conflicting upload row, it does not retry.
pub struct EffortService<S> {
    store: S,
    config: MatchConfig,
}

impl<S: EffortStore> EffortService<S> {
    pub fn new(store: S, config: MatchConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Matches an uploaded GPX ride against the challenge route and records the effort.
    pub async fn upload_ride(
        &self,
        challenge: &Challenge,
        athlete_id: i64,
        gpx: &Bytes,
    ) -> Result<Resolution, ChallengeError> {
        let route = challenge
            .route
            .as_ref()
            .ok_or_else(|| ChallengeError::ConfigurationMissing {
                challenge: challenge.name.clone(),
            })?;

        let ride = parse_track(gpx)?;
        let outcome = compute_match(route, &ride, &self.config)?;

        if let MatchOutcome::Failed(failure) = &outcome {
            warn!(
                "Uploaded ride for athlete {athlete_id} did not match challenge {}: {}",
                challenge.name, failure.reason
            );
            return Ok(Resolution::NoMatch(failure.clone()));
        }

        let context = EffortContext::for_challenge(challenge, athlete_id);
        let existing = self
            .store
            .find_upload(challenge.segment_id, athlete_id)
            .await?;
        let resolution = resolve_effort(&outcome, &context, existing.as_ref());

        if let Some(record) = resolution.record() {
            self.store.save(record.clone()).await?;
            log_resolution(&resolution, challenge);
        }

        Ok(resolution)
    }

    /// Records every relevant synced effort for the athlete.
    pub async fn sync_efforts(
        &self,
        challenge: &Challenge,
        athlete_id: i64,
        efforts: &[SyncedEffort],
    ) -> Result<SyncSummary, ChallengeError> {
        let mut summary = SyncSummary::default();

        for effort in efforts {
            let existing = self
                .store
                .find_synced(effort.segment_id, effort.effort_id)
                .await?;

            let Some(resolution) =
                resolve_synced_effort(effort, challenge, athlete_id, existing.as_ref())
            else {
                debug!(
                    "Ignoring effort {} on segment {}: outside challenge {}",
                    effort.effort_id, effort.segment_id, challenge.name
                );
                summary.ignored += 1;
                continue;
            };

            if let Some(record) = resolution.record() {
                self.store.save(record.clone()).await?;
            }
            match resolution {
                Resolution::Created(_) => summary.created += 1,
                Resolution::Updated(_) => summary.updated += 1,
                Resolution::NoMatch(_) => {}
            }
            log_resolution(&resolution, challenge);
        }

        Ok(summary)
    }
}

fn log_resolution(resolution: &Resolution, challenge: &Challenge) {
    match resolution {
        Resolution::Created(record) => info!(
            "Created effort {} for athlete {} on challenge {}: {}s",
            record.id, record.athlete_id, challenge.name, record.elapsed_seconds
        ),
        Resolution::Updated(record) => info!(
            "Updated effort {} for athlete {} on challenge {}: {}s",
            record.id, record.athlete_id, challenge.name, record.elapsed_seconds
        ),
        Resolution::NoMatch(_) => {}
    }
}
