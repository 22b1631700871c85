//! Writes a complete challenge scenario to disk for the `challenge` CLI.
//!
//! Run with:
//! ```
//! cargo run -p test-data --bin seed -- [output-dir] [leaderboard|most-laps|messy|comprehensive]
//! ```
//!
//! The directory gets `challenge.json` (pointing at `route.gpx`), one GPX file per simulated
//! upload under `rides/`, `efforts.json` with the resolved timing records, and
//! `entries.json` with athletes, registrations and records for `challenge leaderboard`.

use std::{fs, path::Path};

use anyhow::{Context, bail};
use rand::{SeedableRng, rngs::StdRng};
use serde_json::json;
use test_data::builders::ScenarioBuilder;
use test_data::gpx::generate_gpx;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let output = args.next().unwrap_or_else(|| "scenario".to_string());
    let preset = args.next().unwrap_or_else(|| "comprehensive".to_string());

    let builder = match preset.as_str() {
        "leaderboard" => ScenarioBuilder::leaderboard_test(),
        "most-laps" => ScenarioBuilder::most_laps_test(),
        "messy" => ScenarioBuilder::messy_uploads_test(),
        "comprehensive" => ScenarioBuilder::comprehensive_test(),
        other => bail!("Unknown preset {other}"),
    };

    // Reproducible data
    let mut rng = StdRng::seed_from_u64(12345);
    let result = builder.build(&mut rng).await?;

    let dir = Path::new(&output);
    let rides_dir = dir.join("rides");
    fs::create_dir_all(&rides_dir)
        .with_context(|| format!("Failed to create {}", rides_dir.display()))?;

    let mut challenge = result.challenge.clone();
    let route = challenge.route.take().unwrap_or_default();
    let title = challenge
        .display_name
        .clone()
        .unwrap_or_else(|| challenge.name.clone());
    write(&dir.join("route.gpx"), generate_gpx(&route, &title))?;

    let mut challenge_json = serde_json::to_value(&challenge)?;
    challenge_json["route_gpx"] = json!("route.gpx");
    write_json(&dir.join("challenge.json"), &challenge_json)?;

    for (i, ride) in result.rides.iter().enumerate() {
        let file = rides_dir.join(format!("{:03}-athlete-{}.gpx", i + 1, ride.athlete_id));
        write(&file, generate_gpx(&ride.track, &ride.name))?;
    }

    write_json(&dir.join("efforts.json"), &json!(result.records))?;
    write_json(
        &dir.join("entries.json"),
        &json!({
            "athletes": result.athletes,
            "registrations": result.registrations,
            "records": result.records,
        }),
    )?;

    let rows = result.leaderboard();

    // Summary output
    tracing::info!("Seed completed in {}", dir.display());
    tracing::info!("  Challenge: {title} ({:?})", challenge.challenge_type);
    tracing::info!("  Athletes: {}", result.athletes.len());
    tracing::info!(
        "  Uploads: {} ({} matched, {} rejected)",
        result.rides.len(),
        result.uploads.matched,
        result.uploads.rejected
    );
    tracing::info!(
        "  Synced: {} created, {} updated, {} ignored",
        result.sync.created,
        result.sync.updated,
        result.sync.ignored
    );
    tracing::info!("  Records: {}", result.records.len());
    tracing::info!("  Leaderboard rows: {}", rows.len());
    if let Some(metrics) = &result.metrics {
        tracing::info!(
            "  Generation: {}ms, resolution: {}ms, {} track points",
            metrics.generation_time_ms,
            metrics.resolution_time_ms,
            metrics.total_track_points
        );
    }

    Ok(())
}

fn write(path: &Path, content: Vec<u8>) -> anyhow::Result<()> {
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

fn write_json(path: &Path, value: &serde_json::Value) -> anyhow::Result<()> {
    write(path, serde_json::to_vec_pretty(value)?)
}
