use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, bail};
use bytes::Bytes;
use challenge::{
    EffortService, InMemoryEffortStore, MatchConfig, MatchOutcome, Resolution,
    athletes_without_time, compute_leaderboard, compute_match,
    models::{Athlete, Challenge, Registration, TimingRecord},
    parse_track,
};
use getopts::Options;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// A challenge as stored on disk. `route_gpx` is resolved relative to the file.
#[derive(Debug, Deserialize)]
struct ChallengeFile {
    #[serde(flatten)]
    challenge: Challenge,
    #[serde(default)]
    route_gpx: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct LeaderboardInput {
    athletes: Vec<Athlete>,
    registrations: Vec<Registration>,
    records: Vec<TimingRecord>,
}

fn print_usage(program: &str, opts: &Options) {
    let brief = format!(
        "Usage:\n  {program} match <route.gpx> <ride.gpx> [--svg <out.svg>]\n  \
         {program} upload <challenge.json> <athlete-id> <ride.gpx> <efforts.json>\n  \
         {program} leaderboard <challenge.json> <entries.json>"
    );
    eprint!("{}", opts.usage(&brief));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("challenge");

    let mut opts = Options::new();
    opts.optopt("", "svg", "write match diagnostics as SVG", "FILE");
    opts.optflag("h", "help", "print this help menu");
    let matches = opts.parse(args.iter().skip(1))?;

    if matches.opt_present("h") || matches.free.is_empty() {
        print_usage(program, &opts);
        return Ok(());
    }

    let free: Vec<&str> = matches.free.iter().map(String::as_str).collect();
    let output = match free.as_slice() {
        ["match", route, ride] => {
            run_match(Path::new(route), Path::new(ride), matches.opt_str("svg"))?
        }
        ["upload", challenge, athlete_id, ride, efforts] => {
            let athlete_id: i64 = athlete_id
                .parse()
                .with_context(|| format!("Invalid athlete id {athlete_id}"))?;
            run_upload(
                Path::new(challenge),
                athlete_id,
                Path::new(ride),
                Path::new(efforts),
            )
            .await?
        }
        ["leaderboard", challenge, entries] => {
            run_leaderboard(Path::new(challenge), Path::new(entries))?
        }
        _ => {
            print_usage(program, &opts);
            bail!("Unrecognised command: {}", free.join(" "));
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_match(route: &Path, ride: &Path, svg: Option<String>) -> anyhow::Result<Value> {
    let route = parse_track(&read_bytes(route)?)?;
    let ride = parse_track(&read_bytes(ride)?)?;

    let mut config = MatchConfig::from_env();
    if svg.is_some() {
        config = config.with_diagnostics();
    }

    let outcome = compute_match(&route, &ride, &config)?;

    if let (Some(path), Some(diagnostics)) = (svg, outcome.diagnostics()) {
        fs::write(&path, diagnostics.to_svg())
            .with_context(|| format!("Failed to write {path}"))?;
        tracing::info!("Wrote match diagnostics to {path}");
    }

    Ok(outcome_json(&outcome))
}

async fn run_upload(
    challenge_path: &Path,
    athlete_id: i64,
    ride: &Path,
    efforts_path: &Path,
) -> anyhow::Result<Value> {
    let challenge = load_challenge(challenge_path)?;
    let existing: Vec<TimingRecord> = if efforts_path.exists() {
        read_json(efforts_path)?
    } else {
        Vec::new()
    };

    let service = EffortService::new(
        InMemoryEffortStore::with_records(existing),
        MatchConfig::from_env(),
    );
    let resolution = service
        .upload_ride(&challenge, athlete_id, &read_bytes(ride)?)
        .await?;

    let status = match &resolution {
        Resolution::Created(_) => "created",
        Resolution::Updated(_) => "updated",
        Resolution::NoMatch(_) => "no_match",
    };

    if resolution.record().is_some() {
        let records = service.store().all().await;
        fs::write(efforts_path, serde_json::to_string_pretty(&records)?)
            .with_context(|| format!("Failed to write {}", efforts_path.display()))?;
    }

    let mut output = json!({
        "challenge": challenge.name,
        "athlete_id": athlete_id,
        "status": status,
        "record": resolution.record(),
    });
    if let Resolution::NoMatch(failure) = &resolution {
        output["code"] = json!(failure.reason.code());
    }
    Ok(output)
}

fn run_leaderboard(challenge_path: &Path, entries_path: &Path) -> anyhow::Result<Value> {
    let challenge = load_challenge(challenge_path)?;
    let input: LeaderboardInput = read_json(entries_path)?;

    let rows = compute_leaderboard(
        &challenge,
        &input.records,
        &input.registrations,
        &input.athletes,
    );
    let without_time =
        athletes_without_time(&challenge, &input.registrations, &input.athletes, &rows);

    Ok(json!({
        "challenge": challenge.display_name.as_deref().unwrap_or(&challenge.name),
        "challenge_type": challenge.challenge_type,
        "rows": rows,
        "without_time": without_time,
    }))
}

fn outcome_json(outcome: &MatchOutcome) -> Value {
    match outcome {
        MatchOutcome::Matched(result) => json!({
            "matched": true,
            "start": result.start,
            "end": result.end,
            "elapsed_seconds": result.elapsed.whole_seconds(),
            "moving_seconds": result.moving.whole_seconds(),
            "stopped_seconds": result.stopped.whole_seconds(),
            "matched_points": result.matched_points,
            "skipped_points": result.skipped_points,
            "restarts": result.restarts,
            "iterations": result.iterations,
        }),
        MatchOutcome::Failed(failure) => json!({
            "matched": false,
            "code": failure.reason.code(),
            "restarts": failure.restarts,
            "iterations": failure.iterations,
        }),
    }
}

fn load_challenge(path: &Path) -> anyhow::Result<Challenge> {
    let file: ChallengeFile = read_json(path)?;
    let mut challenge = file.challenge;

    if let Some(route_gpx) = file.route_gpx {
        let route_path = path
            .parent()
            .map(|dir| dir.join(&route_gpx))
            .unwrap_or(route_gpx);
        challenge.route = Some(parse_track(&read_bytes(&route_path)?)?);
    }

    Ok(challenge)
}

fn read_bytes(path: &Path) -> anyhow::Result<Bytes> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Bytes::from(content))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}
