use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use hug_bunny_world::config::WorldConfig;
use hug_bunny_world::constants::TICK_MS;
use hug_bunny_world::engine::now_ms;
use hug_bunny_world::rng::Rng;
use hug_bunny_world::session::{Session, SessionCommand, SessionOptions};
use hug_bunny_world::store::{DocumentStore, MemoryStore};
use hug_bunny_world::sync::SyncStats;
use hug_bunny_world::types::{EngineEvent, PlayMode, WorldView};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const AUTOPILOT_INTERVAL_MS: u64 = 2_000;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long, default_value_t = 3)]
    sessions: usize,
    #[arg(long, default_value_t = 120)]
    seconds: u64,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    mode: Option<String>,
    /// Run every session without a store.
    #[arg(long)]
    offline: bool,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Serialize)]
struct SessionResultLine {
    session: String,
    seed: u32,
    hugs: u64,
    #[serde(rename = "itemsCollected")]
    items_collected: u64,
    overloads: u64,
    horrors: u64,
    rebuilds: u64,
    #[serde(rename = "maxPeers")]
    max_peers: usize,
    #[serde(rename = "finalProgress")]
    final_progress: u8,
    #[serde(rename = "sadRemaining")]
    sad_remaining: usize,
    sync: SyncStats,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "sessionCount")]
    session_count: usize,
    #[serde(rename = "totalHugs")]
    total_hugs: u64,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    sessions: Vec<SessionResultLine>,
}

struct SimSession {
    session: Session,
    autopilot: Rng,
    next_autopilot_ms: u64,
    result: SessionResultLine,
    seen: HashSet<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let started_at_ms = now_ms();
    let base_seed = normalize_seed(cli.seed.unwrap_or(started_at_ms));
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(base_seed, started_at_ms));
    let mode = cli
        .mode
        .as_deref()
        .and_then(PlayMode::parse)
        .unwrap_or(PlayMode::Coop);
    let config = cli
        .config
        .as_deref()
        .map(WorldConfig::load)
        .unwrap_or_default();
    let store: Option<Arc<dyn DocumentStore>> = if cli.offline {
        None
    } else {
        Some(Arc::new(MemoryStore::new()))
    };

    info!(
        match_id = %match_id,
        sessions = cli.sessions,
        seconds = cli.seconds,
        seed = base_seed,
        ?mode,
        "simulation_started"
    );

    let mut sessions: Vec<SimSession> = (0..cli.sessions)
        .map(|idx| {
            let seed = base_seed.wrapping_add(idx as u32 * 7_919);
            let key = format!("sim{}x{}", base_seed, idx + 1);
            let session = Session::start(
                SessionOptions {
                    config: config.clone(),
                    mode,
                    session_key: key.clone(),
                    seed,
                },
                store.clone(),
                0,
            );
            SimSession {
                session,
                autopilot: Rng::new(seed ^ 0x5eed),
                next_autopilot_ms: 0,
                result: SessionResultLine {
                    session: key,
                    seed,
                    ..SessionResultLine::default()
                },
                seen: HashSet::new(),
            }
        })
        .collect();

    let end_ms = cli.seconds * 1_000;
    let mut now = 0;
    while now <= end_ms {
        for sim in sessions.iter_mut() {
            if now >= sim.next_autopilot_ms {
                sim.next_autopilot_ms = now + AUTOPILOT_INTERVAL_MS;
                steer_towards_sad_bunny(sim, now);
            }
            let view = sim.session.tick(now);
            record_view(sim, &view, now);
        }
        now += TICK_MS;
    }

    let mut results = Vec::new();
    for mut sim in sessions {
        sim.session.close(now);
        let engine = sim.session.engine();
        sim.result.final_progress = engine.player().progress();
        sim.result.sad_remaining = engine.world().sad_bunny_count();
        sim.result.sync = sim.session.sync().stats();
        for anomaly in &sim.result.anomalies {
            warn!(session = %sim.result.session, anomaly = %anomaly, "anomaly_detected");
        }
        match serde_json::to_string(&sim.result) {
            Ok(line) => println!("{line}"),
            Err(error) => error!(error = %error, "result_encode_failed"),
        }
        results.push(sim.result);
    }

    let summary = build_run_summary(match_id.clone(), started_at_ms, now_ms(), results);
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            error!(path = %path.display(), error = %error, "summary_write_failed");
            std::process::exit(2);
        }
    }
    info!(
        match_id = %match_id,
        total_hugs = summary.total_hugs,
        anomalies = summary.anomaly_count,
        "simulation_finished"
    );
    if summary.anomaly_count > 0 {
        std::process::exit(1);
    }
}

/// Picks one of the three nearest sad bunnies, or a random spot when none
/// is left.
fn steer_towards_sad_bunny(sim: &mut SimSession, now_ms: u64) {
    let engine = sim.session.engine();
    let origin = engine.player().actor.position();
    let mut targets: Vec<(f64, f64, f64)> = engine
        .world()
        .bunnies()
        .filter(|bunny| bunny.is_sad())
        .map(|bunny| {
            let pos = bunny.actor.position();
            let d = (pos.x - origin.x).hypot(pos.y - origin.y);
            (d, pos.x, pos.y)
        })
        .collect();
    targets.sort_by(|a, b| a.0.total_cmp(&b.0));
    let half = engine.config.map_half_size();
    let command = if targets.is_empty() {
        SessionCommand::Pointer {
            x: sim.autopilot.int(-half, half) as f64,
            y: sim.autopilot.int(-half, half) as f64,
        }
    } else {
        let (_, x, y) = targets[sim.autopilot.pick_index(targets.len().min(3))];
        SessionCommand::Pointer { x, y }
    };
    sim.session.handle(command, now_ms);
}

fn record_view(sim: &mut SimSession, view: &WorldView, now_ms: u64) {
    for event in &view.events {
        match event {
            EngineEvent::HugStarted { .. } => sim.result.hugs += 1,
            EngineEvent::ItemCollected { .. } => sim.result.items_collected += 1,
            EngineEvent::OverloadDimmed => sim.result.overloads += 1,
            EngineEvent::HorrorTriggered { .. } => sim.result.horrors += 1,
            EngineEvent::WorldRebuilt { .. } => sim.result.rebuilds += 1,
            _ => {}
        }
    }
    sim.result.max_peers = sim.result.max_peers.max(view.peers.len());
    for message in collect_view_anomalies(&sim.session, view) {
        if sim.seen.insert(message.clone()) {
            warn!(session = %sim.result.session, tick_ms = now_ms, message = %message, "invariant_violated");
            sim.result.anomalies.push(message);
        }
    }
}

fn collect_view_anomalies(session: &Session, view: &WorldView) -> Vec<String> {
    let mut anomalies = Vec::new();
    let engine = session.engine();
    if view.player.progress > 100 {
        anomalies.push(format!("progress out of range: {}", view.player.progress));
    }
    let holding = engine
        .world()
        .bunnies()
        .filter(|bunny| bunny.behavior_handle().is_some())
        .count();
    if engine.scheduler().active_tasks() != holding {
        anomalies.push(format!(
            "behavior task leak: {} tasks for {} bunnies",
            engine.scheduler().active_tasks(),
            holding
        ));
    }
    if view.bunnies.iter().filter(|bunny| bunny.hugging).count() > 1 {
        anomalies.push("more than one bunny locked in a hug".to_string());
    }
    if view.bunnies.iter().any(|bunny| bunny.sad == bunny.owner.is_some()) {
        anomalies.push("bunny sadness disagrees with owner".to_string());
    }
    anomalies
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn default_match_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    match_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    sessions: Vec<SessionResultLine>,
) -> RunSummary {
    RunSummary {
        match_id,
        started_at_ms,
        finished_at_ms,
        session_count: sessions.len(),
        total_hugs: sessions.iter().map(|session| session.hugs).sum(),
        anomaly_count: sessions.iter().map(|session| session.anomalies.len()).sum(),
        sessions,
    }
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_result(hugs: u64, anomalies: &[&str]) -> SessionResultLine {
        SessionResultLine {
            session: "sim1x1".to_string(),
            seed: 1,
            hugs,
            anomalies: anomalies.iter().map(|value| value.to_string()).collect(),
            ..SessionResultLine::default()
        }
    }

    #[test]
    fn default_match_id_contains_seed_and_timestamp() {
        assert_eq!(default_match_id(42, 123456789), "sim-42-123456789");
    }

    #[test]
    fn build_run_summary_totals_hugs_and_anomalies() {
        let summary = build_run_summary(
            "sim-42-1".to_string(),
            1,
            2,
            vec![make_result(3, &[]), make_result(4, &["task leak"])],
        );
        assert_eq!(summary.total_hugs, 7);
        assert_eq!(summary.anomaly_count, 1);
        assert_eq!(summary.session_count, 2);
    }

    #[test]
    fn write_summary_returns_error_when_parent_does_not_exist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("missing").join("summary.json");
        let summary = build_run_summary("sim-1-1".to_string(), 1, 2, vec![make_result(0, &[])]);
        assert!(write_summary(&target, &summary).is_err());
    }

    #[test]
    fn short_offline_run_has_no_anomalies() {
        let config = WorldConfig {
            bunny_count: 10,
            tree_count: 5,
            bush_count: 5,
            item_count: 2,
            map_size: 800,
            ..WorldConfig::default()
        };
        let session = Session::start(
            SessionOptions {
                config,
                mode: PlayMode::Solo,
                session_key: "offline1".to_string(),
                seed: 12,
            },
            None,
            0,
        );
        let mut sim = SimSession {
            session,
            autopilot: Rng::new(3),
            next_autopilot_ms: 0,
            result: SessionResultLine::default(),
            seen: HashSet::new(),
        };
        let mut now = 0;
        while now <= 30_000 {
            if now >= sim.next_autopilot_ms {
                sim.next_autopilot_ms = now + AUTOPILOT_INTERVAL_MS;
                steer_towards_sad_bunny(&mut sim, now);
            }
            let view = sim.session.tick(now);
            record_view(&mut sim, &view, now);
            now += TICK_MS;
        }
        assert!(sim.result.anomalies.is_empty(), "{:?}", sim.result.anomalies);
    }
}
