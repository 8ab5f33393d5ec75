use clap::Parser;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tebak_gambar_server::catalog::Catalog;
use tebak_gambar_server::config::{build_config, default_participants};
use tebak_gambar_server::constants::{
    DEFAULT_TIMER_SECONDS, MAX_TIEBREAK_ROUNDS, MS_PER_SECOND,
};
use tebak_gambar_server::engine::{Action, Effect, GameEngine};
use tebak_gambar_server::rng::Rng;
use tebak_gambar_server::session_store::build_results_response;
use tebak_gambar_server::types::{FlashKind, GroupScore, Phase, RuntimeEvent, TurnEndReason};
use tracing::{error, info, warn};

const MAX_ACTIONS: u64 = 20_000;
const PAUSE_HOLD_SECONDS: u64 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    single: bool,
    #[arg(long)]
    groups: Option<usize>,
    #[arg(long)]
    timer: Option<i64>,
    /// Per-turn action script: c=correct, s=skip, p=pause, .=idle, x=stop. Comma separates groups.
    #[arg(long)]
    script: Option<String>,
    #[arg(long)]
    catalog: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    groups: usize,
    #[serde(rename = "timerSeconds")]
    timer_seconds: Option<i64>,
    #[serde(rename = "catalogLimit", skip_serializing_if = "Option::is_none")]
    catalog_limit: Option<usize>,
    scripts: Vec<String>,
    #[serde(rename = "tiebreakScripts")]
    tiebreak_scripts: Vec<String>,
    seed: u32,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    groups: usize,
    #[serde(rename = "timerSeconds")]
    timer_seconds: u32,
    #[serde(rename = "catalogSize")]
    catalog_size: usize,
    completed: bool,
    #[serde(rename = "elapsedMs")]
    elapsed_ms: u64,
    turns: u32,
    #[serde(rename = "tiebreakRounds")]
    tiebreak_rounds: u32,
    correct: u32,
    skipped: u32,
    #[serde(rename = "outOfItems")]
    out_of_items: u32,
    winners: Vec<String>,
    results: Vec<GroupScore>,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    action: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
    finished_action: u64,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "matchId")]
    match_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageElapsedMs")]
    average_elapsed_ms: u64,
    #[serde(rename = "tiebreakCount")]
    tiebreak_count: usize,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Default)]
struct Anomalies {
    messages: Vec<String>,
    records: Vec<AnomalyRecord>,
    seen: HashSet<String>,
}

impl Anomalies {
    fn push(&mut self, action: u64, message: String) {
        self.records.push(AnomalyRecord {
            action,
            message: message.clone(),
        });
        if self.seen.insert(message.clone()) {
            self.messages.push(message);
        }
    }
}

/// What the simulator has observed about the session so far, rebuilt from engine events.
#[derive(Default)]
struct Observed {
    turns: u32,
    tiebreak_rounds: u32,
    correct: u32,
    skipped: u32,
    out_of_items: u32,
    main_correct: BTreeMap<usize, u32>,
    answered: HashSet<u32>,
    catalog_ids: HashSet<u32>,
    served: HashSet<u32>,
    current: Option<u32>,
    in_tiebreak: bool,
    last_remaining: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let catalog = load_catalog(cli.catalog.as_deref())?;
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let match_id = cli
        .match_id
        .clone()
        .unwrap_or_else(|| default_match_id(seed_hint, run_started_at_ms));
    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut total_elapsed_ms = 0u64;
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        info!(
            match_id = %match_id,
            scenario = %scenario.name,
            seed = scenario.seed,
            groups = scenario.groups,
            timer_seconds = ?scenario.timer_seconds,
            scripts = ?scenario.scripts,
            "scenario started"
        );
        let scenario_catalog = match scenario.catalog_limit {
            Some(limit) => Catalog::new(catalog.items().iter().take(limit).cloned().collect())?,
            None => catalog.clone(),
        };
        let scenario_run = run_scenario(&scenario, scenario_catalog)?;

        for anomaly in &scenario_run.anomaly_records {
            warn!(
                match_id = %match_id,
                scenario = %scenario.name,
                seed = scenario.seed,
                action = anomaly.action,
                message = %anomaly.message,
                "anomaly detected"
            );
        }

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();
        total_elapsed_ms += scenario_run.result.elapsed_ms;

        info!(
            match_id = %match_id,
            scenario = %scenario.name,
            seed = scenario.seed,
            action = scenario_run.finished_action,
            completed = scenario_run.result.completed,
            elapsed_ms = scenario_run.result.elapsed_ms,
            tiebreak_rounds = scenario_run.result.tiebreak_rounds,
            winners = ?scenario_run.result.winners,
            anomaly_count = scenario_run.anomaly_records.len(),
            "scenario finished"
        );

        println!("{}", serde_json::to_string(&scenario_run.result)?);
        scenario_results.push(scenario_run.result);
    }

    let summary = build_run_summary(
        match_id.clone(),
        run_started_at_ms,
        now_ms(),
        scenario_results,
        total_anomalies,
        total_elapsed_ms,
    );
    if let Some(path) = cli.summary_out.as_deref() {
        if let Err(error) = write_summary(path, &summary) {
            error!(
                match_id = %match_id,
                path = %path.display(),
                %error,
                "summary write failed"
            );
            std::process::exit(1);
        }
    }

    if has_anomaly {
        std::process::exit(1);
    }
    Ok(())
}

fn load_catalog(path: Option<&Path>) -> anyhow::Result<Catalog> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            Ok(Catalog::from_json(&text)?)
        }
        None => Ok(Catalog::builtin()),
    }
}

fn run_scenario(scenario: &Scenario, catalog: Catalog) -> anyhow::Result<ScenarioRunResult> {
    let mut rng = Rng::new(scenario.seed);
    let mut config = build_config(&default_participants(), scenario.timer_seconds, &mut rng);
    config.groups.truncate(scenario.groups.max(1));
    let timer_seconds = config.timer_seconds;
    let catalog_size = catalog.len();
    let catalog_ids: HashSet<u32> = catalog.items().iter().map(|item| item.id).collect();
    let mut engine = GameEngine::new(config, catalog, scenario.seed)?;

    let mut anomalies = Anomalies::default();
    let mut observed = Observed {
        catalog_ids,
        ..Observed::default()
    };
    let mut cursor = 0usize;
    let mut elapsed_ms = 0u64;
    let mut action_count = 0u64;

    while !engine.is_ended() && action_count < MAX_ACTIONS {
        action_count += 1;
        match engine.phase() {
            Phase::Ready { .. } | Phase::TiebreakReady { .. } => {
                cursor = 0;
                engine.dispatch(Action::StartTurn);
            }
            Phase::Playing { group } | Phase::TiebreakPlaying { group, .. } => {
                let scripts = if observed.in_tiebreak {
                    &scenario.tiebreak_scripts
                } else {
                    &scenario.scripts
                };
                let op = script_op(scripts, group, cursor);
                cursor += 1;
                elapsed_ms += play_op(&mut engine, op);
            }
            Phase::Summary { .. } | Phase::TiebreakAnnounce { .. } | Phase::TiebreakSummary { .. } => {
                if let Some(Effect::SessionComplete { results }) = engine.dispatch(Action::Advance) {
                    check_results(&results, &observed, &mut anomalies, action_count);
                }
            }
            Phase::GameOver => break,
        }
        collect_snapshot_anomalies(&mut engine, &mut observed, &mut anomalies, action_count);
    }

    if !engine.is_ended() {
        anomalies.push(
            action_count,
            format!("session did not finish within {MAX_ACTIONS} actions"),
        );
    }
    if observed.tiebreak_rounds > MAX_TIEBREAK_ROUNDS {
        anomalies.push(
            action_count,
            format!("tiebreak ran {} rounds", observed.tiebreak_rounds),
        );
    }

    let results = engine.results().map(<[GroupScore]>::to_vec).unwrap_or_default();
    let winners = if results.is_empty() {
        Vec::new()
    } else {
        build_results_response(&results).winners
    };

    Ok(ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            seed: scenario.seed,
            groups: engine.scoreboard().len(),
            timer_seconds,
            catalog_size,
            completed: engine.is_ended(),
            elapsed_ms,
            turns: observed.turns,
            tiebreak_rounds: observed.tiebreak_rounds,
            correct: observed.correct,
            skipped: observed.skipped,
            out_of_items: observed.out_of_items,
            winners,
            results,
            anomalies: anomalies.messages,
        },
        anomaly_records: anomalies.records,
        finished_action: action_count,
    })
}

fn script_op(scripts: &[String], group: usize, cursor: usize) -> char {
    if scripts.is_empty() {
        return 'c';
    }
    let script = &scripts[group % scripts.len()];
    let ops: Vec<char> = script.chars().collect();
    if ops.is_empty() {
        return '.';
    }
    ops[cursor % ops.len()]
}

/// Applies one script op followed by a second of play. Returns the simulated milliseconds spent.
fn play_op(engine: &mut GameEngine, op: char) -> u64 {
    let effect = match op {
        'c' => engine.dispatch(Action::Correct),
        's' => engine.dispatch(Action::Skip),
        'x' => engine.dispatch(Action::StopTurn),
        'p' => {
            engine.dispatch(Action::Pause);
            for _ in 0..PAUSE_HOLD_SECONDS {
                engine.step(MS_PER_SECOND);
            }
            engine.dispatch(Action::Resume)
        }
        _ => None,
    };
    let mut spent = 0;
    if let Some(Effect::ScheduleReveal { generation, delay_ms }) = effect {
        engine.step(delay_ms);
        engine.dispatch(Action::Reveal { generation });
        spent += delay_ms;
    }
    let rest = MS_PER_SECOND.saturating_sub(spent);
    engine.step(rest);
    spent + rest
}

fn collect_snapshot_anomalies(
    engine: &mut GameEngine,
    observed: &mut Observed,
    anomalies: &mut Anomalies,
    action: u64,
) {
    let snapshot = engine.build_snapshot(true);

    for event in snapshot.events {
        match event {
            RuntimeEvent::TurnStarted { tiebreak, .. } => {
                observed.turns += 1;
                observed.in_tiebreak = tiebreak;
                observed.last_remaining = None;
                observed.current = None;
            }
            RuntimeEvent::Guessed {
                group,
                item_id,
                kind: FlashKind::Correct,
            } => {
                check_guessed(observed, item_id, anomalies, action);
                observed.correct += 1;
                if !observed.in_tiebreak {
                    *observed.main_correct.entry(group).or_insert(0) += 1;
                }
                if !observed.answered.insert(item_id) {
                    anomalies.push(action, format!("item {item_id} answered twice"));
                }
            }
            RuntimeEvent::Guessed {
                kind: FlashKind::Skip,
                item_id,
                ..
            } => {
                check_guessed(observed, item_id, anomalies, action);
                observed.skipped += 1;
            }
            RuntimeEvent::ItemServed { item_id, .. } => {
                record_serve(observed, item_id, anomalies, action);
            }
            RuntimeEvent::TurnEnded { reason, .. } => {
                if reason == TurnEndReason::OutOfItems {
                    observed.out_of_items += 1;
                }
                observed.last_remaining = None;
                observed.current = None;
            }
            RuntimeEvent::TiebreakStarted { .. } => {
                observed.tiebreak_rounds += 1;
            }
            RuntimeEvent::Paused { .. }
            | RuntimeEvent::Resumed { .. }
            | RuntimeEvent::SessionComplete { .. } => {}
        }
    }

    if let Some(turn) = snapshot.turn {
        if let Some(item) = &turn.item {
            if observed.current != Some(item.id) {
                anomalies.push(action, format!("item {} shown without being served", item.id));
            }
        }
        if let Some(previous) = observed.last_remaining {
            if turn.remaining_seconds > previous {
                anomalies.push(
                    action,
                    format!(
                        "clock went back from {previous}s to {}s for group {}",
                        turn.remaining_seconds, turn.group
                    ),
                );
            }
        }
        if turn.remaining_seconds > turn.total_seconds {
            anomalies.push(action, "remaining time exceeds turn length".to_string());
        }
        observed.last_remaining = Some(turn.remaining_seconds);
    }

    for score in &snapshot.scores {
        let counted = observed.main_correct.get(&score.index).copied().unwrap_or(0);
        if counted != score.correct {
            anomalies.push(
                action,
                format!(
                    "group {} score {} does not match {} correct guesses",
                    score.index, score.correct, counted
                ),
            );
        }
    }
}

fn check_guessed(observed: &mut Observed, item_id: u32, anomalies: &mut Anomalies, action: u64) {
    if observed.current.take() != Some(item_id) {
        anomalies.push(action, format!("guessed item {item_id} was not the current item"));
    }
}

/// Notes `item_id` as the current item. A repeat is only allowed once every unanswered
/// item has been served, which is when the served set starts over.
fn record_serve(observed: &mut Observed, item_id: u32, anomalies: &mut Anomalies, action: u64) {
    observed.current = Some(item_id);
    if observed.answered.contains(&item_id) {
        anomalies.push(action, format!("answered item {item_id} served again"));
        return;
    }
    if observed.served.insert(item_id) {
        return;
    }
    let unserved_left = observed
        .catalog_ids
        .iter()
        .any(|id| !observed.answered.contains(id) && !observed.served.contains(id));
    if unserved_left {
        anomalies.push(
            action,
            format!("item {item_id} served twice while fresh items remain"),
        );
    } else {
        observed.served.clear();
        observed.served.insert(item_id);
    }
}

fn check_results(
    results: &[GroupScore],
    observed: &Observed,
    anomalies: &mut Anomalies,
    action: u64,
) {
    for (index, row) in results.iter().enumerate() {
        let main = observed.main_correct.get(&index).copied().unwrap_or(0);
        if row.correct < main {
            anomalies.push(
                action,
                format!(
                    "final score {} for {} is below rotation score {main}",
                    row.correct, row.name
                ),
            );
        }
    }
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = normalize_seed(cli.seed.unwrap_or_else(now_ms));
    let scripts = cli
        .script
        .as_deref()
        .map(parse_scripts)
        .unwrap_or_else(|| vec!["ccscs".to_string()]);

    if cli.single || cli.groups.is_some() || cli.timer.is_some() || cli.script.is_some() {
        let groups = cli.groups.unwrap_or(4).clamp(1, 4);
        return vec![Scenario {
            name: format!("custom-g{groups}"),
            groups,
            timer_seconds: cli.timer.or(Some(DEFAULT_TIMER_SECONDS as i64)),
            catalog_limit: None,
            scripts,
            tiebreak_scripts: vec!["cs".to_string(), "ss".to_string()],
            seed,
        }];
    }

    vec![
        Scenario {
            name: "full-rotation-g4".to_string(),
            groups: 4,
            timer_seconds: Some(90),
            catalog_limit: None,
            scripts: vec![
                "ccs".to_string(),
                "csp".to_string(),
                "c.s".to_string(),
                "sccx".to_string(),
            ],
            tiebreak_scripts: vec!["cs".to_string(), "ss".to_string()],
            seed,
        },
        Scenario {
            name: "forced-tie-g3".to_string(),
            groups: 3,
            timer_seconds: Some(60),
            catalog_limit: None,
            scripts: vec!["cx".to_string()],
            tiebreak_scripts: vec!["c".to_string(), "s".to_string(), "s".to_string()],
            seed: normalize_seed(seed as u64 + 1),
        },
        Scenario {
            name: "small-catalog-g2".to_string(),
            groups: 2,
            timer_seconds: Some(60),
            catalog_limit: Some(8),
            scripts: vec!["cs".to_string()],
            tiebreak_scripts: vec!["c".to_string()],
            seed: normalize_seed(seed as u64 + 2),
        },
    ]
}

fn parse_scripts(raw: &str) -> Vec<String> {
    let scripts: Vec<String> = raw
        .split(',')
        .map(|part| {
            part.chars()
                .filter(|op| matches!(op, 'c' | 's' | 'p' | '.' | 'x'))
                .collect::<String>()
        })
        .filter(|part| !part.is_empty())
        .collect();
    if scripts.is_empty() {
        vec!["c".to_string()]
    } else {
        scripts
    }
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
    scenarios: Vec<ScenarioResultLine>,
    anomaly_count: usize,
    total_elapsed_ms: u64,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let average_elapsed_ms = if scenario_count == 0 {
        0
    } else {
        total_elapsed_ms / scenario_count as u64
    };
    let tiebreak_count = scenarios
        .iter()
        .filter(|scenario| scenario.tiebreak_rounds > 0)
        .count();
    RunSummary {
        match_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        average_elapsed_ms,
        tiebreak_count,
        scenarios,
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, summary_text)
}
