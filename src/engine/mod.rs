use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::config::validate_config;
use crate::constants::{LOW_TIME_SECONDS, REVEAL_DELAY_MS, TIEBREAK_TURN_SECONDS};
use crate::error::ConfigError;
use crate::rng::Rng;
use crate::server_utils::format_clock;
use crate::types::{
    FlashKind, FlashView, GameConfig, GroupScore, Item, Phase, RuntimeEvent, ScoreView,
    Snapshot, TiebreakView, TurnEndReason, TurnView,
};

pub mod clock;
pub mod dispenser;
pub mod scoreboard;
pub mod tiebreak;

use self::clock::Countdown;
use self::dispenser::{draw_pool, DrawPool};
use self::scoreboard::{detect_ties, Scoreboard};
use self::tiebreak::{RoundOutcome, TiebreakContext};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    StartTurn,
    Correct,
    Skip,
    Pause,
    Resume,
    StopTurn,
    /// Leaves a summary or announce screen.
    Advance,
    Tick { dt_ms: u64 },
    /// Fired by the host once the guess flash has played out.
    Reveal { generation: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    ScheduleReveal { generation: u64, delay_ms: u64 },
    /// Results in input order. Emitted once per session; the host persists them and shows results.
    SessionComplete { results: Vec<GroupScore> },
}

#[derive(Clone, Debug)]
struct Turn {
    group: usize,
    clock: Countdown,
    pool: DrawPool,
    correct: u32,
}

#[derive(Clone, Debug)]
struct Flash {
    kind: FlashKind,
    item: Item,
    generation: u64,
}

#[derive(Clone, Debug)]
pub struct GameEngine {
    pub config: GameConfig,

    catalog: Catalog,
    rng: Rng,
    phase: Phase,
    scoreboard: Scoreboard,
    answered: HashSet<u32>,
    served: HashSet<u32>,
    turn: Option<Turn>,
    tiebreak: Option<TiebreakContext>,
    flash: Option<Flash>,
    generation: u64,
    events: Vec<RuntimeEvent>,
    results: Option<Vec<GroupScore>>,
}

impl GameEngine {
    pub fn new(config: GameConfig, catalog: Catalog, seed: u32) -> Result<Self, ConfigError> {
        validate_config(&config)?;
        let scoreboard = Scoreboard::new(&config.groups);
        info!(
            groups = config.groups.len(),
            timer_seconds = config.timer_seconds,
            catalog = catalog.len(),
            "session started"
        );
        Ok(Self {
            config,
            catalog,
            rng: Rng::new(seed),
            phase: Phase::Ready { group: 0 },
            scoreboard,
            answered: HashSet::new(),
            served: HashSet::new(),
            turn: None,
            tiebreak: None,
            flash: None,
            generation: 0,
            events: Vec::new(),
            results: None,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_ended(&self) -> bool {
        self.phase == Phase::GameOver
    }

    pub fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    pub fn tiebreak(&self) -> Option<&TiebreakContext> {
        self.tiebreak.as_ref()
    }

    pub fn results(&self) -> Option<&[GroupScore]> {
        self.results.as_deref()
    }

    pub fn answered_ids(&self) -> &HashSet<u32> {
        &self.answered
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The item the describer should be looking at. None while paused or out of items.
    pub fn current_item(&self) -> Option<&Item> {
        let turn = self.turn.as_ref()?;
        if turn.clock.is_paused() {
            return None;
        }
        turn.pool.current()
    }

    pub fn remaining_seconds(&self) -> Option<u32> {
        self.turn.as_ref().map(|turn| turn.clock.remaining_seconds())
    }

    pub fn turn_correct(&self) -> Option<u32> {
        self.turn.as_ref().map(|turn| turn.correct)
    }

    pub fn is_paused(&self) -> bool {
        self.turn
            .as_ref()
            .is_some_and(|turn| turn.clock.is_paused())
    }

    pub fn dispatch(&mut self, action: Action) -> Option<Effect> {
        match action {
            Action::StartTurn => {
                self.start_turn();
                None
            }
            Action::Correct => self.guess(FlashKind::Correct),
            Action::Skip => self.guess(FlashKind::Skip),
            Action::Pause => {
                self.pause();
                None
            }
            Action::Resume => {
                self.resume();
                None
            }
            Action::StopTurn => {
                self.end_turn(TurnEndReason::Stopped);
                None
            }
            Action::Advance => self.advance_phase(),
            Action::Tick { dt_ms } => {
                self.step(dt_ms);
                None
            }
            Action::Reveal { generation } => {
                self.reveal(generation);
                None
            }
        }
    }

    pub fn step(&mut self, dt_ms: u64) {
        if !self.phase.is_playing() {
            return;
        }
        let Some(turn) = self.turn.as_mut() else {
            return;
        };
        if turn.clock.advance(dt_ms) {
            self.end_turn(TurnEndReason::TimeUp);
        }
    }

    pub fn build_snapshot(&mut self, include_events: bool) -> Snapshot {
        let scores = self
            .scoreboard
            .groups()
            .iter()
            .enumerate()
            .map(|(index, group)| ScoreView {
                index,
                name: group.name.clone(),
                color: group.color.clone(),
                correct: group.correct,
            })
            .collect();
        let turn = self.turn.as_ref().map(|turn| {
            let paused = turn.clock.is_paused();
            let flash = self.flash.as_ref().map(|flash| FlashView {
                kind: flash.kind,
                item: flash.item.clone(),
                generation: flash.generation,
            });
            let item = if paused || flash.is_some() {
                None
            } else {
                turn.pool.current().cloned()
            };
            TurnView {
                group: turn.group,
                remaining_seconds: turn.clock.remaining_seconds(),
                total_seconds: turn.clock.total_seconds(),
                correct: turn.correct,
                paused,
                clock: format_clock(turn.clock.remaining_seconds()),
                low_time: turn.clock.remaining_seconds() <= LOW_TIME_SECONDS,
                items_left: turn.pool.remaining(),
                item,
                flash,
            }
        });
        let tiebreak = self.tiebreak.as_ref().map(|ctx| TiebreakView {
            round: ctx.round(),
            tied: ctx.tied().to_vec(),
            position: ctx.position(),
            extra: ctx.tied().iter().map(|g| (*g, ctx.extra_for(*g))).collect(),
        });

        let snapshot = Snapshot {
            phase: self.phase,
            group_count: self.scoreboard.len(),
            scores,
            turn,
            tiebreak,
            answered_count: self.answered.len(),
            catalog_size: self.catalog.len(),
            events: if include_events {
                self.events.clone()
            } else {
                Vec::new()
            },
        };
        if include_events {
            self.events.clear();
        }
        snapshot
    }

    fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.flash = None;
        self.generation
    }

    fn start_turn(&mut self) {
        let (group, total_seconds, next_phase) = match self.phase {
            Phase::Ready { group } => (
                group,
                self.config.timer_seconds,
                Phase::Playing { group },
            ),
            Phase::TiebreakReady { slot, group } => (
                group,
                TIEBREAK_TURN_SECONDS,
                Phase::TiebreakPlaying { slot, group },
            ),
            other => {
                debug!(phase = ?other, "start turn ignored");
                return;
            }
        };

        let draw = draw_pool(
            self.catalog.items(),
            &self.answered,
            &self.served,
            &mut self.rng,
        );
        if draw.recycled {
            debug!(pool = draw.items.len(), "fresh items exhausted, recycling skipped ones");
            self.served.clear();
        }
        let pool = DrawPool::new(draw.items);
        let first = pool.current().map(|item| item.id);
        if let Some(id) = first {
            self.served.insert(id);
        }
        let exhausted = pool.is_exhausted();

        self.bump_generation();
        self.turn = Some(Turn {
            group,
            clock: Countdown::new(total_seconds),
            pool,
            correct: 0,
        });
        self.phase = next_phase;
        self.events.push(RuntimeEvent::TurnStarted {
            group,
            total_seconds,
            tiebreak: self.phase.is_tiebreak(),
        });
        if let Some(item_id) = first {
            self.events.push(RuntimeEvent::ItemServed { group, item_id });
        }
        debug!(group, total_seconds, "turn started");

        if exhausted {
            self.end_turn(TurnEndReason::OutOfItems);
        }
    }

    fn guess(&mut self, kind: FlashKind) -> Option<Effect> {
        if !self.phase.is_playing() {
            return None;
        }
        let turn = self.turn.as_mut()?;
        if turn.clock.is_paused() {
            return None;
        }
        let item = turn.pool.current()?.clone();
        let group = turn.group;

        if kind == FlashKind::Correct {
            self.answered.insert(item.id);
            turn.correct += 1;
            match self.tiebreak.as_mut() {
                Some(ctx) => ctx.record_correct(group),
                None => self.scoreboard.record_correct(group),
            }
        }
        let next = turn.pool.advance().map(|next| next.id);
        if let Some(id) = next {
            self.served.insert(id);
        }
        let exhausted = turn.pool.is_exhausted();

        self.events.push(RuntimeEvent::Guessed {
            group,
            item_id: item.id,
            kind,
        });
        if let Some(item_id) = next {
            self.events.push(RuntimeEvent::ItemServed { group, item_id });
        }

        if exhausted {
            self.end_turn(TurnEndReason::OutOfItems);
            return None;
        }
        let generation = self.bump_generation();
        self.flash = Some(Flash {
            kind,
            item,
            generation,
        });
        Some(Effect::ScheduleReveal {
            generation,
            delay_ms: REVEAL_DELAY_MS,
        })
    }

    fn reveal(&mut self, generation: u64) {
        match &self.flash {
            Some(flash) if flash.generation == generation => self.flash = None,
            _ => debug!(generation, current = self.generation, "stale reveal dropped"),
        }
    }

    fn pause(&mut self) {
        if !self.phase.is_playing() {
            return;
        }
        let Some(turn) = self.turn.as_mut() else {
            return;
        };
        if !turn.clock.pause() {
            return;
        }
        let group = turn.group;
        self.bump_generation();
        self.events.push(RuntimeEvent::Paused { group });
    }

    fn resume(&mut self) {
        if !self.phase.is_playing() {
            return;
        }
        let Some(turn) = self.turn.as_mut() else {
            return;
        };
        if turn.clock.resume() {
            let group = turn.group;
            self.events.push(RuntimeEvent::Resumed { group });
        }
    }

    fn end_turn(&mut self, reason: TurnEndReason) {
        if !self.phase.is_playing() {
            return;
        }
        let Some(turn) = self.turn.take() else {
            return;
        };
        self.bump_generation();
        let correct = turn.correct;
        self.phase = match self.phase {
            Phase::Playing { group } => Phase::Summary {
                group,
                correct,
                reason,
            },
            Phase::TiebreakPlaying { slot, group } => Phase::TiebreakSummary {
                slot,
                group,
                correct,
                reason,
            },
            other => other,
        };
        self.events.push(RuntimeEvent::TurnEnded {
            group: turn.group,
            correct,
            reason,
        });
        info!(group = turn.group, correct, ?reason, "turn ended");
    }

    fn advance_phase(&mut self) -> Option<Effect> {
        match self.phase {
            Phase::Summary { group, .. } => {
                self.bump_generation();
                if group + 1 < self.scoreboard.len() {
                    self.phase = Phase::Ready { group: group + 1 };
                    return None;
                }
                self.end_rotation()
            }
            Phase::TiebreakAnnounce { .. } => {
                self.bump_generation();
                let group = self.tiebreak.as_ref().and_then(|ctx| ctx.current_group());
                match group {
                    Some(group) => {
                        self.phase = Phase::TiebreakReady { slot: 0, group };
                        None
                    }
                    None => self.finish(),
                }
            }
            Phase::TiebreakSummary { .. } => {
                self.bump_generation();
                self.after_tiebreak_turn()
            }
            other => {
                debug!(phase = ?other, "advance ignored");
                None
            }
        }
    }

    fn end_rotation(&mut self) -> Option<Effect> {
        let tied = detect_ties(&self.scoreboard.scores());
        match TiebreakContext::start(tied) {
            Some(ctx) => {
                self.enter_announce(ctx);
                None
            }
            None => self.finish(),
        }
    }

    fn enter_announce(&mut self, ctx: TiebreakContext) {
        let round = ctx.round();
        let tied = ctx.tied().to_vec();
        info!(round, ?tied, "tiebreak round");
        self.events.push(RuntimeEvent::TiebreakStarted { round, tied });
        self.tiebreak = Some(ctx);
        self.phase = Phase::TiebreakAnnounce { round };
    }

    fn after_tiebreak_turn(&mut self) -> Option<Effect> {
        let Some(mut ctx) = self.tiebreak.take() else {
            return self.finish();
        };
        if ctx.next_slot() {
            let slot = ctx.position();
            let group = ctx.current_group();
            self.tiebreak = Some(ctx);
            return match group {
                Some(group) => {
                    self.phase = Phase::TiebreakReady { slot, group };
                    None
                }
                None => self.finish(),
            };
        }
        let outcome = ctx.close_round();
        match outcome {
            RoundOutcome::Again => {
                self.enter_announce(ctx);
                None
            }
            RoundOutcome::Resolved => {
                self.tiebreak = Some(ctx);
                self.finish()
            }
        }
    }

    fn finish(&mut self) -> Option<Effect> {
        if self.results.is_some() {
            return None;
        }
        let extras: BTreeMap<usize, u32> = self
            .tiebreak
            .take()
            .map(|ctx| ctx.final_extras().clone())
            .unwrap_or_default();
        let results = self.scoreboard.finalize(&extras);
        self.turn = None;
        self.bump_generation();
        self.phase = Phase::GameOver;
        self.results = Some(results.clone());
        self.events.push(RuntimeEvent::SessionComplete {
            results: results.clone(),
        });
        info!(
            scores = ?results.iter().map(|row| row.correct).collect::<Vec<_>>(),
            "session complete"
        );
        Some(Effect::SessionComplete { results })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::catalog::Catalog;
    use crate::constants::{REVEAL_DELAY_MS, TIEBREAK_TURN_SECONDS};
    use crate::engine::{Action, Effect, GameEngine};
    use crate::error::ConfigError;
    use crate::types::{GameConfig, GroupConfig, Item, Phase, RuntimeEvent, TurnEndReason};

    fn make_config(groups: usize, timer_seconds: u32) -> GameConfig {
        GameConfig {
            groups: (0..groups)
                .map(|idx| GroupConfig {
                    name: format!("Tim {}", idx + 1),
                    color: "#3b82f6".to_string(),
                    gradient: String::new(),
                    members: vec![format!("Peserta {}", idx + 1)],
                })
                .collect(),
            timer_seconds,
        }
    }

    fn make_catalog(count: u32) -> Catalog {
        Catalog::new(
            (1..=count)
                .map(|id| Item {
                    id,
                    name: format!("Item {id}"),
                    image: format!("/images/{id}.png"),
                    category: "Hardware".to_string(),
                    taboo_words: Vec::new(),
                })
                .collect(),
        )
        .expect("valid catalog")
    }

    fn make_engine(groups: usize, timer_seconds: u32, items: u32) -> GameEngine {
        GameEngine::new(make_config(groups, timer_seconds), make_catalog(items), 4_242)
            .expect("valid config")
    }

    /// Plays one turn from a ready phase: `c` = correct, `s` = skip, one second between actions.
    fn play_turn(engine: &mut GameEngine, script: &str, served: &mut Vec<u32>) {
        engine.dispatch(Action::StartTurn);
        assert!(engine.phase().is_playing());
        for action in script.chars() {
            if !engine.phase().is_playing() {
                break;
            }
            if let Some(item) = engine.current_item() {
                if served.last() != Some(&item.id) {
                    served.push(item.id);
                }
            }
            match action {
                'c' => engine.dispatch(Action::Correct),
                's' => engine.dispatch(Action::Skip),
                other => panic!("unknown script action {other}"),
            };
            engine.step(1_000);
        }
        if engine.phase().is_playing() {
            if let Some(item) = engine.current_item() {
                if served.last() != Some(&item.id) {
                    served.push(item.id);
                }
            }
            engine.dispatch(Action::StopTurn);
        }
    }

    fn corrects(count: usize) -> String {
        "c".repeat(count)
    }

    #[test]
    fn new_rejects_unusable_config() {
        let err = GameEngine::new(make_config(0, 60), make_catalog(5), 1).unwrap_err();
        assert_eq!(err, ConfigError::NoGroups);
        let err = GameEngine::new(make_config(2, 0), make_catalog(5), 1).unwrap_err();
        assert_eq!(err, ConfigError::InvalidTimer(0));
    }

    #[test]
    fn correct_count_matches_actions() {
        let mut engine = make_engine(2, 60, 40);
        engine.dispatch(Action::StartTurn);
        for action in [Action::Correct, Action::Skip, Action::Correct, Action::Correct, Action::Skip] {
            engine.dispatch(action);
        }
        assert_eq!(engine.turn_correct(), Some(3));
        assert_eq!(engine.scoreboard().scores(), vec![3, 0]);
        assert_eq!(engine.answered_ids().len(), 3);

        engine.dispatch(Action::StopTurn);
        assert_eq!(
            engine.phase(),
            Phase::Summary {
                group: 0,
                correct: 3,
                reason: TurnEndReason::Stopped
            }
        );
        assert_eq!(engine.turn_correct(), None);
    }

    #[test]
    fn timer_expiry_moves_to_summary_once() {
        let mut engine = make_engine(2, 60, 40);
        engine.dispatch(Action::StartTurn);
        let mut last = engine.remaining_seconds().expect("turn running");
        for _ in 0..59 {
            engine.step(1_000);
            let now = engine.remaining_seconds().expect("turn running");
            assert!(now <= last);
            last = now;
        }
        assert_eq!(last, 1);
        engine.step(1_000);
        assert!(matches!(
            engine.phase(),
            Phase::Summary {
                reason: TurnEndReason::TimeUp,
                ..
            }
        ));
        engine.step(1_000);
        let snapshot = engine.build_snapshot(true);
        let ended = snapshot
            .events
            .iter()
            .filter(|event| matches!(event, RuntimeEvent::TurnEnded { .. }))
            .count();
        assert_eq!(ended, 1);
    }

    #[test]
    fn ticks_outside_playing_are_ignored() {
        let mut engine = make_engine(2, 60, 10);
        engine.step(5_000);
        assert_eq!(engine.phase(), Phase::Ready { group: 0 });
        engine.dispatch(Action::StartTurn);
        engine.dispatch(Action::StopTurn);
        engine.dispatch(Action::Tick { dt_ms: 90_000 });
        assert!(matches!(engine.phase(), Phase::Summary { group: 0, .. }));
        engine.dispatch(Action::Advance);
        assert_eq!(engine.phase(), Phase::Ready { group: 1 });
        engine.dispatch(Action::StartTurn);
        assert_eq!(engine.remaining_seconds(), Some(60));
    }

    #[test]
    fn pause_twice_is_same_as_once() {
        let mut engine = make_engine(1, 60, 10);
        engine.dispatch(Action::StartTurn);
        engine.step(4_000);
        engine.dispatch(Action::Pause);
        engine.dispatch(Action::Pause);
        engine.step(10_000);
        assert_eq!(engine.remaining_seconds(), Some(56));
        assert!(engine.is_paused());
        assert!(engine.current_item().is_none());

        assert!(engine.dispatch(Action::Correct).is_none());
        assert_eq!(engine.turn_correct(), Some(0));

        engine.dispatch(Action::Resume);
        engine.step(1_000);
        assert_eq!(engine.remaining_seconds(), Some(55));
        assert!(engine.current_item().is_some());

        let snapshot = engine.build_snapshot(true);
        let pauses = snapshot
            .events
            .iter()
            .filter(|event| matches!(event, RuntimeEvent::Paused { .. }))
            .count();
        assert_eq!(pauses, 1);
    }

    #[test]
    fn stop_works_while_paused() {
        let mut engine = make_engine(1, 60, 10);
        engine.dispatch(Action::StartTurn);
        engine.dispatch(Action::Correct);
        engine.dispatch(Action::Pause);
        engine.dispatch(Action::StopTurn);
        assert_eq!(
            engine.phase(),
            Phase::Summary {
                group: 0,
                correct: 1,
                reason: TurnEndReason::Stopped
            }
        );
    }

    #[test]
    fn guess_advances_immediately_and_schedules_reveal() {
        let mut engine = make_engine(1, 60, 10);
        engine.dispatch(Action::StartTurn);
        let first = engine.current_item().expect("item").id;
        let effect = engine.dispatch(Action::Correct).expect("reveal scheduled");
        let Effect::ScheduleReveal {
            generation,
            delay_ms,
        } = effect
        else {
            panic!("expected reveal");
        };
        assert_eq!(delay_ms, REVEAL_DELAY_MS);
        assert_ne!(engine.current_item().map(|i| i.id), Some(first));
        assert_eq!(engine.scoreboard().scores(), vec![1]);

        let snapshot = engine.build_snapshot(false);
        let turn = snapshot.turn.expect("turn view");
        assert!(turn.item.is_none());
        assert_eq!(turn.flash.map(|f| f.item.id), Some(first));

        engine.dispatch(Action::Reveal { generation });
        let turn = engine.build_snapshot(false).turn.expect("turn view");
        assert!(turn.flash.is_none());
        assert!(turn.item.is_some());
    }

    #[test]
    fn every_current_item_is_announced_once() {
        let mut engine = make_engine(1, 60, 4);
        engine.dispatch(Action::StartTurn);
        let mut shown = vec![engine.current_item().expect("item").id];
        for _ in 0..3 {
            engine.dispatch(Action::Skip);
            shown.push(engine.current_item().expect("item").id);
        }
        engine.dispatch(Action::Skip);
        assert!(matches!(
            engine.phase(),
            Phase::Summary {
                reason: TurnEndReason::OutOfItems,
                ..
            }
        ));

        let served: Vec<u32> = engine
            .build_snapshot(true)
            .events
            .iter()
            .filter_map(|event| match event {
                RuntimeEvent::ItemServed { item_id, .. } => Some(*item_id),
                _ => None,
            })
            .collect();
        assert_eq!(served, shown);
    }

    #[test]
    fn second_guess_during_flash_keeps_the_newer_flash() {
        let mut engine = make_engine(1, 60, 10);
        engine.dispatch(Action::StartTurn);
        let Some(Effect::ScheduleReveal { generation: first, .. }) =
            engine.dispatch(Action::Correct)
        else {
            panic!("expected reveal");
        };
        let second_item = engine.current_item().expect("item").id;
        let Some(Effect::ScheduleReveal { generation: second, .. }) =
            engine.dispatch(Action::Correct)
        else {
            panic!("expected reveal");
        };
        assert!(second > first);
        assert_eq!(engine.scoreboard().scores(), vec![2]);

        engine.dispatch(Action::Reveal { generation: first });
        let turn = engine.build_snapshot(false).turn.expect("turn view");
        let flash = turn.flash.expect("newer flash still showing");
        assert_eq!(flash.generation, second);
        assert_eq!(flash.item.id, second_item);
        assert!(turn.item.is_none());

        engine.dispatch(Action::Reveal { generation: second });
        let turn = engine.build_snapshot(false).turn.expect("turn view");
        assert!(turn.flash.is_none());
        assert!(turn.item.is_some());
    }

    #[test]
    fn stale_reveal_after_stop_is_a_no_op() {
        let mut engine = make_engine(2, 60, 10);
        engine.dispatch(Action::StartTurn);
        let Some(Effect::ScheduleReveal { generation, .. }) = engine.dispatch(Action::Skip) else {
            panic!("expected reveal");
        };
        engine.dispatch(Action::StopTurn);
        let phase = engine.phase();
        assert!(engine.dispatch(Action::Reveal { generation }).is_none());
        assert_eq!(engine.phase(), phase);

        engine.dispatch(Action::Advance);
        engine.dispatch(Action::StartTurn);
        engine.dispatch(Action::Reveal { generation });
        assert!(engine.phase().is_playing());
        assert!(engine.build_snapshot(false).turn.expect("turn").flash.is_none());
    }

    #[test]
    fn pause_invalidates_pending_reveal() {
        let mut engine = make_engine(1, 60, 10);
        engine.dispatch(Action::StartTurn);
        let Some(Effect::ScheduleReveal { generation, .. }) = engine.dispatch(Action::Correct)
        else {
            panic!("expected reveal");
        };
        engine.dispatch(Action::Pause);
        assert!(engine.generation() > generation);
        engine.dispatch(Action::Resume);
        engine.dispatch(Action::Reveal { generation });
        assert!(engine.current_item().is_some());
    }

    #[test]
    fn exhaustion_ends_turn_without_scoring_extra_actions() {
        let mut engine = make_engine(2, 60, 3);
        engine.dispatch(Action::StartTurn);
        for _ in 0..5 {
            engine.dispatch(Action::Correct);
        }
        assert_eq!(
            engine.phase(),
            Phase::Summary {
                group: 0,
                correct: 3,
                reason: TurnEndReason::OutOfItems
            }
        );
        assert_eq!(engine.scoreboard().scores(), vec![3, 0]);

        engine.dispatch(Action::Advance);
        engine.dispatch(Action::StartTurn);
        assert!(matches!(
            engine.phase(),
            Phase::Summary {
                group: 1,
                correct: 0,
                reason: TurnEndReason::OutOfItems
            }
        ));
    }

    #[test]
    fn skipped_items_come_back_after_fresh_ones_run_out() {
        let mut engine = make_engine(2, 60, 4);
        let mut served = Vec::new();
        play_turn(&mut engine, "ccss", &mut served);
        assert!(matches!(
            engine.phase(),
            Phase::Summary {
                reason: TurnEndReason::OutOfItems,
                ..
            }
        ));
        engine.dispatch(Action::Advance);
        engine.dispatch(Action::StartTurn);
        let answered = engine.answered_ids().clone();
        let current = engine.current_item().expect("skipped item recycled").id;
        assert!(!answered.contains(&current));
        let snapshot = engine.build_snapshot(false);
        assert_eq!(snapshot.turn.expect("turn").items_left, 2);
    }

    #[test]
    fn single_group_never_ties() {
        let mut engine = make_engine(1, 60, 10);
        let mut served = Vec::new();
        play_turn(&mut engine, "cc", &mut served);
        let effect = engine.dispatch(Action::Advance);
        assert!(matches!(effect, Some(Effect::SessionComplete { .. })));
        assert!(engine.is_ended());
        assert_eq!(engine.results().map(|r| r[0].correct), Some(2));
        assert!(engine.dispatch(Action::Advance).is_none());
    }

    #[test]
    fn four_group_rotation_has_no_repeats() {
        let mut engine = make_engine(4, 90, 71);
        let mut served = Vec::new();
        let expected = [9u32, 7, 5, 3];
        for (group, hits) in expected.iter().enumerate() {
            assert_eq!(engine.phase(), Phase::Ready { group });
            let script = format!("{}{}", corrects(*hits as usize), "s".repeat(12 - *hits as usize));
            play_turn(&mut engine, &script, &mut served);
            assert!(matches!(engine.phase(), Phase::Summary { .. }));
            engine.dispatch(Action::Advance);
        }

        let results = engine.results().expect("session complete").to_vec();
        let scores: Vec<u32> = results.iter().map(|row| row.correct).collect();
        assert_eq!(scores, expected.to_vec());
        assert_eq!(engine.scoreboard().rankings(), vec![0, 1, 2, 3]);
        assert_eq!(engine.answered_ids().len() as u32, expected.iter().sum::<u32>());

        let unique: HashSet<u32> = served.iter().copied().collect();
        assert_eq!(unique.len(), served.len(), "an item was served twice");
        assert_eq!(served.len(), 4 * 13);
    }

    #[test]
    fn tiebreak_converges_and_merges_last_round_extras() {
        let mut engine = make_engine(3, 60, 71);
        let mut served = Vec::new();
        for _ in 0..3 {
            play_turn(&mut engine, &corrects(5), &mut served);
            engine.dispatch(Action::Advance);
        }
        assert_eq!(engine.phase(), Phase::TiebreakAnnounce { round: 1 });

        engine.dispatch(Action::Advance);
        for (slot, hits) in [2usize, 2, 1].into_iter().enumerate() {
            assert_eq!(
                engine.phase(),
                Phase::TiebreakReady { slot, group: slot }
            );
            engine.dispatch(Action::StartTurn);
            assert_eq!(engine.remaining_seconds(), Some(TIEBREAK_TURN_SECONDS));
            for _ in 0..hits {
                engine.dispatch(Action::Correct);
            }
            engine.dispatch(Action::StopTurn);
            engine.dispatch(Action::Advance);
        }
        assert_eq!(engine.phase(), Phase::TiebreakAnnounce { round: 2 });
        assert_eq!(engine.tiebreak().map(|ctx| ctx.tied().to_vec()), Some(vec![0, 1]));
        assert_eq!(engine.scoreboard().scores(), vec![5, 5, 5]);

        engine.dispatch(Action::Advance);
        engine.dispatch(Action::StartTurn);
        engine.dispatch(Action::Correct);
        engine.dispatch(Action::StopTurn);
        engine.dispatch(Action::Advance);
        assert_eq!(engine.phase(), Phase::TiebreakReady { slot: 1, group: 1 });
        engine.dispatch(Action::StartTurn);
        engine.dispatch(Action::StopTurn);
        let effect = engine.dispatch(Action::Advance);

        let Some(Effect::SessionComplete { results }) = effect else {
            panic!("expected session to complete");
        };
        let scores: Vec<u32> = results.iter().map(|row| row.correct).collect();
        assert_eq!(scores, vec![6, 5, 6]);
        assert!(engine.is_ended());
        assert!(engine.tiebreak().is_none());
    }

    #[test]
    fn tiebreak_pool_excludes_answered_items() {
        let mut engine = make_engine(2, 60, 20);
        let mut served = Vec::new();
        play_turn(&mut engine, &corrects(4), &mut served);
        engine.dispatch(Action::Advance);
        play_turn(&mut engine, &corrects(4), &mut served);
        engine.dispatch(Action::Advance);
        engine.dispatch(Action::Advance);

        engine.dispatch(Action::StartTurn);
        let answered = engine.answered_ids().clone();
        assert_eq!(answered.len(), 8);
        let snapshot = engine.build_snapshot(false);
        assert_eq!(snapshot.turn.expect("turn").items_left, 20 - 8 - 2);
        while let Some(item) = engine.current_item().cloned() {
            assert!(!answered.contains(&item.id));
            engine.dispatch(Action::Correct);
        }
        assert!(matches!(
            engine.phase(),
            Phase::TiebreakSummary {
                reason: TurnEndReason::OutOfItems,
                ..
            }
        ));
    }

    #[test]
    fn tiebreak_timer_expires_like_a_normal_turn() {
        let mut engine = make_engine(2, 120, 30);
        let mut served = Vec::new();
        for _ in 0..2 {
            play_turn(&mut engine, "c", &mut served);
            engine.dispatch(Action::Advance);
        }
        engine.dispatch(Action::Advance);
        engine.dispatch(Action::StartTurn);
        engine.step(u64::from(TIEBREAK_TURN_SECONDS) * 1_000);
        assert!(matches!(
            engine.phase(),
            Phase::TiebreakSummary {
                slot: 0,
                reason: TurnEndReason::TimeUp,
                ..
            }
        ));
    }

    #[test]
    fn round_cap_ends_with_unresolved_tie() {
        let mut engine = make_engine(2, 60, 71);
        let mut served = Vec::new();
        for _ in 0..2 {
            play_turn(&mut engine, &corrects(3), &mut served);
            engine.dispatch(Action::Advance);
        }

        let mut rounds = 0;
        let mut outcome = None;
        while !engine.is_ended() {
            let Phase::TiebreakAnnounce { round } = engine.phase() else {
                panic!("expected announce, got {:?}", engine.phase());
            };
            rounds = round;
            engine.dispatch(Action::Advance);
            for _ in 0..2 {
                engine.dispatch(Action::StartTurn);
                engine.dispatch(Action::Correct);
                engine.dispatch(Action::StopTurn);
                outcome = engine.dispatch(Action::Advance);
            }
        }
        assert_eq!(rounds, 3);
        let Some(Effect::SessionComplete { results }) = outcome else {
            panic!("expected session complete");
        };
        assert_eq!(results[0].correct, 4);
        assert_eq!(results[1].correct, 4);
    }

    #[test]
    fn invalid_actions_are_no_ops() {
        let mut engine = make_engine(2, 60, 10);
        for action in [
            Action::Correct,
            Action::Skip,
            Action::Pause,
            Action::Resume,
            Action::StopTurn,
            Action::Advance,
            Action::Reveal { generation: 99 },
        ] {
            assert!(engine.dispatch(action).is_none());
            assert_eq!(engine.phase(), Phase::Ready { group: 0 });
        }
        engine.dispatch(Action::StartTurn);
        engine.dispatch(Action::StartTurn);
        assert_eq!(engine.phase(), Phase::Playing { group: 0 });
        assert!(engine.dispatch(Action::Advance).is_none());
    }
}
