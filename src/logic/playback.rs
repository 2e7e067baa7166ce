//! Battle playback: reveals a generated battle turn by turn, then concludes the match.
//!
//! Phases run `Idle -> WaitingForData -> PlayingTurn(i) -> WaitingForTurnGap(i) -> ...
//! -> Concluding -> Done`; a stop request before the match is decided ends in
//! `Cancelled`, a later one only shortens the finish. Everything the
//! scene should show is emitted as a `PlaybackEvent` to a `PlaybackSink`.

use crate::config::GameSettings;
use crate::logic::decide_winner;
use crate::models::{
    restore_names, sanitize_commentary, ParticipantIndex, Side, TurnRecord, EFFECT_COUNT,
};
use crate::services::Narrator;
use crate::session::{ActiveMatch, BattleData, Conclusion, PreparedBattle, Session};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Ambient animation beats every this many polls while waiting for data.
const AMBIENT_BEAT: u32 = 5;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "turn", rename_all = "snake_case")]
pub enum PlaybackPhase {
    #[default]
    Idle,
    WaitingForData,
    PlayingTurn(usize),
    WaitingForTurnGap(usize),
    Concluding,
    Done,
    Cancelled,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cue", content = "effect", rename_all = "snake_case")]
pub enum SoundCue {
    /// Field effect 1 to 4.
    Effect(u8),
    Finish,
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("A battle is already being played")]
    AlreadyRunning,
    #[error("Playback was stopped")]
    Cancelled,
    #[error("No match is active")]
    NoActiveMatch,
}

/// Side effects of playback, in the order they happen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaybackEvent {
    Phase {
        phase: PlaybackPhase,
    },
    Ambient {
        beat: u32,
    },
    Intro {
        text: String,
        field_no: String,
    },
    TurnStarted {
        turn: usize,
        time: String,
        effect: u8,
    },
    Gauges {
        condition_a: u8,
        condition_b: u8,
        bar_a: f64,
        bar_b: f64,
    },
    Commentary {
        turn: usize,
        text: String,
    },
    /// `shown` characters of the turn's commentary are visible.
    Typed {
        turn: usize,
        shown: usize,
    },
    Sound {
        cue: SoundCue,
    },
    /// Announces the winner before the conclusion is read.
    Winner {
        text: String,
        side: Side,
    },
    Conclusion {
        text: String,
        winner: ParticipantIndex,
        loser: ParticipantIndex,
        winner_side: Side,
        tournament_complete: bool,
    },
}

/// Receives playback side effects. Never blocks playback.
pub trait PlaybackSink: Send + Sync {
    fn emit(&self, event: PlaybackEvent);

    /// Called when a new playback takes over the sink.
    fn reset(&self) {}
}

/// Sink that keeps every event for later reading.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<PlaybackEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events from position `offset` on.
    pub fn events_since(&self, offset: usize) -> Vec<PlaybackEvent> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.get(offset..).map(<[_]>::to_vec).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl PlaybackSink for EventLog {
    fn emit(&self, event: PlaybackEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn reset(&self) {
        self.clear();
    }
}

/// Displayed fraction of a condition gauge: linear up to 30, then quadratic.
pub fn bar_length(value: u8) -> f64 {
    let v = f64::from(value.min(100));
    if v <= 30.0 {
        v / 100.0
    } else {
        0.3 + ((v - 30.0) / 70.0).powi(2) * 0.7
    }
}

fn side_index(side: Side) -> usize {
    match side {
        Side::A => 0,
        Side::B => 1,
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Resolves once a stop has been requested.
async fn stopped(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn pause(stop: &mut watch::Receiver<bool>, duration: Duration) -> Result<(), PlaybackError> {
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = stopped(stop) => Err(PlaybackError::Cancelled),
    }
}

pub struct BattlePlaybackController {
    session: Arc<Session>,
    narrator: Arc<dyn Narrator>,
    sink: Arc<dyn PlaybackSink>,
    settings: Arc<GameSettings>,
    running: AtomicBool,
    stop: watch::Sender<bool>,
    phase: watch::Sender<PlaybackPhase>,
}

impl BattlePlaybackController {
    pub fn new(
        session: Arc<Session>,
        narrator: Arc<dyn Narrator>,
        sink: Arc<dyn PlaybackSink>,
        settings: Arc<GameSettings>,
    ) -> Self {
        let (stop, _) = watch::channel(false);
        let (phase, _) = watch::channel(PlaybackPhase::Idle);
        Self {
            session,
            narrator,
            sink,
            settings,
            running: AtomicBool::new(false),
            stop,
            phase,
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<PlaybackPhase> {
        self.phase.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Halt a running playback at its next timer. Gauges already shown stay as they are,
    /// and a match that has already been decided still finishes as `Done`.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Play the active match's battle to the end and conclude the match.
    ///
    /// Waits for the battle to be generated if it is not ready yet. Rejected
    /// with `AlreadyRunning` while another playback is in progress.
    pub async fn play(&self) -> Result<Conclusion, PlaybackError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(PlaybackError::AlreadyRunning);
        }
        let _guard = RunningGuard(&self.running);
        self.stop.send_replace(false);
        self.sink.reset();
        let mut stop = self.stop.subscribe();

        let result = self.run(&mut stop).await;
        match &result {
            Ok(c) => {
                log::info!("Battle finished: participant {} beat participant {}", c.winner, c.loser);
                self.set_phase(PlaybackPhase::Done);
            }
            Err(PlaybackError::Cancelled) => {
                log::info!("Battle playback stopped");
                self.set_phase(PlaybackPhase::Cancelled);
            }
            Err(e) => {
                log::warn!("Battle playback not started: {}", e);
                self.set_phase(PlaybackPhase::Idle);
            }
        }
        result
    }

    async fn run(&self, stop: &mut watch::Receiver<bool>) -> Result<Conclusion, PlaybackError> {
        let active = self
            .session
            .active_match()
            .ok_or(PlaybackError::NoActiveMatch)?;
        self.set_phase(PlaybackPhase::WaitingForData);
        let prepared = self.wait_for_battle(stop).await?;
        let names = self.names(&active);

        let outcome = &prepared.outcome;
        let intro = format!(
            "The battle begins! {}, {}.",
            outcome.start_time.trim(),
            outcome.location.trim()
        );
        self.narrator.speak(&intro);
        self.sink.emit(PlaybackEvent::Intro {
            text: intro,
            field_no: prepared.field_no.clone(),
        });

        for (i, turn) in outcome.turns.iter().enumerate() {
            self.play_turn(i, turn, &names, stop).await?;
            self.turn_gap(i, stop).await?;
        }
        self.conclude(&prepared, &names, stop).await
    }

    fn names(&self, active: &ActiveMatch) -> [String; 2] {
        active.participants.map(|i| {
            self.session
                .participant(i)
                .map(|p| p.spoken_name().to_string())
                .unwrap_or_else(|| crate::models::UNKNOWN_NAME.to_string())
        })
    }

    async fn wait_for_battle(
        &self,
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Arc<PreparedBattle>, PlaybackError> {
        let mut battle = self.session.subscribe_battle();
        let period = self.settings.timing.poll_interval();
        let mut ambient = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ambient.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut polls = 0u32;
        loop {
            let ready = battle.borrow_and_update().prepared();
            if let Some(prepared) = ready {
                return Ok(prepared);
            }
            tokio::select! {
                changed = battle.changed() => {
                    if changed.is_err() {
                        return Err(PlaybackError::NoActiveMatch);
                    }
                }
                _ = ambient.tick() => {
                    polls += 1;
                    if polls % AMBIENT_BEAT == 0 {
                        self.sink.emit(PlaybackEvent::Ambient { beat: polls / AMBIENT_BEAT });
                    }
                }
                _ = stopped(stop) => return Err(PlaybackError::Cancelled),
            }
        }
    }

    async fn play_turn(
        &self,
        i: usize,
        turn: &TurnRecord,
        names: &[String; 2],
        stop: &mut watch::Receiver<bool>,
    ) -> Result<(), PlaybackError> {
        self.set_phase(PlaybackPhase::PlayingTurn(i));
        let effect = turn
            .effect
            .unwrap_or_else(|| rand::thread_rng().gen_range(1..=EFFECT_COUNT));
        self.sink.emit(PlaybackEvent::TurnStarted {
            turn: i,
            time: turn.time.clone(),
            effect,
        });
        self.sink.emit(PlaybackEvent::Sound {
            cue: SoundCue::Effect(effect),
        });
        self.sink.emit(PlaybackEvent::Gauges {
            condition_a: turn.condition_a,
            condition_b: turn.condition_b,
            bar_a: bar_length(turn.condition_a),
            bar_b: bar_length(turn.condition_b),
        });

        let (shown, spoken) = self.localise(&turn.commentary, names);
        self.narrator.speak(&spoken);
        let char_count = shown.chars().count();
        self.sink.emit(PlaybackEvent::Commentary { turn: i, text: shown });
        let delay = self.settings.timing.char_delay();
        for n in 1..=char_count {
            pause(stop, delay).await?;
            self.sink.emit(PlaybackEvent::Typed { turn: i, shown: n });
        }
        Ok(())
    }

    /// Idle ticks before the next turn; the count restarts while narration is still going.
    async fn turn_gap(&self, i: usize, stop: &mut watch::Receiver<bool>) -> Result<(), PlaybackError> {
        self.set_phase(PlaybackPhase::WaitingForTurnGap(i));
        let timing = self.settings.timing;
        let mut remaining = timing.gap_ticks;
        while remaining > 0 {
            pause(stop, timing.tick()).await?;
            if self.narrator.is_speaking() {
                remaining = timing.gap_ticks;
            } else {
                remaining -= 1;
            }
        }
        Ok(())
    }

    async fn conclude(
        &self,
        prepared: &PreparedBattle,
        names: &[String; 2],
        stop: &mut watch::Receiver<bool>,
    ) -> Result<Conclusion, PlaybackError> {
        self.set_phase(PlaybackPhase::Concluding);
        let outcome = &prepared.outcome;
        let side = decide_winner(outcome, self.settings.placeholders());
        let conclusion = self
            .session
            .conclude_active_match(side)
            .ok_or(PlaybackError::NoActiveMatch)?;
        self.session.publish_battle(BattleData::Empty);

        // The match is decided; a stop from here on only cuts the finish short.
        let winner_line = format!("Winner: {}", names[side_index(conclusion.winner_side)]);
        self.narrator.speak(&winner_line);
        self.sink.emit(PlaybackEvent::Winner {
            text: winner_line,
            side: conclusion.winner_side,
        });

        let (shown, spoken) = self.localise(&outcome.conclusion, names);
        self.sink.emit(PlaybackEvent::Conclusion {
            text: shown,
            winner: conclusion.winner,
            loser: conclusion.loser,
            winner_side: conclusion.winner_side,
            tournament_complete: conclusion.tournament_complete,
        });

        let knocked_out = outcome
            .last_turn()
            .map(|t| t.condition_a == 0 || t.condition_b == 0)
            .unwrap_or(false);
        if !knocked_out {
            self.sink.emit(PlaybackEvent::Sound {
                cue: SoundCue::Effect(1),
            });
            if pause(stop, self.settings.timing.finish_delay()).await.is_err() {
                log::debug!("Finish delay cut short");
            }
        }
        self.sink.emit(PlaybackEvent::Sound {
            cue: SoundCue::Finish,
        });

        self.narrator.speak(&spoken);
        tokio::select! {
            _ = self.narrator.wait_idle() => {}
            _ = stopped(stop) => log::debug!("Closing narration cut short"),
        }
        Ok(conclusion)
    }

    /// Commentary as shown (names quoted) and as spoken.
    fn localise(&self, text: &str, names: &[String; 2]) -> (String, String) {
        let placeholders = self.settings.placeholders();
        let clean = sanitize_commentary(text, placeholders);
        let names = [names[0].as_str(), names[1].as_str()];
        (
            restore_names(&clean, placeholders, names, true),
            restore_names(&clean, placeholders, names, false),
        )
    }

    fn set_phase(&self, phase: PlaybackPhase) {
        log::debug!("Playback phase: {:?}", phase);
        self.phase.send_replace(phase);
        self.sink.emit(PlaybackEvent::Phase { phase });
    }
}
