//! Session context: the roster, the bracket and the shared battle state of one tournament.
//!
//! Every component receives an `Arc<Session>` instead of reaching for global
//! state. Locks are only taken inside synchronous methods, so no write ever
//! spans an `.await`.

use crate::logic::{
    is_tournament_complete, next_unplayed_match, promote_all_won, record_match_result, seed,
    MatchSlots,
};
use crate::models::{
    BattleOutcome, BracketError, BracketState, Participant, ParticipantIndex, Side,
};
use crate::persistence::Snapshot;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;

/// A generated battle ready for playback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreparedBattle {
    pub outcome: BattleOutcome,
    /// Field preset chosen from the battle location.
    pub field_no: String,
}

/// Shared battle state observed by playback.
#[derive(Clone, Debug, Default)]
pub enum BattleData {
    #[default]
    Empty,
    /// A generation request is running; any earlier result is gone.
    Generating,
    Ready(Arc<PreparedBattle>),
}

impl BattleData {
    pub fn prepared(&self) -> Option<Arc<PreparedBattle>> {
        match self {
            BattleData::Ready(p) => Some(Arc::clone(p)),
            _ => None,
        }
    }
}

/// Guard for generation requests of the active match.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct MatchRequestState {
    pub in_flight: bool,
    pub requested: bool,
    pub error_count: u32,
}

/// The match currently being generated or played.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ActiveMatch {
    pub slots: MatchSlots,
    pub participants: [ParticipantIndex; 2],
}

/// Result of concluding the active match.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Conclusion {
    pub winner: ParticipantIndex,
    pub loser: ParticipantIndex,
    pub winner_side: Side,
    /// Slot the winner moved into, `None` when that slot was already filled.
    pub promoted_to: Option<usize>,
    pub tournament_complete: bool,
}

#[derive(Debug, Default)]
struct Tournament {
    roster: Vec<Participant>,
    bracket: BracketState,
}

/// One tournament's mutable state.
#[derive(Debug)]
pub struct Session {
    tournament: RwLock<Tournament>,
    active: Mutex<Option<ActiveMatch>>,
    requests: Mutex<MatchRequestState>,
    summon_in_flight: AtomicBool,
    battle: watch::Sender<BattleData>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    pub fn new() -> Self {
        let (battle, _) = watch::channel(BattleData::Empty);
        Self {
            tournament: RwLock::new(Tournament::default()),
            active: Mutex::new(None),
            requests: Mutex::new(MatchRequestState::default()),
            summon_in_flight: AtomicBool::new(false),
            battle,
        }
    }

    /// Replace the whole roster (new upload batch) and seed a fresh bracket.
    /// Participants are re-indexed by their position.
    pub fn replace_roster(&self, mut participants: Vec<Participant>) -> Result<(), BracketError> {
        for (i, p) in participants.iter_mut().enumerate() {
            p.index = i;
        }
        let indices: Vec<ParticipantIndex> = (0..participants.len()).collect();
        let mut bracket = seed(&indices)?;
        bracket.refresh_names(&participants);
        *write(&self.tournament) = Tournament {
            roster: participants,
            bracket,
        };
        self.reset_match_state();
        log::info!("Seeded a new bracket for {} participant(s)", indices.len());
        Ok(())
    }

    /// Restore roster and bracket from a snapshot, re-applying recorded wins.
    pub fn restore(&self, snapshot: Snapshot) -> Result<(), BracketError> {
        let mut bracket = BracketState::from_slots(snapshot.tournament_data)?;
        promote_all_won(&mut bracket);
        bracket.refresh_names(&snapshot.monsters_data);
        *write(&self.tournament) = Tournament {
            roster: snapshot.monsters_data,
            bracket,
        };
        self.reset_match_state();
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        let t = read(&self.tournament);
        Snapshot::new(t.roster.clone(), t.bracket.slots().to_vec())
    }

    fn reset_match_state(&self) {
        *lock(&self.active) = None;
        *lock(&self.requests) = MatchRequestState::default();
        self.battle.send_replace(BattleData::Empty);
    }

    pub fn roster(&self) -> Vec<Participant> {
        read(&self.tournament).roster.clone()
    }

    pub fn participant(&self, index: ParticipantIndex) -> Option<Participant> {
        read(&self.tournament).roster.get(index).cloned()
    }

    pub fn bracket(&self) -> BracketState {
        read(&self.tournament).bracket.clone()
    }

    /// Mutate one participant and refresh the names shown in the bracket.
    pub fn update_participant<R>(
        &self,
        index: ParticipantIndex,
        f: impl FnOnce(&mut Participant) -> R,
    ) -> Option<R> {
        let mut guard = write(&self.tournament);
        let t = &mut *guard;
        let out = f(t.roster.get_mut(index)?);
        t.bracket.refresh_names(&t.roster);
        Some(out)
    }

    pub fn is_tournament_complete(&self) -> bool {
        let t = read(&self.tournament);
        !t.bracket.is_empty() && is_tournament_complete(&t.bracket)
    }

    pub fn champion(&self) -> Option<Participant> {
        let t = read(&self.tournament);
        t.bracket.champion().and_then(|i| t.roster.get(i).cloned())
    }

    /// Resolve byes, pick the next match and make it the active one.
    ///
    /// With `reset_cards` both participants lose their card and must be summoned again.
    pub fn begin_next_match(&self, reset_cards: bool) -> Option<ActiveMatch> {
        let active = {
            let mut guard = write(&self.tournament);
            let t = &mut *guard;
            let slots = next_unplayed_match(&mut t.bracket);
            t.bracket.refresh_names(&t.roster);
            let slots = slots?;
            let a = t.bracket.get(slots.a)?.participant?;
            let b = t.bracket.get(slots.b)?.participant?;
            if reset_cards {
                for i in [a, b] {
                    if let Some(p) = t.roster.get_mut(i) {
                        p.reset_card();
                    }
                }
            }
            ActiveMatch {
                slots,
                participants: [a, b],
            }
        };
        self.reset_match_state();
        *lock(&self.active) = Some(active.clone());
        log::info!(
            "Next match: participant {} vs participant {}",
            active.participants[0],
            active.participants[1]
        );
        Some(active)
    }

    pub fn active_match(&self) -> Option<ActiveMatch> {
        lock(&self.active).clone()
    }

    /// Write the winner of the active match into the bracket and promote it.
    pub fn conclude_active_match(&self, winner_side: Side) -> Option<Conclusion> {
        let active = lock(&self.active).take()?;
        let mut t = write(&self.tournament);
        let promoted_to = record_match_result(&mut t.bracket, active.slots, winner_side);
        let (winner, loser) = match winner_side {
            Side::A => (active.participants[0], active.participants[1]),
            Side::B => (active.participants[1], active.participants[0]),
        };
        Some(Conclusion {
            winner,
            loser,
            winner_side,
            promoted_to,
            tournament_complete: is_tournament_complete(&t.bracket),
        })
    }

    pub fn subscribe_battle(&self) -> watch::Receiver<BattleData> {
        self.battle.subscribe()
    }

    pub fn battle_data(&self) -> BattleData {
        self.battle.borrow().clone()
    }

    /// Replace the shared battle state in one step.
    pub fn publish_battle(&self, data: BattleData) {
        self.battle.send_replace(data);
    }

    pub fn request_state(&self) -> MatchRequestState {
        *lock(&self.requests)
    }

    /// Claim the generation request for the active match. `false` when one is
    /// already running or has already been made.
    pub fn try_begin_request(&self) -> bool {
        let mut r = lock(&self.requests);
        if r.in_flight || r.requested {
            return false;
        }
        r.in_flight = true;
        r.requested = true;
        true
    }

    pub fn record_request_error(&self) -> u32 {
        let mut r = lock(&self.requests);
        r.error_count += 1;
        r.error_count
    }

    /// Release the request guard. A failed request may be made again.
    pub fn finish_request(&self, succeeded: bool) {
        let mut r = lock(&self.requests);
        r.in_flight = false;
        if !succeeded {
            r.requested = false;
        }
    }

    pub fn try_begin_summon(&self) -> bool {
        self.summon_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn finish_summon(&self) {
        self.summon_in_flight.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.summon_in_flight.load(Ordering::Acquire) || lock(&self.requests).in_flight
    }
}
