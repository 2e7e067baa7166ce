//! Bracket lifecycle: seeding, winner promotion, bye resolution and completion.

use crate::models::{
    BattleOutcome, BracketError, BracketState, ParticipantIndex, Side, SlotResult,
    MAX_BRACKET_SIZE,
};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// The two sibling slots of a match, by global position (`a` is the even index).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct MatchSlots {
    pub a: usize,
    pub b: usize,
}

impl MatchSlots {
    pub fn slot(&self, side: Side) -> usize {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }
}

/// Leaf count for `n` participants: next power of two, at least 2.
pub fn slot_count_for(n: usize) -> usize {
    n.next_power_of_two().max(2)
}

/// Bit-reversal permutation of `0..slot_count` (`slot_count` a power of two).
pub fn bit_reversed_order(slot_count: usize) -> Vec<usize> {
    let bits = slot_count.trailing_zeros();
    (0..slot_count)
        .map(|i| {
            if bits == 0 {
                i
            } else {
                i.reverse_bits() >> (usize::BITS - bits)
            }
        })
        .collect()
}

/// Place `ordered[k]` at leaf `bit_reversed_order(slot_count)[k]`; remaining leaves are byes.
pub fn place_bit_reversed(ordered: &[ParticipantIndex], slot_count: usize) -> Vec<Option<ParticipantIndex>> {
    let mut leaves = vec![None; slot_count];
    for (pos, &p) in bit_reversed_order(slot_count).into_iter().zip(ordered) {
        leaves[pos] = Some(p);
    }
    leaves
}

/// Seed a new bracket from roster indices using the thread RNG.
pub fn seed(participants: &[ParticipantIndex]) -> Result<BracketState, BracketError> {
    seed_with_rng(participants, &mut rand::thread_rng())
}

/// Seed a new bracket.
///
/// 1. Validate 1..=16 participants.
/// 2. Shuffle uniformly.
/// 3. Spread the shuffled order over the leaves by bit reversal so neighbours in
///    the shuffled order meet as late as possible.
pub fn seed_with_rng<R: Rng + ?Sized>(
    participants: &[ParticipantIndex],
    rng: &mut R,
) -> Result<BracketState, BracketError> {
    if participants.is_empty() {
        return Err(BracketError::EmptyRoster);
    }
    if participants.len() > MAX_BRACKET_SIZE {
        return Err(BracketError::TooManyParticipants {
            count: participants.len(),
            max: MAX_BRACKET_SIZE,
        });
    }
    let mut shuffled = participants.to_vec();
    shuffled.shuffle(rng);
    let leaves = place_bit_reversed(&shuffled, slot_count_for(participants.len()));
    BracketState::from_leaves(&leaves)
}

/// Move the winner in `pos` up one level.
///
/// Returns the parent position, or `None` when the slot has not won, is the
/// final, or the parent is already filled (promotion is applied once only).
pub fn promote(bracket: &mut BracketState, pos: usize) -> Option<usize> {
    let slot = bracket.get(pos)?;
    if slot.result != SlotResult::Won {
        return None;
    }
    let (participant, name) = (slot.participant, slot.name.clone());
    let parent = bracket.parent_of(pos)?;
    if bracket.get(parent)?.occupied {
        return None;
    }
    if let Some(up) = bracket.get_mut(parent) {
        up.participant = participant;
        up.name = name;
        up.occupied = true;
    }
    if let Some(sibling) = bracket.sibling_of(pos).and_then(|s| bracket.get_mut(s)) {
        sibling.defeated = true;
    }
    log::debug!("Promoted slot {} to slot {}", pos, parent);
    Some(parent)
}

/// Re-apply every recorded win (after restoring a snapshot). Safe to repeat.
pub fn promote_all_won(bracket: &mut BracketState) -> Vec<usize> {
    (0..bracket.len())
        .filter_map(|pos| promote(bracket, pos))
        .collect()
}

/// Write a decided match into the bracket and promote the winner.
pub fn record_match_result(
    bracket: &mut BracketState,
    slots: MatchSlots,
    winner: Side,
) -> Option<usize> {
    let (won, lost) = (slots.slot(winner), slots.slot(winner.other()));
    if let Some(s) = bracket.get_mut(won) {
        s.result = SlotResult::Won;
    }
    if let Some(s) = bracket.get_mut(lost) {
        s.result = SlotResult::Lost;
    }
    promote(bracket, won)
}

/// No occupied slot below the final is still waiting for its match.
pub fn is_tournament_complete(bracket: &BracketState) -> bool {
    bracket.pending_slot_count() == 0
}

/// Find the next match to play, resolving byes along the way.
///
/// Scans from the leaves towards the final. A pending slot whose sibling is
/// empty wins by default and is promoted; the scan restarts so that byes
/// cascade through several levels.
pub fn next_unplayed_match(bracket: &mut BracketState) -> Option<MatchSlots> {
    let final_pos = bracket.final_position()?;
    loop {
        let pos = (0..final_pos).find(|&p| {
            bracket
                .get(p)
                .map(|s| s.occupied && s.is_pending())
                .unwrap_or(false)
        })?;
        let sibling = bracket.sibling_of(pos)?;
        let slots = if pos < sibling {
            MatchSlots { a: pos, b: sibling }
        } else {
            MatchSlots { a: sibling, b: pos }
        };
        let sibling_occupied = bracket.get(sibling).map(|s| s.occupied).unwrap_or(false);
        if sibling_occupied {
            return Some(slots);
        }
        let side = if pos == slots.a { Side::A } else { Side::B };
        log::info!("Slot {} advances on a bye", pos);
        record_match_result(bracket, slots, side);
    }
}

/// Decide who won a generated battle.
///
/// The declared placeholder name wins; when it matches neither side the side
/// with the strictly higher final condition wins, and a draw goes to side A.
pub fn decide_winner(outcome: &BattleOutcome, placeholders: [&str; 2]) -> Side {
    let declared = outcome.winner.trim();
    if declared == placeholders[0] {
        return Side::A;
    }
    if declared == placeholders[1] {
        return Side::B;
    }
    let (a, b) = outcome
        .last_turn()
        .map(|t| (t.condition_a, t.condition_b))
        .unwrap_or((0, 0));
    if b > a {
        Side::B
    } else {
        Side::A
    }
}
