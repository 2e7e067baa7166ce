//! BracketSlot, SlotResult and the flat BracketState.

use crate::models::participant::{Participant, ParticipantIndex};
use serde::{Deserialize, Serialize};

/// Largest supported bracket (leaf slots).
pub const MAX_BRACKET_SIZE: usize = 16;

/// Errors raised while building or restoring a bracket.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum BracketError {
    #[error("Need at least 1 participant to seed a bracket")]
    EmptyRoster,
    #[error("At most {max} participants are supported (got {count})")]
    TooManyParticipants { count: usize, max: usize },
    #[error("Leaf count {0} is not a power of two between 2 and 16")]
    InvalidSlotCount(usize),
    #[error("Participant {0} appears more than once")]
    DuplicateParticipant(ParticipantIndex),
    #[error("Stored bracket is inconsistent: {0}")]
    Inconsistent(String),
}

/// Outcome recorded on a slot.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotResult {
    #[default]
    Pending,
    Won,
    Lost,
}

/// Which of the two sides of a match.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// One node of the elimination tree.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BracketSlot {
    /// Round, 0 for the opening round.
    pub level: u32,
    /// Position within the level.
    pub index: usize,
    pub participant: Option<ParticipantIndex>,
    /// Display name copied from the roster.
    pub name: Option<String>,
    pub occupied: bool,
    pub result: SlotResult,
    /// Lost its match and was knocked out of the tree.
    #[serde(default)]
    pub defeated: bool,
}

impl BracketSlot {
    fn empty(level: u32, index: usize) -> Self {
        Self {
            level,
            index,
            ..Self::default()
        }
    }

    pub fn is_pending(&self) -> bool {
        self.result == SlotResult::Pending
    }
}

/// Flat list of every slot: leaves first, then each following level.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BracketState {
    slots: Vec<BracketSlot>,
}

impl BracketState {
    /// Empty tree with `slot_count` leaves.
    pub fn with_slot_count(slot_count: usize) -> Result<Self, BracketError> {
        if !slot_count.is_power_of_two() || !(2..=MAX_BRACKET_SIZE).contains(&slot_count) {
            return Err(BracketError::InvalidSlotCount(slot_count));
        }
        let mut slots = Vec::with_capacity(slot_count * 2 - 1);
        let mut width = slot_count;
        let mut level = 0;
        while width >= 1 {
            slots.extend((0..width).map(|i| BracketSlot::empty(level, i)));
            if width == 1 {
                break;
            }
            width /= 2;
            level += 1;
        }
        Ok(Self { slots })
    }

    /// Tree whose leaves hold the given participants (`None` is a bye).
    pub fn from_leaves(leaves: &[Option<ParticipantIndex>]) -> Result<Self, BracketError> {
        let mut state = Self::with_slot_count(leaves.len())?;
        let mut seen = Vec::new();
        for (slot, leaf) in state.slots.iter_mut().zip(leaves) {
            if let Some(p) = *leaf {
                if seen.contains(&p) {
                    return Err(BracketError::DuplicateParticipant(p));
                }
                seen.push(p);
                slot.participant = Some(p);
                slot.occupied = true;
            }
        }
        Ok(state)
    }

    /// Rebuild from a persisted flat slot list, checking the level/index partition.
    pub fn from_slots(slots: Vec<BracketSlot>) -> Result<Self, BracketError> {
        if slots.is_empty() {
            return Ok(Self::default());
        }
        let leaves = (slots.len() + 1) / 2;
        let expected = Self::with_slot_count(leaves)
            .map_err(|_| BracketError::Inconsistent(format!("{} slots", slots.len())))?;
        if expected.slots.len() != slots.len() {
            return Err(BracketError::Inconsistent(format!("{} slots", slots.len())));
        }
        for (want, got) in expected.slots.iter().zip(&slots) {
            if want.level != got.level || want.index != got.index {
                return Err(BracketError::Inconsistent(format!(
                    "slot at level {} index {} out of place",
                    got.level, got.index
                )));
            }
        }
        Ok(Self { slots })
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Leaf slots (first-round positions).
    pub fn slot_count(&self) -> usize {
        (self.slots.len() + 1) / 2
    }

    /// Number of rounds including the final slot.
    pub fn level_count(&self) -> u32 {
        if self.slots.is_empty() {
            0
        } else {
            self.slot_count().trailing_zeros() + 1
        }
    }

    pub fn final_level(&self) -> u32 {
        self.level_count().saturating_sub(1)
    }

    /// Slots at `level`.
    pub fn width(&self, level: u32) -> usize {
        self.slot_count() >> level
    }

    /// Global position of (level, index).
    pub fn position(&self, level: u32, index: usize) -> Option<usize> {
        if level > self.final_level() || index >= self.width(level) {
            return None;
        }
        let offset: usize = (0..level).map(|l| self.width(l)).sum();
        Some(offset + index)
    }

    /// Global position of the other slot in the same match.
    pub fn sibling_of(&self, pos: usize) -> Option<usize> {
        let slot = self.slots.get(pos)?;
        if slot.level == self.final_level() {
            return None;
        }
        self.position(slot.level, slot.index ^ 1)
    }

    /// Global position of the slot a winner moves up into.
    pub fn parent_of(&self, pos: usize) -> Option<usize> {
        let slot = self.slots.get(pos)?;
        if slot.level >= self.final_level() {
            return None;
        }
        self.position(slot.level + 1, slot.index / 2)
    }

    pub fn final_position(&self) -> Option<usize> {
        self.slots.len().checked_sub(1)
    }

    pub fn get(&self, pos: usize) -> Option<&BracketSlot> {
        self.slots.get(pos)
    }

    pub(crate) fn get_mut(&mut self, pos: usize) -> Option<&mut BracketSlot> {
        self.slots.get_mut(pos)
    }

    pub fn slots(&self) -> &[BracketSlot] {
        &self.slots
    }

    pub fn into_slots(self) -> Vec<BracketSlot> {
        self.slots
    }

    /// Participant occupying the final slot, once decided.
    pub fn champion(&self) -> Option<ParticipantIndex> {
        let last = self.slots.last()?;
        if last.occupied {
            last.participant
        } else {
            None
        }
    }

    /// Occupied slots below the final still waiting for their match.
    pub fn pending_slot_count(&self) -> usize {
        let final_pos = self.final_position();
        self.slots
            .iter()
            .enumerate()
            .filter(|&(pos, s)| Some(pos) != final_pos && s.occupied && s.is_pending())
            .count()
    }

    /// Re-copy display names from the roster (names may have been generated since seeding).
    pub fn refresh_names(&mut self, roster: &[Participant]) {
        for slot in &mut self.slots {
            if let Some(p) = slot.participant.and_then(|i| roster.get(i)) {
                slot.name = Some(p.display_name());
            }
        }
    }
}
