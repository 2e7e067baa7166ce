//! Data structures for the monster tournament: participants, bracket slots, battle outcomes.

mod bracket;
mod outcome;
mod participant;

pub use bracket::{BracketError, BracketSlot, BracketState, Side, SlotResult, MAX_BRACKET_SIZE};
pub use outcome::{
    restore_names, sanitize_commentary, BattleOutcome, OutcomeError, TurnRecord, EFFECT_COUNT,
    GAUGE_MAX,
};
pub(crate) use outcome::{validate_turns, RawTurn};
pub use participant::{
    frame_for_stars, name_from_file_name, Element, MonsterStats, Participant, ParticipantIndex,
    UNKNOWN_NAME,
};
