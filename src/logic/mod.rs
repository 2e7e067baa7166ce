//! Tournament logic: bracket seeding and progression, battle generation, battle playback.

mod coordinator;
mod playback;
mod seeding;

pub use coordinator::{
    cosine_similarity, nearest_field, BattleRunStatus, CoordinatorError, MatchRequestCoordinator,
    SummonStatus,
};
pub use playback::{
    bar_length, BattlePlaybackController, EventLog, PlaybackError, PlaybackEvent, PlaybackPhase,
    PlaybackSink, SoundCue,
};
pub use seeding::{
    bit_reversed_order, decide_winner, is_tournament_complete, next_unplayed_match,
    place_bit_reversed, promote, promote_all_won, record_match_result, seed, seed_with_rng,
    slot_count_for, MatchSlots,
};
