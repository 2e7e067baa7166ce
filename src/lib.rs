//! Monster battle tournament: library with models, tournament logic, generation
//! services and persistence. The `web` binary serves it over HTTP.

pub mod config;
pub mod logic;
pub mod models;
pub mod persistence;
pub mod services;
pub mod session;

pub use config::{ApiSettings, GameSettings, PlaybackTiming};
pub use logic::{
    seed, BattlePlaybackController, BattleRunStatus, EventLog, MatchRequestCoordinator,
    MatchSlots, PlaybackError, PlaybackPhase, SummonStatus,
};
pub use models::{
    BattleOutcome, BracketError, BracketSlot, BracketState, Participant, ParticipantIndex, Side,
    SlotResult, TurnRecord,
};
pub use persistence::{FileStore, KeyValueStore, MemoryStore, PersistenceGateway, Snapshot};
pub use session::{BattleData, Conclusion, Session};
