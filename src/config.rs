//! Game settings: generation models and prompts, tournament policy, playback timing.
//!
//! Every field has a default; a JSON file named by `CHATMON_SETTINGS` may
//! override any subset of them, and the API key/endpoint come from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_EMBEDDING_ENDPOINT: &str = "https://api.openai.com/v1/embeddings";

const BATTLE_SYSTEM_PROMPT: &str = "You are a live commentator for monster battles. \
Reply with a single JSON object only.";

const BATTLE_USER_PROMPT: &str = "Two monsters, {dummyName1} and {dummyName2}, fight to the finish.\n\
{dummyName1}: {monster1}\n\
{dummyName2}: {monster2}\n\
Narrate the battle in at most {max_turn} turns. Answer as JSON with keys \
StartTime, BattleLocation, Winner ({dummyName1} or {dummyName2}), ConclusionOfBattle and \
BattleSituation: an array of objects with Time, BattleCommentary, Monster1Condition (0-100), \
Monster2Condition (0-100) and BattleEffect (1-4).";

const DIGEST_SYSTEM_PROMPT: &str = "You are an editor who condenses creative writing.";

const DIGEST_USER_PROMPT: &str = "Rewrite the battle below as a JSON object {\"BattleSituation\": [...]} \
with exactly {count} entries in the same format. Keep the first turn unchanged. Do not change \
the winner and keep the ending decisive. Prefer the later turns where conditions change, avoid \
a condition dropping by 50 or more in a single turn, and keep the commentary's tone.\n{turns}";

const SUMMON_SYSTEM_PROMPT: &str = "You design monsters for a card battle game. \
Reply with a single JSON object only.";

const SUMMON_USER_PROMPT: &str = "Create a monster from the attached image. Answer as JSON with \
Name, HeightAndUnit, WeightAndUnit, Species, Elements (codes F W A E T I L D), Intelligence, \
Charm, Vitality, Agility, Attack, Defense, MagicAttack, MagicDefense (0-999), Skills, \
MagicSpells, flavorText, OverallScore and SpecialAbilityScore (0-999).";

/// Errors while reading the settings file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Settings file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A battle background, chosen by similarity to the generated location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldPreset {
    pub field_no: String,
    pub label: String,
    /// Embedding of `label`. Left empty, it is requested once on first use.
    #[serde(default)]
    pub embedding: Vec<f32>,
}

/// Prompt templates with `{dummyName1}`, `{dummyName2}`, `{monster1}`, `{monster2}`,
/// `{max_turn}`, `{count}` and `{turns}` placeholders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    pub battle_system: String,
    pub battle_user: String,
    pub digest_system: String,
    pub digest_user: String,
    pub summon_system: String,
    pub summon_user: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            battle_system: BATTLE_SYSTEM_PROMPT.to_string(),
            battle_user: BATTLE_USER_PROMPT.to_string(),
            digest_system: DIGEST_SYSTEM_PROMPT.to_string(),
            digest_user: DIGEST_USER_PROMPT.to_string(),
            summon_system: SUMMON_SYSTEM_PROMPT.to_string(),
            summon_user: SUMMON_USER_PROMPT.to_string(),
        }
    }
}

/// Cadences of battle playback, in milliseconds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackTiming {
    /// Ambient animation cadence while waiting for battle data.
    pub poll_interval_ms: u64,
    /// Typing delay per character.
    pub char_delay_ms: u64,
    /// Tick of the turn-gap counter.
    pub tick_ms: u64,
    /// Idle ticks between turns.
    pub gap_ticks: u32,
    /// Pause before the finishing cue when nobody was knocked out.
    pub finish_delay_ms: u64,
}

impl Default for PlaybackTiming {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            char_delay_ms: 100,
            tick_ms: 100,
            gap_ticks: 20,
            finish_delay_ms: 2000,
        }
    }
}

impl PlaybackTiming {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn char_delay(&self) -> Duration {
        Duration::from_millis(self.char_delay_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn finish_delay(&self) -> Duration {
        Duration::from_millis(self.finish_delay_ms)
    }
}

/// All tunable game behaviour.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameSettings {
    pub battle_model: String,
    pub summon_model: String,
    pub embedding_model: String,
    pub battle_max_tokens: u32,
    pub summon_max_tokens: u32,
    /// Upper bound on turns asked of the battle generator.
    pub max_turn_count: u32,
    /// Compress long battles to `digest_turn_count` turns.
    pub digest_enabled: bool,
    pub digest_turn_count: usize,
    /// Names standing in for the two real participants in prompts.
    pub placeholder_names: [String; 2],
    /// Clear both cards before each match so they are summoned again.
    pub card_reset_on_match: bool,
    pub max_attempts: u32,
    /// How long a retry question waits for an answer before counting as a decline.
    pub retry_answer_timeout_ms: u64,
    pub timing: PlaybackTiming,
    pub field_presets: Vec<FieldPreset>,
    pub prompts: PromptTemplates,
    pub storage_key: String,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            battle_model: "gpt-4o-mini".to_string(),
            summon_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            battle_max_tokens: 3000,
            summon_max_tokens: 1000,
            max_turn_count: 10,
            digest_enabled: false,
            digest_turn_count: 5,
            placeholder_names: ["MONSTER_ALPHA".to_string(), "MONSTER_BETA".to_string()],
            card_reset_on_match: false,
            max_attempts: 3,
            retry_answer_timeout_ms: 120_000,
            timing: PlaybackTiming::default(),
            field_presets: default_field_presets(),
            prompts: PromptTemplates::default(),
            storage_key: crate::persistence::DEFAULT_STORAGE_KEY.to_string(),
        }
    }
}

fn default_field_presets() -> Vec<FieldPreset> {
    ["grassland", "volcano", "ocean", "ruins", "sky"]
        .iter()
        .enumerate()
        .map(|(i, label)| FieldPreset {
            field_no: format!("{:02}", i + 1),
            label: (*label).to_string(),
            embedding: Vec::new(),
        })
        .collect()
}

impl GameSettings {
    /// Read a settings file; missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Settings from `CHATMON_SETTINGS` if set, defaults otherwise.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("CHATMON_SETTINGS") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim()),
            _ => Ok(Self::default()),
        }
    }

    pub fn retry_answer_timeout(&self) -> Duration {
        Duration::from_millis(self.retry_answer_timeout_ms)
    }

    pub fn placeholders(&self) -> [&str; 2] {
        [&self.placeholder_names[0], &self.placeholder_names[1]]
    }
}

/// Where and how to reach the generation service.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiSettings {
    pub api_key: String,
    pub chat_endpoint: String,
    pub embedding_endpoint: String,
    pub timeout: Duration,
}

impl ApiSettings {
    /// `OPENAI_API_KEY`, `OPENAI_ENDPOINT`, `OPENAI_EMBEDDING_ENDPOINT`.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            chat_endpoint: std::env::var("OPENAI_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_CHAT_ENDPOINT.to_string()),
            embedding_endpoint: std::env::var("OPENAI_EMBEDDING_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_EMBEDDING_ENDPOINT.to_string()),
            timeout: Duration::from_secs(120),
        }
    }
}
