//! BattleOutcome and TurnRecord, plus validation of the generator's raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Highest value of a condition gauge.
pub const GAUGE_MAX: u8 = 100;

/// Number of distinct field effects a turn can select.
pub const EFFECT_COUNT: u8 = 4;

/// Rejections raised while turning generator JSON into domain records.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum OutcomeError {
    #[error("Response is not valid JSON: {0}")]
    Json(String),
    #[error("Battle has no turns")]
    NoTurns,
    #[error("Battle is missing field {0}")]
    MissingField(&'static str),
}

/// One revealed step of a battle.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    /// In-world time label shown above the commentary.
    pub time: String,
    pub commentary: String,
    /// Condition of side A, 0 to 100.
    pub condition_a: u8,
    /// Condition of side B, 0 to 100.
    pub condition_b: u8,
    /// Field effect 1 to 4, `None` picks one at random.
    pub effect: Option<u8>,
}

/// Everything needed to play one battle back.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BattleOutcome {
    pub start_time: String,
    pub location: String,
    /// One of the two placeholder names, or free text the tie-break has to handle.
    pub winner: String,
    pub conclusion: String,
    pub turns: Vec<TurnRecord>,
}

impl BattleOutcome {
    /// Parse and validate the generator's JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, OutcomeError> {
        let raw: RawOutcome =
            serde_json::from_str(text).map_err(|e| OutcomeError::Json(e.to_string()))?;
        raw.into_outcome()
    }

    pub fn last_turn(&self) -> Option<&TurnRecord> {
        self.turns.last()
    }
}

/// Wire shape of a battle as produced by the generator.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RawOutcome {
    #[serde(default)]
    pub start_time: Option<Value>,
    #[serde(default)]
    pub battle_location: Option<Value>,
    #[serde(default)]
    pub winner: Option<Value>,
    #[serde(default)]
    pub conclusion_of_battle: Option<Value>,
    #[serde(default)]
    pub battle_situation: Option<Vec<RawTurn>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RawTurn {
    #[serde(default)]
    pub time: Option<Value>,
    #[serde(default)]
    pub battle_commentary: Option<Value>,
    #[serde(default)]
    pub monster1_condition: Option<Value>,
    #[serde(default)]
    pub monster2_condition: Option<Value>,
    #[serde(default)]
    pub battle_effect: Option<Value>,
}

impl RawOutcome {
    pub(crate) fn into_outcome(self) -> Result<BattleOutcome, OutcomeError> {
        let winner = text_of(self.winner.as_ref()).ok_or(OutcomeError::MissingField("Winner"))?;
        let turns = validate_turns(self.battle_situation.unwrap_or_default())?;
        Ok(BattleOutcome {
            start_time: text_of(self.start_time.as_ref()).unwrap_or_default(),
            location: text_of(self.battle_location.as_ref()).unwrap_or_default(),
            winner: winner.trim().to_string(),
            conclusion: text_of(self.conclusion_of_battle.as_ref()).unwrap_or_default(),
            turns,
        })
    }
}

impl RawTurn {
    pub(crate) fn from_record(turn: &TurnRecord) -> Self {
        Self {
            time: Some(Value::from(turn.time.clone())),
            battle_commentary: Some(Value::from(turn.commentary.clone())),
            monster1_condition: Some(Value::from(turn.condition_a)),
            monster2_condition: Some(Value::from(turn.condition_b)),
            battle_effect: turn.effect.map(Value::from),
        }
    }

    fn into_record(self) -> TurnRecord {
        TurnRecord {
            time: text_of(self.time.as_ref()).unwrap_or_default(),
            commentary: text_of(self.battle_commentary.as_ref()).unwrap_or_default(),
            condition_a: gauge_of(self.monster1_condition.as_ref()),
            condition_b: gauge_of(self.monster2_condition.as_ref()),
            effect: effect_of(self.battle_effect.as_ref()),
        }
    }
}

pub(crate) fn validate_turns(raw: Vec<RawTurn>) -> Result<Vec<TurnRecord>, OutcomeError> {
    if raw.is_empty() {
        return Err(OutcomeError::NoTurns);
    }
    Ok(raw.into_iter().map(RawTurn::into_record).collect())
}

fn text_of(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// First run of decimal digits in a string, or the number itself.
fn number_of(v: Option<&Value>) -> Option<i64> {
    match v? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let digits: String = s
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            let value: i64 = digits.parse().ok()?;
            if s.trim_start().starts_with('-') {
                Some(-value)
            } else {
                Some(value)
            }
        }
        _ => None,
    }
}

fn gauge_of(v: Option<&Value>) -> u8 {
    number_of(v).unwrap_or(0).clamp(0, i64::from(GAUGE_MAX)) as u8
}

fn effect_of(v: Option<&Value>) -> Option<u8> {
    number_of(v)
        .filter(|n| (1..=i64::from(EFFECT_COUNT)).contains(n))
        .map(|n| n as u8)
}

/// Strip line breaks and stray English labels from a commentary line.
pub fn sanitize_commentary(text: &str, placeholders: [&str; 2]) -> String {
    text.replace(['\r', '\n'], "")
        .replace("Monster1", placeholders[0])
        .replace("Monster 1", placeholders[0])
        .replace("Monster2", placeholders[1])
        .replace("Monster 2", placeholders[1])
}

/// Swap placeholder names back to the real participant names.
pub fn restore_names(text: &str, placeholders: [&str; 2], names: [&str; 2], quoted: bool) -> String {
    let mut out = text.to_string();
    for (placeholder, name) in placeholders.iter().zip(names) {
        let replacement = if quoted {
            format!("\u{201c}{name}\u{201d}")
        } else {
            name.to_string()
        };
        out = out.replace(placeholder, &replacement);
    }
    out
}
