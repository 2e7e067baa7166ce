//! Participant and the monster stats produced by the summon pipeline.

use serde::{Deserialize, Serialize};

/// Stable position of a participant in the roster.
pub type ParticipantIndex = usize;

/// Shown when a participant has no usable name yet.
pub const UNKNOWN_NAME: &str = "?????";

/// Display names longer than this many characters are cut and suffixed with `…`.
pub const DISPLAY_NAME_MAX_CHARS: usize = 10;

/// Names taken from uploaded file names are capped at this many characters.
pub const FILE_NAME_MAX_CHARS: usize = 40;

/// Elemental affinity codes as returned by the generation service.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Element {
    #[serde(rename = "F")]
    Fire,
    #[serde(rename = "W")]
    Water,
    #[serde(rename = "A")]
    Air,
    #[serde(rename = "E")]
    Earth,
    #[serde(rename = "T")]
    Thunder,
    #[serde(rename = "I")]
    Ice,
    #[serde(rename = "L")]
    Light,
    #[serde(rename = "D")]
    Darkness,
}

impl Element {
    pub fn label(self) -> &'static str {
        match self {
            Element::Fire => "fire",
            Element::Water => "water",
            Element::Air => "air",
            Element::Earth => "earth",
            Element::Thunder => "thunder",
            Element::Ice => "ice",
            Element::Light => "light",
            Element::Darkness => "darkness",
        }
    }
}

/// Stat block generated for an uploaded monster image.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MonsterStats {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub height_and_unit: String,
    #[serde(default)]
    pub weight_and_unit: String,
    #[serde(default)]
    pub species: String,
    #[serde(default)]
    pub elements: Vec<Element>,
    pub intelligence: u32,
    pub charm: u32,
    pub vitality: u32,
    pub agility: u32,
    pub attack: u32,
    pub defense: u32,
    pub magic_attack: u32,
    pub magic_defense: u32,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub magic_spells: Vec<String>,
    #[serde(default, rename = "flavorText")]
    pub flavor_text: String,
    #[serde(default)]
    pub overall_score: u32,
    #[serde(default)]
    pub special_ability_score: u32,
}

impl MonsterStats {
    /// Star rating from 1 to 10, weighting raw stats against the generator's own scores.
    pub fn stars(&self) -> u8 {
        let raw = [
            self.intelligence,
            self.charm,
            self.attack,
            self.defense,
            self.magic_attack,
            self.magic_defense,
            self.agility,
        ];
        let mean = raw.iter().map(|&v| f64::from(v)).sum::<f64>() / raw.len() as f64;
        let special = (f64::from(self.overall_score) + f64::from(self.special_ability_score)) / 2.0;
        let blended = (mean + special) / 2.0;
        let ratio = (blended * blended) / (999.0 * 999.0);
        (ratio * 10.0).ceil().clamp(1.0, 10.0) as u8
    }

    /// JSON stat block sent to the battle generator under an anonymised name.
    pub fn to_prompt_json(&self, placeholder: &str) -> serde_json::Value {
        let elements: Vec<&str> = self.elements.iter().map(|e| e.label()).collect();
        let description = if self.name.trim().is_empty() {
            self.flavor_text.clone()
        } else {
            self.flavor_text.replace(self.name.trim(), placeholder)
        };
        serde_json::json!({
            "name": placeholder,
            "height": self.height_and_unit,
            "weight": self.weight_and_unit,
            "species": self.species,
            "elements": elements,
            "intelligence": self.intelligence,
            "charm": self.charm,
            "vitality": self.vitality,
            "agility": self.agility,
            "attack": self.attack,
            "defense": self.defense,
            "magic_attack": self.magic_attack,
            "magic_defense": self.magic_defense,
            "skills": self.skills,
            "magic_spells": self.magic_spells,
            "description": description,
        })
    }
}

/// Card frame for a star rating: 3 for 9+, 2 for 7+, 1 otherwise.
pub fn frame_for_stars(stars: u8) -> u8 {
    match stars {
        9..=u8::MAX => 3,
        7..=8 => 2,
        _ => 1,
    }
}

/// A contestant in the tournament.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub index: ParticipantIndex,
    /// User-supplied or generated name; may be empty before summoning.
    pub name: Option<String>,
    /// Opaque reference to the uploaded image.
    pub image: Option<String>,
    pub stats: Option<MonsterStats>,
    pub stars: Option<u8>,
    pub frame_no: Option<u8>,
    /// Opaque reference to the finalised card asset.
    pub card_asset: Option<String>,
}

impl Participant {
    pub fn new(index: ParticipantIndex, name: Option<String>, image: Option<String>) -> Self {
        Self {
            index,
            name: name.filter(|n| !n.trim().is_empty()),
            image,
            ..Self::default()
        }
    }

    /// Name for bracket display: placeholder when unset, truncated when long.
    pub fn display_name(&self) -> String {
        let name = match self.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n,
            _ => return UNKNOWN_NAME.to_string(),
        };
        if name.chars().count() > DISPLAY_NAME_MAX_CHARS {
            let mut cut: String = name.chars().take(DISPLAY_NAME_MAX_CHARS).collect();
            cut.push('…');
            cut
        } else {
            name.to_string()
        }
    }

    /// Full name for narration; falls back to the placeholder.
    pub fn spoken_name(&self) -> &str {
        match self.name.as_deref() {
            Some(n) if !n.trim().is_empty() => n,
            _ => UNKNOWN_NAME,
        }
    }

    /// Stats generated and card finalised: eligible for battle generation.
    pub fn is_ready(&self) -> bool {
        self.stats.is_some() && self.card_asset.is_some()
    }

    /// Apply a freshly generated stat block. A user-supplied name wins over the
    /// generated one, and the flavor text is rewritten to use it.
    pub fn apply_summon(&mut self, mut stats: MonsterStats, card_asset: String) {
        match self.name.clone() {
            Some(own) if !stats.name.is_empty() && stats.name != own => {
                stats.flavor_text = stats.flavor_text.replace(&stats.name, &own);
                stats.name = own;
            }
            Some(own) => stats.name = own,
            None => {
                if !stats.name.trim().is_empty() {
                    self.name = Some(stats.name.clone());
                }
            }
        }
        let stars = stats.stars();
        self.stars = Some(stars);
        self.frame_no = Some(frame_for_stars(stars));
        self.stats = Some(stats);
        self.card_asset = Some(card_asset);
    }

    /// Forget the generated card so the participant is summoned again.
    pub fn reset_card(&mut self) {
        self.frame_no = None;
        self.card_asset = None;
    }

    /// Line announced when the summon completes.
    pub fn summon_voice_line(&self) -> String {
        let stars = self.stars.unwrap_or(1);
        let Some(s) = &self.stats else {
            return format!("A {stars}-star monster has been summoned.");
        };
        if stars >= 9 {
            "A monster of the strongest class has been summoned.".to_string()
        } else if stars >= 7 {
            "A very strong monster has been summoned.".to_string()
        } else if s.attack >= 500 && s.attack > s.magic_attack {
            "A monster skilled in attack has been summoned.".to_string()
        } else if s.magic_attack >= 500 {
            "A monster of great magical power has been summoned.".to_string()
        } else if s.defense >= 400 && s.magic_defense >= 400 {
            "A monster with high defense has been summoned.".to_string()
        } else if s.charm >= 800 {
            "An extremely charming monster has been summoned.".to_string()
        } else {
            format!("A {stars}-star monster has been summoned.")
        }
    }
}

/// Participant name encoded in an upload's file name: the part after the last
/// `_`, extension removed. No underscore means no name.
pub fn name_from_file_name(file_name: &str) -> String {
    let stem = match file_name.rfind('.') {
        Some(dot) if dot > 0 => &file_name[..dot],
        _ => file_name,
    };
    let name = match stem.rsplit_once('_') {
        Some((_, tail)) => tail,
        None => "",
    };
    name.chars().take(FILE_NAME_MAX_CHARS).collect()
}
