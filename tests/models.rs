//! Integration tests for participants and generated battle outcomes.

use chatmon_tournament::models::{
    frame_for_stars, name_from_file_name, restore_names, sanitize_commentary, BattleOutcome,
    MonsterStats, OutcomeError, Participant, UNKNOWN_NAME,
};

const PLACEHOLDERS: [&str; 2] = ["MONSTER_ALPHA", "MONSTER_BETA"];

fn stats(name: &str, level: u32) -> MonsterStats {
    MonsterStats {
        name: name.to_string(),
        intelligence: level,
        charm: level,
        vitality: level,
        agility: level,
        attack: level,
        defense: level,
        magic_attack: level,
        magic_defense: level,
        overall_score: level,
        special_ability_score: level,
        flavor_text: format!("{name} guards the old forest."),
        ..MonsterStats::default()
    }
}

#[test]
fn outcome_parses_loose_numbers_and_clamps_gauges() {
    let text = r#"{
        "StartTime": "Midnight",
        "BattleLocation": "Frozen lake",
        "Winner": "MONSTER_ALPHA",
        "ConclusionOfBattle": "MONSTER_ALPHA stands alone.",
        "BattleSituation": [
            {"Time": "0:01", "BattleCommentary": "Go!", "Monster1Condition": "85%", "Monster2Condition": 150, "BattleEffect": "3"},
            {"Time": "0:02", "BattleCommentary": "Ouch", "Monster1Condition": 40, "Monster2Condition": -5, "BattleEffect": 9}
        ]
    }"#;
    let outcome = BattleOutcome::from_json_str(text).unwrap();
    assert_eq!(outcome.winner, "MONSTER_ALPHA");
    assert_eq!(outcome.location, "Frozen lake");
    assert_eq!(outcome.turns.len(), 2);
    assert_eq!(outcome.turns[0].condition_a, 85);
    assert_eq!(outcome.turns[0].condition_b, 100);
    assert_eq!(outcome.turns[0].effect, Some(3));
    assert_eq!(outcome.turns[1].condition_b, 0);
    assert_eq!(outcome.turns[1].effect, None);
    assert_eq!(outcome.last_turn().unwrap().condition_a, 40);
}

#[test]
fn outcome_requires_winner_and_turns() {
    assert_eq!(
        BattleOutcome::from_json_str(r#"{"BattleSituation": [{"Time": "1"}]}"#),
        Err(OutcomeError::MissingField("Winner"))
    );
    assert_eq!(
        BattleOutcome::from_json_str(r#"{"Winner": "MONSTER_BETA", "BattleSituation": []}"#),
        Err(OutcomeError::NoTurns)
    );
    assert!(matches!(
        BattleOutcome::from_json_str("not json"),
        Err(OutcomeError::Json(_))
    ));
}

#[test]
fn commentary_names_are_restored() {
    let line = sanitize_commentary("Monster1 strikes\nMONSTER_BETA!", PLACEHOLDERS);
    assert_eq!(line, "MONSTER_ALPHA strikesMONSTER_BETA!");
    assert_eq!(
        restore_names(&line, PLACEHOLDERS, ["Pyro", "Aqua"], true),
        "\u{201c}Pyro\u{201d} strikes\u{201c}Aqua\u{201d}!"
    );
    assert_eq!(
        restore_names("MONSTER_BETA wins", PLACEHOLDERS, ["Pyro", "Aqua"], false),
        "Aqua wins"
    );
}

#[test]
fn display_name_falls_back_and_truncates() {
    assert_eq!(Participant::new(0, None, None).display_name(), UNKNOWN_NAME);
    assert_eq!(
        Participant::new(0, Some("  ".to_string()), None).display_name(),
        UNKNOWN_NAME
    );
    assert_eq!(
        Participant::new(0, Some("Abcdefghijklmn".to_string()), None).display_name(),
        "Abcdefghij…"
    );
    assert_eq!(
        Participant::new(0, Some("Pyro".to_string()), None).display_name(),
        "Pyro"
    );
}

#[test]
fn name_comes_from_the_last_underscore_of_the_file_name() {
    assert_eq!(name_from_file_name("upload_01_Pyro.png"), "Pyro");
    assert_eq!(name_from_file_name("photo.jpg"), "");
    assert_eq!(name_from_file_name("x_Aqua"), "Aqua");
}

#[test]
fn summon_keeps_the_uploaded_name() {
    let mut p = Participant::new(3, Some("Pyro".to_string()), Some("img://pyro".to_string()));
    assert!(!p.is_ready());
    p.apply_summon(stats("Blazewing", 999), "img://pyro".to_string());

    assert!(p.is_ready());
    let s = p.stats.as_ref().unwrap();
    assert_eq!(s.name, "Pyro");
    assert_eq!(s.flavor_text, "Pyro guards the old forest.");
    assert_eq!(p.stars, Some(10));
    assert_eq!(p.frame_no, Some(3));

    p.reset_card();
    assert!(!p.is_ready());
}

#[test]
fn summon_names_an_unnamed_participant() {
    let mut p = Participant::new(0, None, Some("img://x".to_string()));
    p.apply_summon(stats("Mossback", 100), "img://x".to_string());
    assert_eq!(p.name.as_deref(), Some("Mossback"));
    assert_eq!(p.stars, Some(1));
    assert_eq!(p.frame_no, Some(1));
}

#[test]
fn frames_follow_star_thresholds() {
    assert_eq!(frame_for_stars(10), 3);
    assert_eq!(frame_for_stars(9), 3);
    assert_eq!(frame_for_stars(8), 2);
    assert_eq!(frame_for_stars(7), 2);
    assert_eq!(frame_for_stars(6), 1);
    assert_eq!(frame_for_stars(1), 1);
}

#[test]
fn stats_parse_from_generator_json() {
    let text = r#"{"Name": "Volt", "Elements": ["T", "A"], "Intelligence": 500, "Charm": 400,
        "Vitality": 300, "Agility": 700, "Attack": 650, "Defense": 200, "MagicAttack": 100,
        "MagicDefense": 150, "flavorText": "Fast.", "OverallScore": 600, "SpecialAbilityScore": 500}"#;
    let s: MonsterStats = serde_json::from_str(text).unwrap();
    assert_eq!(s.name, "Volt");
    assert_eq!(s.elements.len(), 2);
    assert_eq!(s.flavor_text, "Fast.");
    let prompt = s.to_prompt_json("MONSTER_ALPHA");
    assert_eq!(prompt["name"], "MONSTER_ALPHA");
    assert_eq!(prompt["elements"][0], "thunder");
}
