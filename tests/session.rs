//! Integration tests for the session: roster replacement, match flow and request guards.

use chatmon_tournament::models::{BracketError, MonsterStats};
use chatmon_tournament::{BattleData, Participant, Session, Side};

fn summoned(i: usize, name: &str) -> Participant {
    let mut p = Participant::new(i, Some(name.to_string()), Some(format!("img://{name}")));
    p.apply_summon(MonsterStats::default(), format!("card://{name}"));
    p
}

#[test]
fn replace_roster_reindexes_and_seeds() {
    let session = Session::new();
    session
        .replace_roster(vec![summoned(7, "Pyro"), summoned(7, "Aqua"), summoned(7, "Volt")])
        .unwrap();
    let roster = session.roster();
    assert_eq!(roster.iter().map(|p| p.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    let bracket = session.bracket();
    assert_eq!(bracket.slot_count(), 4);
    assert!(bracket
        .slots()
        .iter()
        .filter(|s| s.occupied)
        .all(|s| s.name.is_some()));
}

#[test]
fn replace_roster_rejects_oversized_batches() {
    let session = Session::new();
    let roster: Vec<Participant> = (0..17).map(|i| Participant::new(i, None, None)).collect();
    assert_eq!(
        session.replace_roster(roster),
        Err(BracketError::TooManyParticipants { count: 17, max: 16 })
    );
    assert!(session.roster().is_empty());
}

#[test]
fn matches_advance_until_a_champion_is_crowned() {
    let session = Session::new();
    session
        .replace_roster(vec![summoned(0, "Pyro"), summoned(1, "Aqua"), summoned(2, "Volt")])
        .unwrap();

    let mut played = 0;
    while let Some(active) = session.begin_next_match(false) {
        assert_ne!(active.participants[0], active.participants[1]);
        let conclusion = session.conclude_active_match(Side::A).unwrap();
        assert_eq!(conclusion.winner, active.participants[0]);
        played += 1;
        assert!(played <= 2, "three participants need two matches");
    }
    assert_eq!(played, 2);
    assert!(session.is_tournament_complete());
    assert!(session.champion().is_some());
    assert!(session.conclude_active_match(Side::A).is_none());
}

#[test]
fn next_match_can_reset_cards() {
    let session = Session::new();
    session
        .replace_roster(vec![summoned(0, "Pyro"), summoned(1, "Aqua")])
        .unwrap();
    let active = session.begin_next_match(true).unwrap();
    for i in active.participants {
        let p = session.participant(i).unwrap();
        assert!(!p.is_ready());
        assert!(p.stats.is_some());
    }
}

#[test]
fn request_guard_allows_one_request_per_match() {
    let session = Session::new();
    session
        .replace_roster(vec![summoned(0, "Pyro"), summoned(1, "Aqua")])
        .unwrap();
    session.begin_next_match(false).unwrap();

    assert!(session.try_begin_request());
    assert!(!session.try_begin_request());
    assert!(session.is_busy());
    session.finish_request(false);
    assert!(!session.is_busy());

    assert!(session.try_begin_request());
    session.finish_request(true);
    assert!(!session.try_begin_request());
    assert!(session.request_state().requested);
}

#[test]
fn new_match_clears_battle_state() {
    let session = Session::new();
    session
        .replace_roster(vec![
            summoned(0, "Pyro"),
            summoned(1, "Aqua"),
            summoned(2, "Volt"),
            summoned(3, "Gale"),
        ])
        .unwrap();
    session.begin_next_match(false).unwrap();
    assert!(session.try_begin_request());
    session.publish_battle(BattleData::Generating);
    session.finish_request(true);
    session.conclude_active_match(Side::B).unwrap();

    session.begin_next_match(false).unwrap();
    assert!(matches!(session.battle_data(), BattleData::Empty));
    assert_eq!(session.request_state(), Default::default());
}

#[test]
fn summon_flag_is_exclusive() {
    let session = Session::new();
    assert!(session.try_begin_summon());
    assert!(!session.try_begin_summon());
    assert!(session.is_busy());
    session.finish_summon();
    assert!(session.try_begin_summon());
}
