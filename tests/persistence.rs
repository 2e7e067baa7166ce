//! Integration tests for snapshot storage and restoring a session from it.

use chatmon_tournament::logic::{record_match_result, MatchSlots};
use chatmon_tournament::persistence::PersistenceError;
use chatmon_tournament::{
    BracketState, FileStore, MemoryStore, Participant, PersistenceGateway, Session, Side, Snapshot,
};
use std::sync::Arc;

fn roster(names: &[&str]) -> Vec<Participant> {
    names
        .iter()
        .enumerate()
        .map(|(i, n)| Participant::new(i, Some(n.to_string()), Some(format!("img://{n}"))))
        .collect()
}

fn temp_dir(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("chatmon-test-{}-{}", tag, std::process::id()))
}

#[tokio::test]
async fn snapshot_round_trips_through_memory() {
    let session = Session::new();
    session.replace_roster(roster(&["Pyro", "Aqua", "Volt"])).unwrap();
    let gateway = PersistenceGateway::new(Box::new(MemoryStore::new()), "chatmon");

    assert!(!gateway.exists().await.unwrap());
    gateway.save(&session.snapshot()).await.unwrap();
    assert!(gateway.exists().await.unwrap());

    let loaded = gateway.load_required().await.unwrap();
    assert!(loaded.saved_at.is_some());
    let original = session.snapshot();
    assert_eq!(loaded.monsters_data, original.monsters_data);
    assert_eq!(loaded.tournament_data, original.tournament_data);

    gateway.remove().await.unwrap();
    assert!(gateway.load().await.unwrap().is_none());
    assert!(matches!(
        gateway.load_required().await,
        Err(PersistenceError::NotFound)
    ));
}

#[tokio::test]
async fn file_store_persists_between_gateways() {
    let dir = temp_dir("file");
    let snapshot = Snapshot::new(
        roster(&["Pyro", "Aqua"]),
        BracketState::from_leaves(&[Some(1), Some(0)]).unwrap().into_slots(),
    );
    PersistenceGateway::new(Box::new(FileStore::new(&dir)), "chatmon")
        .save(&snapshot)
        .await
        .unwrap();

    let reopened = PersistenceGateway::new(Box::new(FileStore::new(&dir)), "chatmon");
    let loaded = reopened.load_required().await.unwrap();
    assert_eq!(loaded.tournament_data, snapshot.tournament_data);
    assert_eq!(loaded.monsters_data, snapshot.monsters_data);

    reopened.remove().await.unwrap();
    assert!(!reopened.exists().await.unwrap());
    // Removing twice is fine.
    reopened.remove().await.unwrap();
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn file_store_rejects_path_like_keys() {
    let gateway = PersistenceGateway::new(Box::new(FileStore::new(temp_dir("keys"))), "../escape");
    assert!(matches!(
        gateway.load().await,
        Err(PersistenceError::InvalidKey(_))
    ));
}

#[test]
fn snapshot_uses_the_stored_field_names() {
    let snapshot = Snapshot::new(roster(&["Pyro"]), Vec::new());
    let json = serde_json::to_value(&snapshot).unwrap();
    assert!(json.get("monstersData").is_some());
    assert!(json.get("tournamentData").is_some());
    assert!(json.get("savedAt").is_none());
}

#[test]
fn restore_reapplies_wins_and_names() {
    let session = Arc::new(Session::new());
    session.replace_roster(roster(&["Pyro", "Aqua"])).unwrap();

    let mut snapshot = session.snapshot();
    let mut bracket = BracketState::from_slots(snapshot.tournament_data.clone()).unwrap();
    record_match_result(&mut bracket, MatchSlots { a: 0, b: 1 }, Side::B);
    let mut slots = bracket.into_slots();
    // An older save may hold the win without the promotion.
    slots[2] = Default::default();
    slots[2].level = 1;
    snapshot.tournament_data = slots;
    snapshot.monsters_data[0].name = Some("Renamed".to_string());

    let restored = Session::new();
    restored.restore(snapshot.clone()).unwrap();
    let bracket = restored.bracket();
    let champion = bracket.champion().unwrap();
    assert_eq!(Some(champion), snapshot.tournament_data[1].participant);
    assert!(restored.is_tournament_complete());
    assert!(bracket
        .slots()
        .iter()
        .filter(|s| s.participant == Some(0))
        .all(|s| s.name.as_deref() == Some("Renamed")));
}

#[test]
fn restore_rejects_a_corrupt_bracket() {
    let mut snapshot = Snapshot::new(roster(&["Pyro", "Aqua"]), Vec::new());
    snapshot.tournament_data = BracketState::from_leaves(&[Some(0), Some(1)])
        .unwrap()
        .into_slots();
    snapshot.tournament_data.pop();
    assert!(Session::new().restore(snapshot).is_err());
}
