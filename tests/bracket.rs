//! Integration tests for the bracket: seeding, promotion, byes and completion.

use chatmon_tournament::logic::{
    bit_reversed_order, decide_winner, is_tournament_complete, next_unplayed_match,
    place_bit_reversed, promote, promote_all_won, record_match_result, seed, seed_with_rng,
    slot_count_for, MatchSlots,
};
use chatmon_tournament::models::{
    BattleOutcome, BracketError, BracketState, Side, SlotResult, TurnRecord, MAX_BRACKET_SIZE,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

const PLACEHOLDERS: [&str; 2] = ["MONSTER_ALPHA", "MONSTER_BETA"];

fn four_leaves() -> BracketState {
    BracketState::from_leaves(&[Some(0), Some(1), Some(2), Some(3)]).unwrap()
}

fn outcome(winner: &str, last: (u8, u8)) -> BattleOutcome {
    BattleOutcome {
        start_time: "Dawn".to_string(),
        location: "Volcano rim".to_string(),
        winner: winner.to_string(),
        conclusion: "It is over.".to_string(),
        turns: vec![TurnRecord {
            time: "00:01".to_string(),
            commentary: "Clash!".to_string(),
            condition_a: last.0,
            condition_b: last.1,
            effect: None,
        }],
    }
}

#[test]
fn seed_places_every_participant_once_for_all_sizes() {
    for n in 1..=MAX_BRACKET_SIZE {
        let indices: Vec<usize> = (0..n).collect();
        let bracket = seed(&indices).unwrap();
        let slot_count = slot_count_for(n);
        assert_eq!(bracket.slot_count(), slot_count, "n = {n}");
        assert_eq!(bracket.len(), slot_count * 2 - 1, "n = {n}");

        let mut placed: Vec<usize> = bracket.slots()[..slot_count]
            .iter()
            .filter(|s| s.occupied)
            .map(|s| s.participant.unwrap())
            .collect();
        placed.sort_unstable();
        assert_eq!(placed, indices, "n = {n}");

        let byes = bracket.slots()[..slot_count].iter().filter(|s| !s.occupied).count();
        assert_eq!(byes, slot_count - n, "n = {n}");
        assert!(bracket.slots()[slot_count..].iter().all(|s| !s.occupied));
    }
}

#[test]
fn slot_count_is_next_power_of_two_with_minimum_two() {
    assert_eq!(slot_count_for(1), 2);
    assert_eq!(slot_count_for(2), 2);
    assert_eq!(slot_count_for(3), 4);
    assert_eq!(slot_count_for(5), 8);
    assert_eq!(slot_count_for(9), 16);
    assert_eq!(slot_count_for(16), 16);
}

#[test]
fn bit_reversal_spreads_shuffled_order() {
    assert_eq!(bit_reversed_order(8), vec![0, 4, 2, 6, 1, 5, 3, 7]);
    assert_eq!(bit_reversed_order(2), vec![0, 1]);

    let shuffled = [10, 11, 12, 13, 14, 15, 16, 17];
    let leaves = place_bit_reversed(&shuffled, 8);
    // Second in the shuffled order lands on leaf 4, the other half of the draw.
    assert_eq!(leaves[4], Some(11));
    assert_eq!(leaves[0], Some(10));
    assert_eq!(leaves[7], Some(17));
}

#[test]
fn seed_rejects_empty_and_oversized_rosters() {
    assert_eq!(seed(&[]), Err(BracketError::EmptyRoster));
    let too_many: Vec<usize> = (0..17).collect();
    assert_eq!(
        seed(&too_many),
        Err(BracketError::TooManyParticipants { count: 17, max: 16 })
    );
}

#[test]
fn seeding_is_deterministic_for_a_given_rng() {
    let indices: Vec<usize> = (0..11).collect();
    let a = seed_with_rng(&indices, &mut StdRng::seed_from_u64(7)).unwrap();
    let b = seed_with_rng(&indices, &mut StdRng::seed_from_u64(7)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn promote_requires_a_win_and_applies_once() {
    let mut bracket = four_leaves();
    assert_eq!(promote(&mut bracket, 0), None);

    let parent = record_match_result(&mut bracket, MatchSlots { a: 0, b: 1 }, Side::B);
    assert_eq!(parent, Some(4));
    assert_eq!(bracket.get(1).unwrap().result, SlotResult::Won);
    assert_eq!(bracket.get(0).unwrap().result, SlotResult::Lost);
    assert!(bracket.get(0).unwrap().defeated);
    let up = bracket.get(4).unwrap();
    assert!(up.occupied);
    assert_eq!(up.participant, Some(1));

    let before = bracket.clone();
    assert_eq!(promote(&mut bracket, 1), None);
    assert_eq!(bracket, before);
}

#[test]
fn promote_stops_at_the_final() {
    let mut bracket = BracketState::from_leaves(&[Some(0), Some(1)]).unwrap();
    assert_eq!(
        record_match_result(&mut bracket, MatchSlots { a: 0, b: 1 }, Side::A),
        Some(2)
    );
    let mut slots = bracket.into_slots();
    slots[2].result = SlotResult::Won;
    let mut bracket = BracketState::from_slots(slots).unwrap();
    assert_eq!(promote(&mut bracket, 2), None);
}

#[test]
fn byes_cascade_to_the_final() {
    let mut bracket = BracketState::from_leaves(&[Some(0), None, None, None]).unwrap();
    assert_eq!(next_unplayed_match(&mut bracket), None);
    assert_eq!(bracket.champion(), Some(0));
    assert!(is_tournament_complete(&bracket));
    assert_eq!(bracket.get(1).unwrap().result, SlotResult::Lost);
    assert_eq!(bracket.get(4).unwrap().result, SlotResult::Won);
}

#[test]
fn next_match_resolves_byes_between_real_matches() {
    let mut bracket = BracketState::from_leaves(&[Some(0), Some(1), Some(2), None]).unwrap();
    assert_eq!(
        next_unplayed_match(&mut bracket),
        Some(MatchSlots { a: 0, b: 1 })
    );
    record_match_result(&mut bracket, MatchSlots { a: 0, b: 1 }, Side::A);
    assert!(!is_tournament_complete(&bracket));

    assert_eq!(
        next_unplayed_match(&mut bracket),
        Some(MatchSlots { a: 4, b: 5 })
    );
    assert_eq!(bracket.get(5).unwrap().participant, Some(2));

    record_match_result(&mut bracket, MatchSlots { a: 4, b: 5 }, Side::B);
    assert!(is_tournament_complete(&bracket));
    assert_eq!(bracket.champion(), Some(2));
    assert_eq!(next_unplayed_match(&mut bracket), None);
}

#[test]
fn two_participants_complete_after_one_match() {
    let mut bracket = BracketState::from_leaves(&[Some(5), Some(9)]).unwrap();
    assert!(!is_tournament_complete(&bracket));
    record_match_result(&mut bracket, MatchSlots { a: 0, b: 1 }, Side::A);
    assert!(is_tournament_complete(&bracket));
    assert_eq!(bracket.champion(), Some(5));
    assert_eq!(bracket.pending_slot_count(), 0);
}

#[test]
fn promote_all_won_reapplies_saved_wins_once() {
    let mut slots = BracketState::from_leaves(&[Some(0), Some(1)]).unwrap().into_slots();
    slots[0].result = SlotResult::Won;
    slots[1].result = SlotResult::Lost;
    let mut bracket = BracketState::from_slots(slots).unwrap();

    assert_eq!(promote_all_won(&mut bracket), vec![2]);
    assert_eq!(bracket.champion(), Some(0));
    assert_eq!(promote_all_won(&mut bracket), Vec::<usize>::new());
}

#[test]
fn from_slots_rejects_a_broken_partition() {
    let mut slots = four_leaves().into_slots();
    slots.swap(3, 4);
    assert!(matches!(
        BracketState::from_slots(slots),
        Err(BracketError::Inconsistent(_))
    ));

    let mut slots = four_leaves().into_slots();
    slots.pop();
    assert!(matches!(
        BracketState::from_slots(slots),
        Err(BracketError::Inconsistent(_))
    ));
}

#[test]
fn from_leaves_rejects_duplicates() {
    assert_eq!(
        BracketState::from_leaves(&[Some(1), Some(1)]),
        Err(BracketError::DuplicateParticipant(1))
    );
}

#[test]
fn winner_is_the_declared_placeholder() {
    assert_eq!(decide_winner(&outcome("MONSTER_BETA", (90, 10)), PLACEHOLDERS), Side::B);
    assert_eq!(decide_winner(&outcome(" MONSTER_ALPHA ", (0, 10)), PLACEHOLDERS), Side::A);
}

#[test]
fn unmatched_winner_falls_back_to_gauges_then_side_a() {
    assert_eq!(decide_winner(&outcome("Sparky", (40, 60)), PLACEHOLDERS), Side::B);
    assert_eq!(decide_winner(&outcome("Sparky", (70, 20)), PLACEHOLDERS), Side::A);
    assert_eq!(decide_winner(&outcome("Sparky", (50, 50)), PLACEHOLDERS), Side::A);
}
