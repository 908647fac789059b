use std::sync::Arc;
use std::thread;

use serde_json::json;
use slot_allocator::allocation::{
    AllocationServiceError, Blackout, BlackoutTarget, EffectiveClass, EngineConfig, GroupId,
    InMemoryScheduleStore, PersonId, RecommendationKind, ScheduleReader, SearchRequest,
    SlotAllocationService, TermId, TimeSlotId, Weekday,
};

const TERM: &str = "2026-autumn";

type Service = SlotAllocationService<InMemoryScheduleStore, InMemoryScheduleStore>;

fn person(id: &str, tier: &str) -> serde_json::Value {
    json!({ "id": id, "name": format!("Student {id}"), "skill_tier": tier, "cohort_level": 3 })
}

fn enrollment(id: &str, arity: &str) -> serde_json::Value {
    json!({
        "person_id": id,
        "term_id": TERM,
        "arity": arity,
        "target_lessons": 10,
        "attended": 10
    })
}

fn group(
    id: &str,
    day: &str,
    arity: &str,
    max_size: u8,
    tier: &str,
    members: &[&str],
) -> serde_json::Value {
    json!({
        "id": id,
        "term_id": TERM,
        "name": format!("{day} {id}"),
        "day": day,
        "slot": 1,
        "target_tier": tier,
        "arity": arity,
        "max_size": max_size,
        "members": members,
        "version": 1
    })
}

/// Studio with a PAIR waiting for a partner, a full GROUP and an occupied SOLO room.
fn studio() -> Arc<InMemoryScheduleStore> {
    let fixture = json!({
        "active_term": TERM,
        "terms": [{
            "id": TERM,
            "name": "Autumn 2026",
            "starts_on": "2026-09-01",
            "ends_on": "2026-12-18"
        }],
        "time_slots": [{ "id": 1, "label": "15:30" }],
        "people": [
            person("x", "B"), person("y", "B"), person("y2", "B"),
            person("m1", "B"), person("m2", "B"), person("m3", "D"), person("z", "B"),
            person("s", "B"), person("solo-busy", "B")
        ],
        "enrollments": [
            enrollment("x", "PAIR"), enrollment("y", "PAIR"), enrollment("y2", "PAIR"),
            enrollment("m1", "GROUP"), enrollment("m2", "GROUP"), enrollment("m3", "GROUP"),
            enrollment("z", "GROUP"), enrollment("s", "SOLO"), enrollment("solo-busy", "SOLO")
        ],
        "groups": [
            group("g-pair", "monday", "PAIR", 2, "B", &["x"]),
            group("g-full", "tuesday", "GROUP", 3, "B", &["m1", "m2", "m3"]),
            group("g-alt", "wednesday", "GROUP", 4, "D", &[]),
            group("g-solo", "thursday", "SOLO", 1, "B", &["solo-busy"])
        ],
        "blackouts": [
            { "day": "friday", "slot": 1, "target": { "person": "s" } }
        ]
    });

    let store = InMemoryScheduleStore::from_json_str(&fixture.to_string())
        .expect("fixture parses");
    Arc::new(store)
}

fn service(store: &Arc<InMemoryScheduleStore>) -> Service {
    SlotAllocationService::new(store.clone(), store.clone(), EngineConfig::default())
}

fn members(store: &InMemoryScheduleStore, group: &str) -> Vec<PersonId> {
    store
        .group(&TermId::new(TERM), &GroupId::new(group))
        .expect("read succeeds")
        .expect("group present")
        .members
}

#[test]
fn pair_partner_is_matched_with_waiting_student() {
    let store = studio();
    let outcome = service(&store)
        .search(&SearchRequest::new(PersonId::new("y")))
        .expect("search succeeds");

    let top = &outcome.recommendations[0];
    assert_eq!(top.kind, RecommendationKind::Direct);
    assert_eq!(top.group_id, GroupId::new("g-pair"));
    assert_eq!(top.effective_class, EffectiveClass::PairWaiting);
    assert_eq!(top.breakdown.skill, 100.0);
    assert!(top.percentage > 0.0 && top.percentage <= 100.0);
}

#[test]
fn displacement_plan_moves_both_students() {
    let store = studio();
    let service = service(&store);
    let outcome = service
        .search(&SearchRequest::new(PersonId::new("z")))
        .expect("search succeeds");

    let swap = outcome
        .recommendations
        .iter()
        .find(|recommendation| recommendation.kind == RecommendationKind::Displacement)
        .expect("displacement offered");
    assert_eq!(swap.group_id, GroupId::new("g-full"));

    let receipt = service.accept(swap).expect("plan commits");
    assert_eq!(receipt.versions.len(), 2);

    let full = members(&store, "g-full");
    assert_eq!(full.len(), 3);
    assert!(full.contains(&PersonId::new("z")));
    assert!(!full.contains(&PersonId::new("m3")));
    assert_eq!(members(&store, "g-alt"), vec![PersonId::new("m3")]);
}

#[test]
fn solo_student_without_free_room_gets_empty_answer() {
    let store = studio();
    let outcome = service(&store)
        .search(&SearchRequest::new(PersonId::new("s")))
        .expect("an empty answer is still a success");

    assert!(outcome.recommendations.is_empty());
    assert!(!outcome.budget_exhausted);
}

#[test]
fn racing_accepts_commit_exactly_once() {
    let store = studio();
    let service = Arc::new(service(&store));

    let proposals: Vec<_> = ["y", "y2"]
        .iter()
        .map(|id| {
            let outcome = service
                .search(&SearchRequest::new(PersonId::new(*id)))
                .expect("search succeeds");
            outcome.recommendations[0].clone()
        })
        .collect();
    assert!(proposals
        .iter()
        .all(|proposal| proposal.group_id == GroupId::new("g-pair")));

    let handles: Vec<_> = proposals
        .into_iter()
        .map(|proposal| {
            let service = Arc::clone(&service);
            thread::spawn(move || service.accept(&proposal))
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("accept thread finishes"))
        .collect();

    let committed = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(committed, 1);
    for result in &results {
        if let Err(error) = result {
            match error {
                AllocationServiceError::Plan(plan) => assert!(plan.is_stale(), "{plan}"),
                other => panic!("expected a stale plan, got {other}"),
            }
        }
    }

    let pair = members(&store, "g-pair");
    assert_eq!(pair.len(), 2);
    assert_eq!(pair[0], PersonId::new("x"));
}

#[test]
fn searching_twice_without_writes_gives_same_answer() {
    let store = studio();
    let service = service(&store);
    let request = SearchRequest::new(PersonId::new("z"));

    let first = service.search(&request).expect("search succeeds");
    let second = service.search(&request).expect("search succeeds");

    assert_eq!(first.recommendations, second.recommendations);
}

#[test]
fn failed_plan_writes_nothing() {
    let store = studio();
    let service = service(&store);
    let outcome = service
        .search(&SearchRequest::new(PersonId::new("z")))
        .expect("search succeeds");
    let swap = outcome
        .recommendations
        .iter()
        .find(|recommendation| recommendation.kind == RecommendationKind::Displacement)
        .expect("displacement offered")
        .clone();

    store.add_blackout(Blackout {
        day: Weekday::Wednesday,
        slot: TimeSlotId(1),
        target: BlackoutTarget::Person(PersonId::new("m3")),
    });

    let error = service.accept(&swap).expect_err("plan is stale");
    match error {
        AllocationServiceError::Plan(plan) => assert!(plan.is_stale(), "{plan}"),
        other => panic!("expected a stale plan, got {other}"),
    }
    assert_eq!(
        members(&store, "g-full"),
        vec![PersonId::new("m1"), PersonId::new("m2"), PersonId::new("m3")]
    );
    assert!(members(&store, "g-alt").is_empty());
}
