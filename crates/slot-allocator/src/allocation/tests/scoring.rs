use std::time::Duration;

use super::common::*;
use crate::allocation::{
    ArityClass, CompatibilityScorer, Projection, ScheduleReader, ScoringWeights, SkillTier,
    TermSnapshot, Weekday,
};

fn scorer() -> CompatibilityScorer {
    CompatibilityScorer::new(ScoringWeights::default(), Duration::from_secs(300))
}

#[test]
fn default_weights_span_the_full_scale() {
    assert_eq!(ScoringWeights::default().scale(), 370.0);
}

#[test]
fn pair_partner_scores_exact_tier() {
    let store = pair_waiting_store();
    let scorer = scorer();
    let snapshot =
        TermSnapshot::load(store.as_ref(), &scorer, &term(), &[pid("y")]).expect("snapshot loads");
    let projection = Projection::new(&snapshot);
    let group = snapshot.group(&gid("g-pair")).expect("group indexed");

    let score = projection
        .score(&scorer, &pid("y"), group)
        .expect("group is scorable");

    assert_eq!(score.breakdown.skill, 100.0);
    assert_eq!(score.breakdown.cohort, 80.0);
    assert_eq!(score.breakdown.arity_fit, 50.0);
    assert_eq!(score.breakdown.specialization, 20.0);
    assert_eq!(score.breakdown.lesson_balance, 20.0);
    assert_eq!(score.breakdown.capacity_fit, 30.0);
    assert_eq!(score.breakdown.time_preference, 0.0);
    assert_eq!(score.total, 216.0);
    assert_eq!(score.percentage, 88.9);
}

#[test]
fn occupant_is_not_their_own_peer() {
    let store = ScheduleBuilder::new()
        .person("solo", SkillTier::C, ArityClass::Solo)
        .group(
            "g-solo",
            Weekday::Friday,
            2,
            ArityClass::Solo,
            1,
            SkillTier::C,
            &["solo"],
        )
        .build();
    let scorer = scorer();
    let snapshot = TermSnapshot::load(store.as_ref(), &scorer, &term(), &[]).expect("loads");
    let projection = Projection::new(&snapshot);
    let group = snapshot.group(&gid("g-solo")).expect("group indexed");

    let score = projection
        .score(&scorer, &pid("solo"), group)
        .expect("scorable");

    assert_eq!(score.breakdown.cohort, 80.0);
    assert_eq!(score.breakdown.capacity_fit, 20.0);
}

#[test]
fn balances_are_prefetched_once_and_cached() {
    let store = full_group_store();
    let scorer = scorer();
    let people = [pid("m1"), pid("m3"), pid("ghost")];

    let balances = scorer
        .prefetch_balances(store.as_ref(), &term(), &people)
        .expect("prefetch succeeds");

    assert_eq!(balances.len(), 2, "unenrolled people have no balance");
    assert_eq!(scorer.cached_balance(&pid("m1"), &term()), Some(0));
    assert_eq!(scorer.cached_balance(&pid("ghost"), &term()), None);

    scorer.clear();
    assert_eq!(scorer.cached_balance(&pid("m1"), &term()), None);
}

#[test]
fn snapshot_indexes_groups_by_slot() {
    let store = chain_store();
    let scorer = scorer();
    let snapshot = TermSnapshot::load(store.as_ref(), &scorer, &term(), &[pid("r")]).expect("loads");

    let monday: Vec<_> = snapshot
        .groups_at(crate::allocation::SlotKey::new(
            Weekday::Monday,
            crate::allocation::TimeSlotId(1),
        ))
        .map(|group| group.id.clone())
        .collect();
    assert_eq!(monday, vec![gid("g1")]);
    assert_eq!(snapshot.arity_of(&pid("r")), Some(ArityClass::Group));
    assert_eq!(
        snapshot.groups().count(),
        store.groups(&term()).expect("groups").len()
    );
}

#[test]
fn projection_moves_people_between_groups() {
    let store = chain_store();
    let scorer = scorer();
    let snapshot = TermSnapshot::load(store.as_ref(), &scorer, &term(), &[pid("r")]).expect("loads");
    let mut projection = Projection::new(&snapshot);

    projection.apply(&pid("r"), Some(&pid("a")), &gid("g1"));
    projection.apply(&pid("a"), Some(&pid("c")), &gid("g2"));

    assert_eq!(projection.members(&gid("g1")), &[pid("b"), pid("r")]);
    assert_eq!(projection.members(&gid("g2")), &[pid("a")]);
    assert!(projection.group_of(&pid("c")).is_none());
    assert_eq!(
        snapshot.group(&gid("g1")).expect("indexed").members,
        vec![pid("a"), pid("b")],
        "snapshot stays untouched"
    );
}
