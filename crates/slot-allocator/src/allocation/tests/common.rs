use std::sync::Arc;

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::allocation::{
    allocation_router, ArityClass, Blackout, BlackoutGroupId, BlackoutTarget, EngineConfig,
    Enrollment, GroupId, InMemoryScheduleStore, Person, PersonId, Recommendation,
    RecommendationKind, ScheduleFixture, SearchOptions, SkillTier, SlotAllocationService,
    SlotGroup, Term, TermId, TimeSlot, TimeSlotId, Weekday,
};

pub(super) const TERM: &str = "2026-autumn";

pub(super) fn term() -> TermId {
    TermId::new(TERM)
}

pub(super) fn pid(id: &str) -> PersonId {
    PersonId::new(id)
}

pub(super) fn gid(id: &str) -> GroupId {
    GroupId::new(id)
}

/// Fluent seed for an [`InMemoryScheduleStore`] with one active term and two daily slots.
pub(super) struct ScheduleBuilder {
    fixture: ScheduleFixture,
}

impl ScheduleBuilder {
    pub(super) fn new() -> Self {
        Self {
            fixture: ScheduleFixture {
                active_term: Some(term()),
                terms: vec![Term {
                    id: term(),
                    name: "Autumn 2026".to_string(),
                    starts_on: NaiveDate::from_ymd_opt(2026, 9, 1).expect("valid date"),
                    ends_on: NaiveDate::from_ymd_opt(2026, 12, 18).expect("valid date"),
                }],
                time_slots: vec![
                    TimeSlot {
                        id: TimeSlotId(1),
                        label: "15:30".to_string(),
                    },
                    TimeSlot {
                        id: TimeSlotId(2),
                        label: "16:15".to_string(),
                    },
                ],
                ..ScheduleFixture::default()
            },
        }
    }

    pub(super) fn without_active_term(mut self) -> Self {
        self.fixture.active_term = None;
        self
    }

    /// Person with an enrollment in the test term and a zero lesson balance.
    pub(super) fn person(mut self, id: &str, tier: SkillTier, arity: ArityClass) -> Self {
        self.fixture.people.push(Person {
            id: pid(id),
            name: format!("Person {id}"),
            skill_tier: tier,
            cohort_level: 3,
            blackout_group: None,
        });
        self.fixture.enrollments.push(Enrollment {
            person_id: pid(id),
            term_id: term(),
            arity,
            target_lessons: 10,
            carried_forward: 0,
            attended: 10,
        });
        self
    }

    /// Person known to the store but not enrolled this term.
    pub(super) fn unenrolled(mut self, id: &str) -> Self {
        self.fixture.people.push(Person {
            id: pid(id),
            name: format!("Person {id}"),
            skill_tier: SkillTier::C,
            cohort_level: 3,
            blackout_group: None,
        });
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn group(
        mut self,
        id: &str,
        day: Weekday,
        slot: u8,
        arity: ArityClass,
        max_size: u8,
        tier: SkillTier,
        members: &[&str],
    ) -> Self {
        self.fixture.groups.push(SlotGroup {
            id: gid(id),
            term_id: term(),
            name: format!("{} {id}", day.label()),
            day,
            slot: TimeSlotId(slot),
            coach_id: None,
            target_tier: tier,
            arity,
            max_size,
            preferred_size: None,
            members: members.iter().map(|member| pid(member)).collect(),
            version: 1,
        });
        self
    }

    pub(super) fn blackout(mut self, person: &str, day: Weekday, slot: u8) -> Self {
        self.fixture.blackouts.push(Blackout {
            day,
            slot: TimeSlotId(slot),
            target: BlackoutTarget::Person(pid(person)),
        });
        self
    }

    pub(super) fn cohort_blackout(
        mut self,
        person: &str,
        cohort: &str,
        day: Weekday,
        slot: u8,
    ) -> Self {
        let cohort = BlackoutGroupId::new(cohort);
        if let Some(entry) = self
            .fixture
            .people
            .iter_mut()
            .find(|entry| entry.id == pid(person))
        {
            entry.blackout_group = Some(cohort.clone());
        }
        self.fixture.blackouts.push(Blackout {
            day,
            slot: TimeSlotId(slot),
            target: BlackoutTarget::Group(cohort),
        });
        self
    }

    pub(super) fn build(self) -> Arc<InMemoryScheduleStore> {
        Arc::new(InMemoryScheduleStore::from_fixture(self.fixture))
    }
}

/// A PAIR group on Monday slot 1 with one PAIR member waiting for a partner.
pub(super) fn pair_waiting_store() -> Arc<InMemoryScheduleStore> {
    ScheduleBuilder::new()
        .person("x", SkillTier::B, ArityClass::Pair)
        .person("y", SkillTier::B, ArityClass::Pair)
        .person("y2", SkillTier::B, ArityClass::Pair)
        .group(
            "g-pair",
            Weekday::Monday,
            1,
            ArityClass::Pair,
            2,
            SkillTier::B,
            &["x"],
        )
        .build()
}

/// A full GROUP of three where `m3` fits poorly and has an empty group to move to.
pub(super) fn full_group_store() -> Arc<InMemoryScheduleStore> {
    ScheduleBuilder::new()
        .person("m1", SkillTier::B, ArityClass::Group)
        .person("m2", SkillTier::B, ArityClass::Group)
        .person("m3", SkillTier::D, ArityClass::Group)
        .person("z", SkillTier::B, ArityClass::Group)
        .group(
            "g-full",
            Weekday::Monday,
            1,
            ArityClass::Group,
            3,
            SkillTier::B,
            &["m1", "m2", "m3"],
        )
        .group(
            "g-alt",
            Weekday::Tuesday,
            1,
            ArityClass::Group,
            4,
            SkillTier::D,
            &[],
        )
        .build()
}

/// `r` can only reach `g1` by displacing `a`, who must displace `c`, who lands in `g3`.
pub(super) fn chain_store() -> Arc<InMemoryScheduleStore> {
    ScheduleBuilder::new()
        .person("r", SkillTier::B, ArityClass::Group)
        .person("a", SkillTier::D, ArityClass::Group)
        .person("b", SkillTier::B, ArityClass::Group)
        .person("c", SkillTier::D, ArityClass::Group)
        .group(
            "g1",
            Weekday::Monday,
            1,
            ArityClass::Group,
            2,
            SkillTier::B,
            &["a", "b"],
        )
        .group(
            "g2",
            Weekday::Tuesday,
            1,
            ArityClass::Group,
            1,
            SkillTier::D,
            &["c"],
        )
        .group(
            "g3",
            Weekday::Wednesday,
            1,
            ArityClass::Group,
            4,
            SkillTier::D,
            &[],
        )
        .blackout("a", Weekday::Wednesday, 1)
        .build()
}

pub(super) fn service(
    store: &Arc<InMemoryScheduleStore>,
) -> SlotAllocationService<InMemoryScheduleStore, InMemoryScheduleStore> {
    service_with(store, EngineConfig::default())
}

pub(super) fn service_with(
    store: &Arc<InMemoryScheduleStore>,
    config: EngineConfig,
) -> SlotAllocationService<InMemoryScheduleStore, InMemoryScheduleStore> {
    SlotAllocationService::new(store.clone(), store.clone(), config)
}

pub(super) fn options() -> SearchOptions {
    SearchOptions::default()
}

pub(super) fn first_of_kind(
    recommendations: &[Recommendation],
    kind: RecommendationKind,
) -> &Recommendation {
    recommendations
        .iter()
        .find(|recommendation| recommendation.kind == kind)
        .unwrap_or_else(|| panic!("expected a {} recommendation", kind.label()))
}

pub(super) fn members(store: &InMemoryScheduleStore, group: &str) -> Vec<PersonId> {
    use crate::allocation::ScheduleReader;
    store
        .group(&term(), &gid(group))
        .expect("read succeeds")
        .expect("group present")
        .members
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn router_with_store(store: &Arc<InMemoryScheduleStore>) -> axum::Router {
    allocation_router(Arc::new(service(store)))
}
