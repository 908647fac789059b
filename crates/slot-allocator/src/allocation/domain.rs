use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Default seat count for GROUP-labelled slot groups when the store omits one.
pub const DEFAULT_GROUP_CAPACITY: u8 = 4;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier wrapper for people requesting or holding a slot.
    PersonId
);
string_id!(
    /// Identifier wrapper for scheduling terms.
    TermId
);
string_id!(
    /// Identifier wrapper for slot groups.
    GroupId
);
string_id!(
    /// Identifier wrapper for coaches.
    CoachId
);
string_id!(
    /// Cohort-wide blackout container (e.g. a school class).
    BlackoutGroupId
);
string_id!(
    /// Identifier assigned to an accepted plan.
    PlanId
);

/// Numbered lesson slot within a day.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimeSlotId(pub u8);

impl fmt::Display for TimeSlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    /// Days the engine schedules lessons on.
    pub const WORKING_DAYS: [Weekday; 5] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Weekday::Monday => "monday",
            Weekday::Tuesday => "tuesday",
            Weekday::Wednesday => "wednesday",
            Weekday::Thursday => "thursday",
            Weekday::Friday => "friday",
            Weekday::Saturday => "saturday",
            Weekday::Sunday => "sunday",
        }
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(value: chrono::Weekday) -> Self {
        match value {
            chrono::Weekday::Mon => Weekday::Monday,
            chrono::Weekday::Tue => Weekday::Tuesday,
            chrono::Weekday::Wed => Weekday::Wednesday,
            chrono::Weekday::Thu => Weekday::Thursday,
            chrono::Weekday::Fri => Weekday::Friday,
            chrono::Weekday::Sat => Weekday::Saturday,
            chrono::Weekday::Sun => Weekday::Sunday,
        }
    }
}

/// A (day, time slot) pair; the unit of availability.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SlotKey {
    pub day: Weekday,
    pub slot: TimeSlotId,
}

impl SlotKey {
    pub const fn new(day: Weekday, slot: TimeSlotId) -> Self {
        Self { day, slot }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.day.label(), self.slot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub id: TimeSlotId,
    pub label: String,
}

/// Ordered skill tiers, `A` being the most advanced.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum SkillTier {
    A,
    B,
    C,
    D,
    E,
}

impl SkillTier {
    pub const fn rank(self) -> u8 {
        match self {
            SkillTier::A => 0,
            SkillTier::B => 1,
            SkillTier::C => 2,
            SkillTier::D => 3,
            SkillTier::E => 4,
        }
    }

    pub fn distance(self, other: SkillTier) -> u8 {
        self.rank().abs_diff(other.rank())
    }
}

/// How many people a placement is designed to be scheduled with.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArityClass {
    Solo,
    Pair,
    Group,
}

impl ArityClass {
    pub const fn label(self) -> &'static str {
        match self {
            ArityClass::Solo => "solo",
            ArityClass::Pair => "pair",
            ArityClass::Group => "group",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: TermId,
    pub name: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

/// A person as supplied by the external store. Read-only during a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    pub skill_tier: SkillTier,
    pub cohort_level: u8,
    #[serde(default)]
    pub blackout_group: Option<BlackoutGroupId>,
}

/// Per-term enrollment carrying the arity class and lesson bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub person_id: PersonId,
    pub term_id: TermId,
    pub arity: ArityClass,
    pub target_lessons: u16,
    #[serde(default)]
    pub carried_forward: i16,
    #[serde(default)]
    pub attended: u16,
}

impl Enrollment {
    pub fn adjusted_target(&self) -> i32 {
        i32::from(self.target_lessons) + i32::from(self.carried_forward)
    }

    /// Lessons still owed; negative when the person is in credit.
    pub fn balance(&self) -> i32 {
        self.adjusted_target() - i32::from(self.attended)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coach {
    pub id: CoachId,
    pub name: String,
    #[serde(default)]
    pub specializations: BTreeSet<SkillTier>,
}

impl Coach {
    pub fn specializes_in(&self, tier: SkillTier) -> bool {
        self.specializations.contains(&tier)
    }
}

/// Container bound to one (day, slot) within a term.
///
/// `arity` is the declared label. Placement decisions use the membership-derived class from
/// [`crate::allocation::effective_class`]; the label only fixes capacity and legality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotGroup {
    pub id: GroupId,
    pub term_id: TermId,
    pub name: String,
    pub day: Weekday,
    pub slot: TimeSlotId,
    #[serde(default)]
    pub coach_id: Option<CoachId>,
    pub target_tier: SkillTier,
    pub arity: ArityClass,
    #[serde(default = "default_group_capacity")]
    pub max_size: u8,
    #[serde(default)]
    pub preferred_size: Option<u8>,
    #[serde(default)]
    pub members: Vec<PersonId>,
    #[serde(default)]
    pub version: u64,
}

fn default_group_capacity() -> u8 {
    DEFAULT_GROUP_CAPACITY
}

impl SlotGroup {
    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.day, self.slot)
    }

    pub fn capacity(&self) -> usize {
        match self.arity {
            ArityClass::Solo => 1,
            ArityClass::Pair => 2,
            ArityClass::Group => usize::from(self.max_size.max(1)),
        }
    }

    pub fn preferred_size(&self) -> usize {
        match self.arity {
            ArityClass::Solo | ArityClass::Pair => self.capacity(),
            ArityClass::Group => self
                .preferred_size
                .map(usize::from)
                .unwrap_or_else(|| self.capacity())
                .min(self.capacity()),
        }
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, person: &PersonId) -> bool {
        self.members.contains(person)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlackoutTarget {
    Person(PersonId),
    Group(BlackoutGroupId),
}

/// Rule forbidding a person or an entire blackout group from a (day, slot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blackout {
    pub day: Weekday,
    pub slot: TimeSlotId,
    pub target: BlackoutTarget,
}

impl Blackout {
    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.day, self.slot)
    }

    pub fn blocks(&self, person: &Person) -> bool {
        match &self.target {
            BlackoutTarget::Person(id) => id == &person.id,
            BlackoutTarget::Group(group) => person.blackout_group.as_ref() == Some(group),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(arity: ArityClass, max_size: u8, preferred: Option<u8>) -> SlotGroup {
        SlotGroup {
            id: GroupId::new("g"),
            term_id: TermId::new("t"),
            name: "g".to_string(),
            day: Weekday::Monday,
            slot: TimeSlotId(1),
            coach_id: None,
            target_tier: SkillTier::B,
            arity,
            max_size,
            preferred_size: preferred,
            members: Vec::new(),
            version: 0,
        }
    }

    #[test]
    fn capacity_follows_declared_label() {
        assert_eq!(group(ArityClass::Solo, 6, None).capacity(), 1);
        assert_eq!(group(ArityClass::Pair, 6, None).capacity(), 2);
        assert_eq!(group(ArityClass::Group, 3, None).capacity(), 3);
        assert_eq!(group(ArityClass::Group, 5, Some(9)).preferred_size(), 5);
        assert_eq!(group(ArityClass::Group, 5, Some(3)).preferred_size(), 3);
    }

    #[test]
    fn balance_accounts_for_carried_lessons() {
        let enrollment = Enrollment {
            person_id: PersonId::new("p"),
            term_id: TermId::new("t"),
            arity: ArityClass::Pair,
            target_lessons: 10,
            carried_forward: -2,
            attended: 9,
        };
        assert_eq!(enrollment.adjusted_target(), 8);
        assert_eq!(enrollment.balance(), -1);
    }

    #[test]
    fn blackout_matches_person_or_cohort() {
        let person = Person {
            id: PersonId::new("p-1"),
            name: "Ada".to_string(),
            skill_tier: SkillTier::C,
            cohort_level: 3,
            blackout_group: Some(BlackoutGroupId::new("3b")),
        };
        let direct = Blackout {
            day: Weekday::Monday,
            slot: TimeSlotId(1),
            target: BlackoutTarget::Person(PersonId::new("p-1")),
        };
        let cohort = Blackout {
            target: BlackoutTarget::Group(BlackoutGroupId::new("3b")),
            ..direct.clone()
        };
        let other = Blackout {
            target: BlackoutTarget::Group(BlackoutGroupId::new("4a")),
            ..direct.clone()
        };
        assert!(direct.blocks(&person));
        assert!(cohort.blocks(&person));
        assert!(!other.blocks(&person));
    }

    #[test]
    fn tier_distance_is_symmetric() {
        assert_eq!(SkillTier::B.distance(SkillTier::B), 0);
        assert_eq!(SkillTier::B.distance(SkillTier::C), 1);
        assert_eq!(SkillTier::E.distance(SkillTier::A), 4);
    }
}
