use serde::{Deserialize, Serialize};

use super::super::domain::ArityClass;

/// Occupancy state derived from the arity of current members, never from the declared label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectiveClass {
    Empty,
    SoloOccupied,
    PairWaiting,
    PairFull,
    Group,
    Mixed,
    Invalid,
}

impl EffectiveClass {
    pub const fn label(self) -> &'static str {
        match self {
            EffectiveClass::Empty => "empty",
            EffectiveClass::SoloOccupied => "solo_occupied",
            EffectiveClass::PairWaiting => "pair_waiting",
            EffectiveClass::PairFull => "pair_full",
            EffectiveClass::Group => "group",
            EffectiveClass::Mixed => "mixed",
            EffectiveClass::Invalid => "invalid",
        }
    }
}

pub fn effective_class(members: &[ArityClass]) -> EffectiveClass {
    let Some(first) = members.first() else {
        return EffectiveClass::Empty;
    };

    if members.iter().any(|arity| arity != first) {
        // A SOLO placement never shares a slot, whatever else is in it.
        if members.contains(&ArityClass::Solo) {
            return EffectiveClass::Invalid;
        }
        return EffectiveClass::Mixed;
    }

    match (first, members.len()) {
        (ArityClass::Solo, 1) => EffectiveClass::SoloOccupied,
        (ArityClass::Solo, _) => EffectiveClass::Invalid,
        (ArityClass::Pair, 1) => EffectiveClass::PairWaiting,
        (ArityClass::Pair, 2) => EffectiveClass::PairFull,
        (ArityClass::Pair, _) => EffectiveClass::Invalid,
        (ArityClass::Group, _) => EffectiveClass::Group,
    }
}

/// Whether an arrival of `arity` may join a group currently in `class`.
///
/// The strict table drives phases 1-3; `relaxed` additionally lets GROUP arrivals into
/// MIXED groups and is only used by the fallback sweep.
pub fn admits(class: EffectiveClass, arity: ArityClass, relaxed: bool) -> bool {
    match arity {
        ArityClass::Solo => class == EffectiveClass::Empty,
        ArityClass::Pair => matches!(class, EffectiveClass::Empty | EffectiveClass::PairWaiting),
        ArityClass::Group => match class {
            EffectiveClass::Empty | EffectiveClass::Group | EffectiveClass::PairWaiting => true,
            EffectiveClass::Mixed => relaxed,
            _ => false,
        },
    }
}

/// Reasons a membership breaks the capacity or arity rules of its declared label.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositionViolation {
    #[error("{size} members exceed capacity {capacity}")]
    OverCapacity { size: usize, capacity: usize },
    #[error("{label:?}-labelled group cannot hold a {member:?} member")]
    ArityMismatch {
        label: ArityClass,
        member: ArityClass,
    },
    #[error("{pairs} PAIR members without a GROUP member alongside")]
    PairOverflow { pairs: usize },
}

pub fn composition_violation(
    label: ArityClass,
    capacity: usize,
    members: &[ArityClass],
) -> Option<CompositionViolation> {
    if members.len() > capacity {
        return Some(CompositionViolation::OverCapacity {
            size: members.len(),
            capacity,
        });
    }

    let stray = match label {
        ArityClass::Solo => members.iter().find(|arity| **arity != ArityClass::Solo),
        ArityClass::Pair => members.iter().find(|arity| **arity != ArityClass::Pair),
        ArityClass::Group => members.iter().find(|arity| **arity == ArityClass::Solo),
    };
    if let Some(member) = stray {
        return Some(CompositionViolation::ArityMismatch {
            label,
            member: *member,
        });
    }

    if label == ArityClass::Group {
        let pairs = members
            .iter()
            .filter(|arity| **arity == ArityClass::Pair)
            .count();
        let groups = members
            .iter()
            .filter(|arity| **arity == ArityClass::Group)
            .count();
        if pairs > 2 && groups == 0 {
            return Some(CompositionViolation::PairOverflow { pairs });
        }
    }

    None
}
