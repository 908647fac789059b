use super::super::domain::{ArityClass, Coach, SkillTier};
use super::ScoreBreakdown;

/// Balance at or above which a person counts as far behind schedule.
pub(crate) const OWES_MANY_LESSONS: i32 = 5;
/// Balance at or above which a person counts as somewhat behind.
pub(crate) const OWES_SOME_LESSONS: i32 = 2;

/// Raw component maxima, in weight-table order (time preference last).
pub(crate) const COMPONENT_MAXIMA: [f64; 7] = [100.0, 80.0, 50.0, 50.0, 40.0, 30.0, 20.0];

/// Everything one score needs, borrowed from the term snapshot.
pub(crate) struct ScoreInput<'a> {
    pub tier: SkillTier,
    pub cohort_level: u8,
    pub arity: ArityClass,
    pub balance: i32,
    pub target_tier: SkillTier,
    pub declared_arity: ArityClass,
    /// Cohort levels of the other members, excluding the person being scored.
    pub peer_cohorts: &'a [u8],
    pub group_size: usize,
    pub preferred_size: usize,
    pub capacity: usize,
    pub coach: Option<&'a Coach>,
}

pub(crate) fn score_components(input: &ScoreInput<'_>) -> ScoreBreakdown {
    ScoreBreakdown {
        skill: skill_points(input.tier, input.target_tier),
        cohort: cohort_points(input.cohort_level, input.peer_cohorts),
        arity_fit: arity_points(input.arity, input.declared_arity),
        specialization: specialization_points(input.coach, input.tier),
        lesson_balance: balance_points(input.balance),
        capacity_fit: capacity_points(input.group_size, input.preferred_size, input.capacity),
        time_preference: 0.0,
    }
}

fn skill_points(tier: SkillTier, target: SkillTier) -> f64 {
    match tier.distance(target) {
        0 => 100.0,
        1 => 60.0,
        _ => 0.0,
    }
}

fn cohort_points(level: u8, peers: &[u8]) -> f64 {
    if peers.is_empty() {
        return 80.0;
    }

    let count = peers.len() as u32;
    let sum: u32 = peers.iter().map(|peer| u32::from(*peer)).sum();
    let reference = (sum + count / 2) / count;

    match u32::from(level).abs_diff(reference) {
        0 => 80.0,
        1 => 60.0,
        2 => 30.0,
        _ => 0.0,
    }
}

fn arity_points(arity: ArityClass, declared: ArityClass) -> f64 {
    if arity == declared {
        50.0
    } else if arity == ArityClass::Group && declared == ArityClass::Pair {
        25.0
    } else {
        0.0
    }
}

fn specialization_points(coach: Option<&Coach>, tier: SkillTier) -> f64 {
    match coach {
        Some(coach) if coach.specializes_in(tier) => 50.0,
        _ => 20.0,
    }
}

fn balance_points(balance: i32) -> f64 {
    if balance >= OWES_MANY_LESSONS {
        40.0
    } else if balance >= OWES_SOME_LESSONS {
        30.0
    } else if balance >= 0 {
        20.0
    } else {
        10.0
    }
}

fn capacity_points(size: usize, preferred: usize, capacity: usize) -> f64 {
    if size < preferred {
        30.0
    } else if size == preferred {
        20.0
    } else if size < capacity {
        10.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skill_rewards_exact_and_adjacent_tiers() {
        assert_eq!(skill_points(SkillTier::B, SkillTier::B), 100.0);
        assert_eq!(skill_points(SkillTier::B, SkillTier::A), 60.0);
        assert_eq!(skill_points(SkillTier::B, SkillTier::D), 0.0);
    }

    #[test]
    fn cohort_is_neutral_for_empty_groups() {
        assert_eq!(cohort_points(4, &[]), 80.0);
        assert_eq!(cohort_points(4, &[4, 4]), 80.0);
        assert_eq!(cohort_points(4, &[5]), 60.0);
        assert_eq!(cohort_points(4, &[6, 6]), 30.0);
        assert_eq!(cohort_points(1, &[6]), 0.0);
    }

    #[test]
    fn arity_fit_uses_declared_label() {
        assert_eq!(arity_points(ArityClass::Pair, ArityClass::Pair), 50.0);
        assert_eq!(arity_points(ArityClass::Group, ArityClass::Pair), 25.0);
        assert_eq!(arity_points(ArityClass::Pair, ArityClass::Group), 0.0);
    }

    #[test]
    fn balance_prioritises_people_behind_schedule() {
        assert_eq!(balance_points(8), 40.0);
        assert_eq!(balance_points(3), 30.0);
        assert_eq!(balance_points(0), 20.0);
        assert_eq!(balance_points(-2), 10.0);
    }

    #[test]
    fn capacity_fit_prefers_room() {
        assert_eq!(capacity_points(1, 3, 4), 30.0);
        assert_eq!(capacity_points(3, 3, 4), 20.0);
        assert_eq!(capacity_points(3, 2, 4), 10.0);
        assert_eq!(capacity_points(4, 3, 4), 0.0);
    }
}
