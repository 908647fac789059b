use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use super::availability::AvailabilityIndex;
use super::domain::{GroupId, PersonId, SlotGroup, SlotKey, TermId};
use super::repository::{RepositoryError, ScheduleReader};
use super::scoring::{effective_class, CompatibilityScorer, EffectiveClass, ScoringWeights};
use super::search::chain::build_chains;
use super::search::displacement::displacement_search;
use super::search::placement::direct_candidates;
use super::search::{
    rank, round_tenth, validate_moves, Deadline, Move, PhaseReport, Recommendation,
    RecommendationKind, SearchContext, SearchOptions, SearchOutcome, SearchPhase,
};
use super::snapshot::{Projection, TermSnapshot};

/// Tunables for the search engine. Every threshold the search relies on lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Wall-clock budget for one search call.
    pub time_budget_ms: u64,
    pub cache_ttl_secs: u64,
    pub max_results: usize,
    /// Below this many results the fallback sweep runs.
    pub min_results: usize,
    /// How far below the weakest occupant a displacing candidate may score.
    pub displacement_margin: f64,
    pub chain_max_depth: usize,
    /// Opportunities explored per chain hop.
    pub chain_branching: usize,
    /// Floor on the summed score deltas of everyone a chain moves besides the requester.
    pub chain_min_benefit: f64,
    pub max_chains: usize,
    pub weights: ScoringWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_budget_ms: 2_000,
            cache_ttl_secs: 300,
            max_results: 10,
            min_results: 3,
            displacement_margin: 25.0,
            chain_max_depth: 20,
            chain_branching: 3,
            chain_min_benefit: -25.0,
            max_chains: 5,
            weights: ScoringWeights::default(),
        }
    }
}

impl EngineConfig {
    /// Replace values the search cannot run with by their defaults.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            time_budget_ms: positive_or(self.time_budget_ms, defaults.time_budget_ms),
            cache_ttl_secs: self.cache_ttl_secs,
            max_results: positive_or(self.max_results, defaults.max_results),
            min_results: self.min_results,
            displacement_margin: finite_or(self.displacement_margin, defaults.displacement_margin),
            chain_max_depth: if self.chain_max_depth < 2 {
                defaults.chain_max_depth
            } else {
                self.chain_max_depth
            },
            chain_branching: positive_or(self.chain_branching, defaults.chain_branching),
            chain_min_benefit: finite_or(self.chain_min_benefit, defaults.chain_min_benefit),
            max_chains: positive_or(self.max_chains, defaults.max_chains),
            weights: self.weights,
        }
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn positive_or<T>(value: T, default: T) -> T
where
    T: PartialEq + Default,
{
    if value == T::default() {
        default
    } else {
        value
    }
}

fn finite_or(value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        default
    }
}

/// Failures that stop a search before any phase runs.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("person {0} does not exist")]
    UnknownPerson(PersonId),
    #[error("term {0} does not exist")]
    UnknownTerm(TermId),
    #[error("group {0} does not exist in this term")]
    UnknownGroup(GroupId),
    #[error("person {person} has no placement in term {term}")]
    NotEnrolled { person: PersonId, term: TermId },
    #[error("no active term is configured")]
    NoActiveTerm,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Current membership of a group together with its live classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupView {
    pub group: SlotGroup,
    pub effective_class: EffectiveClass,
    pub size: usize,
    pub capacity: usize,
}

/// Phase orchestration over one store: direct placement, displacement, chains, fallback.
pub struct SlotEngine<R> {
    reader: Arc<R>,
    availability: AvailabilityIndex<R>,
    scorer: CompatibilityScorer,
    config: EngineConfig,
}

impl<R> SlotEngine<R>
where
    R: ScheduleReader,
{
    pub fn new(reader: Arc<R>, config: EngineConfig) -> Self {
        let config = config.sanitized();
        let availability = AvailabilityIndex::new(reader.clone(), config.cache_ttl());
        let scorer = CompatibilityScorer::new(config.weights.clone(), config.cache_ttl());
        Self {
            reader,
            availability,
            scorer,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn availability(&self) -> &AvailabilityIndex<R> {
        &self.availability
    }

    pub fn scorer(&self) -> &CompatibilityScorer {
        &self.scorer
    }

    pub fn clear_caches(&self) {
        self.availability.clear();
        self.scorer.clear();
    }

    /// Drops expired cache entries; returns how many were removed.
    pub fn purge_expired_caches(&self) -> usize {
        self.availability.purge_expired() + self.scorer.purge_expired()
    }

    /// Ranked recommendations for `person` in `term`.
    ///
    /// An empty list is a successful answer. When the budget runs out the outcome carries
    /// whatever was found and `budget_exhausted` is set.
    pub fn find_optimal_slots(
        &self,
        person: &PersonId,
        term: &TermId,
        options: &SearchOptions,
    ) -> Result<SearchOutcome, SearchError> {
        let span = info_span!("search", person = %person, term = %term);
        let _entered = span.enter();

        let budget = options
            .time_budget_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.time_budget());
        let deadline = Deadline::after(budget);

        self.reader
            .person(person)?
            .ok_or_else(|| SearchError::UnknownPerson(person.clone()))?;
        self.reader
            .term(term)?
            .ok_or_else(|| SearchError::UnknownTerm(term.clone()))?;
        self.reader
            .enrollment(person, term)?
            .ok_or_else(|| SearchError::NotEnrolled {
                person: person.clone(),
                term: term.clone(),
            })?;

        let snapshot =
            TermSnapshot::load(self.reader.as_ref(), &self.scorer, term, &[person.clone()])?;
        let projection = Projection::new(&snapshot);
        let ctx = SearchContext {
            snapshot: &snapshot,
            availability: &self.availability,
            scorer: &self.scorer,
            config: &self.config,
        };

        let current = projection.group_of(person);
        let baseline = current.and_then(|group| projection.score(&self.scorer, person, group).ok());
        let baseline_total = baseline.as_ref().map(|score| score.total);
        let improves = |recommendation: &Recommendation| match baseline_total {
            Some(current) => recommendation.score > current,
            None => true,
        };

        let mut phases = Vec::new();
        let mut results: Vec<Recommendation> = Vec::new();

        let phase_deadline = deadline.portion(1.0 / 3.0);
        let direct = self.direct_phase(
            &ctx,
            &projection,
            person,
            baseline_total,
            RecommendationKind::Direct,
            &BTreeSet::new(),
            &phase_deadline,
        )?;
        let direct: Vec<Recommendation> = direct.into_iter().filter(|r| improves(r)).collect();
        debug!(found = direct.len(), "direct phase finished");
        phases.push(PhaseReport {
            phase: SearchPhase::Direct,
            found: direct.len(),
            completed: !phase_deadline.is_expired(),
        });
        results.extend(direct);

        let mut seeds = Vec::new();
        if (options.include_swaps || options.include_chains) && !deadline.is_expired() {
            let phase_deadline = deadline.portion(0.5);
            let displacement =
                displacement_search(&ctx, &projection, person, baseline_total, &phase_deadline)?;
            let kept: Vec<Recommendation> = if options.include_swaps {
                displacement
                    .recommendations
                    .into_iter()
                    .filter(|r| improves(r))
                    .collect()
            } else {
                Vec::new()
            };
            debug!(
                found = kept.len(),
                stranded = displacement.stranded.len(),
                "displacement phase finished"
            );
            phases.push(PhaseReport {
                phase: SearchPhase::Displacement,
                found: kept.len(),
                completed: displacement.completed && !phase_deadline.is_expired(),
            });
            results.extend(kept);
            seeds = displacement.stranded;
        }

        if options.include_chains && !seeds.is_empty() && !deadline.is_expired() {
            let chains = build_chains(&ctx, &projection, person, baseline_total, &seeds, &deadline)?;
            let kept: Vec<Recommendation> = chains
                .recommendations
                .into_iter()
                .filter(|r| improves(r))
                .collect();
            debug!(
                found = kept.len(),
                abandoned = chains.abandoned,
                "chain phase finished"
            );
            phases.push(PhaseReport {
                phase: SearchPhase::Chain,
                found: kept.len(),
                completed: chains.completed,
            });
            results.extend(kept);
        }

        if results.len() < self.config.min_results && !deadline.is_expired() {
            let targeted: BTreeSet<GroupId> =
                results.iter().map(|r| r.group_id.clone()).collect();
            let fallback = self.direct_phase(
                &ctx,
                &projection,
                person,
                baseline_total,
                RecommendationKind::Fallback,
                &targeted,
                &deadline,
            )?;
            debug!(found = fallback.len(), "fallback sweep finished");
            phases.push(PhaseReport {
                phase: SearchPhase::Fallback,
                found: fallback.len(),
                completed: !deadline.is_expired(),
            });
            results.extend(fallback);
        }

        rank(&mut results);
        results.truncate(options.max_results.unwrap_or(self.config.max_results));

        let budget_exhausted = phases.iter().any(|phase| !phase.completed);
        if budget_exhausted {
            info!(
                budget_ms = budget.as_millis() as u64,
                found = results.len(),
                "search budget exhausted; returning partial results"
            );
        }

        Ok(SearchOutcome {
            person_id: person.clone(),
            term_id: term.clone(),
            recommendations: results,
            budget_exhausted,
            phases,
        })
    }

    /// Single-seat moves into groups with room. The fallback kind relaxes admission.
    #[allow(clippy::too_many_arguments)]
    fn direct_phase<'a>(
        &self,
        ctx: &SearchContext<'a, R>,
        projection: &Projection<'a>,
        person: &PersonId,
        baseline: Option<f64>,
        kind: RecommendationKind,
        exclude: &BTreeSet<GroupId>,
        deadline: &Deadline,
    ) -> Result<Vec<Recommendation>, RepositoryError> {
        let relaxed = kind == RecommendationKind::Fallback;
        let from_group = projection.group_of(person).map(|group| group.id.clone());
        let candidates = direct_candidates(ctx, projection, person, exclude, relaxed, deadline)?;

        let mut recommendations = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let moves = vec![Move {
                person_id: person.clone(),
                leaving: None,
                group_id: candidate.group.id.clone(),
                from_group: from_group.clone(),
                score_delta: round_tenth(candidate.score.total - baseline.unwrap_or(0.0)),
            }];
            if let Err(violation) = validate_moves(projection, &moves) {
                debug!(group = %candidate.group.id, %violation, "placement would break its source group");
                continue;
            }
            recommendations.push(Recommendation::new(
                kind,
                person,
                ctx.snapshot.term_id(),
                candidate.group,
                candidate.class,
                candidate.score,
                moves,
            ));
        }
        Ok(recommendations)
    }

    /// Free (day, slot) pairs for a known person, in calendar order.
    pub fn available_slots(&self, person: &PersonId) -> Result<Vec<SlotKey>, SearchError> {
        self.reader
            .person(person)?
            .ok_or_else(|| SearchError::UnknownPerson(person.clone()))?;
        Ok(self.availability.available_slots(person)?.iter().copied().collect())
    }

    /// Membership and live class of one group, read fresh from the store.
    pub fn group_view(&self, term: &TermId, group: &GroupId) -> Result<GroupView, SearchError> {
        let group = self
            .reader
            .group(term, group)?
            .ok_or_else(|| SearchError::UnknownGroup(group.clone()))?;

        let enrollments = self.reader.enrollments(term, &group.members)?;
        let arities: Option<Vec<_>> = group
            .members
            .iter()
            .map(|member| {
                enrollments
                    .iter()
                    .find(|enrollment| &enrollment.person_id == member)
                    .map(|enrollment| enrollment.arity)
            })
            .collect();
        let class = arities
            .map(|arities| effective_class(&arities))
            .unwrap_or(EffectiveClass::Invalid);

        Ok(GroupView {
            size: group.size(),
            capacity: group.capacity(),
            effective_class: class,
            group,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_restores_unusable_values() {
        let config = EngineConfig {
            time_budget_ms: 0,
            max_results: 0,
            displacement_margin: f64::NAN,
            chain_max_depth: 1,
            chain_min_benefit: f64::INFINITY,
            ..EngineConfig::default()
        }
        .sanitized();

        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn sanitized_keeps_tuned_values() {
        let tuned = EngineConfig {
            displacement_margin: -5.0,
            chain_max_depth: 4,
            min_results: 0,
            ..EngineConfig::default()
        };
        assert_eq!(tuned.clone().sanitized(), tuned);
    }
}
