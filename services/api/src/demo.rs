use crate::infra::load_store;
use chrono::SecondsFormat;
use clap::Args;
use slot_allocator::allocation::{
    AllocationServiceError, ExecutionReceipt, GroupId, InMemoryScheduleStore, PersonId,
    Recommendation, RecommendationKind, SearchOptions, SearchOutcome, SearchRequest,
    SlotAllocationService, TermId,
};
use slot_allocator::config::AppConfig;
use slot_allocator::error::AppError;
use std::path::PathBuf;

type StudioService = SlotAllocationService<InMemoryScheduleStore, InMemoryScheduleStore>;

#[derive(Args, Debug)]
pub(crate) struct SearchArgs {
    /// Person to find a slot for
    #[arg(long)]
    pub(crate) person: String,
    /// Term to search in (defaults to the store's active term)
    #[arg(long)]
    pub(crate) term: Option<String>,
    /// JSON schedule fixture to load (defaults to the bundled studio)
    #[arg(long)]
    pub(crate) fixture: Option<PathBuf>,
    /// Cap on the number of recommendations printed
    #[arg(long)]
    pub(crate) max_results: Option<usize>,
    /// Skip single displacements
    #[arg(long)]
    pub(crate) no_swaps: bool,
    /// Skip displacement chains
    #[arg(long)]
    pub(crate) no_chains: bool,
    /// Print the raw JSON outcome instead of the summary
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// JSON schedule fixture to load (defaults to the bundled studio)
    #[arg(long)]
    pub(crate) fixture: Option<PathBuf>,
    /// Person searched for, accepted, and searched for again
    #[arg(long, default_value = "zoe")]
    pub(crate) person: String,
}

pub(crate) fn run_search(args: SearchArgs) -> Result<(), AppError> {
    let SearchArgs {
        person,
        term,
        fixture,
        max_results,
        no_swaps,
        no_chains,
        json,
    } = args;

    let config = AppConfig::load()?;
    let store = load_store(fixture.as_deref())?;
    let service = SlotAllocationService::new(store.clone(), store, config.engine);

    let request = SearchRequest {
        person_id: PersonId::new(person),
        term_id: term.map(TermId::new),
        options: SearchOptions {
            max_results,
            include_swaps: !no_swaps,
            include_chains: !no_chains,
            ..SearchOptions::default()
        },
    };
    let outcome = service.search(&request)?;

    if json {
        match serde_json::to_string_pretty(&outcome) {
            Ok(payload) => println!("{payload}"),
            Err(err) => println!("Outcome unavailable as JSON: {err}"),
        }
    } else {
        render_outcome(&outcome);
    }
    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { fixture, person } = args;

    let config = AppConfig::load()?;
    let store = load_store(fixture.as_deref())?;
    let service = SlotAllocationService::new(store.clone(), store, config.engine);
    let person = PersonId::new(person);

    println!("Slot allocation demo");
    let outcome = service.search(&SearchRequest::new(person.clone()))?;
    render_outcome(&outcome);

    let Some(choice) = outcome.recommendations.first() else {
        println!("\nNothing to accept; {person} stays where they are.");
        return Ok(());
    };

    println!(
        "\nAccepting the top {} recommendation for {}",
        choice.kind.label(),
        choice.group_name
    );
    match service.accept(choice) {
        Ok(receipt) => render_receipt(&receipt),
        Err(AllocationServiceError::Plan(err)) => {
            println!("  Plan not applied: {err}");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    }

    render_group(&service, &outcome.term_id, &choice.group_id)?;
    for mv in choice.moves.iter().skip(1) {
        render_group(&service, &outcome.term_id, &mv.group_id)?;
    }

    println!("\nSearching again for {person}");
    let again = service.search(&SearchRequest::new(person))?;
    render_outcome(&again);

    println!("\nAccepting the same plan a second time");
    match service.accept(choice) {
        Ok(_) => println!("  Unexpectedly committed twice"),
        Err(AllocationServiceError::Plan(err)) if err.is_stale() => {
            println!("  Refused as stale: {err}");
        }
        Err(err) => println!("  Refused: {err}"),
    }

    Ok(())
}

fn render_outcome(outcome: &SearchOutcome) {
    println!(
        "Recommendations for {} in {} ({} found{})",
        outcome.person_id,
        outcome.term_id,
        outcome.recommendations.len(),
        if outcome.budget_exhausted {
            ", time budget exhausted"
        } else {
            ""
        }
    );
    if outcome.recommendations.is_empty() {
        println!("- no feasible placement right now");
    }
    for (rank, recommendation) in outcome.recommendations.iter().enumerate() {
        render_recommendation(rank + 1, recommendation);
    }
    for report in &outcome.phases {
        println!(
            "  {} phase: {} found{}",
            report.phase.label(),
            report.found,
            if report.completed { "" } else { " (cut short)" }
        );
    }
}

fn render_recommendation(rank: usize, recommendation: &Recommendation) {
    println!(
        "{rank}. {} | {} {} | {} | score {:.1} ({:.1}%) | benefit {:.1}",
        recommendation.group_name,
        recommendation.day.label(),
        recommendation.slot,
        recommendation.kind.label(),
        recommendation.score,
        recommendation.percentage,
        recommendation.benefit
    );
    if recommendation.kind == RecommendationKind::Direct {
        return;
    }
    for mv in &recommendation.moves {
        let leaving = mv
            .leaving
            .as_ref()
            .map(|person| format!(", replacing {person}"))
            .unwrap_or_default();
        println!(
            "   - {} -> {}{} (delta {:+.1})",
            mv.person_id, mv.group_id, leaving, mv.score_delta
        );
    }
}

fn render_receipt(receipt: &ExecutionReceipt) {
    println!(
        "- Plan {} committed at {}",
        receipt.plan_id,
        receipt
            .committed_at
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    for (group, version) in &receipt.versions {
        println!("  - {group} now at version {version}");
    }
}

fn render_group(
    service: &StudioService,
    term: &TermId,
    group: &GroupId,
) -> Result<(), AllocationServiceError> {
    let view = service.group(Some(term), group)?;
    let members: Vec<&str> = view
        .group
        .members
        .iter()
        .map(|member| member.as_str())
        .collect();
    println!(
        "  {} [{}] {}/{}: {}",
        view.group.name,
        view.effective_class.label(),
        view.size,
        view.capacity,
        members.join(", ")
    );
    Ok(())
}
