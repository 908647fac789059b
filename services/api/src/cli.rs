use crate::demo::{run_demo, run_search, DemoArgs, SearchArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use slot_allocator::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Slot Allocator",
    about = "Serve, query, and demonstrate the lesson slot allocation engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Rank slot recommendations for one person and print them
    Search(SearchArgs),
    /// Walk through search, accept, and re-search against the bundled studio schedule
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Seed the in-memory store from a JSON schedule fixture instead of the bundled studio
    #[arg(long)]
    pub(crate) fixture: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Search(args) => run_search(args),
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_flags_parse() {
        let cli = Cli::try_parse_from([
            "slot-allocator-api",
            "search",
            "--person",
            "zoe",
            "--max-results",
            "3",
            "--no-chains",
        ])
        .expect("arguments parse");

        match cli.command {
            Some(Command::Search(args)) => {
                assert_eq!(args.person, "zoe");
                assert_eq!(args.max_results, Some(3));
                assert!(args.no_chains);
                assert!(!args.no_swaps);
                assert!(args.term.is_none());
            }
            other => panic!("expected search command, got {other:?}"),
        }
    }

    #[test]
    fn serve_is_the_default_command() {
        let cli = Cli::try_parse_from(["slot-allocator-api"]).expect("arguments parse");
        assert!(cli.command.is_none());
    }
}
