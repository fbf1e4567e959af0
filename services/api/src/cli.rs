use crate::report::{run_allocate, run_rank, AllocateArgs, RankArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use effipay::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "effipay",
    about = "Recommend how to split a purchase across payment instruments",
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
    /// Compute a single allocation from profile fixtures and print the trace
    Allocate(AllocateArgs),
    /// Rank a user's instruments without a pending transaction
    Rank(RankArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Allocate(args) => run_allocate(args).await,
        Command::Rank(args) => run_rank(args).await,
    }
}
