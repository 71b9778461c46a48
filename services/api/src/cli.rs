use crate::demo::{
    run_demo, run_rent_quote, run_utility_import, DemoArgs, RentQuoteArgs, UtilityImportArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use dormitory::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Dormitory Housing Service",
    about = "Run and exercise the dormitory allocation and billing engine from the command line",
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
    /// Rent calculations that do not touch the ledger
    Rent {
        #[command(subcommand)]
        command: RentCommand,
    },
    /// Utility billing against the configured ledger
    Utility {
        #[command(subcommand)]
        command: UtilityCommand,
    },
    /// Walk through registration, approval, transfer and billing on a scratch ledger
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum RentCommand {
    /// Print the prorated rent breakdown for an occupancy window
    Quote(RentQuoteArgs),
}

#[derive(Subcommand, Debug)]
enum UtilityCommand {
    /// Record meter readings from a CSV export and bill the occupants
    Import(UtilityImportArgs),
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
        Command::Rent {
            command: RentCommand::Quote(args),
        } => run_rent_quote(args),
        Command::Utility {
            command: UtilityCommand::Import(args),
        } => run_utility_import(args),
        Command::Demo(args) => run_demo(args),
    }
}
