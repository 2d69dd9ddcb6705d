pub mod commands;
pub mod logging;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::config::ConfigArgs;
use commands::show::ShowArgs;
use commands::smoke::SmokeArgs;
use commands::train::TrainArgs;

#[derive(Debug, Parser)]
#[command(
    name = "basketry",
    about = "Basketry recommendation trainer",
    long_about = "Mine association rules from point-of-sale receipts and publish popularity and recommendation artifacts.",
    after_help = "Examples:\n  basketry train --transactions receipts.csv --catalog product.csv\n  basketry config\n  basketry smoke\n  basketry show --product Latte"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run the training pipeline and commit the artifact set")]
    Train(TrainArgs),
    #[command(about = "Train twice into a scratch directory and check artifacts and determinism")]
    Smoke(SmokeArgs),
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config(ConfigArgs),
    #[command(about = "Print the most popular products and recommendations from committed artifacts")]
    Show(ShowArgs),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Train(args) => commands::train::run(&args),
        Command::Smoke(args) => commands::smoke::run(&args),
        Command::Config(args) => commands::config::run(&args),
        Command::Show(args) => commands::show::run(&args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
