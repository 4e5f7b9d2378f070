pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "waypoint",
    about = "Waypoint operator CLI",
    long_about = "Inspect configuration, check reasoning and tool service readiness, and explore \
                  the handler registry without starting the HTTP server.",
    after_help = "Examples:\n  waypoint doctor --json\n  waypoint config\n  waypoint find \
                  \"what does a t3.small cost per month\"\n  waypoint test general \
                  \"what is a VPC\"\n  waypoint export registry.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and check the reasoning endpoint and tool service")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List registered handlers and their capabilities")]
    Agents,
    #[command(about = "Show registration details for one handler")]
    Status {
        #[arg(help = "Handler id, e.g. cost_analysis")]
        handler: String,
    },
    #[command(about = "Classify a query and print the routing decision without dispatching it")]
    Find {
        #[arg(help = "Query text to classify")]
        query: String,
    },
    #[command(about = "Run one handler directly on a query, bypassing classification")]
    Test {
        #[arg(help = "Handler id, e.g. cost_analysis")]
        handler: String,
        #[arg(help = "Query text to send to the handler")]
        query: String,
    },
    #[command(about = "Write the handler registry to a JSON file")]
    Export {
        #[arg(help = "Destination file")]
        path: PathBuf,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Agents => commands::registry::agents(),
        Command::Status { handler } => commands::registry::status(&handler),
        Command::Find { query } => commands::registry::find(&query),
        Command::Test { handler, query } => commands::registry::test(&handler, &query),
        Command::Export { path } => commands::registry::export(&path),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
