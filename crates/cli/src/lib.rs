pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::demo::DemoOutcome;

#[derive(Debug, Parser)]
#[command(
    name = "leadflow",
    about = "Leadflow funnel operator CLI",
    long_about = "Inspect configuration, validate lead payloads, query the package catalog, and run the funnel against an in-memory backend.",
    after_help = "Examples:\n  leadflow config\n  leadflow validate --file lead.json\n  leadflow packages --service SEO --region India\n  leadflow demo --outcome dismissed"
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
    #[command(about = "List supported regions with their currency and calling code")]
    Regions,
    #[command(about = "Validate a lead JSON file the way the intake form does")]
    Validate {
        #[arg(long, help = "Path to a JSON file with the lead form fields")]
        file: PathBuf,
    },
    #[command(about = "List services offered by the configured backend")]
    Services,
    #[command(about = "List packages from the configured backend")]
    Packages {
        #[arg(long, help = "Only packages for this service")]
        service: Option<String>,
        #[arg(long, help = "Only packages priced for this region")]
        region: Option<String>,
    },
    #[command(about = "Run one lead through the funnel against the in-memory backend")]
    Demo {
        #[arg(long, value_enum, default_value_t = DemoOutcome::Verified)]
        outcome: DemoOutcome,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Regions => commands::regions::run(),
        Command::Validate { file } => commands::validate::run(&file),
        Command::Services => commands::catalog::services(),
        Command::Packages { service, region } => {
            commands::catalog::packages(service.as_deref(), region.as_deref())
        }
        Command::Demo { outcome } => commands::demo::run(outcome),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
