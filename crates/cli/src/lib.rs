pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "orumaiv",
    about = "Orumaiv operator CLI",
    long_about = "Inspect configuration, check runtime readiness, and run one-shot message interpretation.",
    after_help = "Examples:\n  orumaiv doctor --json\n  orumaiv config\n  orumaiv interpret \"remind me tomorrow at 9\""
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
    #[command(about = "Validate config and model credential readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Interpret one message with the configured model and print the agent response")]
    Interpret {
        #[arg(help = "Message text to interpret")]
        text: String,
        #[arg(long, help = "Title of the active task to include as context")]
        task_title: Option<String>,
        #[arg(long, help = "Description of the active task to include as context")]
        task_description: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Interpret { text, task_title, task_description } => {
            commands::interpret::run(commands::interpret::InterpretRequest {
                text,
                task_title,
                task_description,
            })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
