pub mod bootstrap;
pub mod commands;
pub mod logging;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "agentcart",
    about = "Agentcart conversational checkout CLI",
    long_about = "Shop with an LLM shopping agent, check out through a payment agent, and manage the local store.",
    after_help = "Examples:\n  agentcart chat --guest\n  agentcart chat --user alice --email alice@example.com\n  agentcart config\n  agentcart migrate"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Start an interactive shopping session")]
    Chat {
        #[arg(long, help = "Durable shopper id; cart and history are stored in the database")]
        user: Option<String>,
        #[arg(long, requires = "user", help = "E-mail used for order confirmations")]
        email: Option<String>,
        #[arg(long, conflicts_with = "user", help = "Shop as an anonymous guest (the default)")]
        guest: bool,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Print the effective configuration with secrets redacted")]
    Config,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { user, email, guest: _ } => commands::chat::run(user, email),
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
