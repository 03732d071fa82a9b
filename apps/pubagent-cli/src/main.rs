//! `pubagent`: ask questions about the documents in the corpus directory.
//!
//! Usage:
//!   pubagent                      # interactive loop (same as `pubagent chat`)
//!   pubagent ask "question"       # one answer, then exit
//!   pubagent index                # rebuild the index from the corpus
//!   pubagent status               # show corpus and index state

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pubagent_core::config::Config;

#[derive(Parser)]
#[command(name = "pubagent", version, about = "Answer questions from a private document corpus")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive question loop; type `exit` or `quit` to leave
    Chat,
    /// Answer a single question
    Ask {
        question: Vec<String>,
        /// Print the sources used for the answer
        #[arg(long)]
        sources: bool,
    },
    /// Rebuild the index from the corpus directory
    Index,
    /// Show corpus and index state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug,lance=warn,lancedb=warn" } else { "info,lance=warn,lancedb=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let settings = config.settings(&std::env::current_dir()?)?;

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => commands::chat(&settings).await,
        Command::Ask { question, sources } => commands::ask(&settings, &question.join(" "), sources).await,
        Command::Index => commands::index(&settings).await,
        Command::Status => commands::status(&settings).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_chat() {
        let cli = Cli::try_parse_from(["pubagent"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn ask_collects_question_words() {
        let cli = Cli::try_parse_from(["pubagent", "ask", "--sources", "what", "is", "it"]).unwrap();
        match cli.command {
            Some(Command::Ask { question, sources }) => {
                assert_eq!(question.join(" "), "what is it");
                assert!(sources);
            }
            _ => panic!("expected ask"),
        }
    }
}
