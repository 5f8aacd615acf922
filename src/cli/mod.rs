//! CLI module for Cascade
//!
//! Provides commands:
//! - `ask`: Submit queries and print their results plus any follow-ups
//! - `batch`: Run one query per line of a file
//! - `config`: Print the effective configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::app;

pub mod ask;
pub mod batch;
pub mod render;

/// Cascade query engine CLI
#[derive(Parser, Debug)]
#[command(name = "cascade")]
#[command(about = "Query scheduling engine for a remote agent service")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit one or more queries
    Ask {
        /// Query texts, submitted in order
        #[arg(required = true)]
        queries: Vec<String>,
        /// Conversation id used to scope the cache
        #[arg(short, long)]
        conversation: Option<String>,
    },
    /// Run every non-empty line of a file as a batch query
    Batch {
        /// File with one query per line
        file: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Ask {
            queries,
            conversation,
        }) => {
            let config = app::load_config()?;
            ask::run(&config, queries, conversation).await
        }
        Some(Commands::Batch { file }) => {
            let config = app::load_config()?;
            batch::run(&config, &file).await
        }
        Some(Commands::Config) => {
            let config = app::load_config()?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask() {
        let cli = Cli::parse_from(["cascade", "ask", "sales report", "-c", "conv-1"]);
        match cli.command {
            Some(Commands::Ask {
                queries,
                conversation,
            }) => {
                assert_eq!(queries, vec!["sales report"]);
                assert_eq!(conversation.as_deref(), Some("conv-1"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_ask_requires_a_query() {
        assert!(Cli::try_parse_from(["cascade", "ask"]).is_err());
    }

    #[test]
    fn test_parse_batch() {
        let cli = Cli::parse_from(["cascade", "batch", "queries.txt"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Batch { file }) if file == PathBuf::from("queries.txt")
        ));
    }
}
