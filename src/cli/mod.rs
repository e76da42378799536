//! CLI argument parsing using clap 4.x derive macros

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Turn-gated reading-profile interviews
///
/// Every turn is checkpointed, so an interview can be stopped and resumed
/// by session id.
#[derive(Parser, Debug)]
#[command(name = "wren")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ./wren.toml, then ~/.config/wren/wren.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Checkpoint directory for the file backend
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an interview over stdin
    Interview {
        /// Session to start or resume (generated when omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Folder for finished transcripts (defaults next to the checkpoints)
        #[arg(long)]
        archive_dir: Option<PathBuf>,
    },

    /// Process one turn of a session and print the outcome as JSON
    Turn {
        /// Session ID
        session: String,

        /// The user's answer
        #[arg(num_args = 1.., required = true)]
        text: Vec<String>,
    },

    /// Inspect stored sessions
    Session {
        #[command(subcommand)]
        cmd: SessionCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Show the latest (or a specific) checkpoint of a session
    Show {
        /// Session ID
        id: String,

        /// Checkpoint ID instead of the latest one
        #[arg(long)]
        checkpoint: Option<String>,
    },
    /// List the checkpoints of a session, oldest first
    List {
        /// Session ID
        id: String,

        /// Maximum number of checkpoints to show
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Delete every checkpoint of a session
    Delete {
        /// Session ID
        id: String,
    },
    /// Verify that the latest alias matches the newest checkpoint
    Check {
        /// Session ID
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_turn() {
        let cli = Cli::try_parse_from(["wren", "turn", "cli_1", "I", "like", "Dune"]).unwrap();
        match cli.command {
            Commands::Turn { session, text } => {
                assert_eq!(session, "cli_1");
                assert_eq!(text.join(" "), "I like Dune");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "wren", "session", "list", "s1", "--limit", "3", "--data-dir", "/tmp/w",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/w")));
        assert!(matches!(
            cli.command,
            Commands::Session {
                cmd: SessionCommand::List { limit: Some(3), .. }
            }
        ));
    }

    #[test]
    fn test_turn_requires_text() {
        assert!(Cli::try_parse_from(["wren", "turn", "cli_1"]).is_err());
    }
}
