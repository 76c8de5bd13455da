//! CLI module for netdiag
//!
//! Provides commands:
//! - `diagnose`: open a session and drive it
//! - `resume`: answer a paused session's question
//! - `cancel`: conclude a session with a partial report
//! - `show`, `list`, `cleanup`: inspect and prune stored sessions

use crate::app::{AppConfig, Collaborators};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use uuid::Uuid;

pub mod diagnose;
pub mod output;
pub mod sessions;

/// Network connectivity diagnosis
#[derive(Parser, Debug)]
#[command(name = "netdiag")]
#[command(about = "Diagnose why one host cannot reach another")]
#[command(version)]
pub struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a diagnosis
    Diagnose(diagnose::DiagnoseArgs),
    /// Answer the pending question of a paused session
    Resume {
        /// Session id
        session_id: Uuid,
        /// Answer to the pending question
        #[arg(long)]
        answer: String,
        #[command(flatten)]
        collaborators: CollaboratorArgs,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Cancel a session, concluding it with a partial report
    Cancel {
        /// Session id
        session_id: Uuid,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a stored session
    Show {
        /// Session id
        session_id: Uuid,
        /// Include the message transcript
        #[arg(long)]
        messages: bool,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List stored sessions
    List {
        /// Only sessions in this status (active, waiting_user, completed, error)
        #[arg(long)]
        status: Option<String>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete sessions older than the configured TTL
    Cleanup,
}

/// Where probes run and where host facts come from
#[derive(Args, Debug, Clone, Default)]
pub struct CollaboratorArgs {
    /// Replay scripted command output from a TOML scenario
    #[arg(long, value_name = "FILE")]
    pub scenario: Option<PathBuf>,
    /// Host inventory JSON document
    #[arg(long, value_name = "FILE")]
    pub inventory: Option<PathBuf>,
}

impl From<CollaboratorArgs> for Collaborators {
    fn from(args: CollaboratorArgs) -> Self {
        Self {
            scenario: args.scenario,
            inventory: args.inventory,
        }
    }
}

/// Run the CLI command
pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Diagnose(args)) => diagnose::run(args, &config).await,
        Some(Commands::Resume {
            session_id,
            answer,
            collaborators,
            json,
        }) => sessions::resume(&config, session_id, answer, collaborators.into(), json).await,
        Some(Commands::Cancel { session_id, json }) => {
            sessions::cancel(&config, session_id, json).await
        }
        Some(Commands::Show {
            session_id,
            messages,
            json,
        }) => sessions::show(&config, session_id, messages, json).await,
        Some(Commands::List { status, json }) => {
            sessions::list(&config, status.as_deref(), json).await
        }
        Some(Commands::Cleanup) => sessions::cleanup(&config).await,
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
    fn test_cli_is_well_formed() {
        <Cli as clap::CommandFactory>::command().debug_assert();
    }

    #[test]
    fn test_parse_diagnose() {
        let cli = Cli::try_parse_from([
            "netdiag",
            "diagnose",
            "--source",
            "10.0.1.10",
            "--target",
            "10.0.2.20",
            "--port",
            "80",
            "--scenario",
            "scenario.toml",
            "--dynamic",
        ])
        .unwrap();

        let Some(Commands::Diagnose(args)) = cli.command else {
            panic!("expected diagnose");
        };
        assert_eq!(args.port, Some(80));
        assert!(args.dynamic);
        assert_eq!(args.collaborators.scenario, Some(PathBuf::from("scenario.toml")));
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_parse_resume_requires_answer() {
        let id = Uuid::new_v4().to_string();
        assert!(Cli::try_parse_from(["netdiag", "resume", id.as_str()]).is_err());

        let cli = Cli::try_parse_from([
            "netdiag",
            "--log-format",
            "json",
            "resume",
            id.as_str(),
            "--answer",
            "nginx",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(matches!(cli.command, Some(Commands::Resume { ref answer, .. }) if answer == "nginx"));
    }
}
