//! Command-line interface for formdrop.
//!
//! This module provides the CLI structure for the `formdrop` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::app::RunMode;

pub use commands::{ConfigCommand, EntriesCommand, ServeCommand, StatusCommand};

/// formdrop - Collect web form submissions into a local JSON file
///
/// Serves a small site over HTTP, forwards every form POST over a local UDP
/// channel, and appends each submission, timestamped, to a JSON store.
#[derive(Debug, Parser)]
#[command(name = "formdrop")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP front end and the collector
    Serve(ServeCommand),

    /// Run only the HTTP front end
    Http(ServeCommand),

    /// Run only the collector
    Collect(ServeCommand),

    /// Print stored entries
    Entries(EntriesCommand),

    /// Show addresses and store status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Command {
    /// The services a run command starts, or `None` for other commands.
    #[must_use]
    pub fn run_mode(&self) -> Option<(RunMode, &ServeCommand)> {
        match self {
            Self::Serve(cmd) => Some((RunMode::All, cmd)),
            Self::Http(cmd) => Some((RunMode::HttpOnly, cmd)),
            Self::Collect(cmd) => Some((RunMode::CollectorOnly, cmd)),
            _ => None,
        }
    }
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
        assert_eq!(Cli::command().get_name(), "formdrop");
    }

    #[test]
    fn test_verbosity_flags() {
        use crate::logging::Verbosity;

        assert_eq!(parse(&["formdrop", "status"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["formdrop", "-v", "status"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["formdrop", "-vv", "status"]).verbosity(), Verbosity::Trace);
        assert_eq!(parse(&["formdrop", "-q", "-v", "status"]).verbosity(), Verbosity::Quiet);
    }

    #[test]
    fn test_parse_run_commands() {
        let cli = parse(&["formdrop", "serve"]);
        assert!(matches!(cli.command.run_mode(), Some((RunMode::All, _))));

        let cli = parse(&["formdrop", "http", "--http-port", "8080"]);
        let Some((mode, cmd)) = cli.command.run_mode() else {
            panic!("http should be a run command");
        };
        assert_eq!(mode, RunMode::HttpOnly);
        assert_eq!(cmd.http_port, Some(8080));

        let cli = parse(&["formdrop", "collect", "--data", "/tmp/d.json"]);
        let Some((mode, cmd)) = cli.command.run_mode() else {
            panic!("collect should be a run command");
        };
        assert_eq!(mode, RunMode::CollectorOnly);
        assert_eq!(cmd.data, Some(PathBuf::from("/tmp/d.json")));
    }

    #[test]
    fn test_parse_entries() {
        let cli = parse(&["formdrop", "entries", "--last", "5", "--json"]);
        let Command::Entries(cmd) = cli.command else {
            panic!("expected entries command");
        };
        assert_eq!(cmd.last, Some(5));
        assert!(cmd.json);
        assert!(Command::Entries(cmd).run_mode().is_none());
    }

    #[test]
    fn test_parse_config_subcommands() {
        let cli = parse(&["formdrop", "config", "show", "--json"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Show { json: true })
        ));

        let cli = parse(&["formdrop", "config", "validate", "-f", "/etc/formdrop.toml"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["formdrop", "-c", "/custom/config.toml", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }
}
