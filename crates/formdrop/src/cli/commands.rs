//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::config::Config;

/// Arguments shared by the commands that start services.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Override the HTTP port
    #[arg(long, value_name = "PORT")]
    pub http_port: Option<u16>,

    /// Override the ingest (UDP) port
    #[arg(long, value_name = "PORT")]
    pub ingest_port: Option<u16>,

    /// Override the store file path
    #[arg(long, value_name = "FILE")]
    pub data: Option<PathBuf>,
}

impl ServeCommand {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.http_port {
            config.http.port = port;
        }
        if let Some(port) = self.ingest_port {
            config.ingest.port = port;
        }
        if let Some(data) = &self.data {
            config.storage.data_path.clone_from(data);
        }
    }
}

/// Entries command arguments.
#[derive(Debug, Args)]
pub struct EntriesCommand {
    /// Show only the last N entries
    #[arg(short, long)]
    pub last: Option<usize>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
