//! `formdrop` - CLI for the form collector
//!
//! This binary starts the HTTP front end and/or the collector, and offers a
//! few commands for inspecting the store and the configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::collections::BTreeMap;

use anyhow::Context;
use clap::Parser;

use formdrop::cli::{Cli, Command, ConfigCommand, EntriesCommand};
use formdrop::{channel, init_logging, Config, Record, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    let mut config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    if let Some((mode, overrides)) = cli.command.run_mode() {
        overrides.apply(&mut config);
        config.validate()?;
        formdrop::app::run(&config, mode).await?;
        return Ok(());
    }

    match cli.command {
        Command::Entries(cmd) => handle_entries(&config, &cmd),
        Command::Status(cmd) => handle_status(&config, cmd.json),
        Command::Config(cmd) => handle_config(&config, cmd),
        Command::Serve(_) | Command::Http(_) | Command::Collect(_) => Ok(()),
    }
}

fn handle_entries(config: &Config, cmd: &EntriesCommand) -> anyhow::Result<()> {
    // Read-only: never create the store from here.
    let store = Store::at(config.data_path());
    let entries = store.load();
    let skip = cmd.last.map_or(0, |n| entries.len().saturating_sub(n));
    let shown: Vec<_> = entries.iter().skip(skip).collect();

    if cmd.json {
        let map: BTreeMap<&str, &Record> = shown
            .into_iter()
            .map(|(key, record)| (key.as_str(), record))
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
    } else {
        if shown.is_empty() {
            println!("No entries in {}", store.path().display());
        }
        for (key, record) in shown {
            let fields: Vec<String> = record.iter().map(|(k, v)| format!("{k}={v:?}")).collect();
            println!("{key}  {}", fields.join(", "));
        }
    }
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = Store::at(config.data_path());
    let stats = store.stats();
    let collector_running = channel::is_in_use(config.ingest_addr());

    if json {
        let status = serde_json::json!({
            "http_address": config.http_addr(),
            "ingest_address": config.ingest_addr(),
            "collector_running": collector_running,
            "store_path": store.path(),
            "store": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("formdrop status");
        println!("---------------");
        println!("HTTP:          http://{}", config.http_addr());
        println!(
            "Ingest:        udp://{} ({})",
            config.ingest_addr(),
            if collector_running { "in use" } else { "free" }
        );
        println!("Store:         {}", store.path().display());
        println!("Entries:       {}", stats.entries);
        println!("File size:     {} bytes", stats.file_size);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[HTTP]");
                println!("  Listen address:     {}", config.http_addr());
                println!();
                println!("[Ingest]");
                println!("  Channel address:    {}", config.ingest_addr());
                println!("  Max datagram size:  {}", config.ingest.max_datagram_size);
                println!();
                println!("[Storage]");
                println!("  Data path:          {}", config.data_path().display());
                println!();
                println!("[Site]");
                println!("  Base directory:     {}", config.site.base_dir.display());
                println!("  Index page:         {}", config.site.index_page.display());
                println!("  Message page:       {}", config.site.message_page.display());
                println!("  Error page:         {}", config.site.error_page.display());
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            Config::load_from(Some(path)).context("configuration is invalid")?;
            println!("Configuration is valid.");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validate_fails_on_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ingest]\nmax_datagram_size = 0\n").unwrap();

        let result = handle_config(
            &Config::default(),
            ConfigCommand::Validate { file: Some(path) },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_config_validate_accepts_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[http]\nport = 8080\n").unwrap();

        let result = handle_config(
            &Config::default(),
            ConfigCommand::Validate { file: Some(path) },
        );
        assert!(result.is_ok());
    }
}
