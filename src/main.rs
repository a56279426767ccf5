//! iptctl - idempotent iptables/ip6tables rule management
//!
//! Thin CLI over the `iptctl` library: detects the backend once, then runs
//! a single rule or chain operation against it.

mod cli;
mod commands;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::filter::{Directive, LevelFilter};

use cli::{Cli, Commands};
use iptctl::config::Settings;
use iptctl::iptables::{IpTables, Protocol};

fn main() {
    // Logs go to stderr so stdout stays parseable
    let default_directive: Directive = "iptctl=info"
        .parse()
        .unwrap_or_else(|_| LevelFilter::INFO.into());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_directive),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn open(cli: &Cli) -> Result<IpTables> {
    let settings = Settings::load_or_default(cli.config.as_deref())?;
    let protocol = if cli.ipv6 { Protocol::V6 } else { Protocol::V4 };

    let mut builder = settings.builder_for(protocol);
    if let Some(path) = &cli.path {
        builder = builder.path(path.clone());
    }
    if let Some(wait) = cli.wait {
        builder = builder.timeout(wait);
    }
    builder
        .build()
        .with_context(|| format!("Failed to detect {} backend", protocol))
}

/// Runs the command; `Ok(false)` means a negative answer rather than a failure.
fn run(cli: Cli) -> Result<bool> {
    let ipt = open(&cli)?;
    let table = cli.table.as_str();
    let (json, yes) = (cli.json, cli.yes);

    match &cli.command {
        Commands::Info => commands::info::info(&ipt, json)?,
        Commands::Chains => commands::chains::chains(&ipt, table, json)?,
        Commands::List { chain, counters } => {
            commands::rules::list(&ipt, table, chain, *counters, json)?
        }
        Commands::Stats { chain, from_rules } => {
            commands::rules::stats(&ipt, table, chain, *from_rules, json)?
        }
        Commands::Check { chain, rule } => {
            return commands::rules::check(&ipt, table, chain, rule, json)
        }
        Commands::Append {
            chain,
            unique,
            rule,
        } => commands::rules::append(&ipt, table, chain, *unique, rule, json)?,
        Commands::Insert {
            chain,
            position,
            unique,
            rule,
        } => commands::rules::insert(&ipt, table, chain, *position, *unique, rule, json)?,
        Commands::Delete {
            chain,
            if_exists,
            rule,
        } => commands::rules::delete(&ipt, table, chain, *if_exists, rule, json)?,
        Commands::NewChain { chain } => commands::chains::new_chain(&ipt, table, chain, json)?,
        Commands::ClearChain { chain } => {
            commands::chains::clear_chain(&ipt, table, chain, yes, json)?
        }
        Commands::DeleteChain { chain, clear } => {
            commands::chains::delete_chain(&ipt, table, chain, *clear, yes, json)?
        }
        Commands::RenameChain { old, new } => {
            commands::chains::rename_chain(&ipt, table, old, new, json)?
        }
        Commands::Policy { chain, target } => {
            commands::chains::policy(&ipt, table, chain, target, yes, json)?
        }
        Commands::Restore { file } => commands::restore::restore(&ipt, table, file, yes, json)?,
    }
    Ok(true)
}
