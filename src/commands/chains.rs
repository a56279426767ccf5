//! Chain management

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Display;

use iptctl::iptables::IpTables;

use crate::output::{confirm, print_output};

#[derive(Debug, Serialize)]
pub struct ChainList {
    pub table: String,
    pub chains: Vec<String>,
}

impl Display for ChainList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for chain in &self.chains {
            writeln!(f, "{}", chain)?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct ChainChange {
    pub success: bool,
    pub table: String,
    pub chain: String,
    #[serde(skip)]
    pub message: String,
}

impl Display for ChainChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn done(table: &str, chain: &str, message: String, json: bool) {
    let result = ChainChange {
        success: true,
        table: table.to_string(),
        chain: chain.to_string(),
        message,
    };
    print_output(&result, json);
}

/// Run `iptctl chains`
pub fn chains(ipt: &IpTables, table: &str, json: bool) -> Result<()> {
    let chains = ipt
        .list_chains(table)
        .with_context(|| format!("Failed to list chains of table {}", table))?;
    print_output(
        &ChainList {
            table: table.to_string(),
            chains,
        },
        json,
    );
    Ok(())
}

/// Run `iptctl new-chain`
pub fn new_chain(ipt: &IpTables, table: &str, chain: &str, json: bool) -> Result<()> {
    ipt.new_chain(table, chain)
        .with_context(|| format!("Failed to create {}/{}", table, chain))?;
    done(table, chain, format!("Created chain {}/{}", table, chain), json);
    Ok(())
}

/// Run `iptctl clear-chain`
pub fn clear_chain(ipt: &IpTables, table: &str, chain: &str, yes: bool, json: bool) -> Result<()> {
    if !confirm(&format!("Flush all rules of {}/{}?", table, chain), yes) {
        anyhow::bail!("Operation cancelled");
    }
    ipt.clear_chain(table, chain)
        .with_context(|| format!("Failed to clear {}/{}", table, chain))?;
    done(table, chain, format!("Cleared chain {}/{}", table, chain), json);
    Ok(())
}

/// Run `iptctl delete-chain`
pub fn delete_chain(
    ipt: &IpTables,
    table: &str,
    chain: &str,
    clear: bool,
    yes: bool,
    json: bool,
) -> Result<()> {
    if !confirm(&format!("Delete chain {}/{}?", table, chain), yes) {
        anyhow::bail!("Operation cancelled");
    }
    let res = if clear {
        ipt.clear_and_delete_chain(table, chain)
    } else {
        ipt.delete_chain(table, chain)
    };
    res.with_context(|| format!("Failed to delete {}/{}", table, chain))?;
    done(table, chain, format!("Deleted chain {}/{}", table, chain), json);
    Ok(())
}

/// Run `iptctl rename-chain`
pub fn rename_chain(ipt: &IpTables, table: &str, old: &str, new: &str, json: bool) -> Result<()> {
    ipt.rename_chain(table, old, new)
        .with_context(|| format!("Failed to rename {}/{}", table, old))?;
    done(table, new, format!("Renamed {}/{} to {}", table, old, new), json);
    Ok(())
}

/// Run `iptctl policy`
pub fn policy(
    ipt: &IpTables,
    table: &str,
    chain: &str,
    target: &str,
    yes: bool,
    json: bool,
) -> Result<()> {
    if !confirm(&format!("Set policy of {}/{} to {}?", table, chain, target), yes) {
        anyhow::bail!("Operation cancelled");
    }
    ipt.change_policy(table, chain, target)
        .with_context(|| format!("Failed to set policy of {}/{}", table, chain))?;
    done(table, chain, format!("Policy of {}/{} is now {}", table, chain, target), json);
    Ok(())
}
