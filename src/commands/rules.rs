//! Rule listing, statistics and idempotent rule edits

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Display;

use iptctl::iptables::{IpTables, Stat};

use crate::output::{print_output, TableOutput, TableRow};

impl TableRow for Stat {
    fn cells(&self) -> Vec<String> {
        vec![
            self.packets.to_string(),
            self.bytes.to_string(),
            self.target.clone(),
            self.protocol.clone(),
            self.opt.clone(),
            self.input.clone(),
            self.output.clone(),
            self.source.to_string(),
            self.destination.to_string(),
            self.options.clone(),
        ]
    }

    fn right_aligned() -> &'static [usize] {
        &[0, 1]
    }
}

/// Canonical rule lines of one chain
#[derive(Debug, Serialize)]
pub struct RuleList {
    pub table: String,
    pub chain: String,
    pub rules: Vec<String>,
}

impl Display for RuleList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{}", rule)?;
        }
        Ok(())
    }
}

/// Outcome of a single rule edit
#[derive(Debug, Serialize)]
pub struct RuleChange {
    pub success: bool,
    pub action: &'static str,
    pub table: String,
    pub chain: String,
    pub rule: String,
}

impl Display for RuleChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}: {}", self.action, self.table, self.chain, self.rule)
    }
}

fn change(action: &'static str, table: &str, chain: &str, rule: &[String]) -> RuleChange {
    RuleChange {
        success: true,
        action,
        table: table.to_string(),
        chain: chain.to_string(),
        rule: rule.join(" "),
    }
}

/// Run `iptctl list`
pub fn list(ipt: &IpTables, table: &str, chain: &str, counters: bool, json: bool) -> Result<()> {
    let rules = if counters {
        ipt.list_with_counters(table, chain)
    } else {
        ipt.list(table, chain)
    }
    .with_context(|| format!("Failed to list {}/{}", table, chain))?;

    let output = RuleList {
        table: table.to_string(),
        chain: chain.to_string(),
        rules,
    };
    print_output(&output, json);
    Ok(())
}

/// Run `iptctl stats`
pub fn stats(ipt: &IpTables, table: &str, chain: &str, from_rules: bool, json: bool) -> Result<()> {
    let stats = if from_rules {
        ipt.rule_stats(table, chain)
    } else {
        ipt.structured_stats(table, chain)
    }
    .with_context(|| format!("Failed to read counters of {}/{}", table, chain))?;

    let output = TableOutput {
        headers: [
            "Pkts", "Bytes", "Target", "Prot", "Opt", "In", "Out", "Source", "Destination", "Options",
        ]
        .iter()
        .map(|h| h.to_string())
        .collect(),
        rows: stats,
    };
    print_output(&output, json);
    Ok(())
}

/// Run `iptctl check`. Returns whether the rule is present.
pub fn check(ipt: &IpTables, table: &str, chain: &str, rule: &[String], json: bool) -> Result<bool> {
    let present = ipt
        .exists(table, chain, rule)
        .with_context(|| format!("Failed to check rule in {}/{}", table, chain))?;

    #[derive(Serialize)]
    struct CheckResult {
        present: bool,
        rule: String,
    }

    impl Display for CheckResult {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let word = if self.present { "present" } else { "absent" };
            write!(f, "{}: {}", word, self.rule)
        }
    }

    print_output(
        &CheckResult {
            present,
            rule: rule.join(" "),
        },
        json,
    );
    Ok(present)
}

/// Run `iptctl append`
pub fn append(
    ipt: &IpTables,
    table: &str,
    chain: &str,
    unique: bool,
    rule: &[String],
    json: bool,
) -> Result<()> {
    let (action, res) = if unique {
        ("Ensured in", ipt.append_unique(table, chain, rule))
    } else {
        ("Appended to", ipt.append(table, chain, rule))
    };
    res.with_context(|| format!("Failed to append to {}/{}", table, chain))?;

    print_output(&change(action, table, chain, rule), json);
    Ok(())
}

/// Run `iptctl insert`
pub fn insert(
    ipt: &IpTables,
    table: &str,
    chain: &str,
    position: u32,
    unique: bool,
    rule: &[String],
    json: bool,
) -> Result<()> {
    if position == 0 {
        anyhow::bail!("Positions start at 1");
    }
    let (action, res) = if unique {
        ("Ensured in", ipt.insert_unique(table, chain, position, rule))
    } else {
        ("Inserted into", ipt.insert(table, chain, position, rule))
    };
    res.with_context(|| format!("Failed to insert into {}/{} at {}", table, chain, position))?;

    print_output(&change(action, table, chain, rule), json);
    Ok(())
}

/// Run `iptctl delete`
pub fn delete(
    ipt: &IpTables,
    table: &str,
    chain: &str,
    if_exists: bool,
    rule: &[String],
    json: bool,
) -> Result<()> {
    let (action, res) = if if_exists {
        ("Ensured absent from", ipt.delete_if_exists(table, chain, rule))
    } else {
        ("Deleted from", ipt.delete(table, chain, rule))
    };
    res.with_context(|| format!("Failed to delete from {}/{}", table, chain))?;

    print_output(&change(action, table, chain, rule), json);
    Ok(())
}
