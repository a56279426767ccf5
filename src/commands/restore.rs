//! Bulk chain replacement from a JSON file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::path::Path;

use iptctl::iptables::{ChainRules, IpTables};

use crate::output::{confirm, print_output};

/// A rule written either as one line or as pre-split tokens
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RuleSpec {
    Line(String),
    Tokens(Vec<String>),
}

impl RuleSpec {
    fn into_tokens(self) -> Vec<String> {
        match self {
            RuleSpec::Line(line) => line.split_whitespace().map(String::from).collect(),
            RuleSpec::Tokens(tokens) => tokens,
        }
    }
}

fn parse_chain_rules(text: &str) -> Result<ChainRules> {
    let raw: HashMap<String, Vec<RuleSpec>> =
        serde_json::from_str(text).context("Expected an object of chain name to rule list")?;
    Ok(raw
        .into_iter()
        .map(|(chain, rules)| (chain, rules.into_iter().map(RuleSpec::into_tokens).collect()))
        .collect())
}

/// Run `iptctl restore`
pub fn restore(ipt: &IpTables, table: &str, file: &Path, yes: bool, json: bool) -> Result<()> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let chains = parse_chain_rules(&text).with_context(|| format!("in {}", file.display()))?;

    let mut names: Vec<String> = chains.keys().cloned().collect();
    names.sort();

    if !confirm(
        &format!("Replace the contents of {} in table {}?", names.join(", "), table),
        yes,
    ) {
        anyhow::bail!("Operation cancelled");
    }

    ipt.restore(table, &chains)
        .with_context(|| format!("Failed to restore into table {}", table))?;

    #[derive(Serialize)]
    struct RestoreResult {
        success: bool,
        table: String,
        chains: Vec<String>,
        rules: usize,
    }

    impl Display for RestoreResult {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(
                f,
                "Restored {} rule(s) into {} ({})",
                self.rules,
                self.table,
                self.chains.join(", ")
            )
        }
    }

    let result = RestoreResult {
        success: true,
        table: table.to_string(),
        rules: chains.values().map(Vec::len).sum(),
        chains: names,
    };
    print_output(&result, json);
    Ok(())
}
