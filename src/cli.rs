//! CLI argument definitions using Clap derive macros

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "iptctl",
    about = "Idempotent iptables/ip6tables rule management",
    version,
    author
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Operate on ip6tables instead of iptables
    #[arg(long = "ipv6", short = '6', global = true)]
    pub ipv6: bool,

    /// Backend executable (overrides the settings file)
    #[arg(long, global = true, env = "IPTCTL_PATH")]
    pub path: Option<PathBuf>,

    /// Seconds to wait for the xtables lock (0 waits indefinitely)
    #[arg(long, global = true)]
    pub wait: Option<u32>,

    /// Settings file (JSON)
    #[arg(long, global = true, env = "IPTCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Table to operate on
    #[arg(long, short = 't', global = true, default_value = "filter")]
    pub table: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detected backend version, mode and capabilities
    Info,

    /// List chain names in the table
    Chains,

    /// List rules of a chain in canonical form
    List {
        chain: String,
        /// Include packet and byte counters
        #[arg(long, short = 'c')]
        counters: bool,
    },

    /// Per-rule packet/byte counters of a chain
    Stats {
        chain: String,
        /// Derive from the rule dump (`-S -v`) instead of the `-L` table
        #[arg(long)]
        from_rules: bool,
    },

    /// Exit 0 if the rule is present, 1 if not
    Check {
        chain: String,
        #[arg(required = true, allow_hyphen_values = true, trailing_var_arg = true)]
        rule: Vec<String>,
    },

    /// Append a rule
    Append {
        chain: String,
        /// Skip if the rule is already present
        #[arg(long, short = 'u')]
        unique: bool,
        #[arg(required = true, allow_hyphen_values = true, trailing_var_arg = true)]
        rule: Vec<String>,
    },

    /// Insert a rule at a 1-based position
    Insert {
        chain: String,
        position: u32,
        /// Skip if the rule is already present
        #[arg(long, short = 'u')]
        unique: bool,
        #[arg(required = true, allow_hyphen_values = true, trailing_var_arg = true)]
        rule: Vec<String>,
    },

    /// Delete a rule
    Delete {
        chain: String,
        /// Succeed if the rule or chain is already gone
        #[arg(long)]
        if_exists: bool,
        #[arg(required = true, allow_hyphen_values = true, trailing_var_arg = true)]
        rule: Vec<String>,
    },

    /// Create a user chain
    NewChain { chain: String },

    /// Flush a chain, creating it if missing
    ClearChain { chain: String },

    /// Delete a user chain
    DeleteChain {
        chain: String,
        /// Flush first; a missing chain is not an error
        #[arg(long)]
        clear: bool,
    },

    /// Rename a user chain
    RenameChain { old: String, new: String },

    /// Set the policy of a built-in chain
    Policy { chain: String, target: String },

    /// Replace chain contents from a JSON file in one transaction
    Restore {
        /// `{"CHAIN": ["-j ACCEPT", ["-s", "10.0.0.1", "-j", "DROP"]]}`
        file: PathBuf,
    },
}
