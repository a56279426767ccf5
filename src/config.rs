//! Settings file for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::iptables::{IpTables, IpTablesBuilder, NotExistPhrases, Protocol};

/// Backend settings, read from a JSON file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// iptables executable; looked up on `PATH` when unset
    pub path: Option<PathBuf>,
    /// ip6tables executable
    pub path_v6: Option<PathBuf>,
    /// xtables lock wait, 0 waits indefinitely
    pub wait_seconds: u32,
    pub command_timeout_secs: Option<u64>,
    /// Appended to the built-in not-exist phrase table
    pub not_exist_phrases: Vec<String>,
}

impl Settings {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Invalid settings")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Loads `path` if given, otherwise defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn path_for(&self, protocol: Protocol) -> Option<&Path> {
        match protocol {
            Protocol::V4 => self.path.as_deref(),
            Protocol::V6 => self.path_v6.as_deref(),
        }
    }

    pub fn phrases(&self) -> NotExistPhrases {
        NotExistPhrases::with_extra(self.not_exist_phrases.iter().cloned())
    }

    /// Handle builder carrying these settings.
    pub fn builder_for(&self, protocol: Protocol) -> IpTablesBuilder {
        let mut builder = IpTables::builder()
            .protocol(protocol)
            .timeout(self.wait_seconds)
            .not_exist_phrases(self.phrases());
        if let Some(path) = self.path_for(protocol) {
            builder = builder.path(path);
        }
        if let Some(secs) = self.command_timeout_secs {
            builder = builder.command_timeout(Duration::from_secs(secs));
        }
        builder
    }
}
