//! Backend version, mode and capability detection

use std::fmt::Display;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::error::ParseError;

/// Backend implementation family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum Mode {
    Legacy,
    NfTables,
    /// Any other parenthetical the version string carried
    Other(String),
}

impl Mode {
    pub fn as_str(&self) -> &str {
        match self {
            Mode::Legacy => "legacy",
            Mode::NfTables => "nf_tables",
            Mode::Other(s) => s,
        }
    }

    fn from_version_tag(tag: &str) -> Self {
        match tag {
            "legacy" => Mode::Legacy,
            "nf_tables" => Mode::NfTables,
            other => Mode::Other(other.to_string()),
        }
    }

    /// Mode forced by the executable name (`iptables-legacy`, `ip6tables-nft`, ...).
    pub fn forced_by_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy();
        if name.contains("-legacy") {
            Some(Mode::Legacy)
        } else if name.contains("-nft") {
            Some(Mode::NfTables)
        } else {
            None
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> Self {
        mode.as_str().to_string()
    }
}

/// Parsed `iptables --version` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub mode: Mode,
}

impl VersionInfo {
    /// Parses `name vMAJOR.MINOR.PATCH[ (MODE)]`. A missing mode means legacy.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"v(\d+)\.(\d+)\.(\d+)(?:\s+\((\w+)\))?")
                .expect("version pattern is valid")
        });

        let bad = || ParseError::Version(text.trim().to_string());
        let caps = re.captures(text).ok_or_else(bad)?;
        let num = |i: usize| -> Result<u32, ParseError> {
            caps.get(i)
                .and_then(|m| m.as_str().parse().ok())
                .ok_or_else(bad)
        };

        Ok(VersionInfo {
            major: num(1)?,
            minor: num(2)?,
            patch: num(3)?,
            mode: caps
                .get(4)
                .map(|m| Mode::from_version_tag(m.as_str()))
                .unwrap_or(Mode::Legacy),
        })
    }

    /// True if this version is at least `major.minor.patch`.
    pub fn at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        (self.major, self.minor, self.patch) >= (major, minor, patch)
    }
}

impl Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}.{}.{} ({})", self.major, self.minor, self.patch, self.mode)
    }
}

/// Optional backend features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// `-C` rule existence check
    pub check: bool,
    /// `--wait` on the xtables lock
    pub wait: bool,
    /// `--wait <seconds>`
    pub wait_seconds: bool,
    /// `--random-fully` for MASQUERADE/SNAT
    pub random_fully: bool,
}

impl Capabilities {
    /// Capabilities implied by the version number alone.
    pub fn for_version(v: &VersionInfo) -> Self {
        Capabilities {
            check: v.at_least(1, 4, 11),
            wait: v.at_least(1, 4, 20),
            wait_seconds: v.at_least(1, 6, 0),
            random_fully: v.at_least(1, 6, 2),
        }
    }
}

/// Harmless argument vectors exercising `-C` and `--wait`; `--version`
/// makes the backend exit before touching any table.
pub(crate) const CHECK_PROBE: &[&str] = &["-C", "INPUT", "--version"];
pub(crate) const WAIT_PROBE: &[&str] = &["--wait", "--version"];

const UNSUPPORTED_MARKERS: &[&str] = &["unrecognized option", "invalid option", "Bad argument"];

/// True if probe output reports the flag as unknown to the backend.
pub(crate) fn reports_unsupported(output: &str) -> bool {
    UNSUPPORTED_MARKERS.iter().any(|m| output.contains(m))
}
