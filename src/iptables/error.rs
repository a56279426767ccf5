//! Backend failures and their classification

use std::fmt;
use std::io;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Phrases iptables/ip6tables print when a rule or chain is missing.
///
/// Legacy builds report `Bad rule ...` for `-C`/`-D` and
/// `No chain/target/match by that name.` for chain verbs. nf_tables builds
/// report `... failed (No such file or directory)` before 1.8.8 and
/// `Chain 'X' does not exist` from 1.8.8 on. Wording is identical between
/// the v4 and v6 binaries.
pub const DEFAULT_NOT_EXIST_PHRASES: &[&str] = &[
    "Bad rule (does a matching rule exist in that chain?)",
    "No chain/target/match by that name",
    "No such file or directory",
    "does not exist",
];

/// Warning lines printed while waiting on the xtables lock held by another process
const LOCK_WARNING: &str = r"^Another app is currently holding the xtables lock; (?:waiting \(\d+s\) for it to exit|still \d+s \d+us time ahead to have a chance to grab the lock)\.\.\.\r?\n?";

fn lock_warning() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(LOCK_WARNING).expect("lock warning pattern is valid"))
}

/// Removes any leading xtables lock-contention warnings from backend output.
pub fn strip_lock_warnings(message: &str) -> &str {
    let mut rest = message;
    while let Some(m) = lock_warning().find(rest) {
        if m.end() == 0 {
            break;
        }
        rest = &rest[m.end()..];
    }
    rest
}

/// Table of phrases that classify a backend failure as "rule/chain absent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotExistPhrases {
    phrases: Vec<String>,
}

impl Default for NotExistPhrases {
    fn default() -> Self {
        Self {
            phrases: DEFAULT_NOT_EXIST_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl NotExistPhrases {
    /// Empty table; nothing classifies as not-exists.
    pub fn empty() -> Self {
        Self { phrases: vec![] }
    }

    /// Default table extended with `extra` phrases.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::default();
        for phrase in extra {
            table.push(phrase);
        }
        table
    }

    pub fn push(&mut self, phrase: impl Into<String>) {
        let phrase = phrase.into();
        if !phrase.is_empty() && !self.phrases.contains(&phrase) {
            self.phrases.push(phrase);
        }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// True if `message`, once lock warnings are stripped, contains a known phrase.
    pub fn matches(&self, message: &str) -> bool {
        let body = strip_lock_warnings(message);
        self.phrases.iter().any(|p| body.contains(p.as_str()))
    }
}

/// The backend ran and exited non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    args: Vec<String>,
    exit_status: Option<i32>,
    message: String,
}

impl BackendError {
    pub fn new(args: Vec<String>, exit_status: Option<i32>, message: impl Into<String>) -> Self {
        Self {
            args,
            exit_status,
            message: message.into(),
        }
    }

    /// Full argument vector, program first.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Exit code; `-1` if the process was killed by a signal.
    pub fn exit_status(&self) -> i32 {
        self.exit_status.unwrap_or(-1)
    }

    /// Raw diagnostic text, untouched.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Classifies against the default phrase table.
    pub fn is_not_exist(&self) -> bool {
        self.is_not_exist_with(&NotExistPhrases::default())
    }

    /// Only exit status 1 can mean "absent"; usage and syntax errors exit 2
    /// and may still mention `No such file or directory`.
    pub fn is_not_exist_with(&self, phrases: &NotExistPhrases) -> bool {
        self.exit_status == Some(1) && phrases.matches(&self.message)
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "running {:?}: exit status {}: {}",
            self.args,
            self.exit_status(),
            self.message.trim_end()
        )
    }
}

impl std::error::Error for BackendError {}

/// Output that could not be parsed into the expected shape.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unrecognized version string: {0:?}")]
    Version(String),

    #[error("stat has {found} fields, expected {expected}")]
    FieldCount { expected: usize, found: usize },

    #[error("could not parse {field} {value:?}: {source}")]
    Counter {
        field: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("could not parse {field} {value:?}: {source}")]
    Address {
        field: &'static str,
        value: String,
        #[source]
        source: ipnet::AddrParseError,
    },

    #[error("malformed rule line: {0:?}")]
    Rule(String),
}

#[derive(Debug, Error)]
pub enum Error {
    /// The backend could not be started at all.
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl Error {
    pub fn as_backend(&self) -> Option<&BackendError> {
        match self {
            Error::Backend(e) => Some(e),
            _ => None,
        }
    }

    /// Backend failure classified as "rule/chain absent" by the default table.
    pub fn is_not_exist(&self) -> bool {
        self.as_backend().is_some_and(BackendError::is_not_exist)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
