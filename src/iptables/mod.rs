//! iptables/ip6tables backend handle
//!
//! [`IpTables`] is detected once (version, mode, optional flags) and then
//! used read-only. Every method is one fresh backend invocation; nothing
//! about chains or rules is cached between calls.
//!
//! ```no_run
//! use iptctl::iptables::{IpTables, Protocol};
//!
//! # fn main() -> iptctl::iptables::Result<()> {
//! let ipt = IpTables::builder().protocol(Protocol::V4).timeout(5).build()?;
//! ipt.append_unique("filter", "INPUT", &["-p", "tcp", "--dport", "22", "-j", "ACCEPT"])?;
//! ipt.delete_if_exists("filter", "INPUT", &["-s", "192.0.2.1", "-j", "DROP"])?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod detect;
pub mod error;
pub mod normalize;
pub mod restore;
pub mod stats;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::exec::{ExecOutput, Executor, Invocation, SystemExecutor};

pub use command::{Verb, WaitPolicy};
pub use detect::{Capabilities, Mode, VersionInfo};
pub use error::{BackendError, Error, NotExistPhrases, ParseError, Result};
pub use normalize::normalize_rule_line;
pub use restore::ChainRules;
pub use stats::{parse_stat, Stat};

/// Address family, selecting `iptables` or `ip6tables`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    V4,
    V6,
}

impl Protocol {
    pub fn default_program(self) -> &'static str {
        match self {
            Protocol::V4 => "iptables",
            Protocol::V6 => "ip6tables",
        }
    }

    /// `0.0.0.0/0` or `::/0`
    pub fn any_network(self) -> IpNet {
        match self {
            Protocol::V4 => IpNet::V4(Ipv4Net::default()),
            Protocol::V6 => IpNet::V6(Ipv6Net::default()),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::V4 => write!(f, "IPv4"),
            Protocol::V6 => write!(f, "IPv6"),
        }
    }
}

/// Options for detecting an [`IpTables`] handle.
pub struct IpTablesBuilder {
    protocol: Protocol,
    path: Option<PathBuf>,
    timeout: u32,
    command_timeout: Option<Duration>,
    phrases: NotExistPhrases,
    executor: Option<Arc<dyn Executor>>,
}

impl Default for IpTablesBuilder {
    fn default() -> Self {
        Self {
            protocol: Protocol::V4,
            path: None,
            timeout: 0,
            command_timeout: None,
            phrases: NotExistPhrases::default(),
            executor: None,
        }
    }
}

impl IpTablesBuilder {
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Explicit executable, e.g. `iptables-legacy`. Skips the `PATH` lookup.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Seconds to wait for the xtables lock; 0 waits indefinitely.
    pub fn timeout(mut self, seconds: u32) -> Self {
        self.timeout = seconds;
        self
    }

    /// Wall-clock limit for each backend process.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn not_exist_phrases(mut self, phrases: NotExistPhrases) -> Self {
        self.phrases = phrases;
        self
    }

    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Resolves the executable and probes its version and capabilities.
    pub fn build(self) -> Result<IpTables> {
        let executor = self.executor.unwrap_or_else(|| Arc::new(SystemExecutor));
        let path = match self.path {
            Some(path) => path,
            None => resolve_program(self.protocol.default_program())?,
        };

        let mut ipt = IpTables {
            protocol: self.protocol,
            path,
            version: VersionInfo {
                major: 0,
                minor: 0,
                patch: 0,
                mode: Mode::Legacy,
            },
            caps: Capabilities::default(),
            timeout: self.timeout,
            command_timeout: self.command_timeout,
            phrases: self.phrases,
            executor,
        };

        let out = ipt.run(vec!["--version".to_string()])?;
        let text = if out.stdout.is_empty() {
            out.stderr_lossy()
        } else {
            out.stdout_lossy()
        };
        let mut version = VersionInfo::parse(&text)?;
        if let Some(forced) = Mode::forced_by_path(&ipt.path) {
            version.mode = forced;
        }

        let mut caps = Capabilities::for_version(&version);
        caps.check = ipt.probe(detect::CHECK_PROBE)?;
        caps.wait = ipt.probe(detect::WAIT_PROBE)?;
        caps.wait_seconds &= caps.wait;

        ipt.version = version;
        ipt.caps = caps;

        info!(
            "detected {} at {} {} (check={}, wait={})",
            ipt.protocol,
            ipt.path.display(),
            ipt.version,
            ipt.caps.check,
            ipt.caps.wait
        );
        Ok(ipt)
    }
}

fn resolve_program(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|e| {
        Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{}: {}", name, e),
        ))
    })
}

/// Detected backend. Immutable; safe to share across threads.
pub struct IpTables {
    protocol: Protocol,
    path: PathBuf,
    version: VersionInfo,
    caps: Capabilities,
    timeout: u32,
    command_timeout: Option<Duration>,
    phrases: NotExistPhrases,
    executor: Arc<dyn Executor>,
}

impl fmt::Debug for IpTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpTables")
            .field("protocol", &self.protocol)
            .field("path", &self.path)
            .field("version", &self.version)
            .field("caps", &self.caps)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl IpTables {
    /// IPv4 handle using `iptables` from `PATH`.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn with_protocol(protocol: Protocol) -> Result<Self> {
        Self::builder().protocol(protocol).build()
    }

    pub fn builder() -> IpTablesBuilder {
        IpTablesBuilder::default()
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> &VersionInfo {
        &self.version
    }

    pub fn mode(&self) -> &Mode {
        &self.version.mode
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn has_random_fully(&self) -> bool {
        self.caps.random_fully
    }

    /// Lock wait in seconds, 0 meaning indefinitely.
    pub fn timeout(&self) -> u32 {
        self.timeout
    }

    pub fn not_exist_phrases(&self) -> &NotExistPhrases {
        &self.phrases
    }

    /// Classifies `err` against this handle's phrase table.
    pub fn is_not_exist(&self, err: &Error) -> bool {
        err.as_backend()
            .is_some_and(|e| e.is_not_exist_with(&self.phrases))
    }

    // ----- primitive rule operations -----

    /// Whether `rule` is present in `chain`.
    ///
    /// Uses `-C` when available; otherwise scans the `-S` listing for an
    /// exact canonical match, which only finds rules written the way the
    /// backend prints them back.
    pub fn exists<S: AsRef<str>>(&self, table: &str, chain: &str, rule: &[S]) -> Result<bool> {
        if !self.caps.check {
            return self.exists_by_listing(table, chain, rule);
        }
        match self.exec(table, Verb::Check, Some(chain), None, rule) {
            Ok(_) => Ok(true),
            Err(Error::Backend(e)) if e.exit_status() == 1 => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn exists_by_listing<S: AsRef<str>>(&self, table: &str, chain: &str, rule: &[S]) -> Result<bool> {
        let wanted = command::rule_spec(chain, rule);
        match self.list(table, chain) {
            Ok(lines) => Ok(lines.iter().any(|l| *l == wanted)),
            Err(e) if self.is_not_exist(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Inserts `rule` at 1-based `pos`.
    pub fn insert<S: AsRef<str>>(&self, table: &str, chain: &str, pos: u32, rule: &[S]) -> Result<()> {
        self.exec(table, Verb::Insert, Some(chain), Some(pos), rule)
            .map(drop)
    }

    /// Replaces the rule at 1-based `pos`.
    pub fn replace<S: AsRef<str>>(&self, table: &str, chain: &str, pos: u32, rule: &[S]) -> Result<()> {
        self.exec(table, Verb::Replace, Some(chain), Some(pos), rule)
            .map(drop)
    }

    pub fn append<S: AsRef<str>>(&self, table: &str, chain: &str, rule: &[S]) -> Result<()> {
        self.exec(table, Verb::Append, Some(chain), None, rule)
            .map(drop)
    }

    pub fn delete<S: AsRef<str>>(&self, table: &str, chain: &str, rule: &[S]) -> Result<()> {
        self.exec(table, Verb::Delete, Some(chain), None, rule)
            .map(drop)
    }

    /// Deletes the rule at 1-based `id`.
    pub fn delete_by_id(&self, table: &str, chain: &str, id: u32) -> Result<()> {
        self.exec(table, Verb::Delete, Some(chain), Some(id), NO_TOKENS)
            .map(drop)
    }

    // ----- idempotent rule operations -----

    /// Appends `rule` unless it is already present.
    pub fn append_unique<S: AsRef<str>>(&self, table: &str, chain: &str, rule: &[S]) -> Result<()> {
        if self.exists(table, chain, rule)? {
            debug!("rule already in {}/{}, not appending", table, chain);
            return Ok(());
        }
        self.append(table, chain, rule)
    }

    /// Inserts `rule` at `pos` unless it is already present anywhere in the chain.
    pub fn insert_unique<S: AsRef<str>>(
        &self,
        table: &str,
        chain: &str,
        pos: u32,
        rule: &[S],
    ) -> Result<()> {
        if self.exists(table, chain, rule)? {
            debug!("rule already in {}/{}, not inserting", table, chain);
            return Ok(());
        }
        self.insert(table, chain, pos, rule)
    }

    /// Deletes `rule`; a missing rule or chain is success.
    pub fn delete_if_exists<S: AsRef<str>>(&self, table: &str, chain: &str, rule: &[S]) -> Result<()> {
        match self.delete(table, chain, rule) {
            Err(e) if self.is_not_exist(&e) => {
                debug!("rule not in {}/{}, nothing to delete", table, chain);
                Ok(())
            }
            other => other,
        }
    }

    // ----- listing -----

    /// Rules of `chain` as canonical `-S` lines, starting with `-N`/`-P`.
    pub fn list(&self, table: &str, chain: &str) -> Result<Vec<String>> {
        self.list_lines(table, Some(chain), None, NO_TOKENS)
    }

    /// Like [`list`](Self::list), with a `-c packets bytes` clause on each rule.
    pub fn list_with_counters(&self, table: &str, chain: &str) -> Result<Vec<String>> {
        self.list_lines(table, Some(chain), None, &["-v"])
    }

    /// The rule at 1-based `id` as a canonical line.
    pub fn list_by_id(&self, table: &str, chain: &str, id: u32) -> Result<String> {
        let lines = self.list_lines(table, Some(chain), Some(id), NO_TOKENS)?;
        Ok(lines.into_iter().next().unwrap_or_default())
    }

    /// Names of all chains in `table`, built-in ones first.
    pub fn list_chains(&self, table: &str) -> Result<Vec<String>> {
        let lines = self.list_lines(table, None, None, NO_TOKENS)?;
        Ok(lines
            .iter()
            .take_while(|l| l.starts_with("-P") || l.starts_with("-N"))
            .filter_map(|l| l.split_whitespace().nth(1))
            .map(String::from)
            .collect())
    }

    pub fn chain_exists(&self, table: &str, chain: &str) -> Result<bool> {
        match self.exec(table, Verb::ListRules, Some(chain), Some(1), NO_TOKENS) {
            Ok(_) => Ok(true),
            Err(Error::Backend(e)) if e.exit_status() == 1 => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn list_lines<S: AsRef<str>>(
        &self,
        table: &str,
        chain: Option<&str>,
        id: Option<u32>,
        extra: &[S],
    ) -> Result<Vec<String>> {
        let out = self.exec(table, Verb::ListRules, chain, id, extra)?;
        Ok(out
            .stdout_lossy()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(normalize_rule_line)
            .collect())
    }

    // ----- statistics -----

    /// Raw ten-column rows of `-L <chain> -n -v -x`.
    pub fn stats(&self, table: &str, chain: &str) -> Result<Vec<Vec<String>>> {
        let out = self.exec(table, Verb::ListTable, Some(chain), None, &["-n", "-v", "-x"])?;
        Ok(stats::split_stats_output(&out.stdout_lossy(), self.blank_opt_column())?)
    }

    /// [`stats`](Self::stats) with every row run through [`parse_stat`].
    pub fn structured_stats(&self, table: &str, chain: &str) -> Result<Vec<Stat>> {
        self.stats(table, chain)?
            .iter()
            .map(|row| parse_stat(row.as_slice()).map_err(Error::from))
            .collect()
    }

    /// Stats derived from the `-S -v` rule dump instead of the `-L` table.
    ///
    /// Unlike [`stats`](Self::stats) this keeps the full match text of each
    /// rule and does not depend on column layout.
    pub fn rule_stats(&self, table: &str, chain: &str) -> Result<Vec<Stat>> {
        self.list_with_counters(table, chain)?
            .iter()
            .filter(|line| line.starts_with("-A "))
            .map(|line| Stat::from_rule_line(line, self.protocol).map_err(Error::from))
            .collect()
    }

    pub fn parse_stat<S: AsRef<str>>(&self, columns: &[S]) -> Result<Stat> {
        Ok(parse_stat(columns)?)
    }

    // ip6tables < 1.8.9 leaves the opt column blank
    fn blank_opt_column(&self) -> bool {
        self.protocol == Protocol::V6 && !self.version.at_least(1, 8, 9)
    }

    // ----- chains -----

    pub fn new_chain(&self, table: &str, chain: &str) -> Result<()> {
        self.exec(table, Verb::NewChain, Some(chain), None, NO_TOKENS)
            .map(drop)
    }

    /// Empties `chain`, creating it first if it does not exist.
    pub fn clear_chain(&self, table: &str, chain: &str) -> Result<()> {
        if self.chain_exists(table, chain)? {
            self.flush_chain(table, chain)
        } else {
            self.new_chain(table, chain)
        }
    }

    /// `-F chain`; fails if the chain is missing.
    pub fn flush_chain(&self, table: &str, chain: &str) -> Result<()> {
        self.exec(table, Verb::Flush, Some(chain), None, NO_TOKENS)
            .map(drop)
    }

    pub fn rename_chain(&self, table: &str, old: &str, new: &str) -> Result<()> {
        self.exec(table, Verb::RenameChain, Some(old), None, &[new])
            .map(drop)
    }

    /// Deletes an empty, unreferenced user chain.
    pub fn delete_chain(&self, table: &str, chain: &str) -> Result<()> {
        self.exec(table, Verb::DeleteChain, Some(chain), None, NO_TOKENS)
            .map(drop)
    }

    /// Flushes and deletes `chain`; a missing chain is success.
    pub fn clear_and_delete_chain(&self, table: &str, chain: &str) -> Result<()> {
        match self.flush_chain(table, chain) {
            Ok(()) => {}
            Err(e) if self.is_not_exist(&e) => {
                debug!("chain {}/{} does not exist, nothing to delete", table, chain);
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        self.delete_chain(table, chain)
    }

    /// Flushes every chain in `table`.
    pub fn clear_all(&self, table: &str) -> Result<()> {
        self.exec(table, Verb::Flush, None, None, NO_TOKENS).map(drop)
    }

    /// Deletes every user chain in `table`.
    pub fn delete_all(&self, table: &str) -> Result<()> {
        self.exec(table, Verb::DeleteChain, None, None, NO_TOKENS)
            .map(drop)
    }

    /// Sets the policy of a built-in chain.
    pub fn change_policy(&self, table: &str, chain: &str, target: &str) -> Result<()> {
        self.exec(table, Verb::Policy, Some(chain), None, &[target])
            .map(drop)
    }

    // ----- bulk -----

    /// Replaces the contents of each chain in `chains` in one
    /// `iptables-restore --noflush` transaction, creating missing chains.
    ///
    /// Chains not named are untouched. Order across chains is unspecified.
    pub fn restore(&self, table: &str, chains: &ChainRules) -> Result<()> {
        let program = command::restore_program(&self.path);
        let args = command::restore_args(&self.wait_policy());
        let payload = restore::build_payload(table, chains);

        info!(
            "restoring {} chain(s) into table {} via {}",
            chains.len(),
            table,
            program.display()
        );
        self.invoke(&program, args, Some(payload.as_bytes()))
            .map(drop)
    }

    // ----- plumbing -----

    fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy::new(&self.caps, self.timeout)
    }

    fn exec<S: AsRef<str>>(
        &self,
        table: &str,
        verb: Verb,
        chain: Option<&str>,
        position: Option<u32>,
        tokens: &[S],
    ) -> Result<ExecOutput> {
        let args = command::build_args(table, verb, chain, position, tokens, &self.wait_policy());
        self.run(args)
    }

    fn run(&self, args: Vec<String>) -> Result<ExecOutput> {
        self.invoke(&self.path, args, None)
    }

    fn invoke(&self, program: &Path, args: Vec<String>, input: Option<&[u8]>) -> Result<ExecOutput> {
        debug!("running {} {:?}", program.display(), args);
        let out = self.executor.execute(&Invocation {
            program,
            args: &args,
            input,
            timeout: self.command_timeout,
        })?;

        if out.success() {
            return Ok(out);
        }

        let message = if out.stderr.is_empty() {
            out.stdout_lossy()
        } else {
            out.stderr_lossy()
        };
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(program.display().to_string());
        full.extend(args);
        Err(BackendError::new(full, out.status, message).into())
    }

    /// Runs a capability probe; only an "unknown option" style failure means unsupported.
    fn probe(&self, args: &[&str]) -> Result<bool> {
        match self.run(args.iter().map(|a| a.to_string()).collect()) {
            Ok(_) => Ok(true),
            Err(Error::Backend(e)) => {
                let supported = !detect::reports_unsupported(e.message());
                if !supported {
                    warn!("{} does not support {}", self.path.display(), args[0]);
                }
                Ok(supported)
            }
            Err(e) => Err(e),
        }
    }
}

const NO_TOKENS: &[&str] = &[];
