//! Argument vectors for backend operations

use std::path::{Path, PathBuf};

use super::detect::Capabilities;

/// The operation flag placed after `-t <table>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Append,
    Insert,
    Replace,
    Delete,
    Check,
    /// `-S`: rule-dump listing
    ListRules,
    /// `-L`: tabular listing
    ListTable,
    NewChain,
    Flush,
    DeleteChain,
    RenameChain,
    Policy,
}

impl Verb {
    pub fn flag(self) -> &'static str {
        match self {
            Verb::Append => "-A",
            Verb::Insert => "-I",
            Verb::Replace => "-R",
            Verb::Delete => "-D",
            Verb::Check => "-C",
            Verb::ListRules => "-S",
            Verb::ListTable => "-L",
            Verb::NewChain => "-N",
            Verb::Flush => "-F",
            Verb::DeleteChain => "-X",
            Verb::RenameChain => "-E",
            Verb::Policy => "-P",
        }
    }
}

/// How long to wait on the xtables lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    enabled: bool,
    seconds: Option<u32>,
}

impl WaitPolicy {
    /// `timeout` 0 waits forever; N bounds the wait to N seconds where the
    /// backend supports it.
    pub fn new(caps: &Capabilities, timeout: u32) -> Self {
        WaitPolicy {
            enabled: caps.wait,
            seconds: (caps.wait && caps.wait_seconds && timeout > 0).then_some(timeout),
        }
    }

    pub fn disabled() -> Self {
        WaitPolicy {
            enabled: false,
            seconds: None,
        }
    }

    pub fn flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.enabled {
            flags.push("--wait".to_string());
            if let Some(secs) = self.seconds {
                flags.push(secs.to_string());
            }
        }
        flags
    }
}

/// Builds `[-t table, verb, chain?, position?, token..., wait-flags...]`.
pub fn build_args<S: AsRef<str>>(
    table: &str,
    verb: Verb,
    chain: Option<&str>,
    position: Option<u32>,
    tokens: &[S],
    wait: &WaitPolicy,
) -> Vec<String> {
    let mut args = vec!["-t".to_string(), table.to_string(), verb.flag().to_string()];
    if let Some(chain) = chain {
        args.push(chain.to_string());
    }
    if let Some(pos) = position {
        args.push(pos.to_string());
    }
    args.extend(tokens.iter().map(|t| t.as_ref().to_string()));
    args.extend(wait.flags());
    args
}

/// Arguments for `<backend>-restore`: merge into the live ruleset rather than replace it.
pub fn restore_args(wait: &WaitPolicy) -> Vec<String> {
    let mut args = vec!["--noflush".to_string()];
    args.extend(wait.flags());
    args
}

/// `iptables` -> `iptables-restore`, `/usr/sbin/ip6tables-nft` -> `/usr/sbin/ip6tables-nft-restore`.
pub fn restore_program(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push("-restore");
    path.with_file_name(name)
}

/// The canonical `-S` line a rule appears as.
pub fn rule_spec<S: AsRef<str>>(chain: &str, rule: &[S]) -> String {
    let mut parts = vec!["-A", chain];
    parts.extend(rule.iter().map(|t| t.as_ref()));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(wait: bool, wait_seconds: bool) -> Capabilities {
        Capabilities {
            check: true,
            wait,
            wait_seconds,
            random_fully: false,
        }
    }

    #[test]
    fn test_append_shape() {
        let args = build_args(
            "filter",
            Verb::Append,
            Some("INPUT"),
            None,
            &["-s", "10.0.0.0/8", "-j", "ACCEPT"],
            &WaitPolicy::disabled(),
        );
        assert_eq!(args, ["-t", "filter", "-A", "INPUT", "-s", "10.0.0.0/8", "-j", "ACCEPT"]);
    }

    #[test]
    fn test_insert_with_position_and_wait() {
        let wait = WaitPolicy::new(&caps(true, true), 0);
        let args = build_args("nat", Verb::Insert, Some("PREROUTING"), Some(2), &["-j", "RETURN"], &wait);
        assert_eq!(args, ["-t", "nat", "-I", "PREROUTING", "2", "-j", "RETURN", "--wait"]);
    }

    #[test]
    fn test_bounded_wait() {
        let wait = WaitPolicy::new(&caps(true, true), 5);
        assert_eq!(wait.flags(), ["--wait", "5"]);

        // Backend can only wait forever
        let wait = WaitPolicy::new(&caps(true, false), 5);
        assert_eq!(wait.flags(), ["--wait"]);

        let wait = WaitPolicy::new(&caps(false, true), 5);
        assert!(wait.flags().is_empty());
    }

    #[test]
    fn test_chainless_verbs() {
        let none: &[&str] = &[];
        let args = build_args("filter", Verb::ListRules, None, None, none, &WaitPolicy::disabled());
        assert_eq!(args, ["-t", "filter", "-S"]);
    }

    #[test]
    fn test_restore_program() {
        assert_eq!(restore_program(Path::new("iptables")), PathBuf::from("iptables-restore"));
        assert_eq!(
            restore_program(Path::new("/usr/sbin/ip6tables-nft")),
            PathBuf::from("/usr/sbin/ip6tables-nft-restore")
        );
    }

    #[test]
    fn test_restore_args() {
        let wait = WaitPolicy::new(&caps(true, true), 3);
        assert_eq!(restore_args(&wait), ["--noflush", "--wait", "3"]);
    }

    #[test]
    fn test_rule_spec() {
        assert_eq!(rule_spec("foo", &["-j", "ACCEPT"]), "-A foo -j ACCEPT");
    }
}
