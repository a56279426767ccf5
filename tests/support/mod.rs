//! In-memory stand-in for the iptables/ip6tables binaries

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};

use iptctl::exec::{ExecOutput, Executor, Invocation};
use iptctl::iptables::{IpTables, Protocol, VersionInfo};

const LOCK_WARNING: &str =
    "Another app is currently holding the xtables lock; waiting (1s) for it to exit...\n";

#[derive(Debug, Clone)]
struct Rule {
    spec: String,
    packets: u64,
    bytes: u64,
}

#[derive(Debug, Clone)]
struct Chain {
    name: String,
    policy: Option<String>,
    rules: Vec<Rule>,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Vec<Chain>>,
    calls: Vec<Vec<String>>,
    inputs: Vec<String>,
}

/// Behaves like one iptables build. Rules are stored exactly as given, so
/// listings echo tokens back verbatim.
pub struct FakeIptables {
    version: String,
    nft: bool,
    check: bool,
    wait: bool,
    lock_warnings: usize,
    missing: bool,
    state: Mutex<State>,
}

impl FakeIptables {
    pub fn legacy() -> Self {
        Self::new("v1.8.7 (legacy)", false)
    }

    pub fn nft() -> Self {
        Self::new("v1.8.9 (nf_tables)", true)
    }

    pub fn new(version: &str, nft: bool) -> Self {
        FakeIptables {
            version: version.to_string(),
            nft,
            check: true,
            wait: true,
            lock_warnings: 0,
            missing: false,
            state: Mutex::new(State::default()),
        }
    }

    /// Build without `-C`.
    pub fn without_check(mut self) -> Self {
        self.check = false;
        self
    }

    /// Build without `--wait`.
    pub fn without_wait(mut self) -> Self {
        self.wait = false;
        self
    }

    /// Prefix every failure with `n` lock-contention warnings.
    pub fn with_lock_warnings(mut self, n: usize) -> Self {
        self.lock_warnings = n;
        self
    }

    /// Every invocation fails as if the binary were absent.
    pub fn missing(mut self) -> Self {
        self.missing = true;
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls whose verb (third argument) is `verb`.
    pub fn calls_with_verb(&self, verb: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.get(2).map(String::as_str) == Some(verb))
            .count()
    }

    pub fn restore_inputs(&self) -> Vec<String> {
        self.state.lock().unwrap().inputs.clone()
    }

    pub fn set_counters(&self, table: &str, chain: &str, index: usize, packets: u64, bytes: u64) {
        let mut state = self.state.lock().unwrap();
        let tables = &mut state.tables;
        let chains = tables.entry(table.to_string()).or_insert_with(|| builtins(table));
        let chain = chains.iter_mut().find(|c| c.name == chain).unwrap();
        chain.rules[index].packets = packets;
        chain.rules[index].bytes = bytes;
    }

    fn ok(&self, stdout: String) -> ExecOutput {
        ExecOutput {
            stdout: stdout.into_bytes(),
            stderr: vec![],
            status: Some(0),
        }
    }

    fn fail(&self, status: i32, msg: &str) -> ExecOutput {
        let mut stderr = LOCK_WARNING.repeat(self.lock_warnings);
        stderr.push_str(msg);
        stderr.push('\n');
        ExecOutput {
            stdout: vec![],
            stderr: stderr.into_bytes(),
            status: Some(status),
        }
    }

    fn no_chain(&self, chain: &str) -> ExecOutput {
        if self.nft {
            self.fail(1, &format!("iptables {}: Chain '{}' does not exist", self.version, chain))
        } else {
            self.fail(1, "iptables: No chain/target/match by that name.")
        }
    }

    fn bad_rule(&self) -> ExecOutput {
        self.fail(1, "iptables: Bad rule (does a matching rule exist in that chain?).")
    }

    fn version_line(&self, program: &str) -> String {
        format!("{} {}\n", program, self.version)
    }

    fn handle(&self, program: &str, mut args: Vec<String>, input: Option<&[u8]>) -> ExecOutput {
        if let Some(i) = args.iter().position(|a| a == "--wait") {
            if !self.wait {
                return self.fail(2, &format!("{}: unrecognized option '--wait'", program));
            }
            args.remove(i);
            if args.get(i).is_some_and(|a| a.parse::<u32>().is_ok()) {
                args.remove(i);
            }
        }

        if program.ends_with("-restore") {
            let text = String::from_utf8_lossy(input.unwrap_or_default()).into_owned();
            return self.restore(text);
        }

        if args.iter().any(|a| a == "--version") {
            if !self.check && args.iter().any(|a| a == "-C") {
                return self.fail(2, &format!("{} {}: invalid option -- 'C'", program, self.version));
            }
            return self.ok(self.version_line(program));
        }

        if args.len() < 3 || args[0] != "-t" {
            return self.fail(2, "iptables: bad invocation");
        }
        if let Some(bad) = args.iter().find(|a| a.starts_with("--bogus")) {
            return self.fail(2, &format!("iptables {}: unknown option \"{}\"", self.version, bad));
        }

        if let Some(i) = args.iter().position(|a| a == "-j") {
            if args.get(i + 1).is_some_and(|t| t == "NOPE") {
                return self.fail(
                    2,
                    "iptables v1.6.1: Couldn't load target `NOPE':No such file or directory\n\n\
                     Try `iptables -h' or 'iptables --help' for more information.",
                );
            }
        }

        let table = args[1].clone();
        let verb = args[2].clone();
        let rest: Vec<String> = args[3..].to_vec();

        let mut state = self.state.lock().unwrap();
        let chains = state
            .tables
            .entry(table.clone())
            .or_insert_with(|| builtins(&table));

        match verb.as_str() {
            "-S" => self.list_rules(chains, &rest),
            "-L" => self.list_table(program, chains, &rest),
            "-A" | "-I" | "-R" | "-D" | "-C" => self.rule_op(chains, &verb, &rest),
            "-N" => {
                let name = &rest[0];
                if chains.iter().any(|c| &c.name == name) {
                    return self.fail(1, "iptables: Chain already exists.");
                }
                chains.push(Chain {
                    name: name.clone(),
                    policy: None,
                    rules: vec![],
                });
                self.ok(String::new())
            }
            "-F" => match rest.first() {
                None => {
                    chains.iter_mut().for_each(|c| c.rules.clear());
                    self.ok(String::new())
                }
                Some(name) => match chains.iter_mut().find(|c| &c.name == name) {
                    Some(c) => {
                        c.rules.clear();
                        self.ok(String::new())
                    }
                    None => self.no_chain(name),
                },
            },
            "-X" => match rest.first() {
                None => {
                    chains.retain(|c| c.policy.is_some());
                    self.ok(String::new())
                }
                Some(name) => match chains.iter().position(|c| &c.name == name) {
                    None => self.no_chain(name),
                    Some(i) if chains[i].policy.is_some() => self.fail(1, "iptables: Invalid argument."),
                    Some(i) if !chains[i].rules.is_empty() => self.fail(1, "iptables: Directory not empty."),
                    Some(i) => {
                        chains.remove(i);
                        self.ok(String::new())
                    }
                },
            },
            "-E" => match chains.iter_mut().find(|c| c.name == rest[0]) {
                Some(c) => {
                    c.name = rest[1].clone();
                    self.ok(String::new())
                }
                None => self.no_chain(&rest[0]),
            },
            "-P" => match chains.iter_mut().find(|c| c.name == rest[0]) {
                Some(c) if c.policy.is_some() => {
                    c.policy = Some(rest[1].clone());
                    self.ok(String::new())
                }
                Some(_) => self.fail(1, "iptables: Bad built-in chain name."),
                None => self.no_chain(&rest[0]),
            },
            other => self.fail(2, &format!("iptables: unknown verb {}", other)),
        }
    }

    fn render_rule(&self, chain: &str, rule: &Rule, verbose: bool) -> String {
        match (verbose, self.nft) {
            (false, _) => format!("-A {} {}", chain, rule.spec),
            (true, false) => format!("-A {} {} -c {} {}", chain, rule.spec, rule.packets, rule.bytes),
            (true, true) => format!("[{}:{}] -A {} {}", rule.packets, rule.bytes, chain, rule.spec),
        }
    }

    fn header(chain: &Chain) -> String {
        match &chain.policy {
            Some(p) => format!("-P {} {}", chain.name, p),
            None => format!("-N {}", chain.name),
        }
    }

    fn list_rules(&self, chains: &[Chain], rest: &[String]) -> ExecOutput {
        let verbose = rest.iter().any(|a| a == "-v");
        let rest: Vec<&String> = rest.iter().filter(|a| *a != "-v").collect();

        let mut out = String::new();
        match rest.first() {
            None => {
                for c in chains {
                    out.push_str(&Self::header(c));
                    out.push('\n');
                }
                for c in chains {
                    for r in &c.rules {
                        out.push_str(&self.render_rule(&c.name, r, verbose));
                        out.push('\n');
                    }
                }
            }
            Some(name) => {
                let Some(c) = chains.iter().find(|c| &c.name == *name) else {
                    return self.no_chain(name);
                };
                match rest.get(1).map(|id| id.parse::<usize>().unwrap()) {
                    Some(id) => {
                        if let Some(r) = c.rules.get(id - 1) {
                            out.push_str(&self.render_rule(&c.name, r, verbose));
                            out.push('\n');
                        }
                    }
                    None => {
                        out.push_str(&Self::header(c));
                        out.push('\n');
                        for r in &c.rules {
                            out.push_str(&self.render_rule(&c.name, r, verbose));
                            out.push('\n');
                        }
                    }
                }
            }
        }
        self.ok(out)
    }

    fn list_table(&self, program: &str, chains: &[Chain], rest: &[String]) -> ExecOutput {
        let name = &rest[0];
        let Some(c) = chains.iter().find(|c| &c.name == name) else {
            return self.no_chain(name);
        };
        let v6 = program.starts_with("ip6tables");
        // ip6tables before 1.8.9 leaves the opt column blank
        let blank_opt = v6
            && VersionInfo::parse(&self.version)
                .map(|v| !v.at_least(1, 8, 9))
                .unwrap_or(false);
        let mut out = format!("Chain {} (0 references)\n", c.name);
        out.push_str("    pkts      bytes target     prot opt in     out     source               destination\n");
        for r in &c.rules {
            let tokens: Vec<&str> = r.spec.split_whitespace().collect();
            let get = |flag: &str| {
                tokens
                    .iter()
                    .position(|t| *t == flag)
                    .and_then(|i| tokens.get(i + 1))
                    .map(|s| s.to_string())
            };
            let any = if v6 { "::/0" } else { "0.0.0.0/0" };
            let opt = if blank_opt { "  " } else { "--" };
            out.push_str(&format!(
                "{:>8} {:>10} {:<10} {:<4} {} {:<6} {:<6} {:<20} {:<20}\n",
                r.packets,
                r.bytes,
                get("-j").unwrap_or_default(),
                get("-p").unwrap_or_else(|| "all".to_string()),
                opt,
                get("-i").unwrap_or_else(|| "*".to_string()),
                get("-o").unwrap_or_else(|| "*".to_string()),
                get("-s").unwrap_or_else(|| any.to_string()),
                get("-d").unwrap_or_else(|| any.to_string()),
            ));
        }
        self.ok(out)
    }

    fn rule_op(&self, chains: &mut Vec<Chain>, verb: &str, rest: &[String]) -> ExecOutput {
        let name = &rest[0];
        let Some(c) = chains.iter_mut().find(|c| &c.name == name) else {
            return self.no_chain(name);
        };
        let positional = matches!(verb, "-I" | "-R");
        let (pos, tokens) = if positional {
            (rest[1].parse::<usize>().ok(), &rest[2..])
        } else {
            (None, &rest[1..])
        };
        let spec = tokens.join(" ");
        let rule = Rule {
            spec: spec.clone(),
            packets: 0,
            bytes: 0,
        };

        match verb {
            "-A" => {
                c.rules.push(rule);
                self.ok(String::new())
            }
            "-I" => {
                let pos = pos.unwrap_or(1);
                if pos == 0 || pos > c.rules.len() + 1 {
                    return self.fail(1, "iptables: Index of insertion too big.");
                }
                c.rules.insert(pos - 1, rule);
                self.ok(String::new())
            }
            "-R" => match pos {
                Some(p) if p >= 1 && p <= c.rules.len() => {
                    c.rules[p - 1] = rule;
                    self.ok(String::new())
                }
                _ => self.fail(1, "iptables: Index of replacement too big."),
            },
            "-D" => {
                // `-D chain N` deletes by position
                if tokens.len() == 1 {
                    if let Ok(id) = tokens[0].parse::<usize>() {
                        if id >= 1 && id <= c.rules.len() {
                            c.rules.remove(id - 1);
                            return self.ok(String::new());
                        }
                        return self.fail(1, "iptables: Index of deletion too big.");
                    }
                }
                match c.rules.iter().position(|r| r.spec == spec) {
                    Some(i) => {
                        c.rules.remove(i);
                        self.ok(String::new())
                    }
                    None => self.bad_rule(),
                }
            }
            "-C" => {
                if c.rules.iter().any(|r| r.spec == spec) {
                    self.ok(String::new())
                } else {
                    self.bad_rule()
                }
            }
            _ => unreachable!(),
        }
    }

    fn restore(&self, text: String) -> ExecOutput {
        let mut state = self.state.lock().unwrap();
        state.inputs.push(text.clone());

        let mut lines = text.lines();
        let Some(table) = lines.next().and_then(|l| l.strip_prefix('*')).map(String::from) else {
            return self.fail(1, "iptables-restore: line 1 failed");
        };
        let chains = state
            .tables
            .entry(table.clone())
            .or_insert_with(|| builtins(&table));

        for line in lines {
            if line == "COMMIT" {
                return self.ok(String::new());
            }
            if let Some(decl) = line.strip_prefix(':') {
                let name = decl.split_whitespace().next().unwrap_or_default().to_string();
                match chains.iter_mut().find(|c| c.name == name) {
                    Some(c) => c.rules.clear(),
                    None => chains.push(Chain {
                        name,
                        policy: None,
                        rules: vec![],
                    }),
                }
            } else if let Some(rule) = line.strip_prefix("-A ") {
                let (name, spec) = rule.split_once(' ').unwrap_or((rule, ""));
                match chains.iter_mut().find(|c| c.name == name) {
                    Some(c) => c.rules.push(Rule {
                        spec: spec.to_string(),
                        packets: 0,
                        bytes: 0,
                    }),
                    None => return self.fail(1, "iptables-restore: line 2 failed"),
                }
            }
        }
        self.fail(1, "iptables-restore: COMMIT expected")
    }
}

fn builtins(table: &str) -> Vec<Chain> {
    let names: &[&str] = match table {
        "nat" => &["PREROUTING", "INPUT", "OUTPUT", "POSTROUTING"],
        "mangle" => &["PREROUTING", "INPUT", "FORWARD", "OUTPUT", "POSTROUTING"],
        "raw" => &["PREROUTING", "OUTPUT"],
        _ => &["INPUT", "FORWARD", "OUTPUT"],
    };
    names
        .iter()
        .map(|n| Chain {
            name: n.to_string(),
            policy: Some("ACCEPT".to_string()),
            rules: vec![],
        })
        .collect()
}

impl Executor for FakeIptables {
    fn execute(&self, invocation: &Invocation<'_>) -> io::Result<ExecOutput> {
        if self.missing {
            return Err(io::Error::new(io::ErrorKind::NotFound, "No such file or directory"));
        }
        let program = invocation
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let args = invocation.args.to_vec();
        self.state.lock().unwrap().calls.push(args.clone());
        Ok(self.handle(&program, args, invocation.input))
    }
}

/// Detects a handle against `fake`.
pub fn handle(fake: &Arc<FakeIptables>, protocol: Protocol) -> IpTables {
    let path = match protocol {
        Protocol::V4 => "/usr/sbin/iptables",
        Protocol::V6 => "/usr/sbin/ip6tables",
    };
    IpTables::builder()
        .protocol(protocol)
        .path(path)
        .executor(fake.clone())
        .build()
        .expect("detection against fake backend")
}

pub fn tokens(rule: &str) -> Vec<String> {
    rule.split_whitespace().map(String::from).collect()
}
