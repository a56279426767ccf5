//! Per-rule packet/byte statistics

use std::fmt::Display;
use std::net::IpAddr;

use ipnet::IpNet;
use serde::Serialize;

use super::error::ParseError;
use super::Protocol;

/// Number of columns in one stats row: nine fixed fields plus the remainder.
pub const STAT_COLUMNS: usize = 10;

/// One row of `iptables -L <chain> -n -v -x`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stat {
    pub packets: u64,
    pub bytes: u64,
    pub target: String,
    pub protocol: String,
    pub opt: String,
    pub input: String,
    pub output: String,
    pub source: IpNet,
    pub destination: IpNet,
    /// Free-form match/target text after the destination column
    pub options: String,
}

impl Display for Stat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {} {} {}",
            self.packets,
            self.bytes,
            self.target,
            self.protocol,
            self.opt,
            self.input,
            self.output,
            self.source,
            self.destination
        )?;
        if !self.options.is_empty() {
            write!(f, " {}", self.options)?;
        }
        Ok(())
    }
}

/// Parses one stats row, as produced by [`split_stats_output`], into a [`Stat`].
///
/// Pure: the same columns always yield the same record.
pub fn parse_stat<S: AsRef<str>>(columns: &[S]) -> Result<Stat, ParseError> {
    if columns.len() != STAT_COLUMNS {
        return Err(ParseError::FieldCount {
            expected: STAT_COLUMNS,
            found: columns.len(),
        });
    }
    let col = |i: usize| columns[i].as_ref();

    Ok(Stat {
        packets: parse_counter("packets", col(0))?,
        bytes: parse_counter("bytes", col(1))?,
        target: col(2).to_string(),
        protocol: col(3).to_string(),
        opt: col(4).to_string(),
        input: col(5).to_string(),
        output: col(6).to_string(),
        source: parse_network("source", col(7))?,
        destination: parse_network("destination", col(8))?,
        options: col(9).to_string(),
    })
}

/// Splits verbose listing output into ten-column rows.
///
/// The chain banner and column header are skipped. `blank_opt` re-inserts the
/// all-blank `opt` column that ip6tables before 1.8.9 prints, which
/// whitespace splitting would otherwise swallow.
pub fn split_stats_output(raw: &str, blank_opt: bool) -> Result<Vec<Vec<String>>, ParseError> {
    let mut rows = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        // Chain name and field header
        if i < 2 || line.trim().is_empty() {
            continue;
        }
        rows.push(split_stats_row(line, blank_opt)?);
    }
    Ok(rows)
}

fn split_stats_row(line: &str, blank_opt: bool) -> Result<Vec<String>, ParseError> {
    let mut fields: Vec<String> = line.split_whitespace().map(String::from).collect();

    // Rules without a target print a blank target column, pulling prot into column 2
    let blank_target = (fields.len() > 3 && is_opt_flag(&fields[3]))
        || (blank_opt && fields.len() > 5 && looks_like_address(&fields[5]));
    if blank_target {
        fields.insert(2, String::new());
    }

    // With the opt column gone, field 6 is the source address instead of the out-interface
    if blank_opt && fields.len() > 6 && looks_like_address(&fields[6]) {
        fields.insert(4, "  ".to_string());
    }

    if fields.len() < STAT_COLUMNS - 1 {
        return Err(ParseError::FieldCount {
            expected: STAT_COLUMNS - 1,
            found: fields.len(),
        });
    }

    let options = fields[STAT_COLUMNS - 1..].join(" ");
    fields.truncate(STAT_COLUMNS - 1);
    fields.push(options);
    Ok(fields)
}

fn is_opt_flag(field: &str) -> bool {
    matches!(field, "--" | "-f" | "!f")
}

fn looks_like_address(field: &str) -> bool {
    field.parse::<IpNet>().is_ok() || field.parse::<IpAddr>().is_ok()
}

fn parse_counter(field: &'static str, value: &str) -> Result<u64, ParseError> {
    value.parse().map_err(|source| ParseError::Counter {
        field,
        value: value.to_string(),
        source,
    })
}

/// Parses `addr/len` (or a bare address as a host route) into its network.
fn parse_network(field: &'static str, value: &str) -> Result<IpNet, ParseError> {
    match value.parse::<IpNet>() {
        Ok(net) => Ok(net.trunc()),
        Err(source) => value
            .parse::<IpAddr>()
            .map(IpNet::from)
            .map_err(|_| ParseError::Address {
                field,
                value: value.to_string(),
                source,
            }),
    }
}

impl Stat {
    /// Derives a stats record from a canonical `-S -v` rule line.
    ///
    /// The line must carry a `-c packets bytes` clause (see
    /// [`normalize_rule_line`](super::normalize_rule_line)). Matches the
    /// verbose listing would show as columns are lifted out; absent ones get
    /// the listing defaults, negated ones and everything else stay in
    /// `options`.
    pub fn from_rule_line(line: &str, protocol: Protocol) -> Result<Stat, ParseError> {
        let malformed = || ParseError::Rule(line.to_string());
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 || tokens[0] != "-A" {
            return Err(malformed());
        }

        let any = protocol.any_network();
        let mut counters = None;
        let mut target = String::new();
        let mut proto = "all".to_string();
        let mut opt = "--".to_string();
        let mut input = "*".to_string();
        let mut output = "*".to_string();
        let mut source = any;
        let mut destination = any;
        let mut rest: Vec<&str> = Vec::new();

        let mut i = 2;
        while i < tokens.len() {
            let value = tokens.get(i + 1).copied();
            match (tokens[i], value) {
                ("-c" | "--set-counters", Some(p)) => {
                    let b = tokens.get(i + 2).copied().ok_or_else(malformed)?;
                    counters = Some((parse_counter("packets", p)?, parse_counter("bytes", b)?));
                    i += 3;
                    continue;
                }
                ("-p" | "--protocol", Some(v)) => proto = v.to_string(),
                ("-s" | "--source", Some(v)) => source = parse_network("source", v)?,
                ("-d" | "--destination", Some(v)) => destination = parse_network("destination", v)?,
                ("-i" | "--in-interface", Some(v)) => input = v.to_string(),
                ("-o" | "--out-interface", Some(v)) => output = v.to_string(),
                ("-j" | "--jump" | "-g" | "--goto", Some(v)) => target = v.to_string(),
                ("-f" | "--fragment", _) => {
                    opt = "-f".to_string();
                    i += 1;
                    continue;
                }
                ("!", Some(_)) => {
                    // Negated match: keep operator, option and its value (if any) verbatim
                    let takes_value = tokens.get(i + 2).is_some_and(|v| !v.starts_with('-'));
                    let end = if takes_value { i + 3 } else { i + 2 };
                    rest.extend(&tokens[i..end]);
                    i = end;
                    continue;
                }
                (other, _) => {
                    rest.push(other);
                    i += 1;
                    continue;
                }
            }
            i += 2;
        }

        let (packets, bytes) = counters.ok_or_else(malformed)?;
        Ok(Stat {
            packets,
            bytes,
            target,
            protocol: proto,
            opt,
            input,
            output,
            source,
            destination,
            options: rest.join(" "),
        })
    }
}
