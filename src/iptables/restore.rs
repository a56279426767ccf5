//! Bulk rule loading through `iptables-restore`

use std::collections::HashMap;

/// Chain name to its rules, each rule as argument tokens.
///
/// Rules keep their order within a chain. Chains are emitted in the map's
/// iteration order, which is unspecified.
pub type ChainRules = HashMap<String, Vec<Vec<String>>>;

/// Builds the `iptables-restore` transaction for one table.
///
/// Each chain is declared (`:CHAIN - [0:0]`), which creates it or, with
/// `--noflush`, empties an existing one, then filled with `-A` lines.
pub fn build_payload(table: &str, chains: &ChainRules) -> String {
    let mut buf = format!("*{}\n", table);
    for (chain, rules) in chains {
        buf.push_str(&format!(":{} - [0:0]\n", chain));
        for rule in rules {
            buf.push_str("-A ");
            buf.push_str(chain);
            for token in rule {
                buf.push(' ');
                push_token(&mut buf, token);
            }
            buf.push('\n');
        }
    }
    buf.push_str("COMMIT\n");
    buf
}

// iptables-restore splits on whitespace outside double quotes and honors
// backslash escapes inside them
fn push_token(buf: &mut String, token: &str) {
    let plain = !token.is_empty()
        && !token
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\\');
    if plain {
        buf.push_str(token);
        return;
    }
    buf.push('"');
    for c in token.chars() {
        if c == '"' || c == '\\' {
            buf.push('\\');
        }
        buf.push(c);
    }
    buf.push('"');
}
