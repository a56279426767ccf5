//! Canonical rule lines across legacy and nf_tables listing syntax

/// Rewrites one `-S` listing line into canonical form.
///
/// nf_tables prints counters as a leading `[packets:bytes]`; legacy prints
/// them as a trailing `-c packets bytes`. The former is converted to the
/// latter, everything else passes through.
///
/// ```
/// use iptctl::iptables::normalize_rule_line;
///
/// assert_eq!(
///     normalize_rule_line("[99:42] -A foo -j ACCEPT"),
///     "-A foo -j ACCEPT -c 99 42"
/// );
/// ```
pub fn normalize_rule_line(line: &str) -> String {
    match split_counter_prefix(line) {
        // Quoted values may hold runs of spaces, so the body is kept as printed
        Some((packets, bytes, rest)) => format!("{} -c {} {}", rest.trim(), packets, bytes),
        None => line.to_string(),
    }
}

// "[99:42] -A foo" -> ("99", "42", "-A foo")
fn split_counter_prefix(line: &str) -> Option<(&str, &str, &str)> {
    let inner = line.strip_prefix('[')?;
    let (counters, rest) = inner.split_once(']')?;
    let (packets, bytes) = counters.split_once(':')?;
    let is_count = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !is_count(packets) || !is_count(bytes) {
        return None;
    }
    Some((packets, bytes, rest))
}
