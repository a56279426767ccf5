//! Plain-text and JSON rendering for command results

use serde::Serialize;
use std::fmt::{self, Display};
use std::io::{self, BufRead, Write};

/// Renders `data` as pretty JSON or through its `Display` impl.
pub fn format_output<T: Serialize + Display>(data: &T, json: bool) -> String {
    if !json {
        return data.to_string();
    }
    match serde_json::to_string_pretty(data) {
        Ok(text) => text,
        Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
    }
}

pub fn print_output<T: Serialize + Display>(data: &T, json: bool) {
    let text = format_output(data, json);
    // Display impls for lists already end in a newline
    if text.ends_with('\n') {
        print!("{}", text);
    } else {
        println!("{}", text);
    }
}

/// One `key: value` line of a report
#[derive(Debug, Serialize)]
pub struct StatusLine {
    pub key: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LineStatus>,
}

#[derive(Debug, Serialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LineStatus {
    Ok,
    Warning,
}

impl Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indicator = match self.status {
            Some(LineStatus::Ok) => "✓",
            Some(LineStatus::Warning) => "!",
            None => " ",
        };
        write!(f, "{} {:<14} {}", indicator, format!("{}:", self.key), self.value)
    }
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub lines: Vec<StatusLine>,
}

impl Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// Column-aligned table; serializes as `{headers, rows}`.
#[derive(Debug, Serialize)]
pub struct TableOutput<T: Serialize> {
    pub headers: Vec<String>,
    pub rows: Vec<T>,
}

impl<T: Serialize + TableRow> Display for TableOutput<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<Vec<String>> = self.rows.iter().map(TableRow::cells).collect();

        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &cells {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }
        let right = T::right_aligned();

        let write_row = |f: &mut fmt::Formatter<'_>, row: &[String]| -> fmt::Result {
            let mut line = String::new();
            for (i, (cell, width)) in row.iter().zip(&widths).enumerate() {
                if i > 0 {
                    line.push_str("  ");
                }
                if right.contains(&i) {
                    line.push_str(&format!("{:>width$}", cell, width = width));
                } else {
                    line.push_str(&format!("{:<width$}", cell, width = width));
                }
            }
            writeln!(f, "{}", line.trim_end())
        };

        write_row(f, &self.headers)?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        write_row(f, &rule)?;
        for row in &cells {
            write_row(f, row)?;
        }
        Ok(())
    }
}

pub trait TableRow {
    fn cells(&self) -> Vec<String>;

    /// Column indices rendered right-aligned (counters).
    fn right_aligned() -> &'static [usize] {
        &[]
    }
}

/// Asks on stderr; `yes` skips the prompt.
pub fn confirm(message: &str, yes: bool) -> bool {
    if yes {
        return true;
    }

    eprint!("{} [y/N] ", message);
    let _ = io::stderr().flush();

    let mut input = String::new();
    if io::stdin().lock().read_line(&mut input).is_err() {
        return false;
    }

    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}
