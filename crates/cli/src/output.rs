//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};
use verifier_lib::Verdict;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Format bytes as human-readable string; negative values keep their sign
pub fn format_bytes(bytes: i64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    let sign = if bytes < 0 { "-" } else { "" };
    let magnitude = bytes.unsigned_abs();

    if magnitude >= GB {
        format!("{}{:.2}Gi", sign, magnitude as f64 / GB as f64)
    } else if magnitude >= MB {
        format!("{}{:.2}Mi", sign, magnitude as f64 / MB as f64)
    } else if magnitude >= KB {
        format!("{}{:.2}Ki", sign, magnitude as f64 / KB as f64)
    } else {
        format!("{}{}B", sign, magnitude)
    }
}

/// Format millicores as human-readable string
pub fn format_cpu(millicores: i64) -> String {
    if millicores.unsigned_abs() >= 1000 {
        format!("{:.1}", millicores as f64 / 1000.0)
    } else {
        format!("{}m", millicores)
    }
}

/// Color a residual red when it went negative
pub fn color_residual(value: i64, formatted: String) -> String {
    if value < 0 {
        formatted.red().bold().to_string()
    } else {
        formatted.green().to_string()
    }
}

/// Color a verdict by outcome
pub fn color_verdict(verdict: &Verdict) -> String {
    match verdict {
        Verdict::Pass => "pass".green().to_string(),
        Verdict::PolicyViolated { .. } => "violated".red().to_string(),
        Verdict::UnsupportedStrategy { .. } => "unsupported".yellow().to_string(),
        Verdict::InvalidInput { .. } => "invalid".yellow().to_string(),
    }
}

/// Format a cpu id list compactly, collapsing consecutive runs
pub fn format_cpu_list(ids: &[u32]) -> String {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts = Vec::new();
    let mut iter = sorted.into_iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while let Some(next) = iter.next_if(|&id| Some(id) == end.checked_add(1)) {
            end = next;
        }
        if end == start {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{}-{}", start, end));
        }
    }
    parts.join(",")
}
