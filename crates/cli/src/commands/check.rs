//! Local checker commands
//!
//! These run the checkers in-process and never contact an agent.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;
use verifier_lib::topology::core_histogram;
use verifier_lib::{
    evaluate_over_quota, evaluate_placement, CoreUseTally, PlacementStrategy, Verdict,
};

use crate::output::{
    color_verdict, format_cpu_list, print_json, print_success, print_table, print_warning,
    OutputFormat,
};

#[derive(Serialize)]
struct CheckOutput<'a> {
    passed: bool,
    verdict: &'a Verdict,
}

/// Row for the per-core histogram table
#[derive(Tabled)]
struct CoreRow {
    #[tabled(rename = "Core")]
    core: String,
    #[tabled(rename = "Bound")]
    bound: u32,
}

/// Parse a `cpu=count` tally entry
pub fn parse_tally_entry(entry: &str) -> Result<(u32, u32), String> {
    let (cpu, count) = entry
        .split_once('=')
        .ok_or_else(|| format!("expected CPU=COUNT, got '{}'", entry))?;
    let cpu = cpu
        .trim()
        .parse()
        .map_err(|_| format!("invalid cpu id '{}'", cpu))?;
    let count = count
        .trim()
        .parse()
        .map_err(|_| format!("invalid count '{}'", count))?;
    Ok((cpu, count))
}

fn report(verdict: &Verdict, format: OutputFormat) -> Result<bool> {
    match format {
        OutputFormat::Json => print_json(&CheckOutput {
            passed: verdict.is_pass(),
            verdict,
        })?,
        OutputFormat::Table => match verdict {
            Verdict::Pass => print_success("Check passed"),
            other => print_warning(&format!("Check failed: {}", other)),
        },
    }
    Ok(verdict.is_pass())
}

/// Check one container's cpuset against a placement strategy
pub fn placement(
    cpu_ids: &[u32],
    physical_cores: u32,
    strategy: &str,
    skip: bool,
    verbose: bool,
    format: OutputFormat,
) -> Result<bool> {
    let strategy: PlacementStrategy = strategy.parse()?;
    let verdict = evaluate_placement(cpu_ids, physical_cores, &strategy, skip);

    if verbose && format == OutputFormat::Table {
        println!("{}", "Placement Check".bold());
        println!("{}", "=".repeat(50));
        println!("CPUs:                   {}", format_cpu_list(cpu_ids).cyan());
        println!("Physical cores:         {}", physical_cores);
        println!("Strategy:               {}", strategy);
        println!("Result:                 {}", color_verdict(&verdict));
        println!();

        if let Some(histogram) = core_histogram(cpu_ids, physical_cores) {
            let rows: Vec<CoreRow> = histogram
                .into_iter()
                .map(|(core, bound)| CoreRow {
                    core: core.to_string(),
                    bound,
                })
                .collect();
            print_table(rows);
        }
    }

    report(&verdict, format)
}

/// Check a node-wide tally against an over-quota ratio
pub fn over_quota(
    entries: Vec<(u32, u32)>,
    total_cpus: u32,
    ratio: f64,
    verbose: bool,
    format: OutputFormat,
) -> Result<bool> {
    let tally: CoreUseTally = entries.into_iter().collect();
    let verdict = evaluate_over_quota(&tally, total_cpus, ratio);

    if verbose && format == OutputFormat::Table {
        println!("{}", "Over-Quota Check".bold());
        println!("{}", "=".repeat(50));
        println!("CPUs:                   {}", total_cpus);
        println!("Ratio:                  {}", ratio);
        println!("Bound total:            {}", tally.bound_total());
        println!("Result:                 {}", color_verdict(&verdict));
        println!();

        let rows: Vec<CoreRow> = tally
            .iter()
            .map(|(cpu, bound)| CoreRow {
                core: cpu.to_string(),
                bound,
            })
            .collect();
        print_table(rows);
    }

    report(&verdict, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tally_entry() {
        assert_eq!(parse_tally_entry("3=2"), Ok((3, 2)));
        assert_eq!(parse_tally_entry(" 10 = 1 "), Ok((10, 1)));
        assert!(parse_tally_entry("3").is_err());
        assert!(parse_tally_entry("a=1").is_err());
        assert!(parse_tally_entry("1=-1").is_err());
    }

    #[test]
    fn test_placement_outcomes() {
        let format = OutputFormat::Json;
        assert!(placement(&[0, 24, 1, 25], 24, "sameCoreFirst", false, false, format).unwrap());
        assert!(!placement(&[0, 1, 2, 3], 24, "sameCoreFirst", false, false, format).unwrap());
        assert!(!placement(&[0, 1], 24, "random", false, false, format).unwrap());
        assert!(placement(&[0, 1], 24, "random", true, false, format).unwrap());
    }

    #[test]
    fn test_over_quota_outcomes() {
        let format = OutputFormat::Json;
        let within: Vec<(u32, u32)> = (0..8).map(|cpu| (cpu, 2)).collect();
        assert!(over_quota(within.clone(), 8, 1.5, false, format).unwrap());

        let mut over = within;
        over.push((8, 1));
        assert!(!over_quota(over, 8, 1.5, false, format).unwrap());
    }
}
