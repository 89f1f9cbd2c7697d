//! Node commands served by a verifier agent

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, AuditQuery};
use crate::output::{
    color_residual, color_verdict, format_bytes, format_cpu, format_cpu_list, print_error,
    print_json, print_success, print_table, print_warning, OutputFormat,
};

/// Row for the container audit table
#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "Strategy")]
    strategy: String,
    #[tabled(rename = "CPUs")]
    cpus: String,
    #[tabled(rename = "Result")]
    result: String,
}

/// Show available resources on a node
///
/// Negative residuals are reported, not treated as a failure.
pub async fn show_available(client: &ApiClient, node: &str, format: OutputFormat) -> Result<()> {
    let result = client.node_available(node).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let available = result.available;
            println!("{}", "Available Resources".bold());
            println!("{}", "=".repeat(50));
            println!("Node:                   {}", result.node.cyan());
            println!(
                "CPU:                    {}",
                color_residual(available.cpu_milli, format_cpu(available.cpu_milli))
            );
            println!(
                "Memory:                 {}",
                color_residual(available.memory_bytes, format_bytes(available.memory_bytes))
            );
            println!(
                "Ephemeral storage:      {}",
                color_residual(
                    available.ephemeral_storage_bytes,
                    format_bytes(available.ephemeral_storage_bytes)
                )
            );
            if result.overcommitted {
                println!();
                print_warning("Node is over-committed");
            }
        }
    }

    Ok(())
}

/// Audit the cpuset bindings on a node
pub async fn audit(
    client: &ApiClient,
    node: &str,
    query: AuditQuery,
    verbose: bool,
    format: OutputFormat,
) -> Result<bool> {
    let report = client.node_audit(node, &query).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("{}", "Node Audit".bold());
            println!("{}", "=".repeat(60));
            println!("Node:                   {}", report.node.cyan());
            println!(
                "Generated:              {}",
                report.generated_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
            );
            println!(
                "Topology:               {} logical / {} physical",
                report.logical_cpus, report.physical_core_count
            );
            println!("Over-quota ratio:       {}", report.over_quota_ratio);
            println!();

            let rows: Vec<ContainerRow> = report
                .containers
                .iter()
                .filter(|c| verbose || !c.verdict.is_pass())
                .map(|c| ContainerRow {
                    pod: c.pod.clone(),
                    container: c.container.clone(),
                    strategy: c.strategy.to_string(),
                    cpus: format_cpu_list(&c.cpu_ids),
                    result: color_verdict(&c.verdict),
                })
                .collect();

            println!("{}", "Placement".bold());
            println!("{}", "-".repeat(60));
            if rows.is_empty() {
                println!("{} containers checked, no violations", report.containers.len());
            } else {
                print_table(rows);
            }
            for violation in report.violations() {
                println!("  {}: {}", violation.pod, violation.verdict);
            }
            println!();

            println!("{}", "Over-quota".bold());
            println!("{}", "-".repeat(60));
            println!("Bound total:            {}", report.tally.bound_total());
            println!("Result:                 {}", color_verdict(&report.over_quota));
            if !report.over_quota.is_pass() {
                println!("  {}", report.over_quota);
            }
            println!();

            println!("{}", "Available".bold());
            println!("{}", "-".repeat(60));
            println!(
                "CPU / Memory / Disk:    {} / {} / {}",
                format_cpu(report.available.cpu_milli),
                format_bytes(report.available.memory_bytes),
                format_bytes(report.available.ephemeral_storage_bytes)
            );
            println!();

            if report.passed {
                print_success("Node audit passed");
            } else {
                print_error("Node audit failed");
            }
        }
    }

    Ok(report.passed)
}
