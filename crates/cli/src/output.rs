//! Output formatting for scans

use anyhow::Result;
use serde_json::json;
use std::time::Duration;
use vajra_common::Scan;

/// Print the scans in the specified format
pub fn print_scans(scans: &[Scan], format: &str, run_duration: Duration) -> Result<()> {
    let format = format.trim().to_lowercase();
    match format.as_str() {
        "json" | "j" => print_json(scans, run_duration)?,
        "table" | "text" | "t" | "" => print_table(scans, run_duration),
        _ => {
            eprintln!("Warning: Unknown format '{}', using default table format", format);
            print_table(scans, run_duration);
        }
    }
    Ok(())
}

/// Print scans as ASCII table, oldest first
fn print_table(scans: &[Scan], run_duration: Duration) {
    if scans.is_empty() {
        println!("\nNo scans to display.\n");
        return;
    }

    let mut sorted = scans.to_vec();
    sorted.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.name.cmp(&b.name)));

    println!("\n{:-<96}", "");
    println!(
        "{:<32} {:<12} {:<20} {:<8} {:<10} {:<10}",
        "SCAN", "STATE", "REASON", "ASSETS", "COMPLETED", "FINDINGS"
    );
    println!("{:-<96}", "");

    let mut done = 0;
    let mut failed = 0;
    for scan in &sorted {
        println!(
            "{:<32} {:<12} {:<20} {:<8} {:<10} {:<10}",
            truncate(&scan.name, 32),
            format!("{:?}", scan.status.state),
            format!("{:?}", scan.status.reason),
            scan.asset_ids.len(),
            scan.summary.jobs_completed,
            total_findings(scan)
        );
        if let Some(message) = &scan.status.message {
            println!("  {}", message);
        }
        match scan.status.state {
            vajra_common::ScanState::Done => done += 1,
            vajra_common::ScanState::Failed => failed += 1,
            _ => {}
        }
    }

    println!("{:-<96}", "");
    println!("\nSummary:");
    println!("  Scans: {}", scans.len());
    println!("  Done: {}", done);
    println!("  Failed: {}", failed);
    println!("  In progress: {}", scans.len() - done - failed);
    println!("  Run duration: {}", format_duration(run_duration));
    println!();
}

/// Print scans as JSON
fn print_json(scans: &[Scan], run_duration: Duration) -> Result<()> {
    let output = json!({
        "run_info": {
            "duration_seconds": run_duration.as_secs_f64(),
            "duration_formatted": format_duration(run_duration),
            "total_scans": scans.len()
        },
        "scans": scans
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn total_findings(scan: &Scan) -> u32 {
    let f = &scan.summary.findings;
    f.total_packages
        + f.total_exploits
        + f.total_malware
        + f.total_misconfigurations
        + f.total_rootkits
        + f.total_secrets
        + f.total_info_finder
        + f.total_vulnerabilities.total()
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width - 3).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}

/// Format duration in a human-readable way
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs == 0 {
        format!("{}ms", millis)
    } else if total_secs < 60 {
        if millis > 0 {
            format!("{}.{:03}s", total_secs, millis)
        } else {
            format!("{}s", total_secs)
        }
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    }
}
