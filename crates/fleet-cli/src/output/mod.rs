//! Output formatting utilities for the CLI
//!
//! This module provides functions for formatting fleet data as human-readable
//! terminal output: tables for instances, channels and the manifest, the
//! status display, and colored status messages.

use tabled::{settings::Style, Table, Tabled};

use crate::ipc::{FleetManifest, FleetStatus, InstanceInfo, StartSummary};

/// Format a list of instances as an ASCII table
///
/// # Returns
/// A formatted string suitable for terminal output, or "No instances running"
/// if the list is empty.
pub fn format_instances(instances: &[InstanceInfo]) -> String {
    if instances.is_empty() {
        return "No instances running".to_string();
    }

    #[derive(Tabled)]
    struct InstanceRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "STATE")]
        state: String,
        #[tabled(rename = "LISTEN")]
        listen: String,
        #[tabled(rename = "CONTROL")]
        control: String,
        #[tabled(rename = "WORKDIR")]
        workdir: String,
    }

    let rows: Vec<InstanceRow> = instances
        .iter()
        .map(|i| InstanceRow {
            id: i.id.clone(),
            state: i.state.to_string(),
            listen: i.listen_address.clone(),
            control: i.control_endpoint.clone(),
            workdir: i.workdir.clone(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format the managed channel listing (`"<id>: <source> -> <counterpart>"`
/// entries joined by `,`) as a table
pub fn format_channels(listing: &str) -> String {
    if listing.is_empty() {
        return "No managed channels".to_string();
    }

    #[derive(Tabled)]
    struct ChannelRow {
        #[tabled(rename = "CHANNEL")]
        id: String,
        #[tabled(rename = "SOURCE")]
        source: String,
        #[tabled(rename = "COUNTERPART")]
        counterpart: String,
    }

    let rows: Vec<ChannelRow> = listing
        .split(',')
        .map(|entry| {
            let (id, rest) = entry.split_once(": ").unwrap_or(("-", entry));
            let (source, counterpart) = rest.split_once(" -> ").unwrap_or((rest, "-"));
            ChannelRow {
                id: id.to_string(),
                source: source.to_string(),
                counterpart: truncate(counterpart, 20),
            }
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format the fleet manifest as a table
pub fn format_manifest(manifest: &FleetManifest) -> String {
    if manifest.is_empty() {
        return "No instances running".to_string();
    }

    #[derive(Tabled)]
    struct ManifestRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "ADDRESS")]
        address: String,
        #[tabled(rename = "CERT")]
        cert: String,
        #[tabled(rename = "MACAROON")]
        macaroon: String,
    }

    let rows: Vec<ManifestRow> = manifest
        .nodes
        .iter()
        .map(|n| ManifestRow {
            id: n.id.clone(),
            address: n.address.clone(),
            cert: n.cert.clone(),
            macaroon: n.macaroon.clone(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format orchestrator status as a human-readable string
pub fn format_status(status: &FleetStatus) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Orchestrator Status: {}\n",
        if status.running { "Running" } else { "Stopping" }
    ));
    output.push_str(&format!("Version: {}\n", status.version));
    output.push_str(&format!(
        "Uptime: {}\n",
        format_duration(status.uptime_secs)
    ));
    output.push_str(&format!("Instances: {}\n", status.instance_count));
    output.push_str(&format!("Connected: {}\n", status.connected_count));
    output.push_str(&format!("Managed Channels: {}\n", status.channel_count));
    output.push_str(&format!("Fleet Root: {}\n", status.data_dir));
    output.push_str(&format!("IPC Address: {}\n", status.ipc_address));

    output
}

/// One-line description of a start or load
pub fn format_summary(summary: &StartSummary) -> String {
    format!(
        "{} requested, {} started, {} connected",
        summary.requested, summary.started, summary.connected
    )
}

/// Pretty-print a JSON value, or return the text unchanged if it is not JSON
pub fn format_value(value: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(value) {
        Ok(json @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| value.to_string())
        }
        _ => value.to_string(),
    }
}

/// Format duration in human-readable form
fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
///
/// Outputs to stderr.
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print a warning message in yellow with a warning symbol prefix
pub fn print_warning(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Yellow),
        Print("⚠ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::InstanceState;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(7260), "2h 1m");
        assert_eq!(format_duration(90000), "1d 1h");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("blast", 12), "blast");
        assert_eq!(truncate("02aaaaaaaaaaaaaaaa", 8), "02aaa...");
    }

    #[test]
    fn test_format_channels() {
        assert_eq!(format_channels(""), "No managed channels");

        let table = format_channels("3: blast-0000 -> 02aa,9: blast-0001 -> 03bb");
        assert!(table.contains("CHANNEL"));
        assert!(table.contains("blast-0001"));
        assert!(table.contains("03bb"));
    }

    #[test]
    fn test_format_instances() {
        assert_eq!(format_instances(&[]), "No instances running");

        let table = format_instances(&[InstanceInfo {
            id: "blast-0000".to_string(),
            state: InstanceState::Connected,
            listen_address: "localhost:10011".to_string(),
            control_endpoint: "localhost:10012".to_string(),
            workdir: "/fleet/lnd0000".to_string(),
        }]);
        assert!(table.contains("blast-0000"));
        assert!(table.contains("connected"));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value("bcrt1pabc"), "bcrt1pabc");
        assert_eq!(format_value(r#"{"alias":"blast-0000"}"#), "{\n  \"alias\": \"blast-0000\"\n}");
    }
}
