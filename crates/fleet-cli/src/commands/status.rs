//! Status, instance list and manifest commands

use anyhow::Result;

use crate::ipc::FleetClient;
use crate::output::{format_instances, format_manifest, format_status, print_error};

/// Execute the status command
pub async fn status_command(client: &mut FleetClient) -> Result<()> {
    let status = match client.status().await {
        Ok(s) => s,
        Err(e) => {
            print_error(&format!("Failed to get orchestrator status: {}", e));
            print_error("Is the orchestrator running? Try: lnfleet serve");
            return Err(e);
        }
    };

    println!("{}", format_status(&status));
    Ok(())
}

/// Execute the list command
pub async fn list_command(client: &mut FleetClient) -> Result<()> {
    let instances = match client.list_instances().await {
        Ok(i) => i,
        Err(e) => {
            print_error(&format!("Failed to list instances: {}", e));
            return Err(e);
        }
    };

    println!("Fleet Instances:");
    println!("{}", format_instances(&instances));
    Ok(())
}

/// Print the fleet manifest, as a table or as the JSON written to `sim.json`
pub async fn manifest_command(client: &mut FleetClient, json: bool) -> Result<()> {
    let manifest = match client.manifest().await {
        Ok(m) => m,
        Err(e) => {
            print_error(&format!("Failed to get manifest: {}", e));
            return Err(e);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
    } else {
        println!("{}", format_manifest(&manifest));
    }
    Ok(())
}
