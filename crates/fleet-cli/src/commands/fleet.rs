//! Fleet lifecycle commands

use anyhow::Result;

use crate::ipc::FleetClient;
use crate::output::{format_summary, print_error, print_info, print_success, print_warning};

/// Start `count` fresh nodes
pub async fn start_command(client: &mut FleetClient, count: usize) -> Result<()> {
    print_info(&format!("Starting {} nodes...", count));

    let summary = match client.start_nodes(count).await {
        Ok(s) => s,
        Err(e) => {
            print_error(&format!("Failed to start nodes: {}", e));
            return Err(e);
        }
    };

    if summary.connected < summary.requested {
        print_warning(&format!("Fleet partially started: {}", format_summary(&summary)));
    } else {
        print_success(&format!("Fleet started: {}", format_summary(&summary)));
    }
    Ok(())
}

/// Restore a saved simulation
pub async fn load_command(client: &mut FleetClient, sim: &str) -> Result<()> {
    print_info(&format!("Loading simulation {}...", sim));

    let summary = match client.load(sim).await {
        Ok(s) => s,
        Err(e) => {
            print_error(&format!("Failed to load {}: {}", sim, e));
            return Err(e);
        }
    };

    if summary.connected < summary.requested {
        print_warning(&format!("Simulation {} partially loaded: {}", sim, format_summary(&summary)));
    } else {
        print_success(&format!("Loaded {}: {}", sim, format_summary(&summary)));
    }
    Ok(())
}

/// Save the running fleet
pub async fn save_command(client: &mut FleetClient, sim: &str) -> Result<()> {
    match client.save(sim).await {
        Ok(()) => {
            print_success(&format!("Saved simulation {}", sim));
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to save {}: {}", sim, e));
            Err(e)
        }
    }
}

/// Stop the fleet; the orchestrator exits afterwards
pub async fn stop_command(client: &mut FleetClient) -> Result<()> {
    print_info("Stopping fleet...");
    match client.stop_fleet().await {
        Ok(()) => {
            print_success("Fleet stopped");
        }
        Err(e) => {
            // Connection refused likely means it's not running
            if e.to_string().contains("Is it running") {
                print_warning("Orchestrator is not running");
            } else {
                print_error(&format!("Failed to stop fleet: {}", e));
                return Err(e);
            }
        }
    }
    Ok(())
}
