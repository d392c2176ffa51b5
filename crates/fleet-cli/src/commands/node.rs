//! Per-node commands forwarded through the orchestrator

use anyhow::Result;

use fleet_core::ipc::FleetRequest;

use crate::ipc::FleetClient;
use crate::output::{format_value, print_error, print_success};

/// Run a forwarded query and print the node's answer
pub async fn node_query_command(client: &mut FleetClient, request: FleetRequest) -> Result<()> {
    match client.query(request).await {
        Ok(value) => {
            println!("{}", format_value(&value));
            Ok(())
        }
        Err(e) => {
            print_error(&e.to_string());
            Err(e)
        }
    }
}

/// Peer management action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerAction {
    Connect,
    Disconnect,
}

/// Connect or disconnect a node and a peer
pub async fn peer_command(
    client: &mut FleetClient,
    action: PeerAction,
    instance: &str,
    pubkey: &str,
    address: &str,
) -> Result<()> {
    let result = match action {
        PeerAction::Connect => client.connect_peer(instance, pubkey, address).await,
        PeerAction::Disconnect => client.disconnect_peer(instance, pubkey, address).await,
    };

    match result {
        Ok(()) => {
            let verb = match action {
                PeerAction::Connect => "Connected",
                PeerAction::Disconnect => "Disconnected",
            };
            print_success(&format!("{} {} and {}", verb, instance, pubkey));
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Peer operation failed: {}", e));
            Err(e)
        }
    }
}
