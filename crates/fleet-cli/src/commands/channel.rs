//! Managed channel commands

use anyhow::Result;

use crate::ipc::FleetClient;
use crate::output::{format_channels, print_error, print_info, print_success};

/// Ask a node to open a channel; the record appears once the node reports
/// the channel open
pub async fn open_channel_command(
    client: &mut FleetClient,
    instance: &str,
    peer_pubkey: &str,
    amount: i64,
    push_amount: i64,
    channel_id: i64,
) -> Result<()> {
    match client
        .open_channel(instance, peer_pubkey, amount, push_amount, channel_id)
        .await
    {
        Ok(()) => {
            print_success(&format!("Channel {} open accepted by {}", channel_id, instance));
            print_info("Run 'lnfleet channels' to see it once it is open");
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to open channel {}: {}", channel_id, e));
            Err(e)
        }
    }
}

/// Close a managed channel
pub async fn close_channel_command(client: &mut FleetClient, channel_id: i64) -> Result<()> {
    match client.close_channel(channel_id).await {
        Ok(()) => {
            print_success(&format!("Closed channel {}", channel_id));
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Failed to close channel {}: {}", channel_id, e));
            Err(e)
        }
    }
}

/// List managed channels
pub async fn managed_channels_command(client: &mut FleetClient, raw: bool) -> Result<()> {
    let listing = match client.managed_channels().await {
        Ok(l) => l,
        Err(e) => {
            print_error(&format!("Failed to list channels: {}", e));
            return Err(e);
        }
    };

    if raw {
        println!("{}", listing);
    } else {
        println!("{}", format_channels(&listing));
    }
    Ok(())
}
