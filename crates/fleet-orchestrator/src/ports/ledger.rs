//! Ledger of ports handed out to fleet instances

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::io;
use std::net::TcpListener;

use fleet_core::error::PortError;
use fleet_core::InstanceId;

/// Tracks which ports belong to which instance.
///
/// A *claim* marks a port as owned; it lasts until the fleet is torn down so
/// later allocations never hand out a port a running node is using. A
/// *reservation* additionally holds a bound placeholder listener so nothing
/// else on the host can grab the port before its node starts.
pub struct PortLedger {
    claims: DashMap<u16, InstanceId>,
    reserved: DashMap<u16, TcpListener>,
}

impl PortLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            claims: DashMap::new(),
            reserved: DashMap::new(),
        }
    }

    /// Claim `port` for `owner` if nobody holds it yet
    pub fn try_claim(&self, port: u16, owner: &InstanceId) -> bool {
        match self.claims.entry(port) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(owner.clone());
                true
            }
        }
    }

    /// Drop a claim (and any reservation) on `port`
    pub fn unclaim(&self, port: u16) {
        self.reserved.remove(&port);
        self.claims.remove(&port);
    }

    /// Bind a placeholder listener on exactly `port` and claim it for `owner`
    pub fn reserve(&self, port: u16, owner: &InstanceId) -> Result<(), PortError> {
        let newly_claimed = match self.claims.entry(port) {
            Entry::Occupied(existing) => {
                if existing.get() != owner {
                    return Err(PortError::Unavailable {
                        port,
                        source: io::Error::new(
                            io::ErrorKind::AddrInUse,
                            format!("claimed by {}", existing.get()),
                        ),
                    });
                }
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(owner.clone());
                true
            }
        };

        if self.reserved.contains_key(&port) {
            return Ok(());
        }

        match TcpListener::bind(("127.0.0.1", port)) {
            Ok(listener) => {
                self.reserved.insert(port, listener);
                tracing::trace!(port, owner = %owner, "Reserved port");
                Ok(())
            }
            Err(source) => {
                if newly_claimed {
                    self.claims.remove(&port);
                }
                Err(PortError::Unavailable { port, source })
            }
        }
    }

    /// Close the placeholder on `port`; the claim stays
    pub fn release(&self, port: u16) -> bool {
        self.reserved.remove(&port).is_some()
    }

    /// Drop every claim and reservation held by `owner`
    pub fn release_owner(&self, owner: &InstanceId) {
        self.claims.retain(|port, claimant| {
            let keep = claimant != owner;
            if !keep {
                self.reserved.remove(port);
            }
            keep
        });
    }

    /// Owner of a claimed port
    pub fn owner(&self, port: u16) -> Option<InstanceId> {
        self.claims.get(&port).map(|o| o.clone())
    }

    pub fn is_claimed(&self, port: u16) -> bool {
        self.claims.contains_key(&port)
    }

    pub fn is_reserved(&self, port: u16) -> bool {
        self.reserved.contains_key(&port)
    }

    /// Number of claimed ports
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Number of ports currently held by a placeholder listener
    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }

    /// Forget everything
    pub fn clear(&self) {
        self.reserved.clear();
        self.claims.clear();
    }
}

impl Default for PortLedger {
    fn default() -> Self {
        Self::new()
    }
}
