//! Free-port allocation

use std::net::TcpListener;
use std::sync::Arc;

use fleet_core::error::PortError;
use fleet_core::InstanceId;

use super::PortLedger;

type Probe = Box<dyn Fn() -> Result<u16, PortError> + Send + Sync>;

/// Hands out OS-free ports that no fleet instance has claimed yet
pub struct PortAllocator {
    ledger: Arc<PortLedger>,
    max_attempts: u32,
    probe: Probe,
}

impl PortAllocator {
    /// Create an allocator over `ledger`, probing at most `max_attempts`
    /// times per requested port
    pub fn new(ledger: Arc<PortLedger>, max_attempts: u32) -> Self {
        Self {
            ledger,
            max_attempts: max_attempts.max(1),
            probe: Box::new(probe),
        }
    }

    #[cfg(test)]
    fn with_probe(
        ledger: Arc<PortLedger>,
        max_attempts: u32,
        probe: impl Fn() -> Result<u16, PortError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            ledger,
            max_attempts,
            probe: Box::new(probe),
        }
    }

    /// The ledger this allocator claims into
    pub fn ledger(&self) -> &Arc<PortLedger> {
        &self.ledger
    }

    /// Allocate `count` distinct ports for `owner`.
    ///
    /// On failure every port claimed by this call is given back.
    pub fn allocate(&self, owner: &InstanceId, count: usize) -> Result<Vec<u16>, PortError> {
        let mut ports = Vec::with_capacity(count);

        for _ in 0..count {
            match self.claim_one(owner) {
                Ok(port) => ports.push(port),
                Err(e) => {
                    for port in &ports {
                        self.ledger.unclaim(*port);
                    }
                    tracing::warn!(owner = %owner, error = %e, "Port allocation failed");
                    return Err(e);
                }
            }
        }

        tracing::debug!(owner = %owner, ?ports, "Allocated ports");
        Ok(ports)
    }

    fn claim_one(&self, owner: &InstanceId) -> Result<u16, PortError> {
        for _ in 0..self.max_attempts {
            let port = (self.probe)()?;
            if self.ledger.try_claim(port, owner) {
                return Ok(port);
            }
            tracing::trace!(port, "Probed port already claimed, retrying");
        }

        Err(PortError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}

/// Ask the OS for a currently-unused port
fn probe() -> Result<u16, PortError> {
    let listener = TcpListener::bind("127.0.0.1:0").map_err(PortError::Probe)?;
    let port = listener.local_addr().map_err(PortError::Probe)?.port();
    Ok(port)
}
