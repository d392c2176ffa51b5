//! Port allocation and reservation

mod allocator;
mod ledger;

pub use allocator::PortAllocator;
pub use ledger::PortLedger;
