//! Orchestration substrate the operator reconciles against
//!
//! Desired clusters, observed state and fleets live in versioned stores;
//! member status is observed only.

mod memory;
mod traits;

pub use memory::InMemorySubstrate;
pub use traits::{Substrate, SubstrateEvent};
