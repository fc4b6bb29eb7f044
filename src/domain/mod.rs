//! Domain layer: ports and events.
//!
//! The components in the crate root depend only on the abstractions defined
//! here; infrastructure adapters provide the concrete store implementations.

pub mod events;
pub mod ports;
