//! Infrastructure adapters implementing the domain ports.
//!
//! - [`redis`] - Redis cache tier
//! - [`postgres`] - Postgres durable tier
//! - [`memory`] - in-memory tiers for tests and embedding
//! - [`capture`] - error-capture backends

pub mod capture;
pub mod memory;
pub mod postgres;
pub mod redis;

pub use self::capture::{InMemoryErrorCapture, TracingErrorCapture};
pub use self::memory::{MemoryCacheTier, MemoryDurableTier};
pub use self::postgres::PostgresDurableTier;
pub use self::redis::RedisCacheTier;
