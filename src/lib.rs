//! # slotpool
//!
//! Bounded pool of connections that are created asynchronously on demand.
//!
//! ## Features
//!
//! - Connections created lazily, up to `max_connections`, by an async
//!   [`ConnectionFactory`]
//! - Idle connections reused in a stable order; dead ones replaced in place
//! - Callers queue once the pool is exhausted (FIFO or LIFO) and are served
//!   directly by the next release
//! - Automatic return of connections via RAII (Drop trait)
//! - No capacity leaks when an acquire future is dropped midway
//! - Metrics, health status and Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use async_trait::async_trait;
//! use slotpool::{ConnectionFactory, ConnectionHandle, Pool, PoolConfiguration};
//!
//! struct Session;
//!
//! impl ConnectionHandle for Session {
//!     fn is_closed(&self) -> bool {
//!         false
//!     }
//! }
//!
//! struct Connector;
//!
//! #[async_trait]
//! impl ConnectionFactory for Connector {
//!     type Connection = Session;
//!     type Error = std::io::Error;
//!
//!     async fn create(&self) -> Result<Session, std::io::Error> {
//!         Ok(Session)
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pool = Pool::new(Connector, PoolConfiguration::new().with_max_connections(2)).unwrap();
//! {
//!     let conn = pool.acquire().await.unwrap();
//!     assert!(!conn.is_closed());
//!     // Returned to the pool when `conn` goes out of scope
//! }
//! assert_eq!(pool.status().available, 1);
//! # }
//! ```

mod config;
mod connection;
mod errors;
mod factory;
mod health;
mod metrics;
mod pool;
mod slot;
mod waiters;

#[cfg(test)]
mod testing;

pub use config::{PoolConfiguration, WaiterOrder};
pub use connection::Connection;
pub use errors::{ConfigError, PoolError, PoolResult};
pub use factory::{ConnectionFactory, ConnectionHandle};
pub use health::{HealthStatus, Status};
#[cfg(feature = "prometheus")]
pub use metrics::PoolCollector;
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::Pool;
pub use slot::SlotId;
