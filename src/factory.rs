//! Traits implemented by the resource being pooled

use async_trait::async_trait;

/// A pooled connection that can report whether it is still usable.
pub trait ConnectionHandle: Send + 'static {
    /// Point-in-time liveness probe. Must not have side effects.
    fn is_closed(&self) -> bool;
}

/// Creates new connections for a [`Pool`](crate::Pool).
///
/// The factory owns whatever it needs to connect (address, credentials, ...).
/// It may be called concurrently, up to `max_connections` times at once.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Type of connections this factory creates.
    type Connection: ConnectionHandle;

    /// Error returned when a connection cannot be created.
    type Error: Send + 'static;

    /// Creates a new connection.
    async fn create(&self) -> Result<Self::Connection, Self::Error>;
}
