//! Core connection pool implementation

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot::Receiver;
use tracing::{debug, warn};

use crate::config::PoolConfiguration;
use crate::connection::{Connection, Reservation, ReservationKind, Ticket};
use crate::errors::{ConfigError, PoolError, PoolResult};
use crate::factory::{ConnectionFactory, ConnectionHandle};
use crate::health::{HealthStatus, Status};
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};
use crate::slot::{SlotId, SlotRegistry};
use crate::waiters::{Grant, WaiterQueue, Waiting};

/// Bounded pool of connections created on demand by a [`ConnectionFactory`].
///
/// Cloning is cheap; clones share the same connections.
pub struct Pool<M: ConnectionFactory> {
    inner: Arc<Shared<M>>,
}

impl<M: ConnectionFactory> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ConnectionFactory> fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}

impl<M: ConnectionFactory> Pool<M> {
    /// Create an empty pool. No connection is created until the first acquire.
    pub fn new(factory: M, config: PoolConfiguration) -> Result<Self, ConfigError> {
        config.validate()?;
        debug!(
            max_connections = config.max_connections,
            waiter_order = ?config.waiter_order,
            "connection pool created"
        );

        Ok(Self {
            inner: Arc::new(Shared {
                state: Mutex::new(PoolState {
                    active: 0,
                    slots: SlotRegistry::new(config.max_connections),
                    waiters: WaiterQueue::new(config.waiter_order),
                }),
                factory,
                config,
                metrics: MetricsTracker::new(),
            }),
        })
    }

    /// Get a connection, creating one if there is spare capacity, or wait
    /// until another caller releases one.
    ///
    /// An idle connection that reports itself closed is replaced in place.
    /// Waiting has no timeout.
    ///
    /// # Errors
    ///
    /// [`PoolError::Creation`] if the factory fails. The pool does not retry.
    pub async fn acquire(&self) -> PoolResult<Connection<M>, M::Error> {
        let ticket = loop {
            match self.inner.checkout() {
                Checkout::Ready(grant) => break Ticket::arm(&self.inner, grant),
                Checkout::Wait(rx) => {
                    self.inner.metrics.record_wait();
                    debug!("pool exhausted, waiting for a connection");
                    if let Some(ticket) = Waiting::new(rx, &self.inner).wait().await {
                        break ticket;
                    }
                }
            }
        };

        let reservation = match ticket {
            Ticket::Connection(conn) if !conn.is_closed() => {
                self.inner.metrics.record_acquired();
                return Ok(conn);
            }
            Ticket::Connection(conn) => {
                debug!(slot = %Connection::slot_id(&conn), "connection closed, replacing it");
                conn.into_replacement(&self.inner)
            }
            Ticket::Reservation(reservation) => reservation,
        };

        self.create(reservation).await
    }

    async fn create(&self, reservation: Reservation<M>) -> PoolResult<Connection<M>, M::Error> {
        match self.inner.factory.create().await {
            Ok(conn) => {
                if let ReservationKind::Replace(_) = reservation.kind() {
                    self.inner.metrics.record_replaced();
                }
                let conn = reservation.commit(conn);
                self.inner.metrics.record_created();
                self.inner.metrics.record_acquired();
                debug!(slot = %Connection::slot_id(&conn), "connection created");
                Ok(conn)
            }
            Err(err) => {
                if let ReservationKind::Replace(id) = reservation.kind() {
                    debug!(slot = %id, "evicting slot after failed replacement");
                }
                // Releases the capacity, or hands it to a waiter.
                drop(reservation);
                self.inner.metrics.record_creation_failure();
                warn!("failed to create connection");
                Err(PoolError::Creation(err))
            }
        }
    }

    /// Return a connection to the pool.
    ///
    /// If callers are waiting, the connection goes straight to one of them.
    /// Dropping a [`Connection`] has the same effect.
    ///
    /// Passing a connection issued by another pool is a programming error: it
    /// panics in debug builds and leaves this pool untouched otherwise. The
    /// connection then goes back to the pool that issued it.
    pub fn release(&self, conn: Connection<M>) {
        if !conn.belongs_to(&self.inner) {
            self.inner.metrics.record_misuse();
            warn!(
                slot = %Connection::slot_id(&conn),
                "release called with a connection this pool never issued"
            );
            debug_assert!(false, "release called with a connection this pool never issued");
            return;
        }
        drop(conn);
    }

    /// Run `f` with a connection and release it once the returned future
    /// settles, whether it succeeds, fails or panics.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let rows = pool
    ///     .with_connection(|conn| Box::pin(async move { conn.query("SELECT 1").await }))
    ///     .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// The error of `f`, or the acquire error converted into `E`.
    pub async fn with_connection<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut M::Connection) -> BoxFuture<'c, Result<T, E>>,
        E: From<PoolError<M::Error>>,
    {
        let mut conn = self.acquire().await?;
        let result = f(&mut *conn).await;
        self.release(conn);
        result
    }

    /// Point-in-time counts, taken under the pool lock.
    pub fn status(&self) -> Status {
        self.inner.status()
    }

    /// Get pool metrics
    pub fn metrics(&self) -> PoolMetrics {
        self.inner.metrics.get_metrics(&self.status())
    }

    /// Get health status
    pub fn health(&self) -> HealthStatus {
        HealthStatus::new(&self.status())
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.metrics().export()
    }

    /// Export metrics in Prometheus text format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.metrics(), pool_name, tags)
    }

    /// Configuration the pool was built with.
    pub fn config(&self) -> &PoolConfiguration {
        &self.inner.config
    }

    /// The factory used to create connections.
    pub fn factory(&self) -> &M {
        &self.inner.factory
    }
}

pub(crate) struct Shared<M: ConnectionFactory> {
    state: Mutex<PoolState<M::Connection>>,
    factory: M,
    config: PoolConfiguration,
    metrics: MetricsTracker,
}

/// Everything guarded by the pool lock.
struct PoolState<C> {
    /// Slots plus fresh reservations still being created.
    active: usize,
    slots: SlotRegistry<C>,
    waiters: WaiterQueue<C>,
}

enum Checkout<C> {
    Ready(Grant<C>),
    Wait(Receiver<Grant<C>>),
}

impl<M: ConnectionFactory> Shared<M> {
    fn checkout(&self) -> Checkout<M::Connection> {
        let mut state = self.state.lock();

        if let Some((id, conn)) = state.slots.take_first_available() {
            return Checkout::Ready(Grant::Slot { id, conn });
        }

        if state.active < self.config.max_connections {
            state.active += 1;
            return Checkout::Ready(Grant::Reservation);
        }

        Checkout::Wait(state.waiters.push())
    }

    /// Put a checked-out slot back, or hand it to a waiter.
    ///
    /// Gives the connection back if the slot is not checked out of this pool.
    fn check_in(&self, id: SlotId, conn: M::Connection) -> Result<(), M::Connection> {
        let mut state = self.state.lock();

        if !state.slots.is_checked_out(id) {
            return Err(conn);
        }

        match state.waiters.offer(Grant::Slot { id, conn }) {
            Some(Grant::Slot { conn, .. }) => state.slots.mark_available(id, conn),
            // Handed to a waiter.
            _ => Ok(()),
        }
    }

    pub(crate) fn return_connection(&self, id: SlotId, conn: M::Connection) {
        match self.check_in(id, conn) {
            Ok(()) => self.metrics.record_released(),
            Err(conn) => {
                self.metrics.record_misuse();
                warn!(slot = %id, "returned connection does not match a checked-out slot");
                drop(conn);
            }
        }
    }

    pub(crate) fn begin_replacement(&self, id: SlotId) {
        let marked = self.state.lock().slots.mark_replacing(id);
        debug_assert!(marked, "replaced slot was not checked out");
    }

    pub(crate) fn commit(&self, kind: ReservationKind) -> SlotId {
        let mut state = self.state.lock();
        match kind {
            ReservationKind::Replace(id) if state.slots.finish_replacing(id) => id,
            _ => state.slots.push_checked_out(),
        }
    }

    /// Release one unit of capacity, evicting `evict` first. A waiter, if any,
    /// inherits the capacity as a fresh reservation.
    pub(crate) fn free_capacity(&self, evict: Option<SlotId>) {
        let mut state = self.state.lock();

        if let Some(id) = evict {
            let _ = state.slots.remove(id);
        }

        if state.waiters.offer(Grant::Reservation).is_some() {
            state.active -= 1;
        }
    }

    pub(crate) fn detach(&self, id: SlotId) {
        debug!(slot = %id, "connection taken out of the pool");
        self.free_capacity(Some(id));
    }

    fn status(&self) -> Status {
        let state = self.state.lock();
        let counts = state.slots.counts();
        Status {
            max_connections: self.config.max_connections,
            active: state.active,
            slots: state.slots.len(),
            available: counts.available,
            checked_out: counts.checked_out,
            replacing: counts.replacing,
            pending: state.active - state.slots.len(),
            waiting: state.waiters.len(),
        }
    }
}
