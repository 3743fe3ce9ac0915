//! Guards handed out by the pool

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

use crate::factory::ConnectionFactory;
use crate::pool::Shared;
use crate::slot::SlotId;
use crate::waiters::Grant;

/// A connection checked out of a [`Pool`](crate::Pool).
///
/// Dereferences to the underlying connection. Returned to the pool by
/// [`Pool::release`](crate::Pool::release) or when dropped.
#[must_use]
pub struct Connection<M: ConnectionFactory> {
    conn: Option<M::Connection>,
    id: SlotId,
    pool: Weak<Shared<M>>,
}

impl<M: ConnectionFactory> fmt::Debug for Connection<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("slot", &self.id)
            .field("attached", &(self.pool.strong_count() > 0))
            .finish()
    }
}

impl<M: ConnectionFactory> Connection<M> {
    pub(crate) fn new(id: SlotId, conn: M::Connection, pool: &Arc<Shared<M>>) -> Self {
        Self {
            conn: Some(conn),
            id,
            pool: Arc::downgrade(pool),
        }
    }

    /// Slot this connection occupies. Stays the same across replacements of a
    /// dead connection.
    pub fn slot_id(this: &Self) -> SlotId {
        this.id
    }

    /// Takes the connection out of the pool permanently, freeing its capacity.
    pub fn take(mut this: Self) -> M::Connection {
        let conn = this.conn.take().expect("connection already returned");
        if let Some(pool) = this.pool.upgrade() {
            pool.detach(this.id);
        }
        conn
    }

    pub(crate) fn belongs_to(&self, pool: &Arc<Shared<M>>) -> bool {
        std::ptr::eq(self.pool.as_ptr(), Arc::as_ptr(pool))
    }

    /// Drops the dead connection and reserves its slot for a replacement.
    pub(crate) fn into_replacement(mut self, pool: &Arc<Shared<M>>) -> Reservation<M> {
        let dead = self.conn.take();
        pool.begin_replacement(self.id);
        drop(dead);
        Reservation::replace(Arc::clone(pool), self.id)
    }
}

impl<M: ConnectionFactory> Drop for Connection<M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Some(pool) = self.pool.upgrade() {
                pool.return_connection(self.id, conn);
            }
        }
    }
}

impl<M: ConnectionFactory> Deref for Connection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection already returned")
    }
}

impl<M: ConnectionFactory> DerefMut for Connection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection already returned")
    }
}

impl<M: ConnectionFactory> AsRef<M::Connection> for Connection<M> {
    fn as_ref(&self) -> &M::Connection {
        self
    }
}

impl<M: ConnectionFactory> AsMut<M::Connection> for Connection<M> {
    fn as_mut(&mut self) -> &mut M::Connection {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReservationKind {
    /// Capacity for a new slot.
    Fresh,

    /// An existing slot whose connection is being rebuilt.
    Replace(SlotId),
}

/// Capacity counted against `max_connections` while a connection is created.
///
/// Committing turns it into a [`Connection`]. Dropping it uncommitted gives
/// the capacity to a waiter or back to the pool, evicting the slot being
/// replaced if any.
pub(crate) struct Reservation<M: ConnectionFactory> {
    pool: Arc<Shared<M>>,
    kind: ReservationKind,
    armed: bool,
}

impl<M: ConnectionFactory> Reservation<M> {
    pub(crate) fn fresh(pool: Arc<Shared<M>>) -> Self {
        Self {
            pool,
            kind: ReservationKind::Fresh,
            armed: true,
        }
    }

    pub(crate) fn replace(pool: Arc<Shared<M>>, id: SlotId) -> Self {
        Self {
            pool,
            kind: ReservationKind::Replace(id),
            armed: true,
        }
    }

    pub(crate) fn kind(&self) -> ReservationKind {
        self.kind
    }

    pub(crate) fn commit(mut self, conn: M::Connection) -> Connection<M> {
        self.armed = false;
        let id = self.pool.commit(self.kind);
        Connection::new(id, conn, &self.pool)
    }
}

impl<M: ConnectionFactory> Drop for Reservation<M> {
    fn drop(&mut self) {
        if self.armed {
            let evict = match self.kind {
                ReservationKind::Fresh => None,
                ReservationKind::Replace(id) => Some(id),
            };
            self.pool.free_capacity(evict);
        }
    }
}

/// A [`Grant`] wrapped in the guard that owns it.
pub(crate) enum Ticket<M: ConnectionFactory> {
    Connection(Connection<M>),
    Reservation(Reservation<M>),
}

impl<M: ConnectionFactory> Ticket<M> {
    pub(crate) fn arm(pool: &Arc<Shared<M>>, grant: Grant<M::Connection>) -> Self {
        match grant {
            Grant::Slot { id, conn } => Self::Connection(Connection::new(id, conn, pool)),
            Grant::Reservation => Self::Reservation(Reservation::fresh(Arc::clone(pool))),
        }
    }
}
