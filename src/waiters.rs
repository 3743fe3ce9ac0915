//! Queue of acquire calls waiting for capacity

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::oneshot::{Receiver, Sender, channel};

use crate::config::WaiterOrder;
use crate::connection::Ticket;
use crate::factory::ConnectionFactory;
use crate::pool::Shared;
use crate::slot::SlotId;

/// What a waiter receives when it is woken.
#[derive(Debug)]
pub(crate) enum Grant<C> {
    /// A released slot together with its connection. The slot stays checked out.
    Slot { id: SlotId, conn: C },

    /// Capacity freed by a failed creation. The waiter owns the reservation
    /// and must create a connection itself.
    Reservation,
}

pub(crate) struct WaiterQueue<C> {
    waiters: VecDeque<Sender<Grant<C>>>,
    order: WaiterOrder,
}

impl<C> WaiterQueue<C> {
    pub(crate) fn new(order: WaiterOrder) -> Self {
        Self {
            waiters: VecDeque::new(),
            order,
        }
    }

    /// Queue a new waiter.
    pub(crate) fn push(&mut self) -> Receiver<Grant<C>> {
        // Forget waiters whose acquire call was dropped.
        self.waiters.retain(|tx| !tx.is_closed());

        let (tx, rx) = channel();
        self.waiters.push_back(tx);
        rx
    }

    /// Hand the grant to the next live waiter.
    ///
    /// Returns the grant if nobody took it.
    pub(crate) fn offer(&mut self, mut grant: Grant<C>) -> Option<Grant<C>> {
        while let Some(tx) = self.pop() {
            match tx.send(grant) {
                Ok(()) => return None,
                Err(returned) => grant = returned,
            }
        }
        Some(grant)
    }

    /// Number of queued waiters, including ones that gave up but were not pruned yet.
    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    fn pop(&mut self) -> Option<Sender<Grant<C>>> {
        match self.order {
            WaiterOrder::Fifo => self.waiters.pop_front(),
            WaiterOrder::Lifo => self.waiters.pop_back(),
        }
    }
}

/// An acquire call parked in the [`WaiterQueue`].
///
/// If it is dropped before observing its grant, a grant that already arrived
/// goes back to the pool.
pub(crate) struct Waiting<M: ConnectionFactory> {
    rx: Receiver<Grant<M::Connection>>,
    pool: Arc<Shared<M>>,
    done: bool,
}

impl<M: ConnectionFactory> Waiting<M> {
    pub(crate) fn new(rx: Receiver<Grant<M::Connection>>, pool: &Arc<Shared<M>>) -> Self {
        Self {
            rx,
            pool: Arc::clone(pool),
            done: false,
        }
    }

    /// Resolves once a release or a failed creation hands this waiter a grant.
    ///
    /// Returns `None` if the sender went away without granting anything.
    pub(crate) async fn wait(mut self) -> Option<Ticket<M>> {
        let received = (&mut self.rx).await;
        self.done = true;
        received.ok().map(|grant| Ticket::arm(&self.pool, grant))
    }
}

impl<M: ConnectionFactory> Drop for Waiting<M> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.rx.close();
        if let Ok(grant) = self.rx.try_recv() {
            // Arming and dropping runs the normal return path.
            drop(Ticket::arm(&self.pool, grant));
        }
    }
}
