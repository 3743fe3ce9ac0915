//! Factory used by the unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::factory::{ConnectionFactory, ConnectionHandle};

#[derive(Error, Debug, PartialEq, Eq)]
#[error("factory failed")]
pub(crate) struct TestError;

#[derive(Debug)]
pub(crate) struct TestConn {
    /// Order of creation, starting at 0.
    pub(crate) serial: usize,
    closed: Arc<AtomicBool>,
}

impl TestConn {
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl ConnectionHandle for TestConn {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub(crate) struct TestFactory {
    created: AtomicUsize,
    fail_remaining: AtomicUsize,
    gate: Option<Semaphore>,
}

impl TestFactory {
    pub(crate) fn new() -> Self {
        Self {
            created: AtomicUsize::new(0),
            fail_remaining: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Every `create` blocks until [`TestFactory::open_gate`] lets it through.
    pub(crate) fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub(crate) fn open_gate(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    pub(crate) fn fail_next(&self, calls: usize) {
        self.fail_remaining.store(calls, Ordering::SeqCst);
    }

    /// Connections created successfully so far.
    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for TestFactory {
    type Connection = TestConn;
    type Error = TestError;

    async fn create(&self) -> Result<TestConn, TestError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.map_err(|_| TestError)?.forget();
        }

        let fail = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(TestError);
        }

        Ok(TestConn {
            serial: self.created.fetch_add(1, Ordering::SeqCst),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}
