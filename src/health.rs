//! Pool status snapshots and health monitoring

#[cfg(feature = "serde")]
use serde::Serialize;

/// Point-in-time counts of a pool, all read under one lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Status {
    /// Configured capacity
    pub max_connections: usize,

    /// Slots plus reservations still being created
    pub active: usize,

    /// Slots holding or rebuilding a connection
    pub slots: usize,

    /// Idle slots
    pub available: usize,

    /// Slots whose connection is out with a caller
    pub checked_out: usize,

    /// Slots whose dead connection is being replaced
    pub replacing: usize,

    /// New connections being created
    pub pending: usize,

    /// Queued acquire calls
    pub waiting: usize,
}

impl Status {
    /// Fraction of capacity in use, idle slots excluded (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.max_connections == 0 {
            return 0.0;
        }
        self.active.saturating_sub(self.available) as f64 / self.max_connections as f64
    }
}

/// Health status of a connection pool
///
/// # Examples
///
/// ```
/// use slotpool::{HealthStatus, Status};
///
/// let status = Status {
///     max_connections: 4,
///     active: 1,
///     slots: 1,
///     available: 1,
///     checked_out: 0,
///     replacing: 0,
///     pending: 0,
///     waiting: 0,
/// };
///
/// let health = HealthStatus::new(&status);
/// assert!(health.is_healthy());
/// assert_eq!(health.available_connections, 1);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Current pool utilization (0.0 to 1.0)
    pub utilization: f64,

    /// Idle connections
    pub available_connections: usize,

    /// Connections out with callers
    pub active_connections: usize,

    /// Queued acquire calls
    pub waiting_requests: usize,

    /// Total capacity
    pub total_capacity: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Create a new health status
    pub fn new(status: &Status) -> Self {
        let utilization = status.utilization();
        let mut warnings = Vec::new();
        let mut is_healthy = true;

        // Check for high utilization
        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if status.waiting > 0 {
            warnings.push(format!("{} requests waiting for a connection", status.waiting));
            is_healthy = false;
        }

        if status.replacing > 0 {
            warnings.push(format!("{} dead connections being replaced", status.replacing));
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            available_connections: status.available,
            active_connections: status.checked_out + status.replacing + status.pending,
            waiting_requests: status.waiting,
            total_capacity: status.max_connections,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}
