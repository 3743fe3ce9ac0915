//! Pool configuration options

use crate::errors::ConfigError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Order in which queued acquire calls are served once a connection frees up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum WaiterOrder {
    /// Longest-waiting caller first.
    #[default]
    Fifo,

    /// Most recently queued caller first. Long waiters can starve under
    /// sustained contention.
    Lifo,
}

/// Configuration for connection pool behavior
///
/// # Examples
///
/// ```
/// use slotpool::{PoolConfiguration, WaiterOrder};
///
/// let config = PoolConfiguration::new()
///     .with_max_connections(4)
///     .with_waiter_order(WaiterOrder::Lifo);
///
/// assert_eq!(config.max_connections, 4);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfiguration {
    /// Maximum number of connections, counting those still being created
    pub max_connections: usize,

    /// How waiters are picked when a connection is released
    pub waiter_order: WaiterOrder,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            max_connections: 10,
            waiter_order: WaiterOrder::Fifo,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of connections
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the waiter order
    pub fn with_waiter_order(mut self, order: WaiterOrder) -> Self {
        self.waiter_order = order;
        self
    }

    /// Check the configuration before a pool is built from it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::ZeroMaxConnections);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_max_connections_rejected() {
        let config = PoolConfiguration::new().with_max_connections(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroMaxConnections));
    }

    #[test]
    fn test_defaults() {
        let config = PoolConfiguration::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.waiter_order, WaiterOrder::Fifo);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_deserialize_partial() {
        let config: PoolConfiguration =
            serde_json::from_str(r#"{ "waiter_order": "lifo" }"#).unwrap();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.waiter_order, WaiterOrder::Lifo);
    }
}
