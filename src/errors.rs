//! Error types for the connection pool

use thiserror::Error;

/// Errors returned by [`Pool::acquire`](crate::Pool::acquire).
///
/// `E` is the error type of the [`ConnectionFactory`](crate::ConnectionFactory).
#[derive(Error, Debug)]
pub enum PoolError<E> {
    /// The factory failed to produce a connection, either for a new slot or
    /// while replacing a dead one. The capacity it reserved has been released.
    #[error("failed to create connection: {0}")]
    Creation(#[source] E),
}

impl<E> PoolError<E> {
    /// Returns the factory error.
    pub fn into_inner(self) -> E {
        match self {
            Self::Creation(err) => err,
        }
    }
}

/// Errors detected while validating a [`PoolConfiguration`](crate::PoolConfiguration).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_connections must be greater than zero")]
    ZeroMaxConnections,
}

pub type PoolResult<T, E> = Result<T, PoolError<E>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Error, Debug)]
    #[error("connection refused")]
    struct Refused;

    #[test]
    fn test_creation_error_exposes_source() {
        let err = PoolError::Creation(Refused);
        assert_eq!(err.to_string(), "failed to create connection: connection refused");
        assert_eq!(err.source().unwrap().to_string(), "connection refused");
    }
}
