//! Error types for the control plane.

use thiserror::Error;

use crate::control::types::ConfigId;
use crate::store::StoreError;

/// Result type for activation operations.
pub type ActivationResult<T> = Result<T, ActivationError>;

/// Errors that can occur while enabling or disabling a configuration.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// The referenced configuration does not exist in the store
    #[error("Configuration not found: {0}")]
    NotFound(ConfigId),

    /// Activation would conflict with a currently active configuration
    #[error("Configuration {0} conflicts with an active tunnel")]
    Conflict(ConfigId),

    /// Persistence-layer failure, propagated unchanged
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors that can occur on the query path.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The filter changed while a page fetch was in flight; the cursor is
    /// stale and must be re-issued via `paged_apps`
    #[error("Filter superseded while fetching")]
    Superseded,

    /// Persistence-layer failure, propagated unchanged
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
