//! Store contracts consumed by the control plane.
//!
//! Persistence internals are out of scope for this crate; configurations and
//! app mappings are read and mutated exclusively through these traits. Change
//! notification is a broadcast stream: a committed mutation must reach
//! subscribers within one notification cycle, which is what makes the cached
//! views in [`crate::control`] eventually consistent.

use std::io;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::control::types::{AppMapping, ConfigId, TunnelConfig};

pub mod memory;

pub use memory::{MemoryConfigStore, MemoryMappingStore};

/// Errors surfaced by a store implementation.
///
/// Opaque to the control plane: these are propagated unchanged to the caller,
/// never retried and never replaced with a fallback value.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error from the persistence backend
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Backend-specific failure (transaction abort, corruption, ...)
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Opaque continuation token for paginated queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageToken(pub u64);

/// One page of query results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Rows in this page
    pub items: Vec<T>,

    /// Token for the next page, `None` when exhausted
    pub next: Option<PageToken>,
}

/// Change notification emitted by a mapping store, keyed by the
/// configuration ids whose rows were affected.
#[derive(Debug, Clone)]
pub struct MappingChange {
    pub config_ids: Vec<ConfigId>,
}

/// Persistent table of tunnel configurations.
#[async_trait]
pub trait ConfigStore: Send + Sync + 'static {
    /// Fetch a configuration by id.
    async fn get(&self, id: ConfigId) -> Result<Option<TunnelConfig>, StoreError>;

    /// Flip the active flag for a configuration. Transactional per id: the
    /// flag and any resource claim commit together or not at all.
    async fn set_active(&self, id: ConfigId, active: bool) -> Result<(), StoreError>;

    /// All configurations currently marked active.
    async fn active_configs(&self) -> Result<Vec<TunnelConfig>, StoreError>;

    /// Whether activating `candidate` conflicts with the given active set.
    ///
    /// Pure predicate over store-held resource knowledge (exclusive
    /// interfaces, port bindings). Must not touch the live tables.
    fn conflicts_with(&self, candidate: &TunnelConfig, active: &[TunnelConfig]) -> bool;

    /// Subscribe to the ids of configurations whose rows changed.
    fn subscribe(&self) -> broadcast::Receiver<ConfigId>;
}

/// Persistent table of app-to-configuration mappings.
#[async_trait]
pub trait MappingStore: Send + Sync + 'static {
    /// Filtered, paginated read. An empty pattern matches every row;
    /// case-sensitivity of the match is the store's policy.
    async fn query(
        &self,
        pattern: &str,
        token: PageToken,
    ) -> Result<Page<AppMapping>, StoreError>;

    /// Number of mapping rows referencing the given configuration.
    async fn count_by_config(&self, id: ConfigId) -> Result<u64, StoreError>;

    /// Subscribe to mapping-change notifications.
    fn subscribe(&self) -> broadcast::Receiver<MappingChange>;
}
