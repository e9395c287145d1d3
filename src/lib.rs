//! Control plane for WireGuard-style tunnel configurations.
//!
//! This crate decides which tunnel configuration may carry traffic and keeps
//! a live, filterable view of which installed application routes through
//! which configuration. It performs no packet handling itself; persistence
//! is consumed through the [`store`] traits and the visual layer sits on top
//! of the [`control`] surface.

pub mod config;
pub mod control;
pub mod logging;
pub mod store;

// Re-export the public control surface for convenience
pub use control::{
    ActivationController, ActivationError, AppPages, MappingQueryService, QueryError,
};
pub use control::{AppMapping, ConfigId, TunnelConfig, TunnelParameters};
pub use store::{
    ConfigStore, MappingChange, MappingStore, MemoryConfigStore, MemoryMappingStore, Page,
    PageToken, StoreError,
};
