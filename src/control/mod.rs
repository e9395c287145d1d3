//! Control-plane surface: activation state machine and mapping queries.
//!
//! The public surface is exactly `can_enable`, `enable`, `disable`,
//! `set_filter`, `paged_apps` and `count_by_config`; everything else in the
//! crate exists to serve these.

pub mod activation;
pub mod eligibility;
pub mod error;
pub mod query;
pub mod types;

pub use activation::ActivationController;
pub use error::{ActivationError, ActivationResult, QueryError, QueryResult};
pub use query::{AppPages, MappingQueryService};
pub use types::{AppMapping, ConfigId, TunnelConfig, TunnelParameters};
