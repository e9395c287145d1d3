//! Type definitions for the control plane.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a tunnel configuration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ConfigId(pub i64);

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ConfigId {
    fn from(id: i64) -> Self {
        ConfigId(id)
    }
}

/// Tunnel parameters carried by a configuration.
///
/// Opaque to the control plane: the activation logic never interprets these
/// fields, it only passes them through to whatever consumes the config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelParameters {
    /// Remote endpoint, e.g. "vpn.example.org:51820"
    pub endpoint: Option<String>,

    /// Peer public key (base64)
    pub public_key: Option<String>,

    /// Routes carried by the tunnel, CIDR notation
    #[serde(default)]
    pub allowed_ips: Vec<String>,
}

/// A tunnel configuration row as seen by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Unique, immutable identifier
    pub id: ConfigId,

    /// Display label, not required to be unique
    pub name: String,

    /// Whether this configuration currently carries traffic
    pub is_active: bool,

    /// Opaque tunnel parameters
    pub parameters: TunnelParameters,
}

impl TunnelConfig {
    /// Create an inactive configuration with the given id and name.
    pub fn new(id: impl Into<ConfigId>, name: impl Into<String>) -> Self {
        TunnelConfig {
            id: id.into(),
            name: name.into(),
            is_active: false,
            parameters: TunnelParameters::default(),
        }
    }

    /// Set the tunnel parameters.
    pub fn with_parameters(mut self, parameters: TunnelParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Association of an installed application with the tunnel configuration it
/// should route through. At most one row per application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMapping {
    /// Identifier of the installed application (package name)
    pub app_id: String,

    /// Human-readable application name, used for filtering
    pub app_name: String,

    /// Configuration the application routes through
    pub config_id: ConfigId,
}

impl AppMapping {
    /// Create a mapping row.
    pub fn new(
        app_id: impl Into<String>,
        app_name: impl Into<String>,
        config_id: impl Into<ConfigId>,
    ) -> Self {
        AppMapping {
            app_id: app_id.into(),
            app_name: app_name.into(),
            config_id: config_id.into(),
        }
    }
}
