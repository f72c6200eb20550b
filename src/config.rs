//! Configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).
//!
//! | Variable              | Default                 |
//! |-----------------------|-------------------------|
//! | `SIGNAL_BUS_ENDPOINT` | unset (broadcast)       |
//! | `SIGNAL_INTERFACE`    | `com.example.Signals`   |
//! | `SIGNAL_OBJECT_PATH`  | `/com/example/Signals`  |
//! | `LOCAL_BUS_CAPACITY`  | `1024`                  |

use crate::domain::BaseAddress;

/// Default interface name when `SIGNAL_INTERFACE` is unset.
pub const DEFAULT_INTERFACE: &str = "com.example.Signals";

/// Default object path when `SIGNAL_OBJECT_PATH` is unset.
pub const DEFAULT_OBJECT_PATH: &str = "/com/example/Signals";

/// Default fan-out capacity of the local bus.
pub const DEFAULT_LOCAL_BUS_CAPACITY: usize = 1024;

/// Signal addressing and local bus settings.
///
/// Loaded once at startup via [`BusConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Default bus endpoint. `None` broadcasts.
    pub bus_endpoint: Option<String>,

    /// Default interface name.
    pub interface: String,

    /// Default object path.
    pub object_path: String,

    /// Capacity of the local bus fan-out channel.
    pub local_bus_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            bus_endpoint: None,
            interface: DEFAULT_INTERFACE.to_string(),
            object_path: DEFAULT_OBJECT_PATH.to_string(),
            local_bus_capacity: DEFAULT_LOCAL_BUS_CAPACITY,
        }
    }
}

impl BusConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file,
    /// then falls back to defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            bus_endpoint: lookup("SIGNAL_BUS_ENDPOINT").filter(|v| !v.is_empty()),
            interface: lookup("SIGNAL_INTERFACE")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.interface),
            object_path: lookup("SIGNAL_OBJECT_PATH")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.object_path),
            local_bus_capacity: parse_or(
                lookup("LOCAL_BUS_CAPACITY"),
                defaults.local_bus_capacity,
            ),
        }
    }

    /// Returns the configured defaults as a [`BaseAddress`].
    #[must_use]
    pub fn base_address(&self) -> BaseAddress {
        let base = BaseAddress::new()
            .with_interface(self.interface.as_str())
            .with_object_path(self.object_path.as_str());
        match &self.bus_endpoint {
            Some(endpoint) => base.with_bus_endpoint(endpoint.as_str()),
            None => base,
        }
    }
}

/// Parses `value` as `T`, returning `default` on missing or invalid input.
fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
