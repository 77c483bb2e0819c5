//! Configuration schema types for Pulse.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod bus;
mod relay;
mod system;
mod voice;

pub use bus::*;
pub use relay::*;
pub use system::*;
pub use voice::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for Pulse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PulseConfig {
    pub bus: BusConfig,
    pub voice: VoiceConfig,
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================
