//! Zone/sensor directory entries as reported by the control plane, and the
//! narrow subscription concept the message-bus adapter fulfils.

use serde::{Deserialize, Serialize};

use crate::schedule::ZoneId;

pub type SensorId = i64;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Zone {
    pub zone_id: ZoneId,
    pub name: String,
    pub boiler_relay: String,
    pub sensor_id: SensorId,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Sensor {
    pub sensor_id: SensorId,
    pub name: String,
    /// Opaque subscription key (an MQTT topic suffix in the current
    /// deployment, but the core treats it as an opaque string).
    pub locator: String,
}

/// Inbound `sensor.<locator>` payload. A missing or unparsable temperature
/// is ignored by the caller rather than treated as an error (§7).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SensorPayload {
    pub temperature: Option<f64>,
    #[allow(dead_code)]
    pub humidity: Option<f64>,
}
