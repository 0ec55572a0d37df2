//! Narrow interfaces to the out-of-scope collaborators (HTTP control
//! plane, message bus). The core depends only on these traits; concrete
//! implementations live in [`crate::http_client`] and [`crate::mqtt`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::debounce::Symbol;
use crate::error::Result;
use crate::gradient::{GradientSample, GradientTable};
use crate::schedule::{SchedulePolicy, ZoneId};
use crate::sensor::{Sensor, Zone};
use crate::zone::DeviceReportedState;

/// `GET /schedule`.
#[async_trait]
pub trait SchedulePolicySource: Send + Sync {
    async fn fetch_policy(&self) -> Result<SchedulePolicy>;
}

/// `GET /zones` and `GET /sensor`, with the local-cache fallback of §6.
#[async_trait]
pub trait ZoneDirectorySource: Send + Sync {
    async fn fetch_zones(&self) -> Result<Vec<Zone>>;
    async fn fetch_sensors(&self) -> Result<Vec<Sensor>>;
}

/// `GET /zones/<id>/gradients` and `POST /zones/<id>/gradient_measurements`.
#[async_trait]
pub trait GradientClient: Send + Sync {
    async fn fetch_table(&self, zone: ZoneId) -> Result<GradientTable>;
    async fn post_sample(&self, zone: ZoneId, when: DateTime<Utc>, sample: GradientSample) -> Result<()>;
}

/// `POST /zones/<id>/reported_state`.
#[async_trait]
pub trait ReportedStatePublisher: Send + Sync {
    async fn publish(&self, state: &DeviceReportedState) -> Result<()>;
}

/// `heating.demand_request`, publishing the already-debounced symbol for a
/// given relay.
#[async_trait]
pub trait BoilerSink: Send + Sync {
    async fn send(&self, relay: &str, command: Symbol) -> Result<()>;
}
