//! rumqttc-backed message bus: boiler demand publishes plus the inbound
//! subscriptions for sensor readings and schedule/thermostat notifications.

use async_trait::async_trait;
use log::warn;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use snafu::ResultExt;

use crate::collaborators::BoilerSink;
use crate::debounce::Symbol;
use crate::error::{MqttClientSnafu, MqttSnafu, Result};

pub const SENSOR_TOPIC_PREFIX: &str = "sensor.";
pub const SCHEDULE_CHANGED_TOPIC: &str = "thermostat.schedule_changed";
pub const THERMOSTAT_STATUS_TOPIC: &str = "thermostat.status";
pub const HEATING_INFO_TOPIC_PREFIX: &str = "heating.info/";
const DEMAND_TOPIC: &str = "heating.demand_request";

pub struct MessageBusClient {
    client: AsyncClient,
}

impl MessageBusClient {
    /// Builds the client and its event loop. The caller is expected to hand
    /// the event loop to [`run_event_loop`] as a background task and keep
    /// this handle for publishing.
    pub fn connect(host: &str, port: u16, username: Option<&str>, password: Option<&str>) -> (Self, EventLoop) {
        let mut options = MqttOptions::new("heatingd", host, port);
        options.set_keep_alive(std::time::Duration::from_secs(30));
        if let (Some(user), Some(pass)) = (username, password) {
            options.set_credentials(user, pass);
        }

        let (client, eventloop) = AsyncClient::new(options, 64);
        (Self { client }, eventloop)
    }

    pub async fn subscribe_all(&self) -> Result<()> {
        for topic in [
            "sensor.#",
            SCHEDULE_CHANGED_TOPIC,
            THERMOSTAT_STATUS_TOPIC,
            "heating.info/#",
        ] {
            self.client.subscribe(topic, QoS::AtLeastOnce).await.context(MqttClientSnafu)?;
        }
        Ok(())
    }
}

#[derive(serde::Serialize)]
struct DemandRequest<'a> {
    thermostat: &'a str,
    command: &'a str,
}

#[async_trait]
impl BoilerSink for MessageBusClient {
    async fn send(&self, relay: &str, command: Symbol) -> Result<()> {
        let body = DemandRequest { thermostat: relay, command: command.as_str() };
        let payload = serde_json::to_vec(&body).expect("DemandRequest is always serializable");
        self.client
            .publish(DEMAND_TOPIC, QoS::AtLeastOnce, false, payload)
            .await
            .context(MqttClientSnafu)
    }
}

/// Drives the rumqttc event loop, handing each published message's topic
/// and payload to `on_message`. A panic-free callback failure on one
/// message must never stop delivery of the next; connection-level errors
/// are logged and the loop keeps retrying rather than terminating the
/// daemon, since rumqttc reconnects internally.
pub async fn run_event_loop<F>(mut eventloop: EventLoop, mut on_message: F) -> Result<()>
where
    F: FnMut(&str, &[u8]) + Send,
{
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                on_message(&publish.topic, &publish.payload);
            }
            Ok(_) => {}
            Err(e) => {
                warn!("mqtt event loop error: {}", e);
                return Err(e).context(MqttSnafu);
            }
        }
    }
}
