use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use env_logger::Env;
use log::{debug, error, info};
use snafu::ResultExt;
use structopt::StructOpt;
use tokio::sync::Mutex;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;

use heating_core::clock::{Clock, SystemClock};
use heating_core::collaborators::{
    BoilerSink, GradientClient, ReportedStatePublisher, SchedulePolicySource, ZoneDirectorySource,
};
use heating_core::config::load_config;
use heating_core::error::{IoSnafu, Result};
use heating_core::http_client::{ControlPlaneClient, OpenWeatherClient};
use heating_core::mqtt::{self, MessageBusClient};
use heating_core::multizone::MultiZoneController;
use heating_core::sensor::SensorPayload;
use heating_core::weather::SharedCachedWeather;

#[derive(StructOpt, Debug)]
struct Opt {
    /// Path to config file
    #[structopt(short, long)]
    config: PathBuf,
}

/// Registers a flag that flips to `true` on SIGINT/SIGTERM, for the tick
/// loop to poll between iterations. Async equivalent of the classic
/// `signal_hook::pipe` + blocking-read-with-timeout pairing.
fn register_shutdown_flag() -> Result<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in &[signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(*signal, shutdown.clone())
            .context(IoSnafu { path: "(signal handler)" })?;
    }
    Ok(shutdown)
}

async fn main_wrapper() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let opt = Opt::from_args();

    let config = load_config(&opt.config)?;
    debug!("Loaded config: {:#?}", config);

    let shutdown = register_shutdown_flag()?;

    let credentials = match (&config.control_plane.username, &config.control_plane.password) {
        (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
        _ => None,
    };
    let control_plane = Arc::new(ControlPlaneClient::new(
        config.control_plane.base_url.clone(),
        credentials,
        config.control_plane.directory_cache_path.clone(),
    )?);

    let weather_provider = OpenWeatherClient::new(config.weather.api_key.clone(), config.weather.location.clone())?;
    let weather = Arc::new(SharedCachedWeather::new(weather_provider, std::time::Duration::from_secs(600)));

    let (mqtt_client, event_loop) = MessageBusClient::connect(
        &config.mqtt.host,
        config.mqtt.port,
        config.mqtt.username.as_deref(),
        config.mqtt.password.as_deref(),
    );
    mqtt_client.subscribe_all().await?;
    let mqtt_client = Arc::new(mqtt_client);

    let zones = control_plane.fetch_zones().await?;
    let sensors = control_plane.fetch_sensors().await?;
    info!("Loaded {} zones, {} sensors", zones.len(), sensors.len());

    let multizone = Arc::new(Mutex::new(MultiZoneController::new(zones, sensors, chrono::Utc::now())));

    let mqtt_multizone = multizone.clone();
    let mqtt_control_plane = control_plane.clone();
    let clock = SystemClock;
    let message_task = tokio::spawn(mqtt::run_event_loop(event_loop, move |topic, payload| {
        if let Some(locator) = topic.strip_prefix(mqtt::SENSOR_TOPIC_PREFIX) {
            match serde_json::from_slice::<SensorPayload>(payload) {
                Ok(reading) => {
                    let locator = locator.to_owned();
                    let multizone = mqtt_multizone.clone();
                    let control_plane = mqtt_control_plane.clone();
                    let now = clock.now();
                    tokio::spawn(async move {
                        let mut guard = multizone.lock().await;
                        guard.on_sensor_message(&locator, &reading, now, control_plane.as_ref()).await;
                    });
                }
                Err(e) => error!("malformed sensor payload on {}: {}", topic, e),
            }
        } else if topic == mqtt::SCHEDULE_CHANGED_TOPIC {
            let multizone = mqtt_multizone.clone();
            tokio::spawn(async move {
                info!("schedule changed notification received, refreshing policy");
                multizone.lock().await.request_policy_refresh();
            });
        } else if topic == mqtt::THERMOSTAT_STATUS_TOPIC {
            #[derive(serde::Deserialize)]
            struct ThermostatStatus {
                status: String,
            }
            match serde_json::from_slice::<ThermostatStatus>(payload) {
                Ok(status) if status.status == "online" => {
                    let multizone = mqtt_multizone.clone();
                    tokio::spawn(async move {
                        info!("thermostat came online, refreshing policy");
                        multizone.lock().await.request_policy_refresh();
                    });
                }
                Ok(_) => {}
                Err(e) => error!("malformed thermostat status on {}: {}", topic, e),
            }
        } else if let Some(relay) = topic.strip_prefix(mqtt::HEATING_INFO_TOPIC_PREFIX) {
            #[derive(serde::Deserialize)]
            struct BoilerInfo {
                cmd: String,
            }
            match serde_json::from_slice::<BoilerInfo>(payload) {
                Ok(info) => {
                    let relay = relay.to_owned();
                    let multizone = mqtt_multizone.clone();
                    let now = clock.now();
                    tokio::spawn(async move {
                        multizone.lock().await.on_boiler_info(&relay, &info.cmd, now);
                    });
                }
                Err(e) => error!("malformed boiler info on {}: {}", topic, e),
            }
        } else {
            debug!("unhandled topic {}: {} bytes", topic, payload.len());
        }
    }));

    let tick_interval = config.tick_interval.to_duration();
    let ticks = IntervalStream::new(tokio::time::interval(tick_interval));

    run_tick_loop(ticks, multizone, control_plane, weather, mqtt_client, shutdown).await?;

    info!("Shutdown signal received, stopping");
    message_task.abort();

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_tick_loop(
    mut ticks: IntervalStream,
    multizone: Arc<Mutex<MultiZoneController>>,
    control_plane: Arc<ControlPlaneClient>,
    weather: Arc<SharedCachedWeather<OpenWeatherClient>>,
    boiler_sink: Arc<MessageBusClient>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let schedule_source: &dyn SchedulePolicySource = control_plane.as_ref();
    let directory_source: &dyn ZoneDirectorySource = control_plane.as_ref();
    let gradient_client: &dyn GradientClient = control_plane.as_ref();
    let boiler_sink_ref: &dyn BoilerSink = boiler_sink.as_ref();
    let state_publisher: &dyn ReportedStatePublisher = control_plane.as_ref();
    let weather_ref = weather.as_ref();

    while ticks.next().await.is_some() {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let now = chrono::Utc::now();
        let mut guard = multizone.lock().await;
        guard
            .iteration(
                now,
                schedule_source,
                directory_source,
                gradient_client,
                weather_ref,
                boiler_sink_ref,
                state_publisher,
            )
            .await;
    }

    Ok(())
}

fn main() {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {}", e);
            process::exit(1);
        }
    };

    match runtime.block_on(main_wrapper()) {
        Ok(_) => {}
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
