use std::{
    io,
    path::PathBuf,
    result,
};

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to parse config {:?}: {}", path, source))]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[snafu(display("Failed to validate config {:?}: {}", path, reason))]
    ConfigValidation {
        path: PathBuf,
        reason: String,
    },
    #[snafu(display("{:?}: {}", path, source))]
    Io {
        path: PathBuf,
        source: io::Error,
    },
    #[snafu(display("Zone information unavailable from the control plane and no local cache at {:?}", cache_path))]
    ZoneInfoUnavailable {
        cache_path: PathBuf,
    },
    #[snafu(display("HTTP request to {} failed: {}", url, source))]
    Http {
        url: String,
        source: reqwest::Error,
    },
    #[snafu(display("Failed to parse cached zone/sensor directory {:?}: {}", path, source))]
    DirectoryCacheParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[snafu(display("Malformed response from {}: {}", url, reason))]
    ControlPlaneContract {
        url: String,
        reason: String,
    },
    #[snafu(display("MQTT connection error: {}", source))]
    Mqtt {
        source: rumqttc::ConnectionError,
    },
    #[snafu(display("MQTT client error: {}", source))]
    MqttClient {
        source: rumqttc::ClientError,
    },
    #[snafu(display("Weather service unavailable and no cached reading exists"))]
    WeatherService,
}

pub type Result<T, E = Error> = result::Result<T, E>;
