//! Daemon configuration: parsed from TOML, then validated before anything
//! else in the daemon touches it.

use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::Deserialize;
use snafu::ResultExt;

use crate::error::*;

#[derive(Clone, Debug, Deserialize)]
pub struct Interval(pub u64);

impl Interval {
    pub fn to_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl Default for Interval {
    fn default() -> Self {
        Self(1)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

fn default_mqtt_port() -> u16 {
    1883
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlPlaneConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_directory_cache_path")]
    pub directory_cache_path: PathBuf,
}

fn default_directory_cache_path() -> PathBuf {
    PathBuf::from("/var/lib/heatingd/directory_cache.json")
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WeatherConfig {
    pub api_key: String,
    pub location: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(default)]
    pub tick_interval: Interval,
    pub mqtt: MqttConfig,
    pub control_plane: ControlPlaneConfig,
    pub weather: WeatherConfig,
}

pub fn load_config(path: &Path) -> Result<DaemonConfig> {
    let contents = fs::read_to_string(path).context(IoSnafu { path })?;

    let config: DaemonConfig = toml::from_str(&contents).context(ConfigParseSnafu { path })?;

    if config.tick_interval.0 == 0 {
        return Err(Error::ConfigValidation {
            path: path.to_owned(),
            reason: "tick_interval: must be greater than 0".to_owned(),
        });
    }

    if config.mqtt.host.trim().is_empty() {
        return Err(Error::ConfigValidation {
            path: path.to_owned(),
            reason: "mqtt.host: must not be empty".to_owned(),
        });
    }

    if config.control_plane.base_url.trim().is_empty() {
        return Err(Error::ConfigValidation {
            path: path.to_owned(),
            reason: "control_plane.base_url: must not be empty".to_owned(),
        });
    }

    let has_user = config.control_plane.username.is_some();
    let has_pass = config.control_plane.password.is_some();
    if has_user != has_pass {
        return Err(Error::ConfigValidation {
            path: path.to_owned(),
            reason: "control_plane: username and password must be set together".to_owned(),
        });
    }

    if config.weather.api_key.trim().is_empty() {
        return Err(Error::ConfigValidation {
            path: path.to_owned(),
            reason: "weather.api_key: must not be empty".to_owned(),
        });
    }

    if config.weather.location.trim().is_empty() {
        return Err(Error::ConfigValidation {
            path: path.to_owned(),
            reason: "weather.location: must not be empty".to_owned(),
        });
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn valid_config_parses() {
        let file = write_temp(
            r#"
            [mqtt]
            host = "localhost"

            [control_plane]
            base_url = "http://localhost:8080"

            [weather]
            api_key = "abc123"
            location = "London,UK"
            "#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.tick_interval.0, 1);
    }

    #[test]
    fn empty_mqtt_host_is_rejected() {
        let file = write_temp(
            r#"
            [mqtt]
            host = ""

            [control_plane]
            base_url = "http://localhost:8080"

            [weather]
            api_key = "abc123"
            location = "London,UK"
            "#,
        );
        assert!(matches!(load_config(file.path()), Err(Error::ConfigValidation { .. })));
    }

    #[test]
    fn mismatched_control_plane_credentials_are_rejected() {
        let file = write_temp(
            r#"
            [mqtt]
            host = "localhost"

            [control_plane]
            base_url = "http://localhost:8080"
            username = "admin"

            [weather]
            api_key = "abc123"
            location = "London,UK"
            "#,
        );
        assert!(matches!(load_config(file.path()), Err(Error::ConfigValidation { .. })));
    }
}
