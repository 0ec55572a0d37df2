pub mod clock;
pub mod collaborators;
pub mod config;
pub mod debounce;
pub mod error;
pub mod gradient;
pub mod http_client;
pub mod mqtt;
pub mod multizone;
pub mod pid;
pub mod pwm;
pub mod schedule;
pub mod sensor;
pub mod thermostat;
pub mod time_to_target;
pub mod weather;
pub mod zone;
