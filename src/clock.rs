//! "now" is always a parameter; this just gives the daemon binary a single
//! place to say which wall clock it means, and tests a way to hand in
//! literal `DateTime`s instead.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
