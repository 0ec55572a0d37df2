//! Collapses repeated identical boiler commands and reissues after a
//! timeout, so a lossy transport still eventually gets the right state.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::thermostat::BoilerCommand;

pub const REISSUE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    On,
    Off,
}

impl From<BoilerCommand> for Symbol {
    fn from(cmd: BoilerCommand) -> Self {
        match cmd {
            BoilerCommand::On => Symbol::On,
            BoilerCommand::Off => Symbol::Off,
        }
    }
}

impl Symbol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Symbol::On => "O",
            Symbol::Off => "X",
        }
    }
}

#[derive(Debug, Default)]
pub struct Debouncer {
    last_command: Option<Symbol>,
    last_published: Option<DateTime<Utc>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Some(symbol)` iff the command should actually be published
    /// this tick: it differs from the last one, or the last publication is
    /// older than [`REISSUE_TIMEOUT`].
    pub fn maybe_publish(&mut self, command: BoilerCommand, now: DateTime<Utc>) -> Option<Symbol> {
        let symbol = Symbol::from(command);
        let changed = self.last_command != Some(symbol);
        let stale = match self.last_published {
            None => true,
            Some(last) => now - last > chrono::Duration::from_std(REISSUE_TIMEOUT).unwrap(),
        };

        if changed || stale {
            self.last_command = Some(symbol);
            self.last_published = Some(now);
            Some(symbol)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn first_command_is_always_published() {
        let mut d = Debouncer::new();
        assert_eq!(d.maybe_publish(BoilerCommand::On, t(0)), Some(Symbol::On));
    }

    #[test]
    fn repeated_identical_command_is_suppressed() {
        let mut d = Debouncer::new();
        d.maybe_publish(BoilerCommand::On, t(0));
        assert_eq!(d.maybe_publish(BoilerCommand::On, t(1)), None);
    }

    #[test]
    fn changed_command_is_always_published() {
        let mut d = Debouncer::new();
        d.maybe_publish(BoilerCommand::On, t(0));
        assert_eq!(d.maybe_publish(BoilerCommand::Off, t(1)), Some(Symbol::Off));
    }

    #[test]
    fn stale_publication_is_reissued_even_if_unchanged() {
        let mut d = Debouncer::new();
        d.maybe_publish(BoilerCommand::On, t(0));
        assert_eq!(d.maybe_publish(BoilerCommand::On, t(121)), Some(Symbol::On));
        assert_eq!(d.maybe_publish(BoilerCommand::On, t(121)), None);
    }
}
