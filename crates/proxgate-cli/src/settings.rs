//! Configuration file and environment.
//!
//! Values come from, in increasing priority: built-in defaults, the TOML
//! file, then `PROXGATE_`-prefixed environment variables with `__` between
//! nesting levels (`PROXGATE_DATABASE__PATH=/var/lib/proxgate.db`).
//!
//! ```toml
//! log_level = "info"
//! cache_reload_seconds = 120
//! friendly_name = "nick"
//!
//! [database]
//! path = "/var/lib/proxgate/proxgate.db"
//!
//! [after_hours]
//! start = 2200
//! end = 600
//!
//! [[doors]]
//! name = "front"
//! port = "/dev/ttyUSB0"
//! ```

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use proxgate_core::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_BEEP_PACING_MS, DEFAULT_CACHE_RELOAD_SECS, DEFAULT_DENIAL_DELAY_MS,
    DEFAULT_LATCH_SYNC_INTERVAL_MS, DEFAULT_OPEN_HOLD_MS, DEFAULT_RECEIVE_TIMEOUT_MS,
    DEFAULT_SHUTDOWN_GRACE_MS,
};
use proxgate_core::{Error, Result};
use proxgate_door::{AfterHoursPolicy, DoorOptions, DoorTimings, FriendlyName, TimeOfDay};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub database: DatabaseSettings,
    pub cache_reload_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_hours: Option<AfterHoursSettings>,
    pub timings: TimingSettings,
    pub friendly_name: FriendlyName,
    pub audit_log: bool,
    pub doors: Vec<DoorSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            database: DatabaseSettings::default(),
            cache_reload_seconds: DEFAULT_CACHE_RELOAD_SECS,
            after_hours: None,
            timings: TimingSettings::default(),
            friendly_name: FriendlyName::default(),
            audit_log: true,
            doors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: String::new(),
            max_connections: 5,
        }
    }
}

/// Weekday window as `HHMM` integers; weekends are always after hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfterHoursSettings {
    pub start: u16,
    pub end: u16,
    #[serde(default = "default_true")]
    pub magic_cards_exempt: bool,
}

impl AfterHoursSettings {
    pub fn policy(&self) -> Result<AfterHoursPolicy> {
        Ok(
            AfterHoursPolicy::new(TimeOfDay::from_hhmm(self.start)?, TimeOfDay::from_hhmm(self.end)?)
                .with_magic_cards_exempt(self.magic_cards_exempt),
        )
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub open_hold_ms: u64,
    pub denial_delay_ms: u64,
    pub beep_pacing_ms: u64,
    pub latch_sync_interval_ms: u64,
    pub receive_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            open_hold_ms: DEFAULT_OPEN_HOLD_MS,
            denial_delay_ms: DEFAULT_DENIAL_DELAY_MS,
            beep_pacing_ms: DEFAULT_BEEP_PACING_MS,
            latch_sync_interval_ms: DEFAULT_LATCH_SYNC_INTERVAL_MS,
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl TimingSettings {
    pub fn door_timings(&self) -> DoorTimings {
        DoorTimings {
            open_hold: Duration::from_millis(self.open_hold_ms),
            denial_delay: Duration::from_millis(self.denial_delay_ms),
            beep_pacing: Duration::from_millis(self.beep_pacing_ms),
            latch_sync_interval: Duration::from_millis(self.latch_sync_interval_ms),
            receive_timeout: Duration::from_millis(self.receive_timeout_ms),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorSettings {
    pub name: String,
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl Settings {
    /// Load from `path` (which may be absent) and the environment.
    pub fn load(path: &Path) -> std::result::Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("PROXGATE_").split("__"))
            .extract()
    }

    /// Reject settings the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(Error::MissingConfig("database.path".into()));
        }
        if self.database.max_connections == 0 {
            return Err(Error::config("database.max_connections must be at least 1"));
        }
        if self.cache_reload_seconds == 0 {
            return Err(Error::config("cache_reload_seconds must be at least 1"));
        }
        if let Some(after_hours) = &self.after_hours {
            after_hours.policy()?;
        }
        if self.doors.is_empty() {
            return Err(Error::MissingConfig("doors".into()));
        }

        let mut names = HashSet::new();
        for door in &self.doors {
            if door.name.trim().is_empty() {
                return Err(Error::config("door name must not be empty"));
            }
            if door.port.trim().is_empty() {
                return Err(Error::config(format!("door {} has no port", door.name)));
            }
            if !names.insert(door.name.as_str()) {
                return Err(Error::config(format!("duplicate door name: {}", door.name)));
            }
        }
        Ok(())
    }

    pub fn door_options(&self) -> Result<DoorOptions> {
        Ok(DoorOptions {
            timings: self.timings.door_timings(),
            refresh_interval: Duration::from_secs(self.cache_reload_seconds),
            after_hours: self
                .after_hours
                .as_ref()
                .map(AfterHoursSettings::policy)
                .transpose()?,
        })
    }
}
