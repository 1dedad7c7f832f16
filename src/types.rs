use crate::error::{AdaptorError, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Adaptor lifecycle as reported to the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Created but not yet configured
    Stopped,
    /// Configuration received, waiting for apps to initialise
    Starting,
    /// Serving apps
    Running,
    /// Degraded; only cleared by an explicit `clear_error`
    Error,
}

impl LifecycleState {
    /// Wire name of the state
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to change the lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAction {
    /// Move to a plain lifecycle state (`starting`, `running`, ...)
    Enter(LifecycleState),
    /// Mark the adaptor as degraded
    Error,
    /// Leave the degraded state, returning to `running`
    ClearError,
}

impl StateAction {
    /// Parse the action names used by the host (`error`, `clear_error`, or a state name)
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "error" => Some(Self::Error),
            "clear_error" => Some(Self::ClearError),
            "stopped" => Some(Self::Enter(LifecycleState::Stopped)),
            "starting" => Some(Self::Enter(LifecycleState::Starting)),
            "running" => Some(Self::Enter(LifecycleState::Running)),
            _ => None,
        }
    }

    /// Apply this action to `current`, returning the resulting state
    ///
    /// `error` is only entered from `running`, and once in `error` only
    /// `clear_error` moves the adaptor, always back to `running`.
    #[must_use]
    pub const fn apply(self, current: LifecycleState) -> LifecycleState {
        match (current, self) {
            (LifecycleState::Error, Self::ClearError) => LifecycleState::Running,
            (LifecycleState::Running, Self::Error) => LifecycleState::Error,
            (LifecycleState::Error, _)
            | (_, Self::ClearError | Self::Error | Self::Enter(LifecycleState::Error)) => current,
            (_, Self::Enter(next)) => next,
        }
    }
}

/// Relay position of the boiler switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    /// Relay closed, boiler on
    On,
    /// Relay open, boiler off
    Off,
    /// No confirmed report from the device yet
    Unknown,
}

impl SwitchState {
    /// Decode the Z-Wave `mode` value; only `1` means on
    #[must_use]
    pub const fn from_mode(mode: i64) -> Self {
        if mode == 1 {
            Self::On
        } else {
            Self::Off
        }
    }

    /// Encode for a command-class 64 `Set`; anything but `on` is sent as 0
    #[must_use]
    pub const fn to_mode(self) -> u8 {
        match self {
            Self::On => 1,
            Self::Off | Self::Unknown => 0,
        }
    }

    /// Parse an app command payload, accepting exactly `on` or `off`
    #[must_use]
    pub fn from_command(data: &str) -> Option<Self> {
        match data {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            _ => None,
        }
    }

    /// Wire name of the state
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named data channel that apps subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Characteristic {
    /// Relay position as reported by the device
    BinarySensor,
    /// Relay commands from apps
    Switch,
    /// Device reachability
    Connected,
}

impl Characteristic {
    /// Every characteristic this adaptor offers
    pub const ALL: [Self; 3] = [Self::BinarySensor, Self::Switch, Self::Connected];

    /// Parse a characteristic name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "binary_sensor" => Some(Self::BinarySensor),
            "switch" => Some(Self::Switch),
            "connected" => Some(Self::Connected),
            _ => None,
        }
    }

    /// Wire name of the characteristic
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BinarySensor => "binary_sensor",
            Self::Switch => "switch",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-supplied settings for one adaptor instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptorConfig {
    /// Adaptor instance id used in every outbound message
    pub id: String,
    /// Human readable adaptor name advertised to apps
    #[serde(default = "default_name")]
    pub name: String,
    /// Z-Wave node address of the boiler relay
    pub address: String,
    /// Seconds between reachability polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Seconds from device init to the first poll
    #[serde(default = "default_init_poll_delay_secs")]
    pub init_poll_delay_secs: u64,
    /// Also request the relay mode on every poll
    #[serde(default)]
    pub poll_mode_each_tick: bool,
    /// Default log filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_name() -> String {
    crate::MODULE_NAME.to_string()
}

const fn default_poll_interval_secs() -> u64 {
    crate::DEFAULT_POLL_INTERVAL_SECS
}

const fn default_init_poll_delay_secs() -> u64 {
    crate::INIT_POLL_DELAY_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AdaptorConfig {
    /// Create a configuration with default timings
    #[must_use]
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: default_name(),
            address: address.into(),
            poll_interval_secs: default_poll_interval_secs(),
            init_poll_delay_secs: default_init_poll_delay_secs(),
            poll_mode_each_tick: false,
            log_level: default_log_level(),
        }
    }

    /// Parse and validate a configuration supplied by the host as JSON
    ///
    /// # Errors
    ///
    /// Returns [`AdaptorError::Json`] if the text is not a valid configuration object,
    /// or [`AdaptorError::Configuration`] if it fails [`AdaptorConfig::validate`].
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration can drive an adaptor
    ///
    /// # Errors
    ///
    /// Returns [`AdaptorError::Configuration`] for an empty id or address,
    /// or a zero poll interval.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AdaptorError::Configuration("id must not be empty".to_string()));
        }
        if self.address.trim().is_empty() {
            return Err(AdaptorError::Configuration(
                "address must not be empty".to_string(),
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(AdaptorError::Configuration(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Period of the reachability poll
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Delay between device init and the first poll
    #[must_use]
    pub const fn init_poll_delay(&self) -> Duration {
        Duration::from_secs(self.init_poll_delay_secs)
    }
}
