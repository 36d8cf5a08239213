use core::str::FromStr;

use embassy_time::Duration;

use crate::{Error, ALLOWED_RETRIES, COMMAND_RETRY_INTERVAL_MS};

/// Represents the reporting mode of the SDS011 sensor.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum ReportingMode {
    /// In Active mode, the sensor continuously pushes data reports.
    Active,
    /// In Query mode, the sensor only reports data when queried.
    Query,
}

impl ReportingMode {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            ReportingMode::Active => 0x00,
            ReportingMode::Query => 0x01,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Self {
        if byte == 0x00 {
            ReportingMode::Active
        } else {
            ReportingMode::Query
        }
    }
}

impl FromStr for ReportingMode {
    type Err = Error;

    /// Parses `"active"` or `"query"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ReportingMode::Active),
            "query" => Ok(ReportingMode::Query),
            _ => Err(Error::InvalidArgument),
        }
    }
}

/// What the codec does with a well-formed frame carrying an unknown type or setting id.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Default)]
pub enum OnUnknownSetting {
    /// Report the error; the runner treats it as fatal.
    Propagate,
    /// Log the frame and drop it.
    #[default]
    Ignore,
}

/// Represents the unique identifier of the SDS011 sensor.
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct DeviceID {
    /// The first byte of the device ID.
    pub id1: u8,
    /// The second byte of the device ID.
    pub id2: u8,
}

impl Default for DeviceID {
    /// Returns the default device id, which addresses any sensor.
    fn default() -> DeviceID {
        DeviceID {
            id1: 0xff,
            id2: 0xff,
        }
    }
}

/// Configuration settings for the command engine.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Config {
    /// The device ID written into every command frame.
    pub id: DeviceID,
    /// Time between two execute/check cycles of a command.
    pub retry_interval: Duration,
    /// Number of execute/check cycles before a command fails.
    pub allowed_retries: u8,
    /// Policy for frames with an unknown type or setting id.
    pub on_unknown_setting: OnUnknownSetting,
}

impl Config {
    /// Creates a new `Config` instance.
    ///
    /// # Arguments
    ///
    /// * `id` - The `DeviceID` for the sensor.
    /// * `retry_interval` - Delay between retries of the same command.
    /// * `allowed_retries` - Retry budget of a single command.
    pub fn new(id: DeviceID, retry_interval: Duration, allowed_retries: u8) -> Config {
        Config {
            id,
            retry_interval,
            allowed_retries,
            on_unknown_setting: OnUnknownSetting::default(),
        }
    }
    /// Sets the device ID for the configuration.
    pub fn id(mut self, id: DeviceID) -> Self {
        self.id = id;
        self
    }
    /// Sets the delay between two attempts of the same command.
    pub fn retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }
    /// Sets the retry budget.
    pub fn allowed_retries(mut self, allowed_retries: u8) -> Self {
        self.allowed_retries = allowed_retries;
        self
    }
    /// Sets the unknown frame policy.
    pub fn on_unknown_setting(mut self, policy: OnUnknownSetting) -> Self {
        self.on_unknown_setting = policy;
        self
    }
}

/// Provides default configuration values for the engine.
impl Default for Config {
    /// Returns the default configuration.
    ///
    /// The default configuration uses a device ID of `0xFFFF`, a 150 ms retry
    /// interval, 10 retries and ignores unknown frames.
    fn default() -> Config {
        Config::new(
            DeviceID::default(),
            Duration::from_millis(COMMAND_RETRY_INTERVAL_MS),
            ALLOWED_RETRIES,
        )
    }
}
