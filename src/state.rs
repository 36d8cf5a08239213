use core::fmt;

use crate::{FieldUpdate, ReportingMode};

/// Represents a single data sample read from the SDS011 sensor.
///
/// Contains PM2.5 and PM10 particulate matter concentration values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// PM2.5 concentration in µg/m³.
    pub pm2_5: f32,
    /// PM10 concentration in µg/m³.
    pub pm10: f32,
}

/// Firmware build date as reported by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    /// Two-digit year.
    pub year: u8,
    pub month: u8,
    pub day: u8,
}

/// Renders `year-month-day` without zero padding, e.g. `16-11-21` or `15-7-4`.
impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.year, self.month, self.day)
    }
}

/// Last known attributes of the sensor.
///
/// Every field starts unset. Fields are set by decoded frames and cleared by a
/// command before it is first sent, so a set field is always fresher than the
/// command waiting on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorState {
    pub pm2_5: Option<f32>,
    pub pm10: Option<f32>,
    pub mode: Option<ReportingMode>,
    pub sleeping: Option<bool>,
    pub firmware: Option<FirmwareVersion>,
    pub working_period: Option<u8>,
    pub closed: bool,
}

impl SensorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a decoded field update.
    pub fn apply(&mut self, update: FieldUpdate) {
        match update {
            FieldUpdate::Particulates(m) => {
                self.pm2_5 = Some(m.pm2_5);
                self.pm10 = Some(m.pm10);
            }
            FieldUpdate::ReportingMode(mode) => self.mode = Some(mode),
            FieldUpdate::Sleeping(sleeping) => self.sleeping = Some(sleeping),
            FieldUpdate::Firmware(version) => self.firmware = Some(version),
            FieldUpdate::WorkingPeriod(minutes) => self.working_period = Some(minutes),
        }
    }

    /// Both particulate readings, if both are known.
    pub fn measurement(&self) -> Option<Measurement> {
        Some(Measurement {
            pm2_5: self.pm2_5?,
            pm10: self.pm10?,
        })
    }

    pub fn is_streaming(&self) -> bool {
        self.mode == Some(ReportingMode::Active)
    }

    pub fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unset() {
        let state = SensorState::new();
        assert_eq!(state.measurement(), None);
        assert_eq!(state.mode, None);
        assert!(!state.closed);
    }

    #[test]
    fn apply_sets_only_the_matching_field() {
        let mut state = SensorState::new();
        state.apply(FieldUpdate::WorkingPeriod(5));
        assert_eq!(state.working_period, Some(5));
        assert_eq!(state.sleeping, None);

        state.apply(FieldUpdate::Particulates(Measurement {
            pm2_5: 7.5,
            pm10: 8.1,
        }));
        assert_eq!(
            state.measurement(),
            Some(Measurement {
                pm2_5: 7.5,
                pm10: 8.1
            })
        );
    }

    #[test]
    fn streaming_follows_mode() {
        let mut state = SensorState::new();
        assert!(!state.is_streaming());
        state.apply(FieldUpdate::ReportingMode(ReportingMode::Active));
        assert!(state.is_streaming());
        state.apply(FieldUpdate::ReportingMode(ReportingMode::Query));
        assert!(!state.is_streaming());
    }

    #[test]
    fn firmware_is_not_zero_padded() {
        let version = FirmwareVersion {
            year: 15,
            month: 7,
            day: 4,
        };
        assert_eq!(version.to_string(), "15-7-4");
    }
}
