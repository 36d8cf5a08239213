use crate::{
    Error, FirmwareVersion, Measurement, PacketCodec, ReportingMode, SensorState,
    MAX_WORKING_PERIOD, OUTBOUND_FRAME_LEN, SETTING_FIRMWARE, SETTING_QUERY_DATA,
    SETTING_REPORTING_MODE, SETTING_SLEEP, SETTING_WORKING_PERIOD,
};

/// A request the engine can issue to the sensor.
///
/// Each kind knows which state fields it depends on, how its frame looks and
/// when the sensor has confirmed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Request one PM2.5/PM10 sample.
    Query,
    GetReportingMode,
    SetReportingMode(ReportingMode),
    GetSleep,
    /// `true` puts fan and laser to sleep, `false` wakes the sensor.
    SetSleep(bool),
    GetFirmwareVersion,
    GetWorkingPeriod,
    /// Working period in minutes, `0` for continuous operation.
    SetWorkingPeriod(u8),
}

/// Confirmed result of a command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Response {
    Measurement(Measurement),
    ReportingMode(ReportingMode),
    Sleeping(bool),
    FirmwareVersion(FirmwareVersion),
    WorkingPeriod(u8),
    /// A setting was written and echoed back.
    Done,
}

impl Command {
    /// Rejects parameters the sensor cannot accept.
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Command::SetWorkingPeriod(minutes) if *minutes > MAX_WORKING_PERIOD => {
                Err(Error::InvalidArgument)
            }
            _ => Ok(()),
        }
    }

    /// Setting id, write flag and data byte of the command frame.
    pub fn request(&self) -> (u8, bool, u8) {
        match *self {
            Command::Query => (SETTING_QUERY_DATA, false, 0x00),
            Command::GetReportingMode => (SETTING_REPORTING_MODE, false, 0x00),
            Command::SetReportingMode(mode) => (SETTING_REPORTING_MODE, true, mode.to_byte()),
            Command::GetSleep => (SETTING_SLEEP, false, 0x00),
            Command::SetSleep(sleep) => (SETTING_SLEEP, true, if sleep { 0x00 } else { 0x01 }),
            Command::GetFirmwareVersion => (SETTING_FIRMWARE, false, 0x00),
            Command::GetWorkingPeriod => (SETTING_WORKING_PERIOD, false, 0x00),
            Command::SetWorkingPeriod(minutes) => (SETTING_WORKING_PERIOD, true, minutes),
        }
    }

    pub fn encode(&self, codec: &PacketCodec) -> Result<[u8; OUTBOUND_FRAME_LEN], Error> {
        let (setting, write, value) = self.request();
        codec.encode_command(setting, write, &[value])
    }

    /// Blanks the fields this command waits on. Runs once, before the first send.
    pub fn prepare(&self, state: &mut SensorState) {
        match self {
            Command::Query => {
                state.pm2_5 = None;
                state.pm10 = None;
            }
            Command::GetReportingMode | Command::SetReportingMode(_) => state.mode = None,
            Command::GetSleep | Command::SetSleep(_) => state.sleeping = None,
            Command::GetFirmwareVersion => state.firmware = None,
            Command::GetWorkingPeriod | Command::SetWorkingPeriod(_) => {
                state.working_period = None
            }
        }
    }

    /// The confirmed response, once `state` holds it.
    pub fn outcome(&self, state: &SensorState) -> Option<Response> {
        match *self {
            Command::Query => state.measurement().map(Response::Measurement),
            Command::GetReportingMode => state.mode.map(Response::ReportingMode),
            Command::SetReportingMode(mode) => (state.mode == Some(mode)).then_some(Response::Done),
            Command::GetSleep => state.sleeping.map(Response::Sleeping),
            Command::SetSleep(sleep) => (state.sleeping == Some(sleep)).then_some(Response::Done),
            Command::GetFirmwareVersion => state.firmware.map(Response::FirmwareVersion),
            Command::GetWorkingPeriod => state.working_period.map(Response::WorkingPeriod),
            Command::SetWorkingPeriod(minutes) => {
                (state.working_period == Some(minutes)).then_some(Response::Done)
            }
        }
    }

    pub fn is_fulfilled(&self, state: &SensorState) -> bool {
        self.outcome(state).is_some()
    }
}
