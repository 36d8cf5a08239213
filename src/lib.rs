#![cfg_attr(not(test), no_std)]

use embassy_sync::blocking_mutex::raw::RawMutex;
use log::debug;

mod constants;
pub use constants::*;

mod error;
pub use error::*;

mod config;
pub use config::*;

mod codec;
pub use codec::*;

mod state;
pub use state::*;

mod command;
pub use command::*;

mod queue;

mod link;
pub use link::*;

mod runner;
pub use runner::*;

pub mod framing;

/// Typed command API of an SDS011 sensor.
///
/// Every method enqueues one command on the link and resolves once the
/// sensor confirmed it, or fails with `RetryExhausted` when it never did.
/// Commands run one after another in submission order. The handle is cheap
/// to copy and can be shared between tasks.
///
/// [`Runner::run`] must be running for any command to make progress.
pub struct Sds011<'a, M: RawMutex, const N: usize> {
    link: &'a Sds011Link<M, N>,
}

impl<M: RawMutex, const N: usize> Clone for Sds011<'_, M, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex, const N: usize> Copy for Sds011<'_, M, N> {}

impl<'a, M: RawMutex, const N: usize> Sds011<'a, M, N> {
    /// Creates a new `Sds011` handle on top of `link`.
    pub fn new(link: &'a Sds011Link<M, N>) -> Self {
        Self { link }
    }

    /// Requests a fresh sample.
    ///
    /// # Returns
    ///
    /// * `Ok(Measurement)` with the PM2.5 and PM10 values of the reply.
    /// * `Err(Error)` if the sensor did not answer or the link was closed.
    pub async fn query(&self) -> Result<Measurement, Error> {
        match self.run(Command::Query).await? {
            Response::Measurement(measurement) => Ok(measurement),
            other => Err(unexpected(other)),
        }
    }

    /// Sets the sensor's reporting mode. The setting survives power off.
    ///
    /// In Active mode every data report is published as
    /// [`Event::Measurement`]; in Query mode data has to be requested with
    /// [`Sds011::query`].
    pub async fn set_reporting_mode(&self, mode: ReportingMode) -> Result<(), Error> {
        self.run_setter(Command::SetReportingMode(mode)).await
    }

    /// Queries the sensor's current reporting mode.
    pub async fn get_reporting_mode(&self) -> Result<ReportingMode, Error> {
        match self.run(Command::GetReportingMode).await? {
            Response::ReportingMode(mode) => Ok(mode),
            other => Err(unexpected(other)),
        }
    }

    /// Puts the sensor to sleep (`true`) or wakes it up (`false`).
    ///
    /// Fan and laser are off while sleeping.
    pub async fn set_sleep(&self, sleep: bool) -> Result<(), Error> {
        self.run_setter(Command::SetSleep(sleep)).await
    }

    /// Returns `true` if the sensor is sleeping.
    pub async fn get_sleep(&self) -> Result<bool, Error> {
        match self.run(Command::GetSleep).await? {
            Response::Sleeping(sleeping) => Ok(sleeping),
            other => Err(unexpected(other)),
        }
    }

    /// Retrieves the firmware version of the sensor.
    ///
    /// Its `Display` form is `year-month-day` without padding, e.g. `16-11-21`.
    pub async fn get_firmware_version(&self) -> Result<FirmwareVersion, Error> {
        match self.run(Command::GetFirmwareVersion).await? {
            Response::FirmwareVersion(version) => Ok(version),
            other => Err(unexpected(other)),
        }
    }

    /// Sets the sensor's working period.
    ///
    /// - A value of `0` sets the sensor to continuous working mode.
    /// - Values from `1` to `30` make the sensor work for 30 seconds, then
    ///   sleep for `(period - 1) * 60 + 30` seconds, reporting once per
    ///   `period` minutes.
    ///
    /// # Returns
    ///
    /// * `Err(Error::InvalidArgument)` if `minutes` is greater than 30. Nothing
    ///   is sent in that case.
    pub async fn set_working_period(&self, minutes: u8) -> Result<(), Error> {
        self.run_setter(Command::SetWorkingPeriod(minutes)).await
    }

    /// Queries the sensor's current working period in minutes.
    pub async fn get_working_period(&self) -> Result<u8, Error> {
        match self.run(Command::GetWorkingPeriod).await? {
            Response::WorkingPeriod(minutes) => Ok(minutes),
            other => Err(unexpected(other)),
        }
    }

    /// Closes the connection. Pending commands fail with `ConnectionClosed`.
    pub fn close(&self) {
        self.link.close();
    }

    async fn run(&self, command: Command) -> Result<Response, Error> {
        self.link.submit(command)?.wait().await
    }

    async fn run_setter(&self, command: Command) -> Result<(), Error> {
        match self.run(command).await? {
            Response::Done => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> Error {
    debug!("Unexpected response {:?}", response);
    Error::UnexpectedReply
}
