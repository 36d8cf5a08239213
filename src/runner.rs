use embassy_futures::select::{select, select3, Either, Either3};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Instant, Timer};
use embedded_io_async::Write;
use log::{debug, error, info, warn};

use crate::queue::Step;
use crate::{
    Command, Config, Error, Event, FieldUpdate, PacketCodec, SensorState, Sds011Link,
    INBOUND_FRAME_LEN,
};

enum Wakeup {
    Frame([u8; INBOUND_FRAME_LEN]),
    Submitted,
    Tick,
}

/// The task that owns the sensor state and drives the command queue.
///
/// Inbound frames, new submissions and retry ticks are handled one at a time
/// by [`Runner::run`], so the sensor state never sees two writers.
pub struct Runner<'a, M: RawMutex, W, const N: usize> {
    link: &'a Sds011Link<M, N>,
    writer: W,
    codec: PacketCodec,
    state: SensorState,
    config: Config,
}

impl<'a, M, W, const N: usize> Runner<'a, M, W, N>
where
    M: RawMutex,
    W: Write,
{
    pub(crate) fn new(link: &'a Sds011Link<M, N>, writer: W, config: Config) -> Self {
        Self {
            link,
            writer,
            codec: PacketCodec::new(config.id, config.on_unknown_setting),
            state: SensorState::new(),
            config,
        }
    }

    /// Last known sensor attributes.
    pub fn state(&self) -> &SensorState {
        &self.state
    }

    /// Runs until the link is closed.
    ///
    /// The query scheduled by [`Sds011Link::runner`] goes out first; its
    /// outcome is only logged. Returns `Err` when an unknown frame is received under
    /// [`OnUnknownSetting::Propagate`](crate::OnUnknownSetting::Propagate), after
    /// failing every pending command with that error.
    pub async fn run(&mut self) -> Result<(), Error> {
        info!("SDS011 runner started");
        let mut deadline = self.tick().await;

        let result = loop {
            if self.link.is_closed() {
                break Ok(());
            }

            let wakeup = match deadline {
                Some(at) => match select3(self.link.next_frame(), self.link.woken(), Timer::at(at))
                    .await
                {
                    Either3::First(frame) => Wakeup::Frame(frame),
                    Either3::Second(()) => Wakeup::Submitted,
                    Either3::Third(()) => Wakeup::Tick,
                },
                None => match select(self.link.next_frame(), self.link.woken()).await {
                    Either::First(frame) => Wakeup::Frame(frame),
                    Either::Second(()) => Wakeup::Submitted,
                },
            };

            match wakeup {
                Wakeup::Frame(frame) => {
                    if let Err(e) = self.handle_frame(&frame) {
                        error!("Fatal protocol error: {}", e);
                        self.link.shutdown(e);
                        break Err(e);
                    }
                }
                // A busy queue keeps its schedule; an idle one starts now.
                Wakeup::Submitted => {
                    if deadline.is_none() && self.link.has_pending() {
                        deadline = self.tick().await;
                    }
                }
                Wakeup::Tick => deadline = self.tick().await,
            }
        };

        self.state.close();
        self.link.publish(Event::Closed);
        info!("SDS011 runner stopped");
        result
    }

    /// Handles one inbound frame. Only unknown codes under the propagate
    /// policy are returned as errors; corrupt frames are dropped.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
        let update = match self.codec.decode(frame) {
            Ok(Some(update)) => update,
            Ok(None) => return Ok(()),
            Err(e @ (Error::MalformedFrame | Error::ChecksumMismatch)) => {
                debug!("Discarding frame {:02X?}: {}", frame, e);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        self.state.apply(update);
        if let FieldUpdate::Particulates(measurement) = update {
            if self.state.is_streaming() {
                self.link.publish(Event::Measurement(measurement));
            }
        }
        Ok(())
    }

    // Steps the queue until a command has to be (re)sent or nothing is left.
    // Returns when the next check is due.
    async fn tick(&mut self) -> Option<Instant> {
        loop {
            match self.link.step(&mut self.state, self.config.allowed_retries) {
                Step::Idle => return None,
                Step::Finished { entry, result } => {
                    match (&entry.ticket, &result) {
                        (None, Ok(response)) => info!("Sensor answered: {:?}", response),
                        (None, Err(e)) => warn!("Sensor did not answer initial query: {}", e),
                        (Some(_), Err(e)) => warn!("{:?} failed: {}", entry.command, e),
                        (Some(_), Ok(_)) => {}
                    }
                    self.link.settle(entry.ticket, result);
                }
                Step::Execute(command) => {
                    if let Err(e) = self.execute(command).await {
                        error!("Failed to send {:?}: {}", command, e);
                    }
                    return Some(Instant::now() + self.config.retry_interval);
                }
            }
        }
    }

    async fn execute(&mut self, command: Command) -> Result<(), Error> {
        let frame = command.encode(&self.codec)?;
        debug!("Executing command: {:02X?}", frame);
        self.writer
            .write_all(&frame)
            .await
            .map_err(|_| Error::WriteFailure)?;
        self.writer.flush().await.map_err(|_| Error::WriteFailure)
    }
}
