//! Rendezvous between callers, the transport and the runner task.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::pubsub::{PubSubChannel, Subscriber};
use embassy_sync::signal::Signal;
use embedded_io_async::Write;
use log::{debug, warn};

use crate::queue::{CommandQueue, Entry, Step, Ticket};
use crate::{
    Command, Config, Error, Measurement, Response, Runner, Sds011, SensorState, EVENT_CAPACITY,
    FRAME_QUEUE_DEPTH, INBOUND_FRAME_LEN, MAX_SUBSCRIBERS,
};

/// Notifications published by the runner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// A data report arrived while the sensor is in active reporting mode.
    Measurement(Measurement),
    /// The link was closed, no further events follow.
    Closed,
}

/// Subscription to [`Event`]s. Dropping it unsubscribes.
pub type EventSubscriber<'a, M> = Subscriber<'a, M, Event, EVENT_CAPACITY, MAX_SUBSCRIBERS, 1>;

type Completion = (u32, Result<Response, Error>);

#[derive(Debug, Clone, Copy)]
struct Slot {
    busy: bool,
    generation: u32,
}

struct Shared<const N: usize> {
    queue: CommandQueue<N>,
    slots: [Slot; N],
    closed: bool,
}

/// Shared state of one sensor connection.
///
/// `N` is the number of commands that can be pending at once. The link is
/// usually placed in a `static` and handed out by reference:
///
/// ```ignore
/// static LINK: Sds011Link<CriticalSectionRawMutex, 4> = Sds011Link::new();
/// ```
pub struct Sds011Link<M: RawMutex, const N: usize> {
    shared: Mutex<M, RefCell<Shared<N>>>,
    completions: [Signal<M, Completion>; N],
    frames: Channel<M, [u8; INBOUND_FRAME_LEN], FRAME_QUEUE_DEPTH>,
    wake: Signal<M, ()>,
    events: PubSubChannel<M, Event, EVENT_CAPACITY, MAX_SUBSCRIBERS, 1>,
}

impl<M: RawMutex, const N: usize> Sds011Link<M, N> {
    pub const fn new() -> Self {
        Self {
            shared: Mutex::new(RefCell::new(Shared {
                queue: CommandQueue::new(),
                slots: [Slot {
                    busy: false,
                    generation: 0,
                }; N],
                closed: false,
            })),
            completions: [const { Signal::new() }; N],
            frames: Channel::new(),
            wake: Signal::new(),
            events: PubSubChannel::new(),
        }
    }

    /// Typed command API bound to this link.
    pub fn client(&self) -> Sds011<'_, M, N> {
        Sds011::new(self)
    }

    /// Creates the task that talks to the sensor through `writer`.
    ///
    /// A query is scheduled right away to check that the sensor answers. It
    /// is sent before any command submitted so far and does not take one of
    /// the `N` places.
    pub fn runner<W: Write>(&self, writer: W, config: Config) -> Runner<'_, M, W, N> {
        if let Err(e) = self.enqueue_startup(Command::Query) {
            warn!("Could not queue initial query: {}", e);
        }
        Runner::new(self, writer, config)
    }

    /// Validates and enqueues `command`.
    ///
    /// Fails immediately with `InvalidArgument`, `ConnectionClosed` or
    /// `QueueFull`; otherwise the returned handle settles once the sensor
    /// confirmed the command or the retry budget ran out.
    pub fn submit(&self, command: Command) -> Result<PendingCommand<'_, M, N>, Error> {
        command.validate()?;

        let ticket = self.shared.lock(|shared| {
            let mut shared = shared.borrow_mut();
            if shared.closed {
                return Err(Error::ConnectionClosed);
            }
            let slot = shared
                .slots
                .iter()
                .position(|s| !s.busy)
                .ok_or(Error::QueueFull)?;
            let generation = shared.slots[slot].generation.wrapping_add(1);
            let ticket = Ticket { slot, generation };

            shared.queue.push(Entry {
                ticket: Some(ticket),
                command,
            })?;
            shared.slots[slot] = Slot {
                busy: true,
                generation,
            };
            Ok(ticket)
        })?;

        self.completions[ticket.slot].reset();
        debug!("Queued {:?} in slot {}", command, ticket.slot);
        self.wake.signal(());
        Ok(PendingCommand { link: self, ticket })
    }

    /// Delivery callback for one complete inbound frame.
    ///
    /// Frames of the wrong length are dropped here; everything else is
    /// validated by the runner.
    pub fn on_frame(&self, frame: &[u8]) {
        let Ok(frame) = <[u8; INBOUND_FRAME_LEN]>::try_from(frame) else {
            debug!("Dropping {} byte frame", frame.len());
            return;
        };
        if self.frames.try_send(frame).is_err() {
            warn!("Frame queue full, dropping {:02X?}", frame);
        }
    }

    /// Delivers one inbound frame, waiting for room in the frame queue.
    pub async fn deliver(&self, frame: [u8; INBOUND_FRAME_LEN]) {
        self.frames.send(frame).await;
    }

    /// Subscribes to measurement and close events.
    pub fn subscribe(&self) -> Result<EventSubscriber<'_, M>, Error> {
        self.events
            .subscriber()
            .map_err(|_| Error::TooManySubscribers)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock(|shared| shared.borrow().closed)
    }

    /// Closes the connection and fails every pending command with
    /// `ConnectionClosed`.
    pub fn close(&self) {
        if !self.shutdown(Error::ConnectionClosed) {
            warn!("Sensor connection is already closed.");
        }
    }

    // Marks the link closed and fails all queued commands with `error`.
    // Returns false if it was already closed.
    pub(crate) fn shutdown(&self, error: Error) -> bool {
        let closed_now = self.shared.lock(|shared| {
            let mut shared = shared.borrow_mut();
            if shared.closed {
                return false;
            }
            shared.closed = true;
            while let Some(entry) = shared.queue.pop() {
                self.settle(entry.ticket, Err(error));
            }
            true
        });
        if closed_now {
            self.wake.signal(());
        }
        closed_now
    }

    pub(crate) fn enqueue_startup(&self, command: Command) -> Result<(), Error> {
        self.shared.lock(|shared| {
            let mut shared = shared.borrow_mut();
            if shared.closed {
                return Err(Error::ConnectionClosed);
            }
            shared.queue.push_startup(command);
            Ok(())
        })?;
        self.wake.signal(());
        Ok(())
    }

    pub(crate) fn step(&self, state: &mut SensorState, allowed_retries: u8) -> Step {
        self.shared
            .lock(|shared| shared.borrow_mut().queue.step(state, allowed_retries))
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.shared.lock(|shared| !shared.borrow().queue.is_empty())
    }

    pub(crate) fn settle(&self, ticket: Option<Ticket>, result: Result<Response, Error>) {
        if let Some(ticket) = ticket {
            self.completions[ticket.slot].signal((ticket.generation, result));
        }
    }

    pub(crate) fn publish(&self, event: Event) {
        self.events.immediate_publisher().publish_immediate(event);
    }

    pub(crate) async fn next_frame(&self) -> [u8; INBOUND_FRAME_LEN] {
        self.frames.receive().await
    }

    pub(crate) async fn woken(&self) {
        self.wake.wait().await
    }

    fn release(&self, ticket: Ticket) {
        self.shared.lock(|shared| {
            let mut shared = shared.borrow_mut();
            let slot = &mut shared.slots[ticket.slot];
            if slot.generation == ticket.generation {
                slot.busy = false;
            }
        });
    }
}

impl<M: RawMutex, const N: usize> Default for Sds011Link<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion handle of a submitted command.
///
/// Dropping the handle frees its slot; the command itself still runs.
pub struct PendingCommand<'a, M: RawMutex, const N: usize> {
    link: &'a Sds011Link<M, N>,
    ticket: Ticket,
}

impl<M: RawMutex, const N: usize> PendingCommand<'_, M, N> {
    /// Waits until the command is confirmed, exhausted or cancelled by close.
    pub async fn wait(self) -> Result<Response, Error> {
        let signal = &self.link.completions[self.ticket.slot];
        loop {
            let (generation, result) = signal.wait().await;
            if generation == self.ticket.generation {
                return result;
            }
            debug!("Discarding stale result for slot {}", self.ticket.slot);
        }
    }
}

impl<M: RawMutex, const N: usize> Drop for PendingCommand<'_, M, N> {
    fn drop(&mut self) {
        self.link.release(self.ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn submit_rejects_invalid_arguments_synchronously() {
        let link: Sds011Link<NoopRawMutex, 2> = Sds011Link::new();
        assert!(matches!(
            link.submit(Command::SetWorkingPeriod(31)),
            Err(Error::InvalidArgument)
        ));
        assert!(!link.has_pending());
    }

    #[test]
    fn slots_are_bounded_and_reused() {
        let link: Sds011Link<NoopRawMutex, 1> = Sds011Link::new();
        let first = link.submit(Command::Query).unwrap();
        assert!(matches!(link.submit(Command::Query), Err(Error::QueueFull)));

        let mut state = SensorState::new();
        while link.has_pending() {
            if let Step::Finished { entry, result } = link.step(&mut state, 1) {
                link.settle(entry.ticket, result);
            }
        }
        assert_eq!(block_on(first.wait()), Err(Error::RetryExhausted));
        assert!(link.submit(Command::Query).is_ok());
    }

    struct Sink;

    impl embedded_io_async::ErrorType for Sink {
        type Error = core::convert::Infallible;
    }

    impl Write for Sink {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            Ok(buf.len())
        }
    }

    #[test]
    fn initial_query_runs_before_earlier_submissions() {
        let link: Sds011Link<NoopRawMutex, 1> = Sds011Link::new();
        let early = link.submit(Command::GetFirmwareVersion).unwrap();
        let _runner = link.runner(Sink, Config::default());

        let mut state = SensorState::new();
        assert_eq!(link.step(&mut state, 1), Step::Execute(Command::Query));
        match link.step(&mut state, 1) {
            Step::Finished { entry, .. } => assert_eq!(entry.ticket, None),
            other => panic!("unexpected step {:?}", other),
        }
        assert_eq!(
            link.step(&mut state, 1),
            Step::Execute(Command::GetFirmwareVersion)
        );
        drop(early);
    }

    #[test]
    fn single_place_link_accepts_a_command_next_to_the_initial_query() {
        let link: Sds011Link<NoopRawMutex, 1> = Sds011Link::new();
        let _runner = link.runner(Sink, Config::default());
        assert!(link.submit(Command::Query).is_ok());
    }

    #[test]
    fn close_fails_pending_and_later_commands() {
        let link: Sds011Link<NoopRawMutex, 2> = Sds011Link::new();
        let pending = link.submit(Command::GetFirmwareVersion).unwrap();

        link.close();
        assert!(link.is_closed());
        assert_eq!(block_on(pending.wait()), Err(Error::ConnectionClosed));
        assert!(matches!(
            link.submit(Command::Query),
            Err(Error::ConnectionClosed)
        ));
        // Second close only logs.
        link.close();
    }

    #[test]
    fn stale_result_does_not_settle_a_reused_slot() {
        let link: Sds011Link<NoopRawMutex, 1> = Sds011Link::new();
        let abandoned = link.submit(Command::GetWorkingPeriod).unwrap();
        let stale = abandoned.ticket;
        drop(abandoned);

        // The abandoned command is still queued, so the slot cannot take more.
        link.shared.lock(|s| s.borrow_mut().queue.pop());
        let fresh = link.submit(Command::GetWorkingPeriod).unwrap();
        link.settle(Some(stale), Ok(Response::WorkingPeriod(1)));
        link.settle(Some(fresh.ticket), Ok(Response::WorkingPeriod(2)));

        assert_eq!(block_on(fresh.wait()), Ok(Response::WorkingPeriod(2)));
    }

    #[test]
    fn on_frame_drops_wrong_lengths() {
        let link: Sds011Link<NoopRawMutex, 1> = Sds011Link::new();
        link.on_frame(&[0xAA, 0xC0]);
        assert!(link.frames.try_receive().is_err());

        let frame = [0xAA, 0xC0, 0x4B, 0x00, 0x51, 0x00, 0xE9, 0x77, 0xFC, 0xAB];
        link.on_frame(&frame);
        assert_eq!(link.frames.try_receive().ok(), Some(frame));
    }

    #[test]
    fn subscribers_are_limited() {
        let link: Sds011Link<NoopRawMutex, 1> = Sds011Link::new();
        let subscribers: std::vec::Vec<_> =
            (0..MAX_SUBSCRIBERS).map(|_| link.subscribe().unwrap()).collect();
        assert!(matches!(link.subscribe(), Err(Error::TooManySubscribers)));
        drop(subscribers);
        assert!(link.subscribe().is_ok());
    }
}
