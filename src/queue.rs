use heapless::Deque;
use log::debug;

use crate::{Command, Error, Response, SensorState};

/// Identifies the completion slot of a submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    pub slot: usize,
    pub generation: u32,
}

/// A queued command and the handle waiting on it, if any.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Entry {
    pub ticket: Option<Ticket>,
    pub command: Command,
}

/// What the runner has to do after a queue step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Step {
    /// Nothing is queued.
    Idle,
    /// Send the head command and check again after one retry interval.
    Execute(Command),
    /// The head command terminated and left the queue.
    Finished {
        entry: Entry,
        result: Result<Response, Error>,
    },
}

/// Strict FIFO of pending commands with a single command in flight.
///
/// The in-flight command leaves `pending` when it is first stepped, and the
/// startup command sits in a place of its own, so neither takes up one of
/// the `N` places callers submit into.
pub(crate) struct CommandQueue<const N: usize> {
    current: Option<Entry>,
    startup: Option<Command>,
    pending: Deque<Entry, N>,
    attempts: u16,
}

impl<const N: usize> CommandQueue<N> {
    pub const fn new() -> Self {
        Self {
            current: None,
            startup: None,
            pending: Deque::new(),
            attempts: 0,
        }
    }

    pub fn push(&mut self, entry: Entry) -> Result<(), Error> {
        self.pending.push_back(entry).map_err(|_| Error::QueueFull)
    }

    /// Schedules an untracked command ahead of everything not yet in flight.
    pub fn push_startup(&mut self, command: Command) {
        self.startup = Some(command);
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.startup.is_none() && self.pending.is_empty()
    }

    /// Removes the next queued entry, the in-flight one first.
    pub fn pop(&mut self) -> Option<Entry> {
        self.attempts = 0;
        self.current
            .take()
            .or_else(|| self.take_startup())
            .or_else(|| self.pending.pop_front())
    }

    fn take_startup(&mut self) -> Option<Entry> {
        self.startup.take().map(|command| Entry {
            ticket: None,
            command,
        })
    }

    /// Advances the head command by one attempt.
    ///
    /// The head is prepared when it goes in flight, so state it depends on is
    /// cleared exactly once. A confirmed outcome wins over an exhausted
    /// budget, which lets a reply to the last send still succeed.
    pub fn step(&mut self, state: &mut SensorState, allowed_retries: u8) -> Step {
        let entry = match self.current {
            Some(entry) => entry,
            None => {
                let Some(entry) = self.take_startup().or_else(|| self.pending.pop_front()) else {
                    self.attempts = 0;
                    return Step::Idle;
                };
                entry.command.prepare(state);
                self.attempts = 0;
                self.current = Some(entry);
                entry
            }
        };
        self.attempts += 1;

        if let Some(response) = entry.command.outcome(state) {
            debug!(
                "{:?} confirmed after {} attempt(s)",
                entry.command,
                self.attempts - 1
            );
            self.pop();
            return Step::Finished {
                entry,
                result: Ok(response),
            };
        }

        if self.attempts > u16::from(allowed_retries) {
            debug!("{:?} gave up after {} attempt(s)", entry.command, allowed_retries);
            self.pop();
            return Step::Finished {
                entry,
                result: Err(Error::RetryExhausted),
            };
        }

        Step::Execute(entry.command)
    }
}
