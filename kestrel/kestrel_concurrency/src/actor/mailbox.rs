//! Actor mailbox with selective, skip-and-retry consumption.
//!
//! A mailbox is an ordered queue of signals. Senders append under the
//! mailbox mutex; the single owner scans from the oldest entry forward,
//! marking entries it does not want as skipped and leaving them in place for
//! later receives. A consumed entry is removed immediately.
//!
//! Entries that never match stay queued until the actor terminates.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use kestrel_core::{ActorError, ActorId, Exit, ExitReason, MailboxConfig, MailboxError, OverflowPolicy};
use log::{debug, trace};
use parking_lot::{Condvar, Mutex};

use super::context::current_actor;

/// An entry in a mailbox: an ordinary message or a lifecycle signal.
#[derive(Debug)]
pub enum Signal<M> {
    /// Ordinary message
    Message(M),

    /// Exit notification from a link or a watch
    Exit(Exit),
}

impl<M> Signal<M> {
    /// The message, if this is one.
    pub fn into_message(self) -> Option<M> {
        match self {
            Self::Message(msg) => Some(msg),
            Self::Exit(_) => None,
        }
    }

    /// Borrow the message, if this is one.
    pub fn as_message(&self) -> Option<&M> {
        match self {
            Self::Message(msg) => Some(msg),
            Self::Exit(_) => None,
        }
    }

    /// The exit notification, if this is one.
    pub fn into_exit(self) -> Option<Exit> {
        match self {
            Self::Exit(exit) => Some(exit),
            Self::Message(_) => None,
        }
    }

    /// Borrow the exit notification, if this is one.
    pub fn as_exit(&self) -> Option<&Exit> {
        match self {
            Self::Exit(exit) => Some(exit),
            Self::Message(_) => None,
        }
    }
}

/// Scan state of a queued entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Not yet looked at by any receive
    Unprocessed,

    /// Looked at and left in place
    Skipped,
}

struct Entry<M> {
    signal: Signal<M>,
    state: EntryState,
}

struct Inner<M> {
    queue: VecDeque<Entry<M>>,
    // Ordinary messages in `queue`; capacity applies to these only.
    messages: usize,
    overflow: Option<ActorError>,
    kill: Option<Exit>,
    closed: bool,
}

/// An actor's mailbox.
pub struct Mailbox<M> {
    owner: ActorId,
    config: MailboxConfig,
    trap_exits: AtomicBool,
    inner: Mutex<Inner<M>>,
    arrived: Condvar,
    space: Condvar,
}

impl<M> Mailbox<M> {
    /// Create an empty mailbox owned by `owner`.
    pub fn new(owner: ActorId, config: MailboxConfig) -> Self {
        Self {
            owner,
            config,
            trap_exits: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                messages: 0,
                overflow: None,
                kill: None,
                closed: false,
            }),
            arrived: Condvar::new(),
            space: Condvar::new(),
        }
    }

    /// Enqueue an ordinary message, honoring the overflow policy.
    ///
    /// Under `Block` this suspends the calling thread until the receiver
    /// consumes a message or terminates.
    pub fn push(&self, message: M) -> Result<(), MailboxError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(MailboxError::Closed(self.owner));
        }

        if let Some(capacity) = self.config.capacity {
            while inner.messages >= capacity {
                match self.config.overflow {
                    OverflowPolicy::Drop => {
                        trace!("Mailbox of {} full, dropping message", self.owner);
                        return Ok(());
                    }
                    OverflowPolicy::Throw => {
                        if inner.overflow.is_none() {
                            inner.overflow = Some(ActorError::MailboxOverflow {
                                capacity,
                                sender: current_actor(),
                            });
                        }
                        debug!("Mailbox of {} overflowed (capacity {})", self.owner, capacity);
                        drop(inner);
                        self.arrived.notify_one();
                        return Ok(());
                    }
                    OverflowPolicy::Block => {
                        self.space.wait(&mut inner);
                        if inner.closed {
                            return Err(MailboxError::Closed(self.owner));
                        }
                    }
                }
            }
        }

        inner.queue.push_back(Entry {
            signal: Signal::Message(message),
            state: EntryState::Unprocessed,
        });
        inner.messages += 1;
        drop(inner);
        self.arrived.notify_one();
        Ok(())
    }

    /// Enqueue an exit notification. Never subject to capacity.
    pub(crate) fn push_exit(&self, exit: Exit) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.queue.push_back(Entry {
            signal: Signal::Exit(exit),
            state: EntryState::Unprocessed,
        });
        drop(inner);
        self.arrived.notify_one();
    }

    /// Arm an untrappable kill; the next scan raises it.
    pub(crate) fn push_kill(&self, from: ActorId) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.kill = Some(Exit::link(from, ExitReason::Killed));
        drop(inner);
        self.arrived.notify_one();
    }

    /// Close the mailbox, dropping everything queued and waking blocked senders.
    pub(crate) fn close(&self) {
        let dropped = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.messages = 0;
            inner.overflow = None;
            inner.kill = None;
            std::mem::take(&mut inner.queue)
        };
        if !dropped.is_empty() {
            trace!("Mailbox of {} closed with {} pending entries", self.owner, dropped.len());
        }
        self.space.notify_all();
        self.arrived.notify_all();
    }

    /// Scan for the first entry accepted by `matcher`, waiting for new
    /// arrivals until `deadline`.
    ///
    /// Returns `Ok(None)` when the deadline passes without a match. Link exit
    /// signals met while not trapping, armed overflow errors and kills are
    /// raised as errors instead of being offered to `matcher`.
    pub(crate) fn select<T>(
        &self,
        deadline: Option<Instant>,
        matcher: &mut dyn FnMut(&Signal<M>) -> Option<T>,
    ) -> Result<Option<(Signal<M>, T)>, ActorError> {
        let mut inner = self.inner.lock();
        let mut cursor = 0;

        loop {
            if let Some(kill) = inner.kill.take() {
                return Err(ActorError::Exit(kill));
            }
            if let Some(overflow) = inner.overflow.take() {
                return Err(overflow);
            }

            while cursor < inner.queue.len() {
                let intercept = match &inner.queue[cursor].signal {
                    Signal::Exit(exit) => !exit.is_watch() && !self.is_trapping(),
                    Signal::Message(_) => false,
                };
                if intercept {
                    if let Some(Entry {
                        signal: Signal::Exit(exit),
                        ..
                    }) = self.take(&mut inner, cursor)
                    {
                        return Err(ActorError::Exit(exit));
                    }
                    continue;
                }

                if let Some(found) = matcher(&inner.queue[cursor].signal) {
                    if let Some(entry) = self.take(&mut inner, cursor) {
                        return Ok(Some((entry.signal, found)));
                    }
                }
                inner.queue[cursor].state = EntryState::Skipped;
                cursor += 1;
            }

            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    self.arrived.wait_until(&mut inner, deadline);
                }
                None => self.arrived.wait(&mut inner),
            }
        }
    }

    fn take(&self, inner: &mut Inner<M>, index: usize) -> Option<Entry<M>> {
        let entry = inner.queue.remove(index)?;
        if let Signal::Message(_) = entry.signal {
            inner.messages -= 1;
            self.space.notify_one();
        }
        Some(entry)
    }

    /// Whether link exit signals are delivered as messages.
    pub fn is_trapping(&self) -> bool {
        self.trap_exits.load(Ordering::Acquire)
    }

    pub(crate) fn set_trap_exits(&self, trap: bool) {
        self.trap_exits.store(trap, Ordering::Release);
    }

    /// The owning actor.
    pub fn owner(&self) -> ActorId {
        self.owner
    }

    /// Capacity and overflow policy.
    pub fn config(&self) -> MailboxConfig {
        self.config
    }

    /// Number of queued entries, including skipped ones and exit signals.
    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the owner has terminated.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Scan states of the queued entries, oldest first.
    pub fn entry_states(&self) -> Vec<EntryState> {
        self.inner.lock().queue.iter().map(|e| e.state).collect()
    }
}

impl<M> fmt::Debug for Mailbox<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("owner", &self.owner)
            .field("config", &self.config)
            .field("len", &self.len())
            .finish()
    }
}
