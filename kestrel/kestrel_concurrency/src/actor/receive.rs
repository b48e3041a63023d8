//! Selective receive.
//!
//! A [`Receive`] is an ordered list of patterns evaluated first-match-wins
//! against each queued signal, oldest first. Entries no pattern accepts are
//! skipped and stay queued for later receives.
//!
//! ```rust,ignore
//! let reply = ctx
//!     .receive()
//!     .on(|m: &Msg| matches!(m, Msg::Pong(_)), |m| Some(m))
//!     .after(Duration::from_millis(100), || None)
//!     .run()?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use kestrel_core::{ActorError, Exit};

use super::mailbox::{Mailbox, Signal};

enum Pattern<'a, M, R> {
    Message {
        matches: Box<dyn Fn(&M) -> bool + 'a>,
        action: Box<dyn FnOnce(M) -> R + 'a>,
    },
    Exit {
        matches: Box<dyn Fn(&Exit) -> bool + 'a>,
        action: Box<dyn FnOnce(Exit) -> R + 'a>,
    },
    Any(Box<dyn FnOnce(Signal<M>) -> R + 'a>),
}

impl<M, R> Pattern<'_, M, R> {
    fn accepts(&self, signal: &Signal<M>, transformed: Option<&M>) -> bool {
        match (self, signal) {
            (Self::Message { matches, .. }, Signal::Message(msg)) => {
                matches(transformed.unwrap_or(msg))
            }
            (Self::Exit { matches, .. }, Signal::Exit(exit)) => matches(exit),
            (Self::Any(_), _) => true,
            _ => false,
        }
    }
}

/// Builder for one selective receive.
///
/// Obtained from [`Context::receive`](super::context::Context::receive).
#[must_use = "a receive does nothing until `run` is called"]
pub struct Receive<'a, M, R> {
    mailbox: Arc<Mailbox<M>>,
    transform: Option<Box<dyn Fn(&M) -> M + 'a>>,
    patterns: Vec<Pattern<'a, M, R>>,
    after: Option<(Duration, Box<dyn FnOnce() -> R + 'a>)>,
}

impl<'a, M, R> Receive<'a, M, R> {
    pub(crate) fn new(mailbox: Arc<Mailbox<M>>) -> Self {
        Self {
            mailbox,
            transform: None,
            patterns: Vec::new(),
            after: None,
        }
    }

    /// Match ordinary messages accepted by `matches`.
    pub fn on<P, A>(mut self, matches: P, action: A) -> Self
    where
        P: Fn(&M) -> bool + 'a,
        A: FnOnce(M) -> R + 'a,
    {
        self.patterns.push(Pattern::Message {
            matches: Box::new(matches),
            action: Box::new(action),
        });
        self
    }

    /// Match exit notifications accepted by `matches`.
    ///
    /// Watch notifications always reach this pattern; link signals only do
    /// while the actor traps exits.
    pub fn on_exit<P, A>(mut self, matches: P, action: A) -> Self
    where
        P: Fn(&Exit) -> bool + 'a,
        A: FnOnce(Exit) -> R + 'a,
    {
        self.patterns.push(Pattern::Exit {
            matches: Box::new(matches),
            action: Box::new(action),
        });
        self
    }

    /// Match anything.
    pub fn any<A>(mut self, action: A) -> Self
    where
        A: FnOnce(Signal<M>) -> R + 'a,
    {
        self.patterns.push(Pattern::Any(Box::new(action)));
        self
    }

    /// Apply `transform` to each candidate message once before matching.
    ///
    /// The matched action receives the transformed value. Messages that do
    /// not match stay queued untransformed.
    pub fn transform<T>(mut self, transform: T) -> Self
    where
        T: Fn(&M) -> M + 'a,
    {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Give up after `timeout` and run `action` instead.
    ///
    /// The deadline is fixed when `run` starts; `Duration::ZERO` only looks
    /// at what is already queued.
    pub fn after<A>(mut self, timeout: Duration, action: A) -> Self
    where
        A: FnOnce() -> R + 'a,
    {
        self.after = Some((timeout, Box::new(action)));
        self
    }

    /// Block until a pattern matches or the timeout elapses.
    ///
    /// Errors are lifecycle failures: a link exit signal while not trapping,
    /// a kill, or a mailbox overflow under the `throw` policy.
    pub fn run(self) -> Result<R, ActorError> {
        let Self {
            mailbox,
            transform,
            mut patterns,
            after,
        } = self;

        // An unrepresentable deadline means waiting forever.
        let deadline = after
            .as_ref()
            .and_then(|(timeout, _)| Instant::now().checked_add(*timeout));

        let selected = {
            let mut matcher = |signal: &Signal<M>| {
                let transformed = match (signal, &transform) {
                    (Signal::Message(msg), Some(transform)) => Some(transform(msg)),
                    _ => None,
                };
                patterns
                    .iter()
                    .position(|p| p.accepts(signal, transformed.as_ref()))
                    .map(|index| (index, transformed))
            };
            mailbox.select(deadline, &mut matcher)?
        };

        match selected {
            Some((signal, (index, transformed))) => {
                let pattern = patterns.swap_remove(index);
                match (pattern, signal) {
                    (Pattern::Message { action, .. }, Signal::Message(msg)) => {
                        Ok(action(transformed.unwrap_or(msg)))
                    }
                    (Pattern::Exit { action, .. }, Signal::Exit(exit)) => Ok(action(exit)),
                    (Pattern::Any(action), Signal::Message(msg)) => {
                        Ok(action(Signal::Message(transformed.unwrap_or(msg))))
                    }
                    (Pattern::Any(action), signal) => Ok(action(signal)),
                    _ => Err(ActorError::failed(
                        "selective receive matched an incompatible pattern",
                    )),
                }
            }
            None => match after {
                Some((_, action)) => Ok(action()),
                None => Err(ActorError::failed("receive returned without a match")),
            },
        }
    }
}
