use std::{collections::HashMap, time::Duration};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

/// Timers the adaptor arms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// One-shot delay between device init and the first poll
    InitDelay,
    /// Recurring reachability poll
    Poll,
}

/// Notification that a timer has run out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerExpiry {
    /// Which timer fired
    pub kind: TimerKind,
    /// Arming generation, used to discard expiries of replaced timers
    pub generation: u64,
}

/// Timer registration with the process event loop
///
/// At most one timer of each [`TimerKind`] is live. Expiries are delivered back
/// to the event loop, which hands them to [`Scheduler::fired`] before dispatch.
pub trait Scheduler: Send {
    /// Arm `kind` to fire once after `delay`, replacing a pending timer of the same kind
    fn schedule(&mut self, kind: TimerKind, delay: Duration);

    /// Cancel the pending timer of `kind`; returns whether one was pending
    fn cancel(&mut self, kind: TimerKind) -> bool;

    /// Cancel every pending timer
    fn cancel_all(&mut self);

    /// Accept a delivered expiry; false if it belongs to a replaced or cancelled timer
    fn fired(&mut self, expiry: TimerExpiry) -> bool;
}

/// Scheduler backed by tokio sleep tasks
///
/// Each armed timer is a task that sleeps and then posts a [`TimerExpiry`] to the
/// receiver returned by [`TokioScheduler::new`]. Must be used inside a tokio runtime.
#[derive(Debug)]
pub struct TokioScheduler {
    expiries: mpsc::UnboundedSender<TimerExpiry>,
    timers: HashMap<TimerKind, (u64, JoinHandle<()>)>,
    next_generation: u64,
}

impl TokioScheduler {
    /// Create a scheduler and the receiver its expiries arrive on
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerExpiry>) {
        let (expiries, receiver) = mpsc::unbounded_channel();
        (
            Self {
                expiries,
                timers: HashMap::new(),
                next_generation: 0,
            },
            receiver,
        )
    }

    /// Check if a timer of `kind` is armed
    #[must_use]
    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.timers.contains_key(&kind)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        self.next_generation += 1;
        let generation = self.next_generation;
        let expiries = self.expiries.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = expiries.send(TimerExpiry { kind, generation });
        });

        if let Some((_, previous)) = self.timers.insert(kind, (generation, handle)) {
            previous.abort();
        }
        debug!(?kind, ?delay, generation, "Timer armed");
    }

    fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.timers.remove(&kind) {
            Some((generation, handle)) => {
                handle.abort();
                debug!(?kind, generation, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    fn cancel_all(&mut self) {
        for (kind, (_, handle)) in self.timers.drain() {
            handle.abort();
            debug!(?kind, "Timer cancelled");
        }
    }

    fn fired(&mut self, expiry: TimerExpiry) -> bool {
        match self.timers.get(&expiry.kind) {
            Some((generation, _)) if *generation == expiry.generation => {
                self.timers.remove(&expiry.kind);
                true
            }
            _ => false,
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
