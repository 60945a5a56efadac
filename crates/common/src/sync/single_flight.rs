//! Single-flight execution
//!
//! A [`SingleFlight`] tracks at most one pending operation. Callers arriving
//! while the operation is pending join it instead of starting a duplicate,
//! and all of them observe the same result.
//!
//! Two retention policies are supported:
//! - [`SingleFlight::memoized`]: the first result is kept and returned to
//!   every later caller until [`SingleFlight::reset`] (initialization).
//! - [`SingleFlight::coalescing`]: the slot returns to idle once the pending
//!   operation settles, so the next caller starts a fresh one (refresh).
//!
//! The check-then-set of the pending handle happens under a synchronous lock
//! that is never held across an `.await`. Every started operation and every
//! reset takes a new generation, so a caller can only settle the operation it
//! actually awaited, never a newer one or one that was reset in the meantime.

use std::fmt;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

type PendingFlight<T> = Shared<BoxFuture<'static, T>>;

/// Observable state of a [`SingleFlight`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlightState<T> {
    /// Nothing has been started since creation or the last reset
    NotStarted,
    /// An operation is pending; new callers will join it
    InFlight,
    /// A memoized operation finished with this value
    Completed(T),
}

enum Phase<T> {
    Idle,
    Pending(PendingFlight<T>),
    Done(T),
}

struct Slot<T> {
    generation: u64,
    phase: Phase<T>,
}

/// Coalesces concurrent calls into one shared operation.
pub struct SingleFlight<T> {
    slot: Mutex<Slot<T>>,
    memoize: bool,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Keep the first result until [`reset`](Self::reset).
    #[must_use]
    pub const fn memoized() -> Self {
        Self::with_policy(true)
    }

    /// Share a result only among callers that overlap with the operation.
    #[must_use]
    pub const fn coalescing() -> Self {
        Self::with_policy(false)
    }

    const fn with_policy(memoize: bool) -> Self {
        Self { slot: Mutex::new(Slot { generation: 0, phase: Phase::Idle }), memoize }
    }

    /// Run `start` unless an operation is already pending (join it) or a
    /// memoized result exists (return it).
    ///
    /// `start` is only invoked when this caller becomes the leader; it must
    /// build the future without touching this `SingleFlight`.
    pub async fn run<F, Fut>(&self, start: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (generation, pending) = {
            let mut slot = self.slot.lock();
            let pending = match &slot.phase {
                Phase::Done(value) => return value.clone(),
                Phase::Pending(pending) => pending.clone(),
                Phase::Idle => {
                    slot.generation = slot.generation.wrapping_add(1);
                    let pending = start().boxed().shared();
                    slot.phase = Phase::Pending(pending.clone());
                    pending
                }
            };
            (slot.generation, pending)
        };

        let value = pending.await;
        self.settle(generation, &value);
        value
    }

    /// Current state without side effects.
    pub fn state(&self) -> FlightState<T> {
        match &self.slot.lock().phase {
            Phase::Idle => FlightState::NotStarted,
            Phase::Pending(_) => FlightState::InFlight,
            Phase::Done(value) => FlightState::Completed(value.clone()),
        }
    }

    /// `true` while an operation is pending.
    pub fn is_in_flight(&self) -> bool {
        matches!(self.slot.lock().phase, Phase::Pending(_))
    }

    /// Forget any pending or memoized result.
    ///
    /// Callers already waiting on a pending operation still receive its
    /// result, but it no longer lands in this slot.
    pub fn reset(&self) {
        let mut slot = self.slot.lock();
        slot.generation = slot.generation.wrapping_add(1);
        slot.phase = Phase::Idle;
    }

    fn settle(&self, generation: u64, value: &T) {
        let mut slot = self.slot.lock();
        if slot.generation != generation || !matches!(slot.phase, Phase::Pending(_)) {
            return;
        }
        slot.phase = if self.memoize { Phase::Done(value.clone()) } else { Phase::Idle };
    }
}

impl<T> fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.lock();
        let phase = match slot.phase {
            Phase::Idle => "idle",
            Phase::Pending(_) => "pending",
            Phase::Done(_) => "done",
        };
        f.debug_struct("SingleFlight")
            .field("generation", &slot.generation)
            .field("phase", &phase)
            .field("memoize", &self.memoize)
            .finish()
    }
}
