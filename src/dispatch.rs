//! # Dispatch Queue
//!
//! Multi-priority callout queue for cooperative, run-to-completion event
//! handling. Each priority level owns a slot arena (a [`Pool`] of `D`
//! slots) and a pending list ordered by deadline. A level may be limited
//! to fewer than `D` pending callouts, see [`Dispatch::with_lengths`].
//!
//! ## Servicing Algorithm
//!
//! At each [`Dispatch::tick`]:
//! 1. **Advance time**: add the elapsed ticks to the wall clock
//! 2. **Scan levels**: from the highest priority down to, and including,
//!    the level of the handler currently running (if any)
//! 3. **Pop one due callout**: the earliest-deadline entry of the first
//!    level that has one due
//! 4. **Run it**: raise the current priority to that level, call the
//!    handler, restore the previous current priority
//!
//! At most one callout runs per tick, which bounds the latency of a tick;
//! repeated ticks drain any backlog. Handlers run with interrupts enabled,
//! the queue itself is plain data owned by the main loop.
//!
//! ## Callout Lifecycle
//!
//! ```text
//!   ┌──────────┐   schedule()   ┌──────────┐   due + turn   ┌──────────┐
//!   │   Idle   │ ─────────────► │ Pending  │ ─────────────► │ Running  │
//!   └──────────┘                └──────────┘                └──────────┘
//!        ▲  ▲        stop()          │   ▲     reschedule        │
//!        │  └────────────────────────┘   └───────────────────────┤
//!        └───────────────────────────── handler returns ─────────┘
//! ```
//!
//! ## Time
//!
//! The wall clock is a wrapping 16-bit tick counter. Deadlines are compared
//! by signed distance, so a deadline stays orderable across a wrap as long
//! as it lies less than half the counter range (32767 ticks) in the future.
//! The same limit applies backwards: a time more than 32767 ticks in the
//! past reads as a time in the future.

use heapless::Vec;

use crate::config::PRIORITY_LEVELS;
use crate::memory::{Pool, SlotId};

/// Wall clock time in ticks.
pub type Time = u16;

/// Priority level. Higher values are serviced first.
pub type Priority = u8;

/// Callout handler.
///
/// Receives the queue (to reschedule itself or post follow-up work), the
/// context object the queue was ticked with, and the callout's argument.
pub type Handler<C, const D: usize> = fn(&mut Dispatch<C, D>, &mut C, u16);

/// Longest delay that remains orderable against the wrapping clock.
const MAX_DELAY: Time = i16::MAX as Time;

/// Scheduling errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The requested priority level holds as many callouts as it may.
    QueueFull,
    /// The priority is not below [`PRIORITY_LEVELS`].
    InvalidPriority,
}

/// Handle to a scheduled callout, used to [`stop`](Dispatch::stop) it.
///
/// A handle goes stale once its callout runs or is stopped; stale handles
/// never match a later callout that happens to reuse the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Callout {
    priority: Priority,
    slot: SlotId,
    serial: u16,
}

impl Callout {
    pub fn priority(&self) -> Priority {
        self.priority
    }
}

struct Entry<C, const D: usize> {
    handler: Handler<C, D>,
    argument: u16,
    deadline: Time,
    serial: u16,
}

/// `true` once `deadline` is at or before `now`.
#[inline]
fn is_due(deadline: Time, now: Time) -> bool {
    now.wrapping_sub(deadline) as i16 >= 0
}

/// Ticks until `deadline`, zero if already due.
#[inline]
fn until(deadline: Time, now: Time) -> Time {
    (deadline.wrapping_sub(now) as i16).max(0) as Time
}

struct Level<C, const D: usize> {
    slots: Pool<Entry<C, D>, D>,
    /// Slot ids ordered by deadline, ties in insertion order.
    pending: Vec<SlotId, D>,
    /// Pending callouts this level accepts, at most `D`.
    length: usize,
}

impl<C, const D: usize> Level<C, D> {
    fn new() -> Self {
        Self {
            slots: Pool::new(),
            pending: Vec::new(),
            length: D,
        }
    }

    fn insert(&mut self, entry: Entry<C, D>, now: Time) -> Result<SlotId, Error> {
        if self.pending.len() >= self.length {
            return Err(Error::QueueFull);
        }
        let key = until(entry.deadline, now);
        let slot = self.slots.allocate(entry).map_err(|_| Error::QueueFull)?;

        // Insert after every entry due no later than this one, so equal
        // deadlines (and everything already overdue) stay first-in first-out.
        let slots = &self.slots;
        let position = self
            .pending
            .iter()
            .position(|id| slots.get(*id).is_some_and(|e| until(e.deadline, now) > key))
            .unwrap_or(self.pending.len());

        if self.pending.insert(position, slot).is_err() {
            self.slots.release(slot);
            return Err(Error::QueueFull);
        }
        Ok(slot)
    }

    fn find(&self, callout: &Callout) -> Option<usize> {
        let entry = self.slots.get(callout.slot)?;
        if entry.serial != callout.serial {
            return None;
        }
        self.pending.iter().position(|id| *id == callout.slot)
    }

    fn pop_due(&mut self, now: Time) -> Option<Entry<C, D>> {
        let id = *self.pending.first()?;
        if !is_due(self.slots.get(id)?.deadline, now) {
            return None;
        }
        self.pending.remove(0);
        self.slots.release(id)
    }
}

/// Multi-priority dispatch queue.
///
/// `C` is the context handed to every handler; `D` is the number of
/// callout slots per priority level, the length of the deepest level.
pub struct Dispatch<C, const D: usize> {
    levels: [Level<C, D>; PRIORITY_LEVELS],
    /// Wall clock.
    time: Time,
    /// Priority of the handler currently running.
    current: Option<Priority>,
    /// Stamp for the next callout handle.
    serial: u16,
}

impl<C, const D: usize> Dispatch<C, D> {
    /// Create an empty queue at time zero.
    pub fn new() -> Self {
        Self {
            levels: core::array::from_fn(|_| Level::new()),
            time: 0,
            current: None,
            serial: 0,
        }
    }

    /// Create an empty queue whose levels hold at most `lengths[level]`
    /// pending callouts each. Lengths above `D` are clamped to `D`.
    pub fn with_lengths(lengths: [usize; PRIORITY_LEVELS]) -> Self {
        let mut dispatch = Self::new();
        for (level, length) in dispatch.levels.iter_mut().zip(lengths) {
            level.length = length.min(D);
        }
        dispatch
    }

    /// Schedule `handler` to run as soon as its level gets a turn.
    pub fn schedule(
        &mut self,
        handler: Handler<C, D>,
        argument: u16,
        priority: Priority,
    ) -> Result<Callout, Error> {
        self.schedule_at(handler, argument, priority, self.time)
    }

    /// Schedule `handler` to run no earlier than `delay` ticks from now.
    ///
    /// Delays beyond half the clock range are clamped to 32767 ticks.
    pub fn schedule_in(
        &mut self,
        handler: Handler<C, D>,
        argument: u16,
        priority: Priority,
        delay: Time,
    ) -> Result<Callout, Error> {
        let at = self.time.wrapping_add(delay.min(MAX_DELAY));
        self.schedule_at(handler, argument, priority, at)
    }

    /// Schedule `handler` to run no earlier than wall-clock time `at`.
    ///
    /// A time at or up to 32767 ticks before the current time is due
    /// immediately; anything further back wraps around and is taken as a
    /// time in the future.
    pub fn schedule_at(
        &mut self,
        handler: Handler<C, D>,
        argument: u16,
        priority: Priority,
        at: Time,
    ) -> Result<Callout, Error> {
        let now = self.time;
        let serial = self.serial;
        let level = self
            .levels
            .get_mut(usize::from(priority))
            .ok_or(Error::InvalidPriority)?;

        let entry = Entry {
            handler,
            argument,
            deadline: at,
            serial,
        };
        let slot = level.insert(entry, now)?;
        self.serial = serial.wrapping_add(1);

        trace!("dispatch: scheduled priority {} at {}", priority, at);
        Ok(Callout {
            priority,
            slot,
            serial,
        })
    }

    /// Remove a pending callout. Returns `false` (and does nothing) if the
    /// callout is not pending: already run, running, or stopped.
    pub fn stop(&mut self, callout: Callout) -> bool {
        let Some(level) = self.levels.get_mut(usize::from(callout.priority)) else {
            return false;
        };
        let Some(position) = level.find(&callout) else {
            return false;
        };
        level.pending.remove(position);
        level.slots.release(callout.slot);
        true
    }

    /// Whether `callout` is still waiting to run.
    pub fn is_pending(&self, callout: Callout) -> bool {
        self.levels
            .get(usize::from(callout.priority))
            .is_some_and(|level| level.find(&callout).is_some())
    }

    /// Advance the clock by `elapsed` ticks and run at most one due callout.
    ///
    /// Returns `true` if a handler ran. A nested call from inside a handler
    /// only considers the running handler's level and the levels above it.
    pub fn tick(&mut self, context: &mut C, elapsed: Time) -> bool {
        self.time = self.time.wrapping_add(elapsed);
        let floor = self.current.map_or(0, usize::from);

        for priority in (floor..PRIORITY_LEVELS).rev() {
            let Some(entry) = self.levels[priority].pop_due(self.time) else {
                continue;
            };
            let previous = self.current.replace(priority as Priority);
            (entry.handler)(self, context, entry.argument);
            self.current = previous;
            return true;
        }
        false
    }

    /// Number of pending callouts at `priority`.
    pub fn count(&self, priority: Priority) -> usize {
        self.levels
            .get(usize::from(priority))
            .map_or(0, |level| level.pending.len())
    }

    /// Most callouts `priority` may hold pending.
    pub fn capacity(&self, priority: Priority) -> usize {
        self.levels
            .get(usize::from(priority))
            .map_or(0, |level| level.length)
    }

    /// Current wall-clock time in ticks.
    pub fn time(&self) -> Time {
        self.time
    }

    /// Priority of the handler currently running, `None` outside handlers.
    pub fn current_priority(&self) -> Option<Priority> {
        self.current
    }

    /// Drop every pending callout.
    pub fn clear(&mut self) {
        for level in self.levels.iter_mut() {
            while let Some(id) = level.pending.pop() {
                level.slots.release(id);
            }
        }
    }
}

impl<C, const D: usize> Default for Dispatch<C, D> {
    fn default() -> Self {
        Self::new()
    }
}
