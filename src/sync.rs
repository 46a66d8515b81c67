//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstraction. The balance ledger and any
//! allocator shared with interrupt handlers must only be touched inside a
//! critical section to prevent lost updates between the main loop and
//! interrupt context.
//!
//! On the Cortex-M4 the `critical-section` implementation is provided by
//! `cortex-m` (`critical-section-single-core`): interrupts are disabled on
//! entry and the previous state restored on exit. Host builds use the
//! `std` implementation, a process-wide reentrant lock.

pub use critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section.
///
/// The closure is the guard: the section is released on every exit path
/// of `f`, including early returns. The token passed to `f` unlocks
/// [`Mutex`]-protected data.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     let balance = self.balance.borrow(cs);
///     balance.set(balance.get() + amount);
/// });
/// ```
///
/// Keep the closure short and never call user callbacks from inside it.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}
