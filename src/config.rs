//! # Matecon Configuration
//!
//! Compile-time constants governing the dispatch queue and the device
//! drivers. All limits are fixed at compile time, there is no dynamic allocation.

/// SysTick frequency in Hz. One dispatch tick is one SysTick period.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Number of priority levels in the dispatch queue.
pub const PRIORITY_LEVELS: usize = 4;

/// Application level: console follow-up work, bookkeeping.
pub const PRIORITY_APP: u8 = 0;
/// System level: main process housekeeping.
pub const PRIORITY_SYS: u8 = 1;
/// I/O level: device polling.
pub const PRIORITY_IO: u8 = 2;
/// Interrupt level: work deferred from interrupt handlers.
pub const PRIORITY_INT: u8 = 3;

/// Pending callouts each priority level accepts. The application level
/// takes the console's bursts of follow-up work; the others carry a few
/// periodic polls each.
pub const QUEUE_LENGTHS: [usize; PRIORITY_LEVELS] = [16, 4, 4, 4];

/// Callout slots per level arena: the longest entry of [`QUEUE_LENGTHS`].
pub const QUEUE_DEPTH: usize = max_length(QUEUE_LENGTHS);

const fn max_length(lengths: [usize; PRIORITY_LEVELS]) -> usize {
    let mut max = 0;
    let mut i = 0;
    while i < lengths.len() {
        if lengths[i] > max {
            max = lengths[i];
        }
        i += 1;
    }
    max
}

/// Banknote scanner polling period in ticks (~100 ms).
pub const BILL_POLL_TICKS: u16 = 100;

/// Coin acceptor polling period in ticks (~12 ms). The acceptor's output
/// pulse lasts 80–120 ms, so several polls land inside every pulse.
pub const COIN_POLL_TICKS: u16 = 12;

/// Dispatch priority of the banknote scanner poll.
pub const BILL_PRIORITY: u8 = PRIORITY_IO;

/// Dispatch priority of the coin acceptor poll.
pub const COIN_PRIORITY: u8 = PRIORITY_IO;
