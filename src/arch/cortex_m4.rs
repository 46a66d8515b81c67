//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor:
//! SysTick configuration, the tick counter the main loop feeds into the
//! dispatch queue, and interrupt priority setup.
//!
//! ## Tick Flow
//!
//! ```text
//!   SysTick (TICK_HZ) ──► TICKS += 1
//!                              │
//!   main loop ◄── take_ticks() ┘ ──► Dispatch::tick(elapsed)
//! ```
//!
//! The handler only counts; every callout runs from the main loop with
//! interrupts enabled.
//!
//! ## Interrupt Priorities
//!
//! - SysTick: Priority 0xFF (lowest), so UART receive is never held off by
//!   the tick.

use core::cell::Cell;

use cortex_m::peripheral::syst::SystClkSource;

use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::dispatch::Time;
use crate::sync::{self, Mutex};

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer for the dispatch tick.
///
/// Sets up SysTick to fire at `TICK_HZ` frequency using the processor
/// clock. Each tick triggers `SysTick`, which bumps the tick counter.
///
/// # Parameters
/// - `syst`: Mutable reference to the SysTick peripheral
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

// ---------------------------------------------------------------------------
// Interrupt priority configuration
// ---------------------------------------------------------------------------

/// Set SysTick to the lowest interrupt priority.
pub fn set_interrupt_priorities() {
    unsafe {
        // System Handler Priority Register 3 (SHPR3): 0xE000_ED20
        // Bits [31:24] = SysTick priority
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = core::ptr::read_volatile(shpr3);
        core::ptr::write_volatile(shpr3, val | (0xFF << 24));
    }
}

// ---------------------------------------------------------------------------
// Tick counter
// ---------------------------------------------------------------------------

/// Ticks elapsed since the main loop last collected them.
static TICKS: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

/// Count one tick. Called from the SysTick handler.
#[inline]
pub fn count_tick() {
    sync::critical_section(|cs| {
        let ticks = TICKS.borrow(cs);
        ticks.set(ticks.get().wrapping_add(1));
    });
}

/// Collect and reset the elapsed tick count, saturated to the clock width.
pub fn take_ticks() -> Time {
    let ticks = sync::critical_section(|cs| TICKS.borrow(cs).replace(0));
    ticks.min(u32::from(Time::MAX)) as Time
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler. Only counts; dispatching happens in the main
/// loop.
#[cfg(target_os = "none")]
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    count_tick();
}
