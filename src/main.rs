//! # Matecon Firmware
//!
//! Payment controller entry point for an STM32F4 board:
//!
//! | Callout | Priority | Period | Driver |
//! |---------|----------|--------|--------|
//! | `poll_bill` | I/O | 100 ticks | banknote scanner |
//! | `poll_coin` | I/O | 12 ticks | coin acceptor |
//!
//! ## Main Loop
//!
//! 1. Collect the ticks counted by SysTick since the last pass
//! 2. Tick the dispatch queue once with the elapsed time, then again with
//!    zero until nothing is due
//! 3. Sleep until the next interrupt
//!
//! Hosted builds compile to an empty binary so the library can be tested
//! with the standard harness.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod firmware {
    use cortex_m_rt::entry;
    use panic_halt as _;

    #[cfg(feature = "defmt")]
    use defmt_rtt as _;

    use matecon::arch::{board, cortex_m4};
    use matecon::bank::Bank;
    use matecon::config::{QUEUE_DEPTH, QUEUE_LENGTHS};
    use matecon::currency::Currency;
    use matecon::dispatch::Dispatch;
    use matecon::machine::Machine;
    use matecon::report::ErrorKind;

    /// The customer balance, shared with interrupt context.
    static BANK: Bank = Bank::silent();

    #[cfg(feature = "defmt")]
    fn report_error(kind: ErrorKind, denomination: Option<Currency>) {
        defmt::warn!("controller fault: {} ({})", kind, denomination);
    }

    #[cfg(not(feature = "defmt"))]
    fn report_error(_: ErrorKind, _: Option<Currency>) {}

    /// Firmware entry point. Wires the drivers to the dispatch queue and
    /// runs the cooperative main loop. Does not return.
    #[entry]
    fn main() -> ! {
        let Some(mut cp) = cortex_m::Peripherals::take() else {
            panic!("core peripherals already taken");
        };

        // SAFETY: called once, before SysTick is enabled.
        let (scanner, acceptor) = unsafe { board::init() };

        let mut machine = Machine::new(&BANK, scanner, acceptor, report_error);
        let mut dispatch: Dispatch<_, QUEUE_DEPTH> = Dispatch::with_lengths(QUEUE_LENGTHS);
        if machine.start(&mut dispatch).is_err() {
            report_error(ErrorKind::Internal, None);
        }

        cortex_m4::set_interrupt_priorities();
        cortex_m4::configure_systick(&mut cp.SYST);

        loop {
            let mut elapsed = cortex_m4::take_ticks();
            while dispatch.tick(&mut machine, elapsed) {
                elapsed = 0;
            }
            cortex_m::asm::wfi();
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
