//! # Banknote Scanner
//!
//! State machine for a parallel-interface banknote scanner. The driver is
//! polled periodically; it captures the status lines, and only when they
//! differ from the previous capture (or on the very first poll) does it
//! evaluate the state machine.
//!
//! ## Interface Lines
//!
//! ```text
//!   Name   Dir  Active  Function
//!   ─────  ───  ──────  ─────────────────────────────
//!   VALID  in   low     banknote valid
//!   STKF   in   high    stacker full
//!   ABN    in   high    abnormal (jam, fake, fault)
//!   BUSY   in   high    scanner busy
//!   VEND   in   -       denomination (3-bit pattern)
//!   INH    out  high    inhibit acceptance
//!   ACK    out  low     acknowledge / stack note
//!   REJ    out  low     reject / return note
//! ```
//!
//! ## State Machine
//!
//! ```text
//!   UNINITIALIZED ──► SELFTEST ──¬BUSY──► IDLE ──BUSY──► VALIDATION
//!                                          ▲               │    │
//!                                          │            VALID  ABN
//!                                        ¬BUSY             │    │
//!                                          │               ▼    │
//!                    END ◄──¬ABN── ERROR ◄─┼──ABN── ACCEPT ◄── SCANNED
//!                     ▲                    │         │  │      │ escrow
//!                     │                    └──ABN── REJECT ◄───┘ reject
//!                     ├──────── ¬BUSY ───────────────┘  │
//!                     └───────── STKF, ¬BUSY (deposit) ─┘
//! ```
//!
//! After every transition the new state is evaluated again against the
//! same capture, so a state whose exit condition already holds on entry
//! leaves immediately instead of waiting for another pin change.

use core::fmt;

use crate::currency::Currency;
use crate::report::{ErrorKind, Report, Verdict};

// ---------------------------------------------------------------------------
// Pins
// ---------------------------------------------------------------------------

const VEND_SHIFT: u8 = 5;
const VEND_MASK: u8 = 0b111 << VEND_SHIFT;
const BUSY: u8 = 1 << 4;
const ABN: u8 = 1 << 3;
const VALID: u8 = 1 << 2;
const STKF: u8 = 1 << 1;

/// Captured scanner status lines, as line levels.
///
/// ```text
///   bit  7      6      5      4     3    2      1     0
///        VEND1  VEND2  VEND3  BUSY  ABN  VALID  STKF  -
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BillPins(pub u8);

impl BillPins {
    /// Lines of a powered, idle scanner: VALID and VEND released high.
    pub const IDLE: BillPins = BillPins(VEND_MASK | VALID);

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// A valid note was recognised (VALID pulled low).
    pub const fn valid(self) -> bool {
        self.0 & VALID == 0
    }

    pub const fn busy(self) -> bool {
        self.0 & BUSY != 0
    }

    pub const fn abnormal(self) -> bool {
        self.0 & ABN != 0
    }

    pub const fn stacker_full(self) -> bool {
        self.0 & STKF != 0
    }

    /// VEND1..3 line levels as a 3-bit code, VEND1 most significant.
    pub const fn vend(self) -> u8 {
        (self.0 & VEND_MASK) >> VEND_SHIFT
    }

    const fn with(self, mask: u8, set: bool) -> Self {
        if set {
            BillPins(self.0 | mask)
        } else {
            BillPins(self.0 & !mask)
        }
    }

    pub const fn with_valid(self, valid: bool) -> Self {
        self.with(VALID, !valid)
    }

    pub const fn with_busy(self, busy: bool) -> Self {
        self.with(BUSY, busy)
    }

    pub const fn with_abnormal(self, abnormal: bool) -> Self {
        self.with(ABN, abnormal)
    }

    pub const fn with_stacker_full(self, full: bool) -> Self {
        self.with(STKF, full)
    }

    pub const fn with_vend(self, code: u8) -> Self {
        BillPins((self.0 & !VEND_MASK) | ((code << VEND_SHIFT) & VEND_MASK))
    }
}

/// Output line level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

/// Hardware access for the scanner.
pub trait BillPort {
    /// Capture the status lines.
    fn read(&mut self) -> BillPins;
    /// Drive INH (high inhibits acceptance).
    fn set_inhibit(&mut self, level: Level);
    /// Drive ACK (low acknowledges).
    fn set_acknowledge(&mut self, level: Level);
    /// Drive REJ (low rejects).
    fn set_reject(&mut self, level: Level);
}

// ---------------------------------------------------------------------------
// Denominations
// ---------------------------------------------------------------------------

/// VEND code to banknote value.
const DENOMINATIONS: [(u8, i16); 5] = [
    (0b011, 10),
    (0b101, 20),
    (0b001, 50),
    (0b110, 100),
    (0b010, 200),
];

/// Decode a VEND code, `None` if no banknote uses it.
pub fn denomination(vend: u8) -> Option<Currency> {
    DENOMINATIONS
        .iter()
        .find(|(code, _)| *code == vend)
        .map(|&(_, value)| Currency::new(value, 0))
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Scanner protocol state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BillState {
    /// Pin state unknown.
    Uninitialized,
    /// Scanner runs its power-up self test.
    SelfTest,
    /// Ready for a note.
    Idle,
    /// A note is being scanned.
    Validation,
    /// The note was recognised; decide whether to stack it.
    Scanned,
    /// The note is being stacked.
    Accept,
    /// The note is being returned.
    Reject,
    /// The scanner reports a fault.
    Error,
    /// Transaction over, waiting for the scanner to go idle.
    End,
}

impl BillState {
    const COUNT: usize = 9;

    pub fn name(self) -> &'static str {
        match self {
            BillState::Uninitialized => "uninitialized",
            BillState::SelfTest => "self-test",
            BillState::Idle => "idle",
            BillState::Validation => "validating",
            BillState::Scanned => "scanned",
            BillState::Accept => "accepting",
            BillState::Reject => "rejecting",
            BillState::Error => "error",
            BillState::End => "ended",
        }
    }
}

impl fmt::Display for BillState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Banknote scanner driver state.
pub struct BillScanner {
    state: BillState,
    /// Last captured lines, `None` before the first poll.
    input: Option<BillPins>,
    inhibit: bool,
    escrow: bool,
    /// VEND code latched when the note was recognised, for the escrow
    /// verdict and fault reports.
    vend: Option<u8>,
}

impl BillScanner {
    pub const fn new() -> Self {
        Self {
            state: BillState::Uninitialized,
            input: None,
            inhibit: false,
            escrow: false,
            vend: None,
        }
    }

    pub fn state(&self) -> BillState {
        self.state
    }

    pub fn is_inhibited(&self) -> bool {
        self.inhibit
    }

    /// Block or allow note acceptance. Drives INH immediately, in any state.
    pub fn inhibit<P: BillPort>(&mut self, port: &mut P, inhibit: bool) {
        self.inhibit = inhibit;
        port.set_inhibit(if inhibit { Level::High } else { Level::Low });
    }

    pub fn is_escrow(&self) -> bool {
        self.escrow
    }

    /// Enable escrow mode: recognised notes are held until the report
    /// sink's [`Report::escrow`] verdict.
    pub fn set_escrow(&mut self, escrow: bool) {
        self.escrow = escrow;
    }

    /// Capture the lines and advance the state machine.
    pub fn poll<P: BillPort, R: Report>(&mut self, port: &mut P, report: &mut R) -> BillState {
        let pins = port.read();
        if self.input == Some(pins) {
            return self.state;
        }
        self.input = Some(pins);
        debug!(
            "bill: valid={} stkf={} abn={} busy={} vend={}",
            pins.valid(),
            pins.stacker_full(),
            pins.abnormal(),
            pins.busy(),
            pins.vend()
        );

        for _ in 0..BillState::COUNT {
            match self.next(pins, report) {
                Some(next) => self.enter(next, port),
                None => break,
            }
        }
        self.state
    }

    /// Transition out of the current state for `pins`, if any.
    fn next<R: Report>(&mut self, pins: BillPins, report: &mut R) -> Option<BillState> {
        match self.state {
            BillState::Uninitialized => Some(BillState::SelfTest),
            BillState::SelfTest => (!pins.busy()).then_some(BillState::Idle),
            BillState::Idle => pins.busy().then_some(BillState::Validation),
            BillState::Validation => {
                if pins.abnormal() {
                    warn!("bill: scan aborted");
                    report.error(ErrorKind::ScanJam, None);
                    Some(BillState::Error)
                } else if pins.valid() {
                    self.vend = Some(pins.vend());
                    Some(BillState::Scanned)
                } else if !pins.busy() {
                    // Note returned by the scanner itself.
                    Some(BillState::End)
                } else {
                    None
                }
            }
            BillState::Scanned => {
                if !self.escrow {
                    return Some(BillState::Accept);
                }
                let value = self.vend.and_then(denomination);
                match report.escrow(value) {
                    Verdict::Accept => Some(BillState::Accept),
                    Verdict::Reject => Some(BillState::Reject),
                }
            }
            BillState::Accept => {
                // VEND may settle after VALID: the lines held now decide.
                let value = denomination(pins.vend());
                let context = value.or_else(|| self.vend.and_then(denomination));
                if pins.abnormal() {
                    warn!("bill: stacker fault");
                    report.error(ErrorKind::StackerFault, context);
                    Some(BillState::Error)
                } else if pins.stacker_full() {
                    warn!("bill: holder full");
                    report.error(ErrorKind::HolderFull, context);
                    Some(BillState::End)
                } else if !pins.busy() {
                    match value {
                        Some(value) => {
                            info!("bill: accepted {}", value);
                            report.deposit(value);
                        }
                        None => {
                            warn!("bill: unknown vend pattern {}", pins.vend());
                            report.error(ErrorKind::UnknownDenomination, None);
                        }
                    }
                    Some(BillState::End)
                } else {
                    None
                }
            }
            BillState::Reject => {
                if pins.abnormal() {
                    warn!("bill: fault while returning note");
                    report.error(ErrorKind::ScanJam, None);
                    Some(BillState::Error)
                } else {
                    (!pins.busy()).then_some(BillState::End)
                }
            }
            BillState::Error => (!pins.abnormal()).then_some(BillState::End),
            BillState::End => (!pins.busy()).then_some(BillState::Idle),
        }
    }

    /// Switch to `state` and drive its entry outputs.
    fn enter<P: BillPort>(&mut self, state: BillState, port: &mut P) {
        info!("bill: {} -> {}", self.state, state);
        self.state = state;
        match state {
            BillState::SelfTest => {
                port.set_acknowledge(Level::High);
                port.set_reject(Level::High);
                port.set_inhibit(Level::High);
            }
            BillState::Idle => {
                port.set_acknowledge(Level::High);
                port.set_reject(Level::High);
                port.set_inhibit(if self.inhibit { Level::High } else { Level::Low });
            }
            BillState::Accept => port.set_acknowledge(Level::Low),
            BillState::Reject => port.set_reject(Level::Low),
            BillState::End => {
                port.set_acknowledge(Level::High);
                port.set_reject(Level::High);
                self.vend = None;
            }
            BillState::Uninitialized
            | BillState::Validation
            | BillState::Scanned
            | BillState::Error => {}
        }
    }
}

impl Default for BillScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    struct FakePort {
        pins: BillPins,
        inhibit: Level,
        acknowledge: Level,
        reject: Level,
    }

    impl FakePort {
        fn new() -> Self {
            Self {
                pins: BillPins::IDLE.with_busy(true),
                inhibit: Level::Low,
                acknowledge: Level::Low,
                reject: Level::Low,
            }
        }
    }

    impl BillPort for FakePort {
        fn read(&mut self) -> BillPins {
            self.pins
        }
        fn set_inhibit(&mut self, level: Level) {
            self.inhibit = level;
        }
        fn set_acknowledge(&mut self, level: Level) {
            self.acknowledge = level;
        }
        fn set_reject(&mut self, level: Level) {
            self.reject = level;
        }
    }

    #[derive(Default)]
    struct Sink {
        deposits: Vec<Currency>,
        errors: Vec<(ErrorKind, Option<Currency>)>,
        escrow_asked: Vec<Option<Currency>>,
        verdict: Option<Verdict>,
    }

    impl Report for Sink {
        fn deposit(&mut self, denomination: Currency) {
            self.deposits.push(denomination);
        }
        fn error(&mut self, kind: ErrorKind, denomination: Option<Currency>) {
            self.errors.push((kind, denomination));
        }
        fn escrow(&mut self, denomination: Option<Currency>) -> Verdict {
            self.escrow_asked.push(denomination);
            self.verdict.unwrap_or(Verdict::Accept)
        }
    }

    /// Scanner driven through its power-up self test into IDLE.
    fn ready() -> (BillScanner, FakePort, Sink) {
        let mut scanner = BillScanner::new();
        let mut port = FakePort::new();
        let mut sink = Sink::default();

        assert_eq!(scanner.poll(&mut port, &mut sink), BillState::SelfTest);
        assert_eq!(port.inhibit, Level::High);
        port.pins = BillPins::IDLE;
        assert_eq!(scanner.poll(&mut port, &mut sink), BillState::Idle);
        assert_eq!(port.inhibit, Level::Low);
        assert_eq!(port.acknowledge, Level::High);
        assert_eq!(port.reject, Level::High);
        (scanner, port, sink)
    }

    fn feed(scanner: &mut BillScanner, port: &mut FakePort, sink: &mut Sink, pins: BillPins) -> BillState {
        port.pins = pins;
        scanner.poll(port, sink)
    }

    #[test]
    fn test_pin_accessors() {
        let pins = BillPins::IDLE;
        assert!(!pins.valid());
        assert!(!pins.busy());
        assert_eq!(pins.vend(), 0b111);

        let pins = pins.with_valid(true).with_busy(true).with_vend(0b101);
        assert!(pins.valid());
        assert!(pins.busy());
        assert_eq!(pins.bits(), 0b1011_0000);
        assert_eq!(pins.vend(), 0b101);
    }

    #[test]
    fn test_denomination_table() {
        assert_eq!(denomination(0b011), Some(Currency::new(10, 0)));
        assert_eq!(denomination(0b101), Some(Currency::new(20, 0)));
        assert_eq!(denomination(0b001), Some(Currency::new(50, 0)));
        assert_eq!(denomination(0b110), Some(Currency::new(100, 0)));
        assert_eq!(denomination(0b010), Some(Currency::new(200, 0)));
        assert_eq!(denomination(0b111), None);
        assert_eq!(denomination(0b000), None);
    }

    #[test]
    fn test_banknote_accepted() {
        let (mut scanner, mut port, mut sink) = ready();
        let busy = BillPins::IDLE.with_busy(true);
        let scanned = busy.with_valid(true).with_vend(0b101);

        assert_eq!(feed(&mut scanner, &mut port, &mut sink, busy), BillState::Validation);
        assert_eq!(feed(&mut scanner, &mut port, &mut sink, scanned), BillState::Accept);
        assert_eq!(port.acknowledge, Level::Low);
        assert!(sink.deposits.is_empty());

        let done = scanned.with_busy(false);
        assert_eq!(feed(&mut scanner, &mut port, &mut sink, done), BillState::Idle);
        assert_eq!(sink.deposits, [Currency::new(20, 0)]);
        assert!(sink.errors.is_empty());
        assert_eq!(port.acknowledge, Level::High);

        assert_eq!(feed(&mut scanner, &mut port, &mut sink, BillPins::IDLE), BillState::Idle);
        assert_eq!(sink.deposits.len(), 1);
    }

    #[test]
    fn test_unchanged_pins_are_not_evaluated() {
        let (mut scanner, mut port, mut sink) = ready();
        port.pins = BillPins::IDLE.with_busy(true);
        assert_eq!(scanner.poll(&mut port, &mut sink), BillState::Validation);

        port.pins = port.pins.with_valid(true).with_vend(0b011);
        scanner.poll(&mut port, &mut sink);
        port.pins = port.pins.with_busy(false);
        for _ in 0..5 {
            scanner.poll(&mut port, &mut sink);
        }
        assert_eq!(sink.deposits, [Currency::new(10, 0)]);
    }

    #[test]
    fn test_scan_jam() {
        let (mut scanner, mut port, mut sink) = ready();
        let busy = BillPins::IDLE.with_busy(true);

        feed(&mut scanner, &mut port, &mut sink, busy);
        assert_eq!(
            feed(&mut scanner, &mut port, &mut sink, busy.with_abnormal(true)),
            BillState::Error
        );
        assert_eq!(sink.errors, [(ErrorKind::ScanJam, None)]);

        // ABN released while the note is still being ejected.
        assert_eq!(feed(&mut scanner, &mut port, &mut sink, busy), BillState::End);
        assert_eq!(feed(&mut scanner, &mut port, &mut sink, BillPins::IDLE), BillState::Idle);

        assert_eq!(sink.errors.len(), 1);
        assert!(sink.deposits.is_empty());
    }

    #[test]
    fn test_vend_settling_after_valid_is_decoded() {
        let (mut scanner, mut port, mut sink) = ready();
        let busy = BillPins::IDLE.with_busy(true);
        let recognised = busy.with_valid(true).with_vend(0b111);

        feed(&mut scanner, &mut port, &mut sink, busy);
        assert_eq!(feed(&mut scanner, &mut port, &mut sink, recognised), BillState::Accept);
        let settled = recognised.with_vend(0b101);
        assert_eq!(feed(&mut scanner, &mut port, &mut sink, settled), BillState::Accept);
        assert_eq!(
            feed(&mut scanner, &mut port, &mut sink, settled.with_busy(false)),
            BillState::Idle
        );

        assert_eq!(sink.deposits, [Currency::new(20, 0)]);
        assert!(sink.errors.is_empty());
    }

    #[test]
    fn test_fault_while_stacking() {
        let (mut scanner, mut port, mut sink) = ready();
        let scanned = BillPins::IDLE.with_busy(true).with_valid(true).with_vend(0b110);

        feed(&mut scanner, &mut port, &mut sink, BillPins::IDLE.with_busy(true));
        feed(&mut scanner, &mut port, &mut sink, scanned);
        assert_eq!(
            feed(&mut scanner, &mut port, &mut sink, scanned.with_abnormal(true)),
            BillState::Error
        );
        assert_eq!(sink.errors, [(ErrorKind::StackerFault, Some(Currency::new(100, 0)))]);

        assert_eq!(feed(&mut scanner, &mut port, &mut sink, BillPins::IDLE), BillState::Idle);
        assert!(sink.deposits.is_empty());
    }

    #[test]
    fn test_holder_full() {
        let (mut scanner, mut port, mut sink) = ready();
        let scanned = BillPins::IDLE.with_busy(true).with_valid(true).with_vend(0b001);

        feed(&mut scanner, &mut port, &mut sink, BillPins::IDLE.with_busy(true));
        feed(&mut scanner, &mut port, &mut sink, scanned);
        assert_eq!(
            feed(&mut scanner, &mut port, &mut sink, scanned.with_stacker_full(true)),
            BillState::End
        );
        assert_eq!(sink.errors, [(ErrorKind::HolderFull, Some(Currency::new(50, 0)))]);
        assert!(sink.deposits.is_empty());

        let idle = BillPins::IDLE.with_stacker_full(true);
        assert_eq!(feed(&mut scanner, &mut port, &mut sink, idle), BillState::Idle);
    }

    #[test]
    fn test_unknown_vend_pattern() {
        let (mut scanner, mut port, mut sink) = ready();
        let scanned = BillPins::IDLE.with_busy(true).with_valid(true).with_vend(0b100);

        feed(&mut scanner, &mut port, &mut sink, BillPins::IDLE.with_busy(true));
        feed(&mut scanner, &mut port, &mut sink, scanned);
        assert_eq!(
            feed(&mut scanner, &mut port, &mut sink, scanned.with_busy(false)),
            BillState::Idle
        );
        assert_eq!(sink.errors, [(ErrorKind::UnknownDenomination, None)]);
        assert!(sink.deposits.is_empty());
    }

    #[test]
    fn test_escrow_reject() {
        let (mut scanner, mut port, mut sink) = ready();
        scanner.set_escrow(true);
        sink.verdict = Some(Verdict::Reject);
        let scanned = BillPins::IDLE.with_busy(true).with_valid(true).with_vend(0b010);

        feed(&mut scanner, &mut port, &mut sink, BillPins::IDLE.with_busy(true));
        assert_eq!(feed(&mut scanner, &mut port, &mut sink, scanned), BillState::Reject);
        assert_eq!(sink.escrow_asked, [Some(Currency::new(200, 0))]);
        assert_eq!(port.reject, Level::Low);
        assert_eq!(port.acknowledge, Level::High);

        assert_eq!(feed(&mut scanner, &mut port, &mut sink, BillPins::IDLE), BillState::Idle);
        assert_eq!(port.reject, Level::High);
        assert!(sink.deposits.is_empty());
        assert!(sink.errors.is_empty());
    }

    #[test]
    fn test_escrow_accept() {
        let (mut scanner, mut port, mut sink) = ready();
        scanner.set_escrow(true);
        let scanned = BillPins::IDLE.with_busy(true).with_valid(true).with_vend(0b011);

        feed(&mut scanner, &mut port, &mut sink, BillPins::IDLE.with_busy(true));
        assert_eq!(feed(&mut scanner, &mut port, &mut sink, scanned), BillState::Accept);
        feed(&mut scanner, &mut port, &mut sink, BillPins::IDLE);
        assert_eq!(sink.escrow_asked.len(), 1);
        assert_eq!(sink.deposits, [Currency::new(10, 0)]);
    }

    #[test]
    fn test_inhibit_overrides_outputs() {
        let (mut scanner, mut port, mut sink) = ready();
        scanner.inhibit(&mut port, true);
        assert!(scanner.is_inhibited());
        assert_eq!(port.inhibit, Level::High);

        // Returning to IDLE keeps the inhibit request.
        feed(&mut scanner, &mut port, &mut sink, BillPins::IDLE.with_busy(true));
        feed(&mut scanner, &mut port, &mut sink, BillPins::IDLE);
        assert_eq!(scanner.state(), BillState::Idle);
        assert_eq!(port.inhibit, Level::High);

        scanner.inhibit(&mut port, false);
        assert_eq!(port.inhibit, Level::Low);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(BillState::Validation.to_string(), "validating");
        assert_eq!(BillState::SelfTest.name(), "self-test");
        assert_eq!(BillState::End.to_string(), "ended");
    }
}
