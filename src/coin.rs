//! # Coin Acceptor
//!
//! Edge detector over the acceptor's bit-coded output. The acceptor shows
//! a coin pattern on four lines for roughly 100 ms per coin and has no
//! handshake, so the driver polls fast and reacts to changes only.

use crate::currency::Currency;
use crate::report::{ErrorKind, Report};

const PATTERN_MASK: u8 = 0b1111;
const ALARM: u8 = 1 << 4;

/// Pattern lines released: no coin.
const IDLE_PATTERN: u8 = 0b1111;

/// Captured acceptor lines.
///
/// ```text
///   bit  4      3  2  1  0
///        ALARM  f  e  d  b
/// ```
///
/// Pattern bits are line levels; ALARM is set while the alarm is asserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CoinPins(pub u8);

impl CoinPins {
    pub const IDLE: CoinPins = CoinPins(IDLE_PATTERN);

    pub const fn pattern(self) -> u8 {
        self.0 & PATTERN_MASK
    }

    pub const fn alarm(self) -> bool {
        self.0 & ALARM != 0
    }

    pub const fn with_pattern(self, pattern: u8) -> Self {
        CoinPins((self.0 & !PATTERN_MASK) | (pattern & PATTERN_MASK))
    }

    pub const fn with_alarm(self, alarm: bool) -> Self {
        if alarm {
            CoinPins(self.0 | ALARM)
        } else {
            CoinPins(self.0 & !ALARM)
        }
    }
}

pub trait CoinPort {
    fn read(&mut self) -> CoinPins;
}

/// Pattern (f,e,d,b) to coin value in hundredths.
const DENOMINATIONS: [(u8, i32); 7] = [
    (0b0000, 5),
    (0b0001, 10),
    (0b0010, 20),
    (0b0011, 50),
    (0b0100, 100),
    (0b0101, 200),
    (0b0110, 500),
];

pub fn denomination(pattern: u8) -> Option<Currency> {
    DENOMINATIONS
        .iter()
        .find(|(code, _)| *code == pattern)
        .map(|&(_, cents)| Currency::from_cents(cents))
}

pub struct CoinAcceptor {
    last: Option<CoinPins>,
    /// Alarm reported, waiting for it to clear.
    alarm: bool,
}

impl CoinAcceptor {
    pub const fn new() -> Self {
        Self {
            last: None,
            alarm: false,
        }
    }

    pub fn is_alarmed(&self) -> bool {
        self.alarm
    }

    pub fn poll<P: CoinPort, R: Report>(&mut self, port: &mut P, report: &mut R) {
        let pins = port.read();
        if self.last == Some(pins) {
            return;
        }
        self.last = Some(pins);
        debug!("coin: pattern={} alarm={}", pins.pattern(), pins.alarm());

        if pins.alarm() {
            if !self.alarm {
                self.alarm = true;
                warn!("coin: alarm");
                report.error(ErrorKind::Alarm, None);
            }
            return;
        }
        if self.alarm {
            self.alarm = false;
            info!("coin: alarm cleared");
        }

        let pattern = pins.pattern();
        if pattern == IDLE_PATTERN {
            return;
        }
        match denomination(pattern) {
            Some(value) => {
                info!("coin: accepted {}", value);
                report.deposit(value);
            }
            None => {
                warn!("coin: unknown pattern {}", pattern);
                report.error(ErrorKind::UnknownDenomination, None);
            }
        }
    }
}

impl Default for CoinAcceptor {
    fn default() -> Self {
        Self::new()
    }
}
