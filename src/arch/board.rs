//! # Board Wiring
//!
//! STM32F4 GPIO mapping of the scanner and acceptor lines, accessed through
//! raw volatile register reads and writes.
//!
//! ```text
//!   Scanner                         Acceptor
//!   ───────────────────────         ───────────────────
//!   PC7..PC5  VEND1..VEND3  in      PA4  b         in
//!   PC4       BUSY          in      PA5  d         in
//!   PC3       ABN           in      PA6  e         in
//!   PB7       VALID         in      PA7  f         in
//!   PB6       STKF          in      PB5  ALARM (L) in
//!   PC2       INH           out
//!   PC1       ACK           out
//!   PC0       REJ           out
//! ```
//!
//! Inputs use the internal pull-ups; the devices pull the lines low.

use crate::bill::{BillPins, BillPort, Level};
use crate::coin::{CoinPins, CoinPort};

const RCC_AHB1ENR: *mut u32 = 0x4002_3830 as *mut u32;

const GPIOA: Gpio = Gpio(0x4002_0000);
const GPIOB: Gpio = Gpio(0x4002_0400);
const GPIOC: Gpio = Gpio(0x4002_0800);

/// One GPIO register block.
#[derive(Clone, Copy)]
struct Gpio(usize);

impl Gpio {
    const MODER: usize = 0x00;
    const PUPDR: usize = 0x0C;
    const IDR: usize = 0x10;
    const BSRR: usize = 0x18;

    fn reg(self, offset: usize) -> *mut u32 {
        (self.0 + offset) as *mut u32
    }

    /// Input levels of all 16 pins.
    fn read(self) -> u16 {
        unsafe { core::ptr::read_volatile(self.reg(Self::IDR)) as u16 }
    }

    fn write(self, pin: u8, level: Level) {
        let bit = match level {
            Level::High => 1u32 << pin,
            Level::Low => 1u32 << (pin + 16),
        };
        unsafe { core::ptr::write_volatile(self.reg(Self::BSRR), bit) }
    }

    /// Set `pins` to input mode with pull-ups.
    unsafe fn pull_up(self, pins: &[u8]) {
        for &pin in pins {
            let shift = u32::from(pin) * 2;
            let moder = core::ptr::read_volatile(self.reg(Self::MODER));
            core::ptr::write_volatile(self.reg(Self::MODER), moder & !(0b11 << shift));
            let pupdr = core::ptr::read_volatile(self.reg(Self::PUPDR));
            core::ptr::write_volatile(self.reg(Self::PUPDR), (pupdr & !(0b11 << shift)) | (0b01 << shift));
        }
    }

    /// Set `pins` to push-pull output mode.
    unsafe fn output(self, pins: &[u8]) {
        for &pin in pins {
            let shift = u32::from(pin) * 2;
            let moder = core::ptr::read_volatile(self.reg(Self::MODER));
            core::ptr::write_volatile(self.reg(Self::MODER), (moder & !(0b11 << shift)) | (0b01 << shift));
        }
    }
}

const REJ: u8 = 0;
const ACK: u8 = 1;
const INH: u8 = 2;

/// Banknote scanner lines.
pub struct ScannerPort {
    _private: (),
}

impl BillPort for ScannerPort {
    fn read(&mut self) -> BillPins {
        let c = GPIOC.read() as u8 & 0b1111_1000;
        let b = (GPIOB.read() >> 5) as u8 & 0b0000_0110;
        BillPins(c | b)
    }

    fn set_inhibit(&mut self, level: Level) {
        GPIOC.write(INH, level);
    }

    fn set_acknowledge(&mut self, level: Level) {
        GPIOC.write(ACK, level);
    }

    fn set_reject(&mut self, level: Level) {
        GPIOC.write(REJ, level);
    }
}

/// Coin acceptor lines.
pub struct AcceptorPort {
    _private: (),
}

impl CoinPort for AcceptorPort {
    fn read(&mut self) -> CoinPins {
        let pattern = (GPIOA.read() >> 4) as u8 & 0b1111;
        let alarm = GPIOB.read() & (1 << 5) == 0;
        CoinPins(pattern).with_alarm(alarm)
    }
}

/// Clock the GPIO blocks, configure the scanner and acceptor pins and hand
/// out their ports. Outputs start released: ACK and REJ high, INH low.
///
/// # Safety
/// Must be called exactly once, before interrupts that touch GPIOA..C are
/// enabled. The returned ports own the pins listed above.
pub unsafe fn init() -> (ScannerPort, AcceptorPort) {
    let enr = core::ptr::read_volatile(RCC_AHB1ENR);
    core::ptr::write_volatile(RCC_AHB1ENR, enr | 0b111);

    GPIOA.pull_up(&[4, 5, 6, 7]);
    GPIOB.pull_up(&[5, 6, 7]);
    GPIOC.pull_up(&[3, 4, 5, 6, 7]);

    GPIOC.write(ACK, Level::High);
    GPIOC.write(REJ, Level::High);
    GPIOC.write(INH, Level::Low);
    GPIOC.output(&[REJ, ACK, INH]);

    (ScannerPort { _private: () }, AcceptorPort { _private: () })
}
