//! # Matecon: Matemat Payment Controller
//!
//! Firmware core for a vending-machine payment controller on ARM Cortex-M4
//! microcontrollers. It accepts coins and banknotes, keeps the customer
//! balance, and exposes balance and scanner controls to a console.
//!
//! ## Overview
//!
//! Everything runs in a single cooperative context driven by a
//! priority dispatch queue. Device drivers are polled by self re-arming
//! callouts and never block; interrupts only count ticks (and feed the
//! console), so the balance ledger is the one piece of state both sides
//! touch, and it is guarded by critical sections.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │               Firmware entry (main.rs)                  │
//! │        board init · SysTick · tick / wfi loop           │
//! ├────────────────────────────────────────────────────────┤
//! │             Payment Controller (machine.rs)             │
//! │   start() · shutdown() · balance() · inhibit() · ...    │
//! ├──────────────┬──────────────────┬──────────────────────┤
//! │  Scanner     │  Coin Acceptor   │  Bank Ledger         │
//! │  bill.rs     │  coin.rs         │  bank.rs             │
//! │  ─ poll()    │  ─ poll()        │  ─ deposit()         │
//! │  ─ inhibit() │                  │  ─ withdraw()        │
//! ├──────────────┴──────────────────┼──────────────────────┤
//! │  Dispatch Queue (dispatch.rs)   │  Currency            │
//! │  ─ schedule() · stop() · tick() │  currency.rs         │
//! ├─────────────────────────────────┼──────────────────────┤
//! │  Block Allocator (memory.rs)    │  Sync (sync.rs)      │
//! │  ─ BlockPool · Pool<T, N>       │  ─ critical_section  │
//! ├─────────────────────────────────┴──────────────────────┤
//! │     Arch Port (arch/cortex_m4.rs, arch/board.rs)        │
//! │        SysTick · tick counter · GPIO wiring             │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all state is statically sized
//! - **No `alloc`**: pure `core` only
//! - **Fixed callout slots**: `QUEUE_LENGTHS` bound each priority level
//! - **Critical sections**: `critical-section` crate, provided by
//!   `cortex-m` on target

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod arch;
pub mod bank;
pub mod bill;
pub mod coin;
pub mod config;
pub mod currency;
pub mod dispatch;
pub mod machine;
pub mod memory;
pub mod report;
pub mod sync;
