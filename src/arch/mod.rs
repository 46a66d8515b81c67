//! # Architecture Abstraction Layer
//!
//! Hardware boundary of the controller. `cortex_m4` holds the core
//! peripherals (SysTick, tick counter); `board` maps the scanner and coin
//! acceptor onto STM32F4 GPIO.

pub mod board;
pub mod cortex_m4;
