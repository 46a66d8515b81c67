//! # Bank Ledger
//!
//! The customer balance, shared between the device drivers (deposits from
//! poll context) and the console (reads and overwrites, possibly from the
//! UART interrupt). Every read-modify-write runs inside a critical section;
//! the change listener is called after the section is released, so user
//! code never runs with interrupts disabled.
//!
//! The ledger is volatile: the balance starts at zero on every boot.
//! [`Bank::shutdown`] hands the final balance to whoever persists it.

use core::cell::Cell;

use crate::currency::Currency;
use crate::sync::{self, Mutex};

/// Balance change callback.
pub trait BalanceListener {
    fn balance_changed(&self, balance: Currency);
}

/// No listener.
impl BalanceListener for () {
    fn balance_changed(&self, _: Currency) {}
}

impl BalanceListener for fn(Currency) {
    fn balance_changed(&self, balance: Currency) {
        self(balance)
    }
}

/// Balance ledger with an optional change listener.
pub struct Bank<L = ()> {
    balance: Mutex<Cell<Currency>>,
    listener: L,
}

impl Bank<()> {
    /// A ledger without a change listener.
    pub const fn silent() -> Self {
        Self::new(())
    }
}

impl<L: BalanceListener> Bank<L> {
    /// Create a ledger with a zero balance.
    pub const fn new(listener: L) -> Self {
        Self {
            balance: Mutex::new(Cell::new(Currency::ZERO)),
            listener,
        }
    }

    /// Current balance.
    pub fn balance(&self) -> Currency {
        sync::critical_section(|cs| self.balance.borrow(cs).get())
    }

    /// Overwrite the balance.
    pub fn set_balance(&self, balance: Currency) {
        sync::critical_section(|cs| self.balance.borrow(cs).set(balance));
        info!("bank: balance set to {}", balance);
        self.listener.balance_changed(balance);
    }

    /// Add `amount` (saturating) and return the new balance.
    pub fn deposit(&self, amount: Currency) -> Currency {
        self.update(|balance| balance + amount)
    }

    /// Subtract `amount` (saturating) and return the new balance.
    pub fn withdraw(&self, amount: Currency) -> Currency {
        self.update(|balance| balance - amount)
    }

    /// Final balance, for the persistence layer.
    pub fn shutdown(&self) -> Currency {
        let balance = self.balance();
        info!("bank: shutdown with balance {}", balance);
        balance
    }

    fn update(&self, f: impl FnOnce(Currency) -> Currency) -> Currency {
        let balance = sync::critical_section(|cs| {
            let cell = self.balance.borrow(cs);
            let balance = f(cell.get());
            cell.set(balance);
            balance
        });
        debug!("bank: balance now {}", balance);
        self.listener.balance_changed(balance);
        balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::vec::Vec;

    #[derive(Default)]
    struct Recorder(StdMutex<Vec<Currency>>);

    impl BalanceListener for Recorder {
        fn balance_changed(&self, balance: Currency) {
            self.0.lock().unwrap().push(balance);
        }
    }

    impl BalanceListener for &Recorder {
        fn balance_changed(&self, balance: Currency) {
            (**self).balance_changed(balance)
        }
    }

    #[test]
    fn test_bank_starts_empty() {
        let bank = Bank::silent();
        assert_eq!(bank.balance(), Currency::ZERO);
    }

    #[test]
    fn test_listener_sees_every_change() {
        let recorder = Recorder::default();
        let bank = Bank::new(&recorder);

        bank.set_balance(Currency::new(5, 0));
        assert_eq!(bank.deposit(Currency::new(2, 50)), Currency::new(7, 50));
        assert_eq!(bank.withdraw(Currency::new(10, 0)), Currency::new(-2, 50));

        assert_eq!(
            *recorder.0.lock().unwrap(),
            [
                Currency::new(5, 0),
                Currency::new(7, 50),
                Currency::new(-2, 50)
            ]
        );
        assert_eq!(bank.balance(), Currency::new(-2, 50));
    }

    #[test]
    fn test_shutdown_does_not_notify() {
        let recorder = Recorder::default();
        let bank = Bank::new(&recorder);
        bank.deposit(Currency::new(1, 0));
        assert_eq!(bank.shutdown(), Currency::new(1, 0));
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_function_listener() {
        fn ignore(_: Currency) {}
        let bank = Bank::new(ignore as fn(Currency));
        bank.deposit(Currency::new(1, 0));
        assert_eq!(bank.balance(), Currency::new(1, 0));
    }

    #[test]
    fn test_deposit_saturates() {
        let bank = Bank::silent();
        bank.set_balance(Currency::MAX);
        assert_eq!(bank.deposit(Currency::new(100, 0)), Currency::MAX);
        bank.set_balance(Currency::MIN);
        assert_eq!(bank.withdraw(Currency::new(0, 1)), Currency::MIN);
    }

    #[test]
    fn test_concurrent_deposits_lose_nothing() {
        let bank = Bank::silent();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..250 {
                        bank.deposit(Currency::new(0, 10));
                    }
                });
            }
            scope.spawn(|| {
                for _ in 0..100 {
                    bank.withdraw(Currency::new(0, 5));
                }
            });
        });
        assert_eq!(bank.balance(), Currency::new(95, 0));
    }
}
