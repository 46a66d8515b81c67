//! # Payment Controller
//!
//! Ties the drivers to the dispatch queue and the ledger. The [`Machine`]
//! is the context object the queue hands to every callout: the scanner and
//! acceptor polls run as self re-arming callouts at I/O priority, and their
//! deposits flow straight into the [`Bank`].
//!
//! ## Data Flow
//!
//! ```text
//!   SysTick ──► Dispatch::tick ──► poll_bill / poll_coin
//!                                        │
//!                              BillScanner / CoinAcceptor
//!                                        │
//!                           ┌────────────┴────────────┐
//!                           ▼                         ▼
//!                     Bank::deposit             ErrorHandler
//!                           │
//!                   BalanceListener
//! ```
//!
//! Console operations call the `Machine` directly, outside the queue.

use crate::bank::{BalanceListener, Bank};
use crate::bill::{BillPort, BillScanner, BillState};
use crate::coin::{CoinAcceptor, CoinPort};
use crate::config::{BILL_POLL_TICKS, BILL_PRIORITY, COIN_POLL_TICKS, COIN_PRIORITY};
use crate::currency::Currency;
use crate::dispatch::{self, Callout, Dispatch};
use crate::report::{ErrorHandler, ErrorKind, Report};

/// Routes driver reports to the ledger and the error handler.
struct Ledger<'b, L, E> {
    bank: &'b Bank<L>,
    errors: &'b mut E,
}

impl<L: BalanceListener, E: ErrorHandler> Report for Ledger<'_, L, E> {
    fn deposit(&mut self, denomination: Currency) {
        self.bank.deposit(denomination);
    }

    fn error(&mut self, kind: ErrorKind, denomination: Option<Currency>) {
        self.errors.handle(kind, denomination);
    }
}

/// Payment controller: both drivers, their ports, and the shared ledger.
pub struct Machine<'a, B, C, L, E> {
    bank: &'a Bank<L>,
    bill: BillScanner,
    coin: CoinAcceptor,
    bill_port: B,
    coin_port: C,
    errors: E,
    bill_poll: Option<Callout>,
    coin_poll: Option<Callout>,
}

impl<'a, B, C, L, E> Machine<'a, B, C, L, E>
where
    B: BillPort,
    C: CoinPort,
    L: BalanceListener,
    E: ErrorHandler,
{
    pub fn new(bank: &'a Bank<L>, bill_port: B, coin_port: C, errors: E) -> Self {
        Self {
            bank,
            bill: BillScanner::new(),
            coin: CoinAcceptor::new(),
            bill_port,
            coin_port,
            errors,
            bill_poll: None,
            coin_poll: None,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Arm both poll callouts. A poll that is already pending is left alone,
    /// so calling this again only re-arms a driver that lost its callout.
    pub fn start<const D: usize>(&mut self, dispatch: &mut Dispatch<Self, D>) -> Result<(), dispatch::Error> {
        if !self.bill_poll.is_some_and(|c| dispatch.is_pending(c)) {
            self.bill_poll = Some(dispatch.schedule(Self::poll_bill::<D>, 0, BILL_PRIORITY)?);
        }
        if !self.coin_poll.is_some_and(|c| dispatch.is_pending(c)) {
            self.coin_poll = Some(dispatch.schedule(Self::poll_coin::<D>, 0, COIN_PRIORITY)?);
        }
        info!("machine: started");
        Ok(())
    }

    /// Disarm both polls and return the final balance.
    pub fn shutdown<const D: usize>(&mut self, dispatch: &mut Dispatch<Self, D>) -> Currency {
        if let Some(callout) = self.bill_poll.take() {
            dispatch.stop(callout);
        }
        if let Some(callout) = self.coin_poll.take() {
            dispatch.stop(callout);
        }
        self.bank.shutdown()
    }

    /// Whether both drivers have a poll pending.
    pub fn is_running<const D: usize>(&self, dispatch: &Dispatch<Self, D>) -> bool {
        let pending = |poll: Option<Callout>| poll.is_some_and(|c| dispatch.is_pending(c));
        pending(self.bill_poll) && pending(self.coin_poll)
    }

    fn poll_bill<const D: usize>(dispatch: &mut Dispatch<Self, D>, machine: &mut Self, _: u16) {
        machine.bill_poll = None;
        let mut ledger = Ledger {
            bank: machine.bank,
            errors: &mut machine.errors,
        };
        machine.bill.poll(&mut machine.bill_port, &mut ledger);

        match dispatch.schedule_in(Self::poll_bill::<D>, 0, BILL_PRIORITY, BILL_POLL_TICKS) {
            Ok(callout) => machine.bill_poll = Some(callout),
            Err(_) => {
                error!("machine: bill poll not re-armed");
                machine.errors.handle(ErrorKind::Internal, None);
            }
        }
    }

    fn poll_coin<const D: usize>(dispatch: &mut Dispatch<Self, D>, machine: &mut Self, _: u16) {
        machine.coin_poll = None;
        let mut ledger = Ledger {
            bank: machine.bank,
            errors: &mut machine.errors,
        };
        machine.coin.poll(&mut machine.coin_port, &mut ledger);

        match dispatch.schedule_in(Self::poll_coin::<D>, 0, COIN_PRIORITY, COIN_POLL_TICKS) {
            Ok(callout) => machine.coin_poll = Some(callout),
            Err(_) => {
                error!("machine: coin poll not re-armed");
                machine.errors.handle(ErrorKind::Internal, None);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Console operations
    // -----------------------------------------------------------------------

    pub fn bank(&self) -> &'a Bank<L> {
        self.bank
    }

    pub fn balance(&self) -> Currency {
        self.bank.balance()
    }

    pub fn set_balance(&self, balance: Currency) {
        self.bank.set_balance(balance)
    }

    pub fn deposit(&self, amount: Currency) -> Currency {
        self.bank.deposit(amount)
    }

    pub fn withdraw(&self, amount: Currency) -> Currency {
        self.bank.withdraw(amount)
    }

    pub fn scanner_state(&self) -> BillState {
        self.bill.state()
    }

    pub fn inhibit(&mut self, inhibit: bool) {
        self.bill.inhibit(&mut self.bill_port, inhibit);
    }

    pub fn escrow(&mut self, escrow: bool) {
        self.bill.set_escrow(escrow);
    }

    pub fn coin_alarm(&self) -> bool {
        self.coin.is_alarmed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bill::{BillPins, Level};
    use crate::coin::CoinPins;
    use crate::config::{PRIORITY_IO, QUEUE_DEPTH};
    use std::cell::{Cell, RefCell};
    use std::vec::Vec;

    struct Lines {
        bill: Cell<BillPins>,
        coin: Cell<CoinPins>,
        inhibit: Cell<Level>,
        acknowledge: Cell<Level>,
    }

    impl Lines {
        fn new() -> Self {
            Self {
                bill: Cell::new(BillPins::IDLE),
                coin: Cell::new(CoinPins::IDLE),
                inhibit: Cell::new(Level::Low),
                acknowledge: Cell::new(Level::Low),
            }
        }
    }

    struct BillLines<'l>(&'l Lines);
    struct CoinLines<'l>(&'l Lines);

    impl BillPort for BillLines<'_> {
        fn read(&mut self) -> BillPins {
            self.0.bill.get()
        }
        fn set_inhibit(&mut self, level: Level) {
            self.0.inhibit.set(level);
        }
        fn set_acknowledge(&mut self, level: Level) {
            self.0.acknowledge.set(level);
        }
        fn set_reject(&mut self, _: Level) {}
    }

    impl CoinPort for CoinLines<'_> {
        fn read(&mut self) -> CoinPins {
            self.0.coin.get()
        }
    }

    type Errors = RefCell<Vec<(ErrorKind, Option<Currency>)>>;

    fn recorder(errors: &Errors) -> impl FnMut(ErrorKind, Option<Currency>) + '_ {
        move |kind, denomination| errors.borrow_mut().push((kind, denomination))
    }

    /// Run the queue for `ticks` ticks, draining everything due each tick.
    fn advance<M>(dispatch: &mut Dispatch<M, QUEUE_DEPTH>, machine: &mut M, ticks: u16) {
        for _ in 0..ticks {
            dispatch.tick(machine, 1);
            while dispatch.tick(machine, 0) {}
        }
    }

    #[test]
    fn test_coin_and_banknote_reach_the_bank() {
        let bank = Bank::silent();
        let lines = Lines::new();
        let errors = Errors::default();
        let mut machine = Machine::new(&bank, BillLines(&lines), CoinLines(&lines), recorder(&errors));
        let mut dispatch: Dispatch<_, QUEUE_DEPTH> = Dispatch::new();

        machine.start(&mut dispatch).unwrap();
        advance(&mut dispatch, &mut machine, 1);
        assert_eq!(machine.scanner_state(), BillState::Idle);

        lines.coin.set(CoinPins::IDLE.with_pattern(0b0101));
        advance(&mut dispatch, &mut machine, 100);
        lines.coin.set(CoinPins::IDLE);
        advance(&mut dispatch, &mut machine, 20);
        assert_eq!(machine.balance(), Currency::new(2, 0));

        let busy = BillPins::IDLE.with_busy(true);
        let scanned = busy.with_valid(true).with_vend(0b011);
        lines.bill.set(busy);
        advance(&mut dispatch, &mut machine, 100);
        assert_eq!(machine.scanner_state(), BillState::Validation);
        lines.bill.set(scanned);
        advance(&mut dispatch, &mut machine, 100);
        assert_eq!(machine.scanner_state(), BillState::Accept);
        assert_eq!(lines.acknowledge.get(), Level::Low);
        lines.bill.set(BillPins::IDLE);
        advance(&mut dispatch, &mut machine, 100);

        assert_eq!(machine.scanner_state(), BillState::Idle);
        assert_eq!(machine.balance(), Currency::new(12, 0));
        assert!(errors.borrow().is_empty());
    }

    #[test]
    fn test_start_is_idempotent() {
        let bank = Bank::silent();
        let lines = Lines::new();
        let errors = Errors::default();
        let mut machine = Machine::new(&bank, BillLines(&lines), CoinLines(&lines), recorder(&errors));
        let mut dispatch: Dispatch<_, QUEUE_DEPTH> = Dispatch::new();

        machine.start(&mut dispatch).unwrap();
        machine.start(&mut dispatch).unwrap();
        assert_eq!(dispatch.count(PRIORITY_IO), 2);
        assert!(machine.is_running(&dispatch));

        advance(&mut dispatch, &mut machine, 50);
        machine.start(&mut dispatch).unwrap();
        assert_eq!(dispatch.count(PRIORITY_IO), 2);
    }

    #[test]
    fn test_start_reports_full_queue() {
        let bank = Bank::silent();
        let lines = Lines::new();
        let errors = Errors::default();
        let mut machine = Machine::new(&bank, BillLines(&lines), CoinLines(&lines), recorder(&errors));
        let mut dispatch: Dispatch<_, 1> = Dispatch::new();

        assert_eq!(machine.start(&mut dispatch), Err(dispatch::Error::QueueFull));
        assert!(!machine.is_running(&dispatch));
    }

    #[test]
    fn test_shutdown_stops_polling() {
        let bank = Bank::silent();
        let lines = Lines::new();
        let errors = Errors::default();
        let mut machine = Machine::new(&bank, BillLines(&lines), CoinLines(&lines), recorder(&errors));
        let mut dispatch: Dispatch<_, QUEUE_DEPTH> = Dispatch::new();

        machine.start(&mut dispatch).unwrap();
        advance(&mut dispatch, &mut machine, 1);
        machine.deposit(Currency::new(3, 0));

        assert_eq!(machine.shutdown(&mut dispatch), Currency::new(3, 0));
        assert_eq!(dispatch.count(PRIORITY_IO), 0);

        lines.coin.set(CoinPins::IDLE.with_pattern(0b0000));
        advance(&mut dispatch, &mut machine, 100);
        assert_eq!(machine.balance(), Currency::new(3, 0));
    }

    #[test]
    fn test_driver_faults_reach_error_handler() {
        let bank = Bank::silent();
        let lines = Lines::new();
        let errors = Errors::default();
        let mut machine = Machine::new(&bank, BillLines(&lines), CoinLines(&lines), recorder(&errors));
        let mut dispatch: Dispatch<_, QUEUE_DEPTH> = Dispatch::new();

        machine.start(&mut dispatch).unwrap();
        advance(&mut dispatch, &mut machine, 1);

        lines.coin.set(CoinPins::IDLE.with_alarm(true));
        advance(&mut dispatch, &mut machine, 30);
        assert!(machine.coin_alarm());
        lines.coin.set(CoinPins::IDLE);
        advance(&mut dispatch, &mut machine, 30);
        assert!(!machine.coin_alarm());

        assert_eq!(*errors.borrow(), [(ErrorKind::Alarm, None)]);
        assert_eq!(machine.balance(), Currency::ZERO);
    }

    #[test]
    fn test_console_controls() {
        let bank = Bank::silent();
        let lines = Lines::new();
        let errors = Errors::default();
        let mut machine = Machine::new(&bank, BillLines(&lines), CoinLines(&lines), recorder(&errors));

        machine.inhibit(true);
        assert_eq!(lines.inhibit.get(), Level::High);
        machine.inhibit(false);
        assert_eq!(lines.inhibit.get(), Level::Low);

        machine.set_balance(Currency::new(10, 0));
        assert_eq!(machine.withdraw(Currency::new(1, 50)), Currency::new(8, 50));
        assert_eq!(machine.bank().balance(), Currency::new(8, 50));
        assert_eq!(machine.scanner_state(), BillState::Uninitialized);
    }
}
