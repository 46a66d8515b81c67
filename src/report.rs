//! # Driver Reporting
//!
//! Capability interfaces the device drivers call into. A driver never owns
//! the ledger or the error console; it receives a [`Report`] sink on every
//! poll and pushes deposits, faults and escrow questions through it.

use core::fmt;

use crate::currency::Currency;

/// Device fault reported through the error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// Driver bookkeeping failed (poll could not be re-armed).
    Internal,
    /// Scanner reported ABNORMAL during validation: jam or fake note.
    ScanJam,
    /// Scanner reported ABNORMAL while stacking an accepted note.
    StackerFault,
    /// Banknote holder is full; the note was not stacked.
    HolderFull,
    /// Bit pattern does not match any known denomination.
    UnknownDenomination,
    /// Coin acceptor raised its alarm line.
    Alarm,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Internal => "internal error",
            ErrorKind::ScanJam => "scan error or jam",
            ErrorKind::StackerFault => "stacker error",
            ErrorKind::HolderFull => "banknote holder full",
            ErrorKind::UnknownDenomination => "unknown denomination",
            ErrorKind::Alarm => "coin acceptor alarm",
        })
    }
}

/// Escrow decision for a scanned banknote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    /// Stack the note.
    Accept,
    /// Return the note to the customer.
    Reject,
}

/// Sink for driver events. Called synchronously from poll context.
pub trait Report {
    /// A note or coin of `denomination` was taken in.
    fn deposit(&mut self, denomination: Currency);

    /// A device fault, with the denomination involved if one was decoded.
    fn error(&mut self, kind: ErrorKind, denomination: Option<Currency>);

    /// Escrow mode: decide whether a scanned note is stacked.
    ///
    /// `denomination` is `None` when the VEND pattern is unknown. The
    /// default accepts every known denomination and rejects the rest.
    fn escrow(&mut self, denomination: Option<Currency>) -> Verdict {
        match denomination {
            Some(_) => Verdict::Accept,
            None => Verdict::Reject,
        }
    }
}

/// Error callback installed into the payment controller.
///
/// Implemented for every `FnMut(ErrorKind, Option<Currency>)`, so a closure
/// capturing the console (or an LED sequencer) can be passed directly.
pub trait ErrorHandler {
    fn handle(&mut self, kind: ErrorKind, denomination: Option<Currency>);
}

impl<F> ErrorHandler for F
where
    F: FnMut(ErrorKind, Option<Currency>),
{
    fn handle(&mut self, kind: ErrorKind, denomination: Option<Currency>) {
        self(kind, denomination)
    }
}
