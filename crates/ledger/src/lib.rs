//! Obligation ledger (event-sourced).
//!
//! Payables and receivables share one aggregate shape: an immutable original
//! amount plus an append-only log of settlements (payments and reversals).
//! Every displayed figure (amount paid, discounts, interest/fees, outstanding
//! balance, status) is a pure fold over that log, recomputable at any time.
//!
//! This crate is deterministic domain logic only: no IO, no clocks, no storage.
//! "Today" is always passed in by the caller.

pub mod bank;
pub mod derivation;
pub mod obligation;
pub mod refs;
pub mod settlement;
pub mod snapshot;

pub use bank::{BankAction, BankInstruction};
pub use derivation::{Derivation, ObligationStatus, SettlementTotals, derive, fold_settlements};
pub use obligation::{
    AGGREGATE_TYPE, AmendObligation, CreateObligation, Obligation, ObligationAmended,
    ObligationCommand, ObligationCreated, ObligationEvent, ObligationKind, PaymentRegistered,
    RegisterPayment, ReverseSettlement, SettlementReversed,
};
pub use refs::{BankAccountRef, CategoryRef, CounterpartyRef, ObligationId, SettlementId};
pub use settlement::{Settlement, SettlementKind};
pub use snapshot::{ObligationSnapshot, SettlementView};
