//! Pure derivation of an obligation's figures from its settlement log.
//!
//! Nothing here is cached on the aggregate: totals, balance and status are
//! recomputed from `(original_amount, due_date, log, today)` whenever asked,
//! so two derivations over the same inputs are always identical.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use tesouro_core::Amount;

use crate::obligation::ObligationKind;
use crate::refs::SettlementId;
use crate::settlement::{Settlement, SettlementKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Overdue,
}

impl ObligationStatus {
    /// Label shown in the payables/receivables tables.
    pub fn label(self, kind: ObligationKind) -> &'static str {
        match (self, kind) {
            (ObligationStatus::Pending, _) => "Pendente",
            (ObligationStatus::Overdue, _) => "Vencido",
            (ObligationStatus::PartiallyPaid, ObligationKind::Payable) => "Pago Parcialmente",
            (ObligationStatus::PartiallyPaid, ObligationKind::Receivable) => "Recebido Parcialmente",
            (ObligationStatus::Paid, ObligationKind::Payable) => "Pago",
            (ObligationStatus::Paid, ObligationKind::Receivable) => "Recebido",
        }
    }

    /// Still owes money (pending, overdue or partially settled).
    pub fn is_open(self) -> bool {
        self != ObligationStatus::Paid
    }
}

/// Accumulators folded from a settlement log, independent of dates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SettlementTotals {
    pub total_paid: Amount,
    pub total_discounts: Amount,
    pub total_interest_fees: Amount,
    /// Payments that have a reversal pointing at them.
    pub reversed: BTreeSet<SettlementId>,
}

impl SettlementTotals {
    pub fn is_reversed(&self, id: &SettlementId) -> bool {
        self.reversed.contains(id)
    }
}

/// Fold a settlement log, in log order.
///
/// A payment adds its net effect, discount and interest/fee; a reversal
/// subtracts exactly what its referenced payment added and marks that payment
/// reversed. A reversal that does not point at an earlier, not-yet-reversed
/// payment has no effect (the aggregate never records one).
pub fn fold_settlements(settlements: &[Settlement]) -> SettlementTotals {
    let mut totals = SettlementTotals::default();
    let mut payments: HashMap<SettlementId, &Settlement> = HashMap::new();

    for s in settlements {
        match s.kind {
            SettlementKind::Payment => {
                totals.total_paid += s.net_effect();
                totals.total_discounts += s.discount;
                totals.total_interest_fees += s.interest_fee;
                payments.insert(s.id, s);
            }
            SettlementKind::Reversal => {
                let Some(target_id) = s.reversed_settlement_id else {
                    continue;
                };
                if totals.reversed.contains(&target_id) {
                    continue;
                }
                let Some(target) = payments.get(&target_id) else {
                    continue;
                };
                totals.total_paid -= target.net_effect();
                totals.total_discounts -= target.discount;
                totals.total_interest_fees -= target.interest_fee;
                totals.reversed.insert(target_id);
            }
        }
    }

    totals
}

/// Everything the UI shows about an obligation's settlement state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derivation {
    pub total_paid: Amount,
    pub total_discounts: Amount,
    pub total_interest_fees: Amount,
    /// `original_amount - total_paid`, never below zero.
    pub outstanding_balance: Amount,
    /// `total_paid - original_amount` after a confirmed overpayment, zero otherwise.
    pub overpaid_amount: Amount,
    pub status: ObligationStatus,
    pub reversed: BTreeSet<SettlementId>,
}

/// Derive totals, balance and status as of `today`.
///
/// Status rule, in order: nothing paid → `Overdue` if `due_date < today`,
/// else `Pending`; something but less than owed → `PartiallyPaid`; the rest →
/// `Paid`. A fully reversed log therefore reopens the obligation.
pub fn derive(
    original_amount: Amount,
    due_date: NaiveDate,
    settlements: &[Settlement],
    today: NaiveDate,
) -> Derivation {
    let totals = fold_settlements(settlements);
    let paid = totals.total_paid;

    let status = if !paid.is_positive() {
        if due_date < today {
            ObligationStatus::Overdue
        } else {
            ObligationStatus::Pending
        }
    } else if paid < original_amount {
        ObligationStatus::PartiallyPaid
    } else {
        ObligationStatus::Paid
    };

    Derivation {
        total_paid: paid,
        total_discounts: totals.total_discounts,
        total_interest_fees: totals.total_interest_fees,
        outstanding_balance: (original_amount - paid).clamp_non_negative(),
        overpaid_amount: (paid - original_amount).clamp_non_negative(),
        status,
        reversed: totals.reversed,
    }
}
