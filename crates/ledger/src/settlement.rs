//! Settlement log entries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use tesouro_core::{Amount, Entity, UserId};

use crate::refs::{BankAccountRef, ObligationId, SettlementId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementKind {
    Payment,
    Reversal,
}

/// One payment or reversal applied to an obligation.
///
/// A reversal carries the negated components of the payment it undoes and
/// points at it through `reversed_settlement_id`; its `reversal_reason` is
/// always set. Payments never carry either field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: SettlementId,
    pub obligation_id: ObligationId,
    pub date: NaiveDate,
    /// Cash actually paid (negated on a reversal).
    pub amount_paid: Amount,
    pub discount: Amount,
    pub interest_fee: Amount,
    pub bank_account_ref: BankAccountRef,
    pub kind: SettlementKind,
    pub reversal_reason: Option<String>,
    pub reversed_settlement_id: Option<SettlementId>,
    pub created_by: UserId,
}

impl Settlement {
    #[allow(clippy::too_many_arguments)]
    pub fn payment(
        id: SettlementId,
        obligation_id: ObligationId,
        date: NaiveDate,
        amount_paid: Amount,
        discount: Amount,
        interest_fee: Amount,
        bank_account_ref: BankAccountRef,
        created_by: UserId,
    ) -> Self {
        Self {
            id,
            obligation_id,
            date,
            amount_paid,
            discount,
            interest_fee,
            bank_account_ref,
            kind: SettlementKind::Payment,
            reversal_reason: None,
            reversed_settlement_id: None,
            created_by,
        }
    }

    /// Build the reversal entry that exactly cancels `payment`.
    pub fn reversal_of(
        payment: &Settlement,
        id: SettlementId,
        date: NaiveDate,
        reason: impl Into<String>,
        created_by: UserId,
    ) -> Self {
        Self {
            id,
            obligation_id: payment.obligation_id,
            date,
            amount_paid: -payment.amount_paid,
            discount: -payment.discount,
            interest_fee: -payment.interest_fee,
            bank_account_ref: payment.bank_account_ref.clone(),
            kind: SettlementKind::Reversal,
            reversal_reason: Some(reason.into()),
            reversed_settlement_id: Some(payment.id),
            created_by,
        }
    }

    /// Signed change this entry makes to the obligation's paid total.
    ///
    /// `amount_paid + interest_fee - discount`; negative for a reversal.
    pub fn net_effect(&self) -> Amount {
        self.amount_paid + self.interest_fee - self.discount
    }

    pub fn is_payment(&self) -> bool {
        self.kind == SettlementKind::Payment
    }

    pub fn is_reversal(&self) -> bool {
        self.kind == SettlementKind::Reversal
    }
}

impl Entity for Settlement {
    type Id = SettlementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
