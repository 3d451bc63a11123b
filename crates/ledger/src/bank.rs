//! Intents sent to the bank-account collaborator.
//!
//! The ledger never writes bank balances. After a settlement commits it only
//! describes what the bank side should do with it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use tesouro_core::Amount;

use crate::obligation::{ObligationEvent, ObligationKind};
use crate::refs::{BankAccountRef, ObligationId, SettlementId};
use crate::settlement::Settlement;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankAction {
    /// Money left the account (payable settled).
    Debit,
    /// Money entered the account (receivable settled).
    Credit,
    /// Undo the movement recorded for a reversed payment.
    Reopen,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankInstruction {
    pub action: BankAction,
    pub obligation_id: ObligationId,
    /// For `Reopen`, the payment whose movement is undone.
    pub settlement_id: SettlementId,
    /// Cash amount of the payment concerned, always non-negative.
    pub amount: Amount,
    pub bank_account_ref: BankAccountRef,
    pub date: NaiveDate,
    pub description: String,
    pub reversal_reason: Option<String>,
}

impl BankInstruction {
    /// Instruction implied by a committed ledger event, if any.
    ///
    /// Creation and amendments do not move money and yield `None`.
    pub fn from_event(kind: ObligationKind, description: &str, event: &ObligationEvent) -> Option<Self> {
        match event {
            ObligationEvent::PaymentRegistered(e) => Self::for_settlement(kind, description, &e.settlement),
            ObligationEvent::SettlementReversed(e) => Self::for_settlement(kind, description, &e.reversal),
            ObligationEvent::ObligationCreated(_) | ObligationEvent::ObligationAmended(_) => None,
        }
    }

    /// Instruction for one entry of the settlement log.
    ///
    /// Used to deliver again what the log already holds. A reversal entry
    /// without the payment it points at yields `None`.
    pub fn for_settlement(kind: ObligationKind, description: &str, s: &Settlement) -> Option<Self> {
        if s.is_reversal() {
            let reversed_id = s.reversed_settlement_id?;
            return Some(Self {
                action: BankAction::Reopen,
                obligation_id: s.obligation_id,
                settlement_id: reversed_id,
                amount: -s.amount_paid,
                bank_account_ref: s.bank_account_ref.clone(),
                date: s.date,
                description: format!("Estorno: {description}"),
                reversal_reason: s.reversal_reason.clone(),
            });
        }

        let action = match kind {
            ObligationKind::Payable => BankAction::Debit,
            ObligationKind::Receivable => BankAction::Credit,
        };
        Some(Self {
            action,
            obligation_id: s.obligation_id,
            settlement_id: s.id,
            amount: s.amount_paid,
            bank_account_ref: s.bank_account_ref.clone(),
            date: s.date,
            description: description.to_string(),
            reversal_reason: None,
        })
    }

    /// Signed effect on the account balance (`Reopen` has none of its own).
    pub fn signed_amount(&self) -> Amount {
        match self.action {
            BankAction::Debit => -self.amount,
            BankAction::Credit => self.amount,
            BankAction::Reopen => Amount::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obligation::{PaymentRegistered, SettlementReversed};
    use chrono::Utc;
    use tesouro_core::{TenantId, UserId};

    fn payment() -> Settlement {
        Settlement::payment(
            SettlementId::new(),
            ObligationId::generate(),
            NaiveDate::from_ymd_opt(2025, 10, 2).unwrap(),
            Amount::from_cents(40000),
            Amount::from_cents(1000),
            Amount::from_cents(500),
            BankAccountRef::new("bb-cc"),
            UserId::new(),
        )
    }

    fn registered(settlement: Settlement) -> ObligationEvent {
        ObligationEvent::PaymentRegistered(PaymentRegistered {
            tenant_id: TenantId::new(),
            obligation_id: settlement.obligation_id,
            settlement,
            overpayment_confirmed: false,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn payable_payment_debits_cash_amount() {
        let p = payment();
        let i = BankInstruction::from_event(ObligationKind::Payable, "Aluguel", &registered(p.clone())).unwrap();

        assert_eq!(i.action, BankAction::Debit);
        assert_eq!(i.amount, Amount::from_cents(40000));
        assert_eq!(i.signed_amount(), Amount::from_cents(-40000));
        assert_eq!(i.settlement_id, p.id);
    }

    #[test]
    fn receivable_payment_credits() {
        let i = BankInstruction::from_event(ObligationKind::Receivable, "Venda", &registered(payment())).unwrap();
        assert_eq!(i.action, BankAction::Credit);
        assert_eq!(i.signed_amount(), Amount::from_cents(40000));
    }

    #[test]
    fn reversal_reopens_the_original_payment() {
        let p = payment();
        let r = Settlement::reversal_of(&p, SettlementId::new(), p.date, "erro de digitação", UserId::new());
        let event = ObligationEvent::SettlementReversed(SettlementReversed {
            tenant_id: TenantId::new(),
            obligation_id: p.obligation_id,
            reversal: r,
            occurred_at: Utc::now(),
        });

        let i = BankInstruction::from_event(ObligationKind::Payable, "Aluguel", &event).unwrap();
        assert_eq!(i.action, BankAction::Reopen);
        assert_eq!(i.settlement_id, p.id);
        assert_eq!(i.amount, Amount::from_cents(40000));
        assert_eq!(i.reversal_reason.as_deref(), Some("erro de digitação"));
    }

    #[test]
    fn log_entries_give_the_same_instructions_as_their_events() {
        let p = payment();
        let r = Settlement::reversal_of(&p, SettlementId::new(), p.date, "estorno", UserId::new());

        let from_log = BankInstruction::for_settlement(ObligationKind::Payable, "Aluguel", &p).unwrap();
        let from_event = BankInstruction::from_event(ObligationKind::Payable, "Aluguel", &registered(p.clone())).unwrap();
        assert_eq!(from_log, from_event);

        let reopen = BankInstruction::for_settlement(ObligationKind::Payable, "Aluguel", &r).unwrap();
        assert_eq!(reopen.action, BankAction::Reopen);
        assert_eq!(reopen.settlement_id, p.id);

        let orphan = Settlement { reversed_settlement_id: None, ..r };
        assert!(BankInstruction::for_settlement(ObligationKind::Payable, "Aluguel", &orphan).is_none());
    }
}
