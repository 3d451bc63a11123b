//! Read-side view of an obligation, delivered to subscribers and the UI.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use tesouro_core::{AggregateRoot, Amount, TenantId};

use crate::derivation::ObligationStatus;
use crate::obligation::{Obligation, ObligationKind};
use crate::refs::{CategoryRef, CounterpartyRef, ObligationId};
use crate::settlement::Settlement;

/// A settlement-log entry plus whether a later reversal undid it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementView {
    pub settlement: Settlement,
    pub reversed: bool,
}

/// Everything about an obligation at one version, derived as of `as_of`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationSnapshot {
    pub id: ObligationId,
    pub tenant_id: Option<TenantId>,
    pub version: u64,
    pub kind: ObligationKind,
    pub description: String,
    pub document_number: Option<String>,
    pub counterparty: Option<CounterpartyRef>,
    pub category: Option<CategoryRef>,
    pub issue_date: NaiveDate,
    pub competence_date: NaiveDate,
    pub due_date: NaiveDate,
    pub original_amount: Amount,
    pub total_paid: Amount,
    pub total_discounts: Amount,
    pub total_interest_fees: Amount,
    pub outstanding_balance: Amount,
    pub overpaid_amount: Amount,
    pub status: ObligationStatus,
    pub status_label: String,
    /// Full audit log, reversed payments and reversal entries included.
    pub settlements: Vec<SettlementView>,
    pub as_of: NaiveDate,
}

impl ObligationSnapshot {
    pub fn capture(obligation: &Obligation, today: NaiveDate) -> Self {
        let derivation = obligation.derive(today);
        let settlements = obligation
            .settlements()
            .iter()
            .map(|s| SettlementView {
                settlement: s.clone(),
                reversed: derivation.reversed.contains(&s.id),
            })
            .collect();

        Self {
            id: obligation.id_typed(),
            tenant_id: obligation.tenant_id(),
            version: obligation.version(),
            kind: obligation.kind(),
            description: obligation.description().to_string(),
            document_number: obligation.document_number().map(str::to_string),
            counterparty: obligation.counterparty().cloned(),
            category: obligation.category().cloned(),
            issue_date: obligation.issue_date(),
            competence_date: obligation.competence_date(),
            due_date: obligation.due_date(),
            original_amount: obligation.original_amount(),
            total_paid: derivation.total_paid,
            total_discounts: derivation.total_discounts,
            total_interest_fees: derivation.total_interest_fees,
            outstanding_balance: derivation.outstanding_balance,
            overpaid_amount: derivation.overpaid_amount,
            status: derivation.status,
            status_label: derivation.status.label(obligation.kind()).to_string(),
            settlements,
            as_of: today,
        }
    }

    /// Payments not undone by a reversal, used to group what is shown as paid.
    pub fn active_payments(&self) -> impl Iterator<Item = &Settlement> {
        self.settlements
            .iter()
            .filter(|v| v.settlement.is_payment() && !v.reversed)
            .map(|v| &v.settlement)
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obligation::{CreateObligation, ObligationCommand, RegisterPayment, ReverseSettlement};
    use crate::refs::{BankAccountRef, SettlementId};
    use chrono::Utc;
    use tesouro_core::UserId;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn apply_all(o: &mut Obligation, cmd: ObligationCommand) {
        tesouro_events::execute(o, &cmd).unwrap();
    }

    #[test]
    fn snapshot_marks_reversed_payments_and_lists_active_ones() {
        let tenant_id = TenantId::new();
        let obligation_id = ObligationId::generate();
        let user = UserId::new();
        let mut o = Obligation::empty(obligation_id);

        apply_all(
            &mut o,
            ObligationCommand::CreateObligation(CreateObligation {
                tenant_id,
                obligation_id,
                kind: ObligationKind::Receivable,
                description: "Consultoria".to_string(),
                document_number: None,
                counterparty: None,
                category: None,
                issue_date: Some(date(2025, 10, 1)),
                competence_date: None,
                due_date: date(2025, 10, 30),
                original_amount: Amount::from_cents(20000),
                created_by: user,
                occurred_at: Utc::now(),
            }),
        );

        let mut ids = Vec::new();
        for cents in [5000, 7000] {
            let settlement_id = SettlementId::new();
            ids.push(settlement_id);
            apply_all(
                &mut o,
                ObligationCommand::RegisterPayment(RegisterPayment {
                    tenant_id,
                    obligation_id,
                    settlement_id,
                    date: date(2025, 10, 5),
                    amount_paid: Amount::from_cents(cents),
                    discount: Amount::ZERO,
                    interest_fee: Amount::ZERO,
                    bank_account_ref: Some(BankAccountRef::new("caixa")),
                    confirm_overpayment: false,
                    created_by: user,
                    occurred_at: Utc::now(),
                }),
            );
        }
        apply_all(
            &mut o,
            ObligationCommand::ReverseSettlement(ReverseSettlement {
                tenant_id,
                obligation_id,
                settlement_id: ids[0],
                reversal_id: SettlementId::new(),
                reason: "valor incorreto".to_string(),
                date: date(2025, 10, 6),
                created_by: user,
                occurred_at: Utc::now(),
            }),
        );

        let snap = o.snapshot(date(2025, 10, 10));

        assert_eq!(snap.version, 4);
        assert_eq!(snap.settlements.len(), 3);
        assert!(snap.settlements[0].reversed);
        assert!(!snap.settlements[1].reversed);
        assert_eq!(snap.active_payments().map(|s| s.id).collect::<Vec<_>>(), vec![ids[1]]);
        assert_eq!(snap.total_paid, Amount::from_cents(7000));
        assert_eq!(snap.outstanding_balance, Amount::from_cents(13000));
        assert_eq!(snap.status, ObligationStatus::PartiallyPaid);
        assert_eq!(snap.status_label, "Recebido Parcialmente");
        assert!(snap.is_open());
    }
}
