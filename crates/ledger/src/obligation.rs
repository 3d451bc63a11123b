use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use tesouro_core::{Aggregate, AggregateId, AggregateRoot, Amount, DomainError, TenantId, UserId};
use tesouro_events::{Command, Event};

use crate::derivation::{Derivation, derive, fold_settlements};
use crate::refs::{BankAccountRef, CategoryRef, CounterpartyRef, ObligationId, SettlementId};
use crate::settlement::Settlement;
use crate::snapshot::ObligationSnapshot;

/// Aggregate type name used for event streams.
pub const AGGREGATE_TYPE: &str = "ledger.obligation";

/// Payable (despesa) or receivable (receita).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObligationKind {
    Payable,
    Receivable,
}

/// Aggregate root: Obligation.
///
/// State is the immutable original amount plus the settlement log. Derived
/// figures are never stored here; see [`Obligation::derive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obligation {
    id: ObligationId,
    tenant_id: Option<TenantId>,
    kind: ObligationKind,
    description: String,
    document_number: Option<String>,
    counterparty: Option<CounterpartyRef>,
    category: Option<CategoryRef>,
    issue_date: NaiveDate,
    competence_date: NaiveDate,
    due_date: NaiveDate,
    original_amount: Amount,
    settlements: Vec<Settlement>,
    created_by: Option<UserId>,
    version: u64,
    created: bool,
}

impl Obligation {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ObligationId) -> Self {
        Self {
            id,
            tenant_id: None,
            kind: ObligationKind::Payable,
            description: String::new(),
            document_number: None,
            counterparty: None,
            category: None,
            issue_date: NaiveDate::MIN,
            competence_date: NaiveDate::MIN,
            due_date: NaiveDate::MIN,
            original_amount: Amount::ZERO,
            settlements: Vec::new(),
            created_by: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ObligationId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn kind(&self) -> ObligationKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn document_number(&self) -> Option<&str> {
        self.document_number.as_deref()
    }

    pub fn counterparty(&self) -> Option<&CounterpartyRef> {
        self.counterparty.as_ref()
    }

    pub fn category(&self) -> Option<&CategoryRef> {
        self.category.as_ref()
    }

    pub fn issue_date(&self) -> NaiveDate {
        self.issue_date
    }

    pub fn competence_date(&self) -> NaiveDate {
        self.competence_date
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn original_amount(&self) -> Amount {
        self.original_amount
    }

    /// Full settlement log, in commit order, reversed entries included.
    pub fn settlements(&self) -> &[Settlement] {
        &self.settlements
    }

    pub fn settlement(&self, id: &SettlementId) -> Option<&Settlement> {
        self.settlements.iter().find(|s| &s.id == id)
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    /// Totals, balance and status as of `today`.
    pub fn derive(&self, today: NaiveDate) -> Derivation {
        derive(self.original_amount, self.due_date, &self.settlements, today)
    }

    pub fn snapshot(&self, today: NaiveDate) -> ObligationSnapshot {
        ObligationSnapshot::capture(self, today)
    }
}

impl AggregateRoot for Obligation {
    type Id = ObligationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateObligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateObligation {
    pub tenant_id: TenantId,
    pub obligation_id: ObligationId,
    pub kind: ObligationKind,
    pub description: String,
    pub document_number: Option<String>,
    pub counterparty: Option<CounterpartyRef>,
    pub category: Option<CategoryRef>,
    /// Defaults to the creation date.
    pub issue_date: Option<NaiveDate>,
    /// Defaults to `issue_date`.
    pub competence_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub original_amount: Amount,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AmendObligation. `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmendObligation {
    pub tenant_id: TenantId,
    pub obligation_id: ObligationId,
    pub description: Option<String>,
    pub document_number: Option<String>,
    pub counterparty: Option<CounterpartyRef>,
    pub category: Option<CategoryRef>,
    pub due_date: Option<NaiveDate>,
    pub competence_date: Option<NaiveDate>,
    pub amended_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl AmendObligation {
    pub fn new(
        tenant_id: TenantId,
        obligation_id: ObligationId,
        amended_by: UserId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id,
            obligation_id,
            description: None,
            document_number: None,
            counterparty: None,
            category: None,
            due_date: None,
            competence_date: None,
            amended_by,
            occurred_at,
        }
    }

    fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.document_number.is_none()
            && self.counterparty.is_none()
            && self.category.is_none()
            && self.due_date.is_none()
            && self.competence_date.is_none()
    }
}

/// Command: RegisterPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPayment {
    pub tenant_id: TenantId,
    pub obligation_id: ObligationId,
    pub settlement_id: SettlementId,
    pub date: NaiveDate,
    pub amount_paid: Amount,
    pub discount: Amount,
    pub interest_fee: Amount,
    pub bank_account_ref: Option<BankAccountRef>,
    /// Set on the second call, after the caller accepted the overage.
    pub confirm_overpayment: bool,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl RegisterPayment {
    /// Net change this payment makes to the paid total.
    pub fn net_effect(&self) -> Amount {
        self.amount_paid + self.interest_fee - self.discount
    }

    /// Same money movement as an already recorded settlement.
    fn matches(&self, settlement: &Settlement) -> bool {
        settlement.obligation_id == self.obligation_id
            && settlement.date == self.date
            && settlement.amount_paid == self.amount_paid
            && settlement.discount == self.discount
            && settlement.interest_fee == self.interest_fee
            && self.bank_account_ref.as_ref() == Some(&settlement.bank_account_ref)
    }
}

/// Command: ReverseSettlement (estorno).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseSettlement {
    pub tenant_id: TenantId,
    pub obligation_id: ObligationId,
    /// The payment being reversed.
    pub settlement_id: SettlementId,
    /// Id of the reversal entry to append.
    pub reversal_id: SettlementId,
    pub reason: String,
    pub date: NaiveDate,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObligationCommand {
    CreateObligation(CreateObligation),
    AmendObligation(AmendObligation),
    RegisterPayment(RegisterPayment),
    ReverseSettlement(ReverseSettlement),
}

impl ObligationCommand {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            ObligationCommand::CreateObligation(c) => c.tenant_id,
            ObligationCommand::AmendObligation(c) => c.tenant_id,
            ObligationCommand::RegisterPayment(c) => c.tenant_id,
            ObligationCommand::ReverseSettlement(c) => c.tenant_id,
        }
    }

    pub fn obligation_id(&self) -> ObligationId {
        match self {
            ObligationCommand::CreateObligation(c) => c.obligation_id,
            ObligationCommand::AmendObligation(c) => c.obligation_id,
            ObligationCommand::RegisterPayment(c) => c.obligation_id,
            ObligationCommand::ReverseSettlement(c) => c.obligation_id,
        }
    }
}

impl Command for ObligationCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        self.obligation_id().aggregate_id()
    }
}

/// Event: ObligationCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationCreated {
    pub tenant_id: TenantId,
    pub obligation_id: ObligationId,
    pub kind: ObligationKind,
    pub description: String,
    pub document_number: Option<String>,
    pub counterparty: Option<CounterpartyRef>,
    pub category: Option<CategoryRef>,
    pub issue_date: NaiveDate,
    pub competence_date: NaiveDate,
    pub due_date: NaiveDate,
    pub original_amount: Amount,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ObligationAmended. Only the changed fields are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationAmended {
    pub tenant_id: TenantId,
    pub obligation_id: ObligationId,
    pub description: Option<String>,
    pub document_number: Option<String>,
    pub counterparty: Option<CounterpartyRef>,
    pub category: Option<CategoryRef>,
    pub due_date: Option<NaiveDate>,
    pub competence_date: Option<NaiveDate>,
    pub amended_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRegistered {
    pub tenant_id: TenantId,
    pub obligation_id: ObligationId,
    pub settlement: Settlement,
    /// The payment pushed the paid total past the original amount with the caller's consent.
    pub overpayment_confirmed: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SettlementReversed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReversed {
    pub tenant_id: TenantId,
    pub obligation_id: ObligationId,
    /// The appended reversal entry; `reversed_settlement_id` names the payment.
    pub reversal: Settlement,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObligationEvent {
    ObligationCreated(ObligationCreated),
    ObligationAmended(ObligationAmended),
    PaymentRegistered(PaymentRegistered),
    SettlementReversed(SettlementReversed),
}

impl ObligationEvent {
    pub fn obligation_id(&self) -> ObligationId {
        match self {
            ObligationEvent::ObligationCreated(e) => e.obligation_id,
            ObligationEvent::ObligationAmended(e) => e.obligation_id,
            ObligationEvent::PaymentRegistered(e) => e.obligation_id,
            ObligationEvent::SettlementReversed(e) => e.obligation_id,
        }
    }
}

impl Event for ObligationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ObligationEvent::ObligationCreated(_) => "ledger.obligation.created",
            ObligationEvent::ObligationAmended(_) => "ledger.obligation.amended",
            ObligationEvent::PaymentRegistered(_) => "ledger.obligation.payment_registered",
            ObligationEvent::SettlementReversed(_) => "ledger.obligation.settlement_reversed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ObligationEvent::ObligationCreated(e) => e.occurred_at,
            ObligationEvent::ObligationAmended(e) => e.occurred_at,
            ObligationEvent::PaymentRegistered(e) => e.occurred_at,
            ObligationEvent::SettlementReversed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Obligation {
    type Command = ObligationCommand;
    type Event = ObligationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ObligationEvent::ObligationCreated(e) => {
                self.id = e.obligation_id;
                self.tenant_id = Some(e.tenant_id);
                self.kind = e.kind;
                self.description = e.description.clone();
                self.document_number = e.document_number.clone();
                self.counterparty = e.counterparty.clone();
                self.category = e.category.clone();
                self.issue_date = e.issue_date;
                self.competence_date = e.competence_date;
                self.due_date = e.due_date;
                self.original_amount = e.original_amount;
                self.settlements.clear();
                self.created_by = Some(e.created_by);
                self.created = true;
            }
            ObligationEvent::ObligationAmended(e) => {
                if let Some(description) = &e.description {
                    self.description = description.clone();
                }
                if let Some(document_number) = &e.document_number {
                    self.document_number = Some(document_number.clone());
                }
                if let Some(counterparty) = &e.counterparty {
                    self.counterparty = Some(counterparty.clone());
                }
                if let Some(category) = &e.category {
                    self.category = Some(category.clone());
                }
                if let Some(due_date) = e.due_date {
                    self.due_date = due_date;
                }
                if let Some(competence_date) = e.competence_date {
                    self.competence_date = competence_date;
                }
            }
            ObligationEvent::PaymentRegistered(e) => {
                self.settlements.push(e.settlement.clone());
            }
            ObligationEvent::SettlementReversed(e) => {
                self.settlements.push(e.reversal.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ObligationCommand::CreateObligation(cmd) => self.handle_create(cmd),
            ObligationCommand::AmendObligation(cmd) => self.handle_amend(cmd),
            ObligationCommand::RegisterPayment(cmd) => self.handle_register_payment(cmd),
            ObligationCommand::ReverseSettlement(cmd) => self.handle_reverse(cmd),
        }
    }
}

impl Obligation {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("obligation {}", self.id)));
        }
        Ok(())
    }

    fn ensure_tenant(&self, tenant_id: TenantId) -> Result<(), DomainError> {
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_obligation_id(&self, obligation_id: ObligationId) -> Result<(), DomainError> {
        if self.id != obligation_id {
            return Err(DomainError::invariant("obligation_id mismatch"));
        }
        Ok(())
    }

    fn ensure_settlement_id_free(&self, id: SettlementId) -> Result<(), DomainError> {
        if self.settlement(&id).is_some() {
            return Err(DomainError::conflict(format!("settlement {id} already recorded")));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateObligation) -> Result<Vec<ObligationEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("obligation already exists"));
        }
        self.ensure_obligation_id(cmd.obligation_id)?;

        let description = cmd.description.trim();
        if description.is_empty() {
            return Err(DomainError::validation("description is required"));
        }
        if !cmd.original_amount.is_positive() {
            return Err(DomainError::validation("original amount must be positive"));
        }

        let issue_date = cmd.issue_date.unwrap_or_else(|| cmd.occurred_at.date_naive());
        let competence_date = cmd.competence_date.unwrap_or(issue_date);

        Ok(vec![ObligationEvent::ObligationCreated(ObligationCreated {
            tenant_id: cmd.tenant_id,
            obligation_id: cmd.obligation_id,
            kind: cmd.kind,
            description: description.to_string(),
            document_number: non_blank(cmd.document_number.as_deref()),
            counterparty: cmd.counterparty.clone().filter(|c| !c.is_blank()),
            category: cmd.category.clone().filter(|c| !c.is_blank()),
            issue_date,
            competence_date,
            due_date: cmd.due_date,
            original_amount: cmd.original_amount,
            created_by: cmd.created_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_amend(&self, cmd: &AmendObligation) -> Result<Vec<ObligationEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_obligation_id(cmd.obligation_id)?;

        let description = match &cmd.description {
            Some(d) if d.trim().is_empty() => {
                return Err(DomainError::validation("description is required"));
            }
            Some(d) => Some(d.trim().to_string()),
            None => None,
        };
        // Blank references are dropped, the same way creation drops them.
        let cleaned = AmendObligation {
            description,
            document_number: non_blank(cmd.document_number.as_deref()),
            counterparty: cmd.counterparty.clone().filter(|c| !c.is_blank()),
            category: cmd.category.clone().filter(|c| !c.is_blank()),
            ..cmd.clone()
        };
        if cleaned.is_empty() {
            return Err(DomainError::validation("amendment changes nothing"));
        }

        Ok(vec![ObligationEvent::ObligationAmended(ObligationAmended {
            tenant_id: cleaned.tenant_id,
            obligation_id: cleaned.obligation_id,
            description: cleaned.description,
            document_number: cleaned.document_number,
            counterparty: cleaned.counterparty,
            category: cleaned.category,
            due_date: cleaned.due_date,
            competence_date: cleaned.competence_date,
            amended_by: cleaned.amended_by,
            occurred_at: cleaned.occurred_at,
        })])
    }

    fn handle_register_payment(
        &self,
        cmd: &RegisterPayment,
    ) -> Result<Vec<ObligationEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_obligation_id(cmd.obligation_id)?;

        if cmd.amount_paid.is_negative() {
            return Err(DomainError::validation("amount paid cannot be negative"));
        }
        if cmd.discount.is_negative() {
            return Err(DomainError::validation("discount cannot be negative"));
        }
        if cmd.interest_fee.is_negative() {
            return Err(DomainError::validation("interest/fee cannot be negative"));
        }
        let bank_account_ref = match &cmd.bank_account_ref {
            Some(r) if !r.is_blank() => r.clone(),
            _ => return Err(DomainError::validation("bank account is required")),
        };

        // A re-sent payment that is already in the log decides nothing.
        if let Some(existing) = self.settlement(&cmd.settlement_id) {
            if existing.is_payment() && cmd.matches(existing) {
                return Ok(vec![]);
            }
            return Err(DomainError::conflict(format!(
                "settlement {} already recorded with different data",
                cmd.settlement_id
            )));
        }

        let net_effect = cmd.net_effect();
        if !net_effect.is_positive() {
            return Err(DomainError::validation(
                "payment must reduce the outstanding balance (amount + interest - discount > 0)",
            ));
        }

        let paid_before = fold_settlements(&self.settlements).total_paid;
        let paid_after = paid_before + net_effect;
        let overpays = paid_after > self.original_amount;
        if overpays && !cmd.confirm_overpayment {
            let outstanding = (self.original_amount - paid_before).clamp_non_negative();
            return Err(DomainError::confirmation_required(
                (paid_after - self.original_amount).value(),
                outstanding.value(),
            ));
        }

        let settlement = Settlement::payment(
            cmd.settlement_id,
            cmd.obligation_id,
            cmd.date,
            cmd.amount_paid,
            cmd.discount,
            cmd.interest_fee,
            bank_account_ref,
            cmd.created_by,
        );

        Ok(vec![ObligationEvent::PaymentRegistered(PaymentRegistered {
            tenant_id: cmd.tenant_id,
            obligation_id: cmd.obligation_id,
            settlement,
            overpayment_confirmed: overpays,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse(&self, cmd: &ReverseSettlement) -> Result<Vec<ObligationEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_tenant(cmd.tenant_id)?;
        self.ensure_obligation_id(cmd.obligation_id)?;

        let payment = self
            .settlement(&cmd.settlement_id)
            .filter(|s| s.is_payment())
            .ok_or_else(|| {
                DomainError::not_found(format!(
                    "payment {} on obligation {}",
                    cmd.settlement_id, self.id
                ))
            })?;

        let reversed: HashSet<SettlementId> = self
            .settlements
            .iter()
            .filter_map(|s| s.reversed_settlement_id)
            .collect();
        if reversed.contains(&payment.id) {
            return Err(DomainError::already_reversed(format!("payment {}", payment.id)));
        }

        let reason = cmd.reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("reversal reason is required"));
        }
        self.ensure_settlement_id_free(cmd.reversal_id)?;

        let reversal =
            Settlement::reversal_of(payment, cmd.reversal_id, cmd.date, reason, cmd.created_by);

        Ok(vec![ObligationEvent::SettlementReversed(SettlementReversed {
            tenant_id: cmd.tenant_id,
            obligation_id: cmd.obligation_id,
            reversal,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}
