//! The obligation ledger as seen by its callers (forms, tables, modals).
//!
//! Wraps the command dispatcher with what the domain crate cannot do on its
//! own: generating ids, reading the clock, retrying optimistic-concurrency
//! conflicts, notifying the bank collaborator after commit, and pushing fresh
//! snapshots to subscribers.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use tesouro_core::{AggregateId, Amount, TenantId, UserId};
use tesouro_events::{EventBus, EventEnvelope, InMemoryEventBus};
use tesouro_ledger::{
    AGGREGATE_TYPE, AmendObligation, BankAccountRef, BankInstruction, CategoryRef,
    CounterpartyRef, CreateObligation, Obligation, ObligationCommand, ObligationId,
    ObligationKind, ObligationSnapshot, RegisterPayment, ReverseSettlement, SettlementId,
};

use crate::clock::{Clock, SystemClock};
use crate::command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
use crate::config::LedgerConfig;
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::treasury::BankGateway;
use crate::workers::{ProjectionWorker, WorkerHandle};

/// Failures presented to callers.
///
/// The overpayment confirmation signal is not here: it is a regular
/// [`PaymentOutcome`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already reversed: {0}")]
    AlreadyReversed(String),
    /// The request reuses an id already committed with different data.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Another writer kept winning the race for this obligation.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),
    /// The settlement is committed but the bank collaborator refused or failed.
    #[error("bank collaborator failed after commit: {0}")]
    Collaborator(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DispatchError> for LedgerError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Validation(msg) | DispatchError::InvariantViolation(msg) => {
                LedgerError::Validation(msg)
            }
            DispatchError::Conflict(msg) => LedgerError::Conflict(msg),
            DispatchError::Unauthorized => LedgerError::Validation("unauthorized".to_string()),
            DispatchError::NotFound(msg) => LedgerError::NotFound(msg),
            DispatchError::AlreadyReversed(msg) => LedgerError::AlreadyReversed(msg),
            DispatchError::Concurrency(msg) => LedgerError::ConcurrencyConflict(msg),
            DispatchError::ConfirmationRequired { overage, .. } => LedgerError::Validation(format!(
                "payment exceeds the outstanding balance by {overage}"
            )),
            other @ (DispatchError::TenantIsolation(_)
            | DispatchError::Deserialize(_)
            | DispatchError::Store(_)
            | DispatchError::Publish(_)) => LedgerError::Internal(other.to_string()),
        }
    }
}

/// Data entered when creating an obligation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewObligation {
    pub kind: ObligationKind,
    pub description: String,
    pub document_number: Option<String>,
    pub counterparty: Option<CounterpartyRef>,
    pub category: Option<CategoryRef>,
    pub issue_date: Option<NaiveDate>,
    pub competence_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub original_amount: Amount,
}

/// Descriptive fields to change; `None` keeps the current value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObligationChanges {
    pub description: Option<String>,
    pub document_number: Option<String>,
    pub counterparty: Option<CounterpartyRef>,
    pub category: Option<CategoryRef>,
    pub due_date: Option<NaiveDate>,
    pub competence_date: Option<NaiveDate>,
}

/// A payment as typed in the payment modal.
///
/// The settlement id is fixed when the request is built, so re-sending the
/// same request (after a confirmation prompt, a lost response or a bank
/// failure) never books the payment twice: once committed, a re-send returns
/// the current snapshot and delivers the bank instruction again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub settlement_id: SettlementId,
    pub date: NaiveDate,
    pub amount_paid: Amount,
    pub discount: Amount,
    pub interest_fee: Amount,
    pub bank_account_ref: Option<BankAccountRef>,
    pub confirm_overpayment: bool,
}

impl PaymentRequest {
    pub fn new(date: NaiveDate, amount_paid: Amount, bank_account_ref: BankAccountRef) -> Self {
        Self {
            settlement_id: SettlementId::new(),
            date,
            amount_paid,
            discount: Amount::ZERO,
            interest_fee: Amount::ZERO,
            bank_account_ref: Some(bank_account_ref),
            confirm_overpayment: false,
        }
    }

    pub fn with_discount(mut self, discount: Amount) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_interest_fee(mut self, interest_fee: Amount) -> Self {
        self.interest_fee = interest_fee;
        self
    }

    /// The same request, with the overage accepted.
    pub fn confirmed(mut self) -> Self {
        self.confirm_overpayment = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Committed(ObligationSnapshot),
    /// Nothing was recorded. Re-send `request.confirmed()` to commit it.
    ConfirmationRequired {
        overage: Amount,
        outstanding_balance: Amount,
        request: PaymentRequest,
    },
}

impl PaymentOutcome {
    pub fn committed(self) -> Option<ObligationSnapshot> {
        match self {
            PaymentOutcome::Committed(snapshot) => Some(snapshot),
            PaymentOutcome::ConfirmationRequired { .. } => None,
        }
    }
}

type Envelope = EventEnvelope<JsonValue>;

pub type InMemoryLedger = ObligationLedger<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<Envelope>>>;

/// Service façade over the obligation aggregate.
pub struct ObligationLedger<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    gateway: Arc<dyn BankGateway>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl InMemoryLedger {
    /// In-process ledger with a system clock in the configured offset.
    pub fn in_memory(config: LedgerConfig, gateway: Arc<dyn BankGateway>) -> Self {
        let clock = Arc::new(SystemClock::new(config.utc_offset()));
        Self::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            gateway,
            clock,
            config,
        )
    }
}

impl<S, B> ObligationLedger<S, B>
where
    S: EventStore + 'static,
    B: EventBus<Envelope> + 'static,
{
    pub fn new(
        store: S,
        bus: B,
        gateway: Arc<dyn BankGateway>,
        clock: Arc<dyn Clock>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            dispatcher: Arc::new(CommandDispatcher::new(store, bus)),
            gateway,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &S {
        self.dispatcher.store()
    }

    pub fn bus(&self) -> &B {
        self.dispatcher.bus()
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn create_obligation(
        &self,
        tenant_id: TenantId,
        user: UserId,
        new: NewObligation,
    ) -> Result<ObligationSnapshot, LedgerError> {
        let obligation_id = ObligationId::generate();
        let now = self.clock.now();
        let command = ObligationCommand::CreateObligation(CreateObligation {
            tenant_id,
            obligation_id,
            kind: new.kind,
            description: new.description,
            document_number: new.document_number,
            counterparty: new.counterparty,
            category: new.category,
            issue_date: new.issue_date.or_else(|| Some(self.clock.today())),
            competence_date: new.competence_date,
            due_date: new.due_date,
            original_amount: new.original_amount,
            created_by: user,
            occurred_at: now,
        });

        let out = self.execute(tenant_id, obligation_id, command)?;
        info!(
            tenant_id = %tenant_id,
            obligation_id = %obligation_id,
            kind = ?out.aggregate.kind(),
            original_amount = %out.aggregate.original_amount(),
            "obligation created"
        );
        Ok(out.aggregate.snapshot(self.clock.today()))
    }

    pub fn amend_obligation(
        &self,
        tenant_id: TenantId,
        user: UserId,
        obligation_id: ObligationId,
        changes: ObligationChanges,
    ) -> Result<ObligationSnapshot, LedgerError> {
        let command = ObligationCommand::AmendObligation(AmendObligation {
            tenant_id,
            obligation_id,
            description: changes.description,
            document_number: changes.document_number,
            counterparty: changes.counterparty,
            category: changes.category,
            due_date: changes.due_date,
            competence_date: changes.competence_date,
            amended_by: user,
            occurred_at: self.clock.now(),
        });

        let out = self.execute(tenant_id, obligation_id, command)?;
        info!(tenant_id = %tenant_id, obligation_id = %obligation_id, "obligation amended");
        Ok(out.aggregate.snapshot(self.clock.today()))
    }

    /// Register a payment, or report the overage that needs confirmation.
    pub fn register_payment(
        &self,
        tenant_id: TenantId,
        user: UserId,
        obligation_id: ObligationId,
        request: PaymentRequest,
    ) -> Result<PaymentOutcome, LedgerError> {
        let command = ObligationCommand::RegisterPayment(RegisterPayment {
            tenant_id,
            obligation_id,
            settlement_id: request.settlement_id,
            date: request.date,
            amount_paid: request.amount_paid,
            discount: request.discount,
            interest_fee: request.interest_fee,
            bank_account_ref: request.bank_account_ref.clone(),
            confirm_overpayment: request.confirm_overpayment,
            created_by: user,
            occurred_at: self.clock.now(),
        });

        let out = match self.dispatch_with_retry(tenant_id, obligation_id, command) {
            Ok(out) => out,
            Err(DispatchError::ConfirmationRequired { overage, outstanding }) => {
                let overage = Amount::new(overage);
                info!(
                    tenant_id = %tenant_id,
                    obligation_id = %obligation_id,
                    settlement_id = %request.settlement_id,
                    overage = %overage,
                    outstanding = %outstanding,
                    "payment exceeds outstanding balance; confirmation required"
                );
                return Ok(PaymentOutcome::ConfirmationRequired {
                    overage,
                    outstanding_balance: Amount::new(outstanding),
                    request,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot = out.aggregate.snapshot(self.clock.today());
        if out.events.is_empty() {
            info!(
                tenant_id = %tenant_id,
                obligation_id = %obligation_id,
                settlement_id = %request.settlement_id,
                "payment already committed; delivering its bank instruction again"
            );
            let instruction = out
                .aggregate
                .settlement(&request.settlement_id)
                .and_then(|s| BankInstruction::for_settlement(out.aggregate.kind(), out.aggregate.description(), s));
            self.notify_bank(tenant_id, instruction)?;
            return Ok(PaymentOutcome::Committed(snapshot));
        }

        info!(
            tenant_id = %tenant_id,
            obligation_id = %obligation_id,
            settlement_id = %request.settlement_id,
            amount_paid = %request.amount_paid,
            discount = %request.discount,
            interest_fee = %request.interest_fee,
            outstanding_balance = %snapshot.outstanding_balance,
            status = ?snapshot.status,
            "payment committed"
        );

        self.notify_bank(tenant_id, instructions(&out))?;
        Ok(PaymentOutcome::Committed(snapshot))
    }

    /// Reverse (estorno) one payment of an obligation.
    pub fn reverse_settlement(
        &self,
        tenant_id: TenantId,
        user: UserId,
        obligation_id: ObligationId,
        settlement_id: SettlementId,
        reason: &str,
    ) -> Result<ObligationSnapshot, LedgerError> {
        let command = ObligationCommand::ReverseSettlement(ReverseSettlement {
            tenant_id,
            obligation_id,
            settlement_id,
            reversal_id: SettlementId::new(),
            reason: reason.to_string(),
            date: self.clock.today(),
            created_by: user,
            occurred_at: self.clock.now(),
        });

        let out = self.execute(tenant_id, obligation_id, command)?;
        let snapshot = out.aggregate.snapshot(self.clock.today());
        info!(
            tenant_id = %tenant_id,
            obligation_id = %obligation_id,
            settlement_id = %settlement_id,
            reason = reason,
            status = ?snapshot.status,
            "payment reversed"
        );

        self.notify_bank(tenant_id, instructions(&out))?;
        Ok(snapshot)
    }

    /// Send the bank collaborator every instruction the obligation's log
    /// implies, in log order. Returns how many were sent.
    ///
    /// For catching up after a collaborator failure; the gateway books each
    /// settlement and each reopen once however often it receives them.
    pub fn redeliver_bank_instructions(
        &self,
        tenant_id: TenantId,
        obligation_id: ObligationId,
    ) -> Result<usize, LedgerError> {
        let obligation: Obligation = self.dispatcher.load(tenant_id, obligation_id.aggregate_id(), make_obligation)?;
        if !obligation.is_created() {
            return Err(LedgerError::NotFound(format!("obligation {obligation_id}")));
        }

        let pending: Vec<BankInstruction> = obligation
            .settlements()
            .iter()
            .filter_map(|s| BankInstruction::for_settlement(obligation.kind(), obligation.description(), s))
            .collect();
        let sent = pending.len();
        self.notify_bank(tenant_id, pending)?;

        info!(tenant_id = %tenant_id, obligation_id = %obligation_id, sent, "bank instructions redelivered");
        Ok(sent)
    }

    /// Current state of an obligation, derived as of today.
    pub fn snapshot(&self, tenant_id: TenantId, obligation_id: ObligationId) -> Result<ObligationSnapshot, LedgerError> {
        load_snapshot(&self.dispatcher, tenant_id, obligation_id, self.clock.today())
    }

    /// Push the latest snapshot of one obligation to `callback` on every change.
    ///
    /// The current snapshot (if the obligation exists) is delivered right
    /// away; afterwards one snapshot per committed event, never older than
    /// one already delivered. Stop with [`WorkerHandle::shutdown`].
    pub fn subscribe<F>(
        &self,
        tenant_id: TenantId,
        obligation_id: ObligationId,
        callback: F,
    ) -> Result<WorkerHandle, LedgerError>
    where
        F: FnMut(ObligationSnapshot) + Send + 'static,
    {
        let delivery = Arc::new(Mutex::new(Delivery {
            callback,
            last_version: 0,
        }));

        let worker_delivery = Arc::clone(&delivery);
        let dispatcher = Arc::clone(&self.dispatcher);
        let clock = Arc::clone(&self.clock);
        let target = obligation_id.aggregate_id();

        let handle = ProjectionWorker::spawn(
            "obligation-subscription",
            self.dispatcher.bus(),
            Some(tenant_id),
            move |env: Envelope| -> Result<(), LedgerError> {
                if env.aggregate_id() != target {
                    return Ok(());
                }
                let snapshot = load_snapshot(&dispatcher, tenant_id, obligation_id, clock.today())?;
                deliver(&worker_delivery, snapshot);
                Ok(())
            },
        )
        .map_err(|e| LedgerError::Internal(format!("failed to start subscription worker: {e}")))?;

        match load_snapshot(&self.dispatcher, tenant_id, obligation_id, self.clock.today()) {
            Ok(snapshot) => deliver(&delivery, snapshot),
            Err(LedgerError::NotFound(_)) => {}
            Err(e) => {
                handle.shutdown();
                return Err(e);
            }
        }

        debug!(tenant_id = %tenant_id, obligation_id = %obligation_id, "subscription started");
        Ok(handle)
    }

    fn execute(
        &self,
        tenant_id: TenantId,
        obligation_id: ObligationId,
        command: ObligationCommand,
    ) -> Result<Dispatched<Obligation>, LedgerError> {
        self.dispatch_with_retry(tenant_id, obligation_id, command)
            .map_err(LedgerError::from)
    }

    /// Re-run load → decide → append while another writer keeps winning.
    ///
    /// Each attempt re-reads the log, so checks like the overpayment gate
    /// always see the latest committed balance.
    fn dispatch_with_retry(
        &self,
        tenant_id: TenantId,
        obligation_id: ObligationId,
        command: ObligationCommand,
    ) -> Result<Dispatched<Obligation>, DispatchError> {
        let mut attempt = 0;
        loop {
            let result = self.dispatcher.dispatch(
                tenant_id,
                obligation_id.aggregate_id(),
                AGGREGATE_TYPE,
                command.clone(),
                make_obligation,
            );
            match result {
                Err(DispatchError::Concurrency(msg)) if attempt < self.config.append_retries => {
                    attempt += 1;
                    warn!(
                        tenant_id = %tenant_id,
                        obligation_id = %obligation_id,
                        attempt,
                        conflict = %msg,
                        "concurrent append on obligation; retrying"
                    );
                }
                other => return other,
            }
        }
    }

    fn notify_bank(
        &self,
        tenant_id: TenantId,
        instructions: impl IntoIterator<Item = BankInstruction>,
    ) -> Result<(), LedgerError> {
        for instruction in instructions {
            if let Err(err) = self.gateway.notify(tenant_id, &instruction) {
                error!(
                    tenant_id = %tenant_id,
                    obligation_id = %instruction.obligation_id,
                    settlement_id = %instruction.settlement_id,
                    action = ?instruction.action,
                    error = %err,
                    "bank collaborator failed; settlement stays committed"
                );
                return Err(LedgerError::Collaborator(err.to_string()));
            }
        }
        Ok(())
    }
}

fn instructions(out: &Dispatched<Obligation>) -> Vec<BankInstruction> {
    let kind = out.aggregate.kind();
    let description = out.aggregate.description();
    out.events
        .iter()
        .filter_map(|event| BankInstruction::from_event(kind, description, event))
        .collect()
}

struct Delivery<F> {
    callback: F,
    last_version: u64,
}

fn deliver<F>(delivery: &Mutex<Delivery<F>>, snapshot: ObligationSnapshot)
where
    F: FnMut(ObligationSnapshot),
{
    let Ok(mut d) = delivery.lock() else {
        return;
    };
    if snapshot.version <= d.last_version {
        return;
    }
    d.last_version = snapshot.version;
    (d.callback)(snapshot);
}

fn make_obligation(_: TenantId, id: AggregateId) -> Obligation {
    Obligation::empty(ObligationId::new(id))
}

fn load_snapshot<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    tenant_id: TenantId,
    obligation_id: ObligationId,
    today: NaiveDate,
) -> Result<ObligationSnapshot, LedgerError>
where
    S: EventStore,
    B: EventBus<Envelope>,
{
    let obligation: Obligation = dispatcher.load(tenant_id, obligation_id.aggregate_id(), make_obligation)?;
    if !obligation.is_created() {
        return Err(LedgerError::NotFound(format!("obligation {obligation_id}")));
    }
    Ok(obligation.snapshot(today))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::clock::FixedClock;
    use crate::treasury::{BankGatewayError, TreasuryRegister};
    use rust_decimal_macros::dec;
    use tesouro_ledger::ObligationStatus;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn ledger_on(today: NaiveDate, gateway: Arc<dyn BankGateway>) -> InMemoryLedger {
        ObligationLedger::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
            gateway,
            Arc::new(FixedClock::on(today)),
            LedgerConfig::default(),
        )
    }

    fn payable(amount: Amount, due: NaiveDate) -> NewObligation {
        NewObligation {
            kind: ObligationKind::Payable,
            description: "Aluguel".to_string(),
            document_number: None,
            counterparty: Some(CounterpartyRef::new("imobiliaria")),
            category: None,
            issue_date: None,
            competence_date: None,
            due_date: due,
            original_amount: amount,
        }
    }

    /// Treasury that can be switched offline.
    #[derive(Default)]
    struct SwitchableGateway {
        register: TreasuryRegister,
        offline: AtomicBool,
    }

    impl BankGateway for SwitchableGateway {
        fn notify(&self, tenant_id: TenantId, instruction: &BankInstruction) -> Result<(), BankGatewayError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(BankGatewayError::Unavailable("offline".to_string()));
            }
            self.register.notify(tenant_id, instruction)
        }
    }

    #[test]
    fn creation_defaults_issue_date_to_today() {
        let ledger = ledger_on(date(10, 1), Arc::new(TreasuryRegister::new()));
        let snap = ledger
            .create_obligation(TenantId::new(), UserId::new(), payable(Amount::from_cents(100), date(10, 15)))
            .unwrap();

        assert_eq!(snap.issue_date, date(10, 1));
        assert_eq!(snap.competence_date, date(10, 1));
        assert_eq!(snap.status, ObligationStatus::Pending);
        assert_eq!(snap.status_label, "Pendente");
    }

    #[test]
    fn overpayment_round_trip_through_the_service() {
        let treasury = Arc::new(TreasuryRegister::new());
        let ledger = ledger_on(date(10, 1), treasury.clone());
        let (t, u) = (TenantId::new(), UserId::new());
        let id = ledger
            .create_obligation(t, u, payable(Amount::new(dec!(1000.00)), date(10, 15)))
            .unwrap()
            .id;

        let request = PaymentRequest::new(date(10, 1), Amount::new(dec!(1000.00)), BankAccountRef::new("itau"))
            .with_discount(Amount::new(dec!(50.25)))
            .with_interest_fee(Amount::new(dec!(100.50)));

        let outcome = ledger.register_payment(t, u, id, request).unwrap();
        let PaymentOutcome::ConfirmationRequired { overage, outstanding_balance, request } = outcome else {
            panic!("expected confirmation to be required");
        };
        assert_eq!(overage, Amount::new(dec!(50.25)));
        assert_eq!(outstanding_balance, Amount::new(dec!(1000.00)));
        assert!(ledger.snapshot(t, id).unwrap().settlements.is_empty());
        assert!(treasury.movements_for(t, id).unwrap().is_empty());

        let snap = ledger.register_payment(t, u, id, request.confirmed()).unwrap().committed().unwrap();
        assert_eq!(snap.status, ObligationStatus::Paid);
        assert_eq!(snap.overpaid_amount, Amount::new(dec!(50.25)));

        let movements = treasury.movements_for(t, id).unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].value, Amount::new(dec!(-1000.00)));
    }

    #[test]
    fn reversal_reopens_obligation_and_bank_movement() {
        let treasury = Arc::new(TreasuryRegister::new());
        let ledger = ledger_on(date(10, 20), treasury.clone());
        let (t, u) = (TenantId::new(), UserId::new());
        let id = ledger
            .create_obligation(t, u, NewObligation {
                kind: ObligationKind::Receivable,
                ..payable(Amount::new(dec!(150.00)), date(10, 15))
            })
            .unwrap()
            .id;

        let request = PaymentRequest::new(date(10, 14), Amount::new(dec!(150.00)), BankAccountRef::new("caixa"));
        let paid_id = request.settlement_id;
        let snap = ledger.register_payment(t, u, id, request).unwrap().committed().unwrap();
        assert_eq!(snap.status_label, "Recebido");

        let snap = ledger.reverse_settlement(t, u, id, paid_id, "cheque sem fundos").unwrap();
        assert_eq!(snap.status, ObligationStatus::Overdue);
        assert_eq!(snap.outstanding_balance, Amount::new(dec!(150.00)));
        assert!(snap.settlements[0].reversed);

        let movements = treasury.movements_for(t, id).unwrap();
        assert_eq!(movements.len(), 2);
        assert!(movements[0].reversed);
        assert_eq!(movements[1].reversal_of, Some(movements[0].id));

        let err = ledger.reverse_settlement(t, u, id, paid_id, "again").unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyReversed(_)));
    }

    #[test]
    fn collaborator_failure_keeps_the_commit() {
        let gateway = Arc::new(SwitchableGateway::default());
        gateway.offline.store(true, Ordering::SeqCst);
        let ledger = ledger_on(date(10, 1), gateway);
        let (t, u) = (TenantId::new(), UserId::new());
        let id = ledger.create_obligation(t, u, payable(Amount::from_cents(1000), date(10, 15))).unwrap().id;

        let err = ledger
            .register_payment(t, u, id, PaymentRequest::new(date(10, 1), Amount::from_cents(400), BankAccountRef::new("cc")))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Collaborator(_)));
        assert_eq!(ledger.snapshot(t, id).unwrap().total_paid, Amount::from_cents(400));
    }

    #[test]
    fn resending_after_a_bank_outage_books_the_movement_once() {
        let gateway = Arc::new(SwitchableGateway::default());
        let ledger = ledger_on(date(10, 1), gateway.clone());
        let (t, u) = (TenantId::new(), UserId::new());
        let id = ledger.create_obligation(t, u, payable(Amount::from_cents(1000), date(10, 15))).unwrap().id;
        let request = PaymentRequest::new(date(10, 1), Amount::from_cents(400), BankAccountRef::new("cc"));

        gateway.offline.store(true, Ordering::SeqCst);
        let err = ledger.register_payment(t, u, id, request.clone()).unwrap_err();
        assert!(matches!(err, LedgerError::Collaborator(_)));
        assert!(gateway.register.movements_for(t, id).unwrap().is_empty());

        gateway.offline.store(false, Ordering::SeqCst);
        let snap = ledger.register_payment(t, u, id, request.clone()).unwrap().committed().unwrap();
        assert_eq!(snap.total_paid, Amount::from_cents(400));
        assert_eq!(snap.settlements.len(), 1);
        assert_eq!(snap.version, 2);

        let movements = gateway.register.movements_for(t, id).unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].value, Amount::from_cents(-400));

        // Once more, for a response lost on the way back.
        ledger.register_payment(t, u, id, request).unwrap().committed().unwrap();
        assert_eq!(gateway.register.movements_for(t, id).unwrap().len(), 1);
        assert_eq!(ledger.snapshot(t, id).unwrap().total_paid, Amount::from_cents(400));
    }

    #[test]
    fn reused_settlement_id_with_other_data_is_a_conflict() {
        let ledger = ledger_on(date(10, 1), Arc::new(TreasuryRegister::new()));
        let (t, u) = (TenantId::new(), UserId::new());
        let id = ledger.create_obligation(t, u, payable(Amount::from_cents(1000), date(10, 15))).unwrap().id;
        let request = PaymentRequest::new(date(10, 1), Amount::from_cents(400), BankAccountRef::new("cc"));
        ledger.register_payment(t, u, id, request.clone()).unwrap();

        let altered = PaymentRequest {
            amount_paid: Amount::from_cents(500),
            ..request
        };
        let err = ledger.register_payment(t, u, id, altered).unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
        assert_eq!(ledger.snapshot(t, id).unwrap().total_paid, Amount::from_cents(400));
    }

    #[test]
    fn redelivery_catches_the_treasury_up_with_the_log() {
        let gateway = Arc::new(SwitchableGateway::default());
        let ledger = ledger_on(date(10, 20), gateway.clone());
        let (t, u) = (TenantId::new(), UserId::new());
        let id = ledger.create_obligation(t, u, payable(Amount::from_cents(1000), date(10, 15))).unwrap().id;

        let kept = PaymentRequest::new(date(10, 2), Amount::from_cents(300), BankAccountRef::new("cc"));
        ledger.register_payment(t, u, id, kept).unwrap();
        let undone = PaymentRequest::new(date(10, 3), Amount::from_cents(200), BankAccountRef::new("cc"));
        let undone_id = undone.settlement_id;

        gateway.offline.store(true, Ordering::SeqCst);
        assert!(matches!(ledger.register_payment(t, u, id, undone), Err(LedgerError::Collaborator(_))));
        let err = ledger.reverse_settlement(t, u, id, undone_id, "valor errado").unwrap_err();
        assert!(matches!(err, LedgerError::Collaborator(_)));
        assert_eq!(gateway.register.movements_for(t, id).unwrap().len(), 1);

        gateway.offline.store(false, Ordering::SeqCst);
        assert_eq!(ledger.redeliver_bank_instructions(t, id).unwrap(), 3);
        // Idempotent: a second pass changes nothing.
        assert_eq!(ledger.redeliver_bank_instructions(t, id).unwrap(), 3);

        let movements = gateway.register.movements_for(t, id).unwrap();
        assert_eq!(movements.len(), 3);
        assert!(!movements[0].reversed);
        assert!(movements[1].reversed);
        assert_eq!(movements[2].reversal_of, Some(movements[1].id));
        let balance: Amount = movements.iter().map(|m| m.value).sum();
        assert_eq!(balance, Amount::from_cents(-300));

        let err = ledger.redeliver_bank_instructions(t, ObligationId::generate()).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn errors_map_to_the_caller_taxonomy() {
        let ledger = ledger_on(date(10, 1), Arc::new(TreasuryRegister::new()));
        let (t, u) = (TenantId::new(), UserId::new());

        let err = ledger.snapshot(t, ObligationId::generate()).unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));

        let id = ledger.create_obligation(t, u, payable(Amount::from_cents(1000), date(10, 15))).unwrap().id;
        let mut request = PaymentRequest::new(date(10, 1), Amount::from_cents(100), BankAccountRef::new("cc"));
        request.bank_account_ref = None;
        let err = ledger.register_payment(t, u, id, request).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let err = ledger.reverse_settlement(t, u, id, SettlementId::new(), "x").unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));

        // Obligations are invisible to other tenants.
        assert!(matches!(ledger.snapshot(TenantId::new(), id), Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn receivables_credit_and_payables_debit() {
        let treasury = Arc::new(TreasuryRegister::new());
        let ledger = ledger_on(date(10, 1), treasury.clone());
        let (t, u) = (TenantId::new(), UserId::new());
        let receivable = ledger
            .create_obligation(t, u, NewObligation {
                kind: ObligationKind::Receivable,
                ..payable(Amount::from_cents(1000), date(10, 15))
            })
            .unwrap()
            .id;
        ledger
            .register_payment(t, u, receivable, PaymentRequest::new(date(10, 1), Amount::from_cents(1000), BankAccountRef::new("cc")))
            .unwrap();

        let payable_id = ledger.create_obligation(t, u, payable(Amount::from_cents(300), date(10, 15))).unwrap().id;
        ledger
            .register_payment(t, u, payable_id, PaymentRequest::new(date(10, 1), Amount::from_cents(300), BankAccountRef::new("cc")))
            .unwrap();

        let ms = treasury.movements(t, &BankAccountRef::new("cc")).unwrap();
        assert_eq!(ms.iter().map(|m| m.value).collect::<Vec<_>>(), vec![
            Amount::from_cents(1000),
            Amount::from_cents(-300)
        ]);
        assert_eq!(ms[1].obligation_id, Some(payable_id));
    }
}
