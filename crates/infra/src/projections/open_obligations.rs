//! Open payables/receivables dashboard.
//!
//! Tracks every obligation of a tenant from its ledger events and answers
//! "what is still open" questions as of a given date. Paid obligations drop
//! out of the open set; a reversal that reopens one brings it back. The same
//! open set feeds the due-soon and overdue alerts.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{Days, NaiveDate};
use serde_json::Value as JsonValue;
use thiserror::Error;

use tesouro_core::{AggregateId, Amount, TenantId};
use tesouro_events::EventEnvelope;
use tesouro_ledger::{
    AGGREGATE_TYPE, CounterpartyRef, Derivation, ObligationEvent, ObligationId, ObligationKind,
    ObligationStatus, Settlement, derive,
};

use crate::read_model::TenantStore;

/// Read model record: enough of an obligation to re-derive its status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedObligation {
    pub obligation_id: ObligationId,
    pub kind: ObligationKind,
    pub description: String,
    pub counterparty: Option<CounterpartyRef>,
    pub due_date: NaiveDate,
    pub original_amount: Amount,
    pub settlements: Vec<Settlement>,
}

impl TrackedObligation {
    pub fn derive(&self, as_of: NaiveDate) -> Derivation {
        derive(self.original_amount, self.due_date, &self.settlements, as_of)
    }
}

/// One open obligation as shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenObligation {
    pub obligation_id: ObligationId,
    pub kind: ObligationKind,
    pub description: String,
    pub counterparty: Option<CounterpartyRef>,
    pub due_date: NaiveDate,
    pub original_amount: Amount,
    pub outstanding_balance: Amount,
    pub status: ObligationStatus,
    /// Open and past its due date, whether or not partially paid.
    pub is_overdue: bool,
    pub days_overdue: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenObligationsSummary {
    pub kind: ObligationKind,
    pub as_of: NaiveDate,
    pub open_count: usize,
    pub total_outstanding: Amount,
    pub partially_paid_count: usize,
    pub overdue_count: usize,
    pub overdue_amount: Amount,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AlertKind {
    /// Open and due within the alert window (today included).
    DueSoon,
    /// Open and past its due date.
    Overdue,
}

/// A reminder about one open obligation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObligationAlert {
    pub obligation_id: ObligationId,
    pub kind: ObligationKind,
    pub alert: AlertKind,
    pub description: String,
    pub due_date: NaiveDate,
    pub original_amount: Amount,
    pub outstanding_balance: Amount,
}

impl ObligationAlert {
    /// At most one alert exists per obligation and alert kind.
    pub fn key(&self) -> (ObligationId, AlertKind) {
        (self.obligation_id, self.alert)
    }

    pub fn title(&self) -> &'static str {
        match (self.kind, self.alert) {
            (ObligationKind::Payable, AlertKind::DueSoon) => "Despesa Próxima ao Vencimento",
            (ObligationKind::Receivable, AlertKind::DueSoon) => "Receita Próxima ao Vencimento",
            (ObligationKind::Payable, AlertKind::Overdue) => "Despesa Vencida",
            (ObligationKind::Receivable, AlertKind::Overdue) => "Receita Vencida",
        }
    }

    pub fn message(&self) -> String {
        let verb = match self.alert {
            AlertKind::DueSoon => "vence em",
            AlertKind::Overdue => "venceu em",
        };
        format!(
            "{} no valor de {} {verb} {}.",
            self.description,
            self.original_amount.format_brl(),
            self.due_date.format("%d/%m/%Y")
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum OpenObligationsProjectionError {
    #[error("failed to deserialize obligation event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("event for unknown obligation {0}")]
    UnknownObligation(ObligationId),
}

/// Rebuildable, tenant-isolated projection over ledger events.
///
/// Idempotent under at-least-once delivery: each stream has a cursor and
/// envelopes at or below it are skipped.
#[derive(Debug)]
pub struct OpenObligationsProjection<S>
where
    S: TenantStore<ObligationId, TrackedObligation>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> OpenObligationsProjection<S>
where
    S: TenantStore<ObligationId, TrackedObligation>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    fn get_cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        match self.cursors.read() {
            Ok(cursors) => *cursors.get(&CursorKey { tenant_id, aggregate_id }).unwrap_or(&0),
            Err(_) => 0,
        }
    }

    fn update_cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId, sequence_number: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert(CursorKey { tenant_id, aggregate_id }, sequence_number);
        }
    }

    fn clear_cursors(&self, tenant_id: TenantId) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.retain(|k, _| k.tenant_id != tenant_id);
        }
    }

    pub fn tracked(&self, tenant_id: TenantId, obligation_id: &ObligationId) -> Option<TrackedObligation> {
        self.store.get(tenant_id, obligation_id)
    }

    /// Open obligations of one kind as of `as_of`, earliest due first.
    pub fn list_open(&self, tenant_id: TenantId, kind: ObligationKind, as_of: NaiveDate) -> Vec<OpenObligation> {
        let mut open: Vec<OpenObligation> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|t| t.kind == kind)
            .filter_map(|t| open_view(t, as_of))
            .collect();
        open.sort_by_key(|o| (o.due_date, *o.obligation_id.aggregate_id().as_uuid()));
        open
    }

    pub fn list_overdue(&self, tenant_id: TenantId, kind: ObligationKind, as_of: NaiveDate) -> Vec<OpenObligation> {
        self.list_open(tenant_id, kind, as_of)
            .into_iter()
            .filter(|o| o.is_overdue)
            .collect()
    }

    pub fn summary(&self, tenant_id: TenantId, kind: ObligationKind, as_of: NaiveDate) -> OpenObligationsSummary {
        let open = self.list_open(tenant_id, kind, as_of);

        OpenObligationsSummary {
            kind,
            as_of,
            open_count: open.len(),
            total_outstanding: open.iter().map(|o| o.outstanding_balance).sum(),
            partially_paid_count: open
                .iter()
                .filter(|o| o.status == ObligationStatus::PartiallyPaid)
                .count(),
            overdue_count: open.iter().filter(|o| o.is_overdue).count(),
            overdue_amount: open
                .iter()
                .filter(|o| o.is_overdue)
                .map(|o| o.outstanding_balance)
                .sum(),
        }
    }

    /// Due-soon and overdue alerts across both kinds, earliest due first.
    ///
    /// An obligation is due soon when it is open and due between `as_of` and
    /// `as_of + window_days`, both inclusive.
    pub fn alerts(&self, tenant_id: TenantId, as_of: NaiveDate, window_days: u32) -> Vec<ObligationAlert> {
        let horizon = as_of
            .checked_add_days(Days::new(u64::from(window_days)))
            .unwrap_or(NaiveDate::MAX);

        let mut alerts: Vec<ObligationAlert> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter_map(|t| open_view(t, as_of))
            .filter_map(|o| {
                let alert = if o.is_overdue {
                    AlertKind::Overdue
                } else if o.due_date <= horizon {
                    AlertKind::DueSoon
                } else {
                    return None;
                };
                Some(ObligationAlert {
                    obligation_id: o.obligation_id,
                    kind: o.kind,
                    alert,
                    description: o.description,
                    due_date: o.due_date,
                    original_amount: o.original_amount,
                    outstanding_balance: o.outstanding_balance,
                })
            })
            .collect();
        alerts.sort_by_key(|a| (a.due_date, *a.obligation_id.aggregate_id().as_uuid()));
        alerts
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), OpenObligationsProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.get_cursor(tenant_id, aggregate_id);

        if seq == 0 {
            return Err(OpenObligationsProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(OpenObligationsProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: ObligationEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| OpenObligationsProjectionError::Deserialize(e.to_string()))?;

        let event_tenant = match &ev {
            ObligationEvent::ObligationCreated(e) => e.tenant_id,
            ObligationEvent::ObligationAmended(e) => e.tenant_id,
            ObligationEvent::PaymentRegistered(e) => e.tenant_id,
            ObligationEvent::SettlementReversed(e) => e.tenant_id,
        };
        if event_tenant != tenant_id {
            return Err(OpenObligationsProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        let obligation_id = ev.obligation_id();
        if obligation_id.aggregate_id() != aggregate_id {
            return Err(OpenObligationsProjectionError::TenantIsolation(
                "event obligation_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            ObligationEvent::ObligationCreated(e) => {
                self.store.upsert(
                    tenant_id,
                    e.obligation_id,
                    TrackedObligation {
                        obligation_id: e.obligation_id,
                        kind: e.kind,
                        description: e.description,
                        counterparty: e.counterparty,
                        due_date: e.due_date,
                        original_amount: e.original_amount,
                        settlements: Vec::new(),
                    },
                );
            }
            other => {
                let mut tracked = self
                    .store
                    .get(tenant_id, &obligation_id)
                    .ok_or(OpenObligationsProjectionError::UnknownObligation(obligation_id))?;
                match other {
                    ObligationEvent::ObligationAmended(e) => {
                        if let Some(description) = e.description {
                            tracked.description = description;
                        }
                        if let Some(counterparty) = e.counterparty {
                            tracked.counterparty = Some(counterparty);
                        }
                        if let Some(due_date) = e.due_date {
                            tracked.due_date = due_date;
                        }
                    }
                    ObligationEvent::PaymentRegistered(e) => tracked.settlements.push(e.settlement),
                    ObligationEvent::SettlementReversed(e) => tracked.settlements.push(e.reversal),
                    ObligationEvent::ObligationCreated(_) => {}
                }
                self.store.upsert(tenant_id, obligation_id, tracked);
            }
        }

        self.update_cursor(tenant_id, aggregate_id, seq);
        Ok(())
    }

    /// Rebuild the read model from scratch.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), OpenObligationsProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut tenants = envs.iter().map(|e| e.tenant_id()).collect::<Vec<_>>();
        tenants.sort_by_key(|t| *t.as_uuid().as_bytes());
        tenants.dedup();
        for t in tenants {
            self.store.clear_tenant(t);
            self.clear_cursors(t);
        }

        envs.sort_by_key(|e| {
            (
                *e.tenant_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}

fn open_view(tracked: TrackedObligation, as_of: NaiveDate) -> Option<OpenObligation> {
    let d = tracked.derive(as_of);
    if !d.outstanding_balance.is_positive() {
        return None;
    }
    let days_overdue = (as_of - tracked.due_date).num_days().max(0);

    Some(OpenObligation {
        obligation_id: tracked.obligation_id,
        kind: tracked.kind,
        description: tracked.description,
        counterparty: tracked.counterparty,
        due_date: tracked.due_date,
        original_amount: tracked.original_amount,
        outstanding_balance: d.outstanding_balance,
        status: d.status,
        is_overdue: tracked.due_date < as_of,
        days_overdue,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use tesouro_core::UserId;
    use tesouro_ledger::{
        BankAccountRef, ObligationCreated, PaymentRegistered, SettlementId, SettlementReversed,
    };

    use crate::read_model::InMemoryTenantStore;

    type Proj = OpenObligationsProjection<Arc<InMemoryTenantStore<ObligationId, TrackedObligation>>>;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    fn projection() -> Proj {
        OpenObligationsProjection::new(Arc::new(InMemoryTenantStore::new()))
    }

    fn envelope(tenant_id: TenantId, obligation_id: ObligationId, seq: u64, event: ObligationEvent) -> EventEnvelope<JsonValue> {
        use tesouro_events::Event;
        EventEnvelope::new(
            uuid::Uuid::now_v7(),
            tenant_id,
            obligation_id.aggregate_id(),
            AGGREGATE_TYPE,
            event.event_type(),
            seq,
            serde_json::to_value(&event).unwrap(),
        )
    }

    fn created(tenant_id: TenantId, obligation_id: ObligationId, kind: ObligationKind, cents: i64, due: NaiveDate) -> ObligationEvent {
        ObligationEvent::ObligationCreated(ObligationCreated {
            tenant_id,
            obligation_id,
            kind,
            description: "Fornecedor".to_string(),
            document_number: None,
            counterparty: None,
            category: None,
            issue_date: date(9, 1),
            competence_date: date(9, 1),
            due_date: due,
            original_amount: Amount::from_cents(cents),
            created_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    fn paid(tenant_id: TenantId, obligation_id: ObligationId, cents: i64) -> (Settlement, ObligationEvent) {
        let s = Settlement::payment(
            SettlementId::new(),
            obligation_id,
            date(10, 1),
            Amount::from_cents(cents),
            Amount::ZERO,
            Amount::ZERO,
            BankAccountRef::new("cc"),
            UserId::new(),
        );
        let e = ObligationEvent::PaymentRegistered(PaymentRegistered {
            tenant_id,
            obligation_id,
            settlement: s.clone(),
            overpayment_confirmed: false,
            occurred_at: Utc::now(),
        });
        (s, e)
    }

    #[test]
    fn summary_per_kind_with_overdue_and_partial() {
        let proj = projection();
        let t = TenantId::new();
        let as_of = date(10, 20);

        let late = ObligationId::generate();
        proj.apply_envelope(&envelope(t, late, 1, created(t, late, ObligationKind::Payable, 10000, date(10, 10)))).unwrap();
        let (_, p) = paid(t, late, 4000);
        proj.apply_envelope(&envelope(t, late, 2, p)).unwrap();

        let future = ObligationId::generate();
        proj.apply_envelope(&envelope(t, future, 1, created(t, future, ObligationKind::Payable, 5000, date(11, 5)))).unwrap();

        let receivable = ObligationId::generate();
        proj.apply_envelope(&envelope(t, receivable, 1, created(t, receivable, ObligationKind::Receivable, 7000, date(10, 1)))).unwrap();

        let s = proj.summary(t, ObligationKind::Payable, as_of);
        assert_eq!(s.open_count, 2);
        assert_eq!(s.total_outstanding, Amount::from_cents(11000));
        assert_eq!(s.partially_paid_count, 1);
        assert_eq!(s.overdue_count, 1);
        assert_eq!(s.overdue_amount, Amount::from_cents(6000));

        let r = proj.summary(t, ObligationKind::Receivable, as_of);
        assert_eq!(r.open_count, 1);
        assert_eq!(proj.list_overdue(t, ObligationKind::Receivable, as_of)[0].days_overdue, 19);
    }

    #[test]
    fn paid_drops_out_and_reversal_brings_back() {
        let proj = projection();
        let t = TenantId::new();
        let id = ObligationId::generate();
        let as_of = date(10, 5);

        proj.apply_envelope(&envelope(t, id, 1, created(t, id, ObligationKind::Payable, 15000, date(10, 15)))).unwrap();
        let (payment, p) = paid(t, id, 15000);
        proj.apply_envelope(&envelope(t, id, 2, p)).unwrap();
        assert!(proj.list_open(t, ObligationKind::Payable, as_of).is_empty());

        let reversal = Settlement::reversal_of(&payment, SettlementId::new(), date(10, 2), "estorno", UserId::new());
        let r = ObligationEvent::SettlementReversed(SettlementReversed {
            tenant_id: t,
            obligation_id: id,
            reversal,
            occurred_at: Utc::now(),
        });
        proj.apply_envelope(&envelope(t, id, 3, r)).unwrap();

        let open = proj.list_open(t, ObligationKind::Payable, as_of);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].status, ObligationStatus::Pending);
        assert_eq!(open[0].outstanding_balance, Amount::from_cents(15000));
    }

    #[test]
    fn duplicates_are_skipped_and_gaps_rejected() {
        let proj = projection();
        let t = TenantId::new();
        let id = ObligationId::generate();
        let env = envelope(t, id, 1, created(t, id, ObligationKind::Payable, 100, date(10, 15)));

        proj.apply_envelope(&env).unwrap();
        proj.apply_envelope(&env).unwrap();
        assert_eq!(proj.summary(t, ObligationKind::Payable, date(10, 1)).open_count, 1);

        let (_, p) = paid(t, id, 10);
        let err = proj.apply_envelope(&envelope(t, id, 3, p)).unwrap_err();
        assert!(matches!(err, OpenObligationsProjectionError::NonMonotonicSequence { last: 1, found: 3 }));
    }

    #[test]
    fn rebuild_is_tenant_isolated() {
        let proj = projection();
        let (a, b) = (TenantId::new(), TenantId::new());
        let (ia, ib) = (ObligationId::generate(), ObligationId::generate());
        proj.apply_envelope(&envelope(a, ia, 1, created(a, ia, ObligationKind::Payable, 100, date(10, 15)))).unwrap();
        proj.apply_envelope(&envelope(b, ib, 1, created(b, ib, ObligationKind::Payable, 200, date(10, 15)))).unwrap();

        let replay = vec![envelope(a, ia, 1, created(a, ia, ObligationKind::Payable, 300, date(10, 15)))];
        proj.rebuild_from_scratch(replay).unwrap();

        assert_eq!(proj.summary(a, ObligationKind::Payable, date(10, 1)).total_outstanding, Amount::from_cents(300));
        assert_eq!(proj.summary(b, ObligationKind::Payable, date(10, 1)).total_outstanding, Amount::from_cents(200));
    }

    #[test]
    fn alerts_flag_due_soon_and_overdue_once_each() {
        let proj = projection();
        let t = TenantId::new();
        let as_of = date(10, 20);

        let mut ids = Vec::new();
        for (kind, cents, due) in [
            (ObligationKind::Payable, 10000, date(10, 10)),
            (ObligationKind::Receivable, 20000, date(10, 20)),
            (ObligationKind::Payable, 30000, date(10, 23)),
            (ObligationKind::Payable, 40000, date(10, 24)),
        ] {
            let id = ObligationId::generate();
            proj.apply_envelope(&envelope(t, id, 1, created(t, id, kind, cents, due))).unwrap();
            ids.push(id);
        }
        // Settled obligations raise nothing, even when past due.
        let settled = ObligationId::generate();
        proj.apply_envelope(&envelope(t, settled, 1, created(t, settled, ObligationKind::Payable, 500, date(10, 1)))).unwrap();
        let (_, p) = paid(t, settled, 500);
        proj.apply_envelope(&envelope(t, settled, 2, p)).unwrap();

        let alerts = proj.alerts(t, as_of, 3);
        assert_eq!(alerts.iter().map(|a| a.key()).collect::<Vec<_>>(), vec![
            (ids[0], AlertKind::Overdue),
            (ids[1], AlertKind::DueSoon),
            (ids[2], AlertKind::DueSoon),
        ]);
        assert_eq!(alerts[0].title(), "Despesa Vencida");
        assert_eq!(alerts[1].title(), "Receita Próxima ao Vencimento");
        assert_eq!(alerts[2].message(), "Fornecedor no valor de R$ 300,00 vence em 23/10/2025.");

        // A wider window picks up the last one; a partial payment keeps the overdue alert.
        assert_eq!(proj.alerts(t, as_of, 4).len(), 4);
        let (_, p) = paid(t, ids[0], 4000);
        proj.apply_envelope(&envelope(t, ids[0], 2, p)).unwrap();
        let overdue = &proj.alerts(t, as_of, 0)[0];
        assert_eq!(overdue.key(), (ids[0], AlertKind::Overdue));
        assert_eq!(overdue.outstanding_balance, Amount::from_cents(6000));

        assert!(proj.alerts(TenantId::new(), as_of, 3).is_empty());
    }
}
