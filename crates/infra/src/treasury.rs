//! Bank-account collaborator.
//!
//! The ledger hands a [`BankInstruction`] to a [`BankGateway`] after each
//! committed settlement. [`TreasuryRegister`] is the in-process gateway: it
//! keeps the movements of each bank account, takes manual entries and
//! transfers typed at the treasury screen, and answers the cash-flow figures
//! shown next to them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use tesouro_core::{Amount, TenantId};
use tesouro_ledger::{BankAccountRef, BankAction, BankInstruction, ObligationId, SettlementId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BankGatewayError {
    /// The instruction contradicts the register's state.
    #[error("bank instruction rejected: {0}")]
    Rejected(String),
    /// A manual entry or transfer is malformed.
    #[error("invalid movement: {0}")]
    Invalid(String),
    /// The collaborator could not be reached or failed internally.
    #[error("bank collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Receives settlement intents. Implementations own bank balances; the
/// ledger never writes them.
///
/// Delivery is at least once: the same instruction may arrive again after a
/// failure and must not move money twice.
pub trait BankGateway: Send + Sync {
    fn notify(&self, tenant_id: TenantId, instruction: &BankInstruction) -> Result<(), BankGatewayError>;
}

impl<G> BankGateway for Arc<G>
where
    G: BankGateway + ?Sized,
{
    fn notify(&self, tenant_id: TenantId, instruction: &BankInstruction) -> Result<(), BankGatewayError> {
        (**self).notify(tenant_id, instruction)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(Uuid);

tesouro_core::impl_uuid_newtype!(MovementId, "MovementId");

/// Links the two legs of an account-to-account transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(Uuid);

tesouro_core::impl_uuid_newtype!(TransferId, "TransferId");

/// Where a movement came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementOrigin {
    /// Booked from a ledger settlement (or its reversal).
    Settlement,
    /// Manual entry not tied to an obligation.
    OtherInflow,
    /// Manual exit not tied to an obligation.
    OtherOutflow,
    /// One leg of a transfer between two of the tenant's accounts.
    Transfer,
}

/// One line of a bank account's statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankMovement {
    pub id: MovementId,
    pub bank_account_ref: BankAccountRef,
    pub date: NaiveDate,
    pub description: String,
    /// Signed: credits positive, debits negative.
    pub value: Amount,
    pub origin: MovementOrigin,
    pub obligation_id: Option<ObligationId>,
    pub settlement_id: Option<SettlementId>,
    pub transfer_id: Option<TransferId>,
    pub reconciled: bool,
    /// Undone by a later counter-movement.
    pub reversed: bool,
    /// Set on counter-movements: the movement this one cancels.
    pub reversal_of: Option<MovementId>,
    pub reversal_reason: Option<String>,
}

impl BankMovement {
    fn unlinked(account: BankAccountRef, date: NaiveDate, description: String, value: Amount, origin: MovementOrigin) -> Self {
        Self {
            id: MovementId::new(),
            bank_account_ref: account,
            date,
            description,
            value,
            origin,
            obligation_id: None,
            settlement_id: None,
            transfer_id: None,
            reconciled: false,
            reversed: false,
            reversal_of: None,
            reversal_reason: None,
        }
    }

    pub fn is_counter_movement(&self) -> bool {
        self.reversal_of.is_some()
    }

    pub fn is_transfer(&self) -> bool {
        self.origin == MovementOrigin::Transfer
    }
}

/// Cash-flow figures for a period.
///
/// For a single account, transfers count as that account's inflows and
/// outflows. Across all accounts they move nothing and are left out.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CashFlowSummary {
    /// Balance of everything dated before the period.
    pub opening_balance: Amount,
    pub inflows: Amount,
    /// Positive total of money that left.
    pub outflows: Amount,
    pub net_result: Amount,
    pub closing_balance: Amount,
    /// Sum of movements up to the period end not yet reconciled.
    pub unreconciled_balance: Amount,
}

type Movements = HashMap<TenantId, Vec<BankMovement>>;

/// In-memory, tenant-isolated register of bank movements.
#[derive(Debug, Default)]
pub struct TreasuryRegister {
    movements: RwLock<Movements>,
}

impl TreasuryRegister {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Movements>, BankGatewayError> {
        self.movements
            .read()
            .map_err(|_| BankGatewayError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Movements>, BankGatewayError> {
        self.movements
            .write()
            .map_err(|_| BankGatewayError::Unavailable("lock poisoned".to_string()))
    }

    /// Movements of one account, ordered by date (stable for equal dates).
    pub fn movements(&self, tenant_id: TenantId, account: &BankAccountRef) -> Result<Vec<BankMovement>, BankGatewayError> {
        let map = self.read()?;
        let mut out: Vec<BankMovement> = map
            .get(&tenant_id)
            .map(|all| {
                all.iter()
                    .filter(|m| &m.bank_account_ref == account)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by_key(|m| m.date);
        Ok(out)
    }

    /// Movements linked to one obligation, in registration order.
    pub fn movements_for(&self, tenant_id: TenantId, obligation_id: ObligationId) -> Result<Vec<BankMovement>, BankGatewayError> {
        let map = self.read()?;
        Ok(map
            .get(&tenant_id)
            .map(|all| {
                all.iter()
                    .filter(|m| m.obligation_id == Some(obligation_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Book an entry (`value > 0`) or exit (`value < 0`) not tied to any
    /// obligation. A blank description reads "Lançamento manual".
    pub fn record_manual(
        &self,
        tenant_id: TenantId,
        account: &BankAccountRef,
        date: NaiveDate,
        value: Amount,
        description: &str,
    ) -> Result<MovementId, BankGatewayError> {
        if account.is_blank() {
            return Err(BankGatewayError::Invalid("bank account is required".to_string()));
        }
        if value.is_zero() {
            return Err(BankGatewayError::Invalid("manual movement needs a non-zero value".to_string()));
        }
        let origin = if value.is_positive() {
            MovementOrigin::OtherInflow
        } else {
            MovementOrigin::OtherOutflow
        };
        let description = match description.trim() {
            "" => "Lançamento manual".to_string(),
            d => d.to_string(),
        };

        let movement = BankMovement::unlinked(account.clone(), date, description, value, origin);
        let id = movement.id;
        self.write()?.entry(tenant_id).or_default().push(movement);

        info!(
            tenant_id = %tenant_id,
            bank_account = account.as_str(),
            movement_id = %id,
            value = %value,
            "manual movement recorded"
        );
        Ok(id)
    }

    /// Move `amount` from one of the tenant's accounts to another.
    ///
    /// Books a debit on `from` and a credit on `to`, both carrying the
    /// returned transfer id.
    pub fn transfer(
        &self,
        tenant_id: TenantId,
        from: &BankAccountRef,
        to: &BankAccountRef,
        amount: Amount,
        date: NaiveDate,
        note: Option<&str>,
    ) -> Result<TransferId, BankGatewayError> {
        if from.is_blank() || to.is_blank() {
            return Err(BankGatewayError::Invalid("origin and destination accounts are required".to_string()));
        }
        if from == to {
            return Err(BankGatewayError::Invalid(
                "origin and destination accounts must differ".to_string(),
            ));
        }
        if !amount.is_positive() {
            return Err(BankGatewayError::Invalid("transfer amount must be positive".to_string()));
        }

        let transfer_id = TransferId::new();
        let mut description = format!("Transferência de {} para {}", from.as_str(), to.as_str());
        if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
            description = format!("{description} ({note})");
        }
        let leg = |account: &BankAccountRef, value: Amount| BankMovement {
            transfer_id: Some(transfer_id),
            ..BankMovement::unlinked(account.clone(), date, description.clone(), value, MovementOrigin::Transfer)
        };

        let mut map = self.write()?;
        let all = map.entry(tenant_id).or_default();
        all.push(leg(from, -amount));
        all.push(leg(to, amount));

        info!(
            tenant_id = %tenant_id,
            transfer_id = %transfer_id,
            from = from.as_str(),
            to = to.as_str(),
            amount = %amount,
            "transfer recorded"
        );
        Ok(transfer_id)
    }

    /// Flag movements as reconciled (or not). Returns how many changed.
    ///
    /// Reversed movements and counter-movements stay reconciled.
    pub fn set_reconciled(
        &self,
        tenant_id: TenantId,
        ids: &[MovementId],
        reconciled: bool,
    ) -> Result<usize, BankGatewayError> {
        let mut map = self.write()?;
        let Some(all) = map.get_mut(&tenant_id) else {
            return Ok(0);
        };

        let mut changed = 0;
        for m in all.iter_mut().filter(|m| ids.contains(&m.id)) {
            if m.reversed || m.is_counter_movement() || m.reconciled == reconciled {
                continue;
            }
            m.reconciled = reconciled;
            changed += 1;
        }
        Ok(changed)
    }

    /// Cash flow of `[from, to]`, for one account or all of them.
    pub fn cash_flow(
        &self,
        tenant_id: TenantId,
        account: Option<&BankAccountRef>,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<CashFlowSummary, BankGatewayError> {
        let map = self.read()?;
        let Some(all) = map.get(&tenant_id) else {
            return Ok(CashFlowSummary::default());
        };

        let mut summary = CashFlowSummary::default();
        let selected = all.iter().filter(|m| match account {
            Some(a) => &m.bank_account_ref == a,
            // Both legs cancel out across accounts.
            None => !m.is_transfer(),
        });
        for m in selected {
            if m.date < from {
                summary.opening_balance += m.value;
            } else if m.date <= to {
                if m.value.is_negative() {
                    summary.outflows += -m.value;
                } else {
                    summary.inflows += m.value;
                }
            }
            if m.date <= to && !m.reconciled {
                summary.unreconciled_balance += m.value;
            }
        }
        summary.net_result = summary.inflows - summary.outflows;
        summary.closing_balance = summary.opening_balance + summary.net_result;
        Ok(summary)
    }

    fn record(all: &mut Vec<BankMovement>, instruction: &BankInstruction) {
        if all
            .iter()
            .any(|m| m.settlement_id == Some(instruction.settlement_id) && !m.is_counter_movement())
        {
            debug!(settlement_id = %instruction.settlement_id, "settlement already booked");
            return;
        }
        all.push(BankMovement {
            obligation_id: Some(instruction.obligation_id),
            settlement_id: Some(instruction.settlement_id),
            ..BankMovement::unlinked(
                instruction.bank_account_ref.clone(),
                instruction.date,
                instruction.description.clone(),
                instruction.signed_amount(),
                MovementOrigin::Settlement,
            )
        });
    }

    fn reopen(all: &mut Vec<BankMovement>, instruction: &BankInstruction) -> Result<(), BankGatewayError> {
        let original = all
            .iter_mut()
            .find(|m| m.settlement_id == Some(instruction.settlement_id) && !m.is_counter_movement())
            .ok_or_else(|| {
                BankGatewayError::Rejected(format!(
                    "no movement recorded for settlement {}",
                    instruction.settlement_id
                ))
            })?;
        // A payment is reversed at most once, so a second reopen is the same one delivered again.
        if original.reversed {
            debug!(movement_id = %original.id, "movement already reversed");
            return Ok(());
        }

        original.reversed = true;
        original.reconciled = true;
        let counter = BankMovement {
            obligation_id: original.obligation_id,
            reconciled: true,
            reversal_of: Some(original.id),
            reversal_reason: instruction.reversal_reason.clone(),
            ..BankMovement::unlinked(
                original.bank_account_ref.clone(),
                instruction.date,
                instruction.description.clone(),
                -original.value,
                MovementOrigin::Settlement,
            )
        };
        all.push(counter);
        Ok(())
    }
}

impl BankGateway for TreasuryRegister {
    fn notify(&self, tenant_id: TenantId, instruction: &BankInstruction) -> Result<(), BankGatewayError> {
        let mut map = self.write()?;
        let all = map.entry(tenant_id).or_default();

        match instruction.action {
            BankAction::Debit | BankAction::Credit => {
                Self::record(all, instruction);
                Ok(())
            }
            BankAction::Reopen => Self::reopen(all, instruction),
        }
    }
}
