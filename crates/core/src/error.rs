//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// The targeted settlement already has a reversal pointing to it.
    #[error("already reversed: {0}")]
    AlreadyReversed(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The payment would settle more than is owed and needs explicit confirmation.
    ///
    /// Not a failure of the request itself: re-issuing it with confirmation commits it.
    /// `outstanding` is the balance the check was made against.
    #[error("payment exceeds the outstanding balance of {outstanding} by {overage}; confirmation required")]
    OverpaymentConfirmationRequired { overage: Decimal, outstanding: Decimal },

    /// Authorization failure at the domain boundary.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn already_reversed(msg: impl Into<String>) -> Self {
        Self::AlreadyReversed(msg.into())
    }

    pub fn confirmation_required(overage: Decimal, outstanding: Decimal) -> Self {
        Self::OverpaymentConfirmationRequired { overage, outstanding }
    }

    /// True for the two-phase confirmation signal (as opposed to a real failure).
    pub fn is_confirmation_required(&self) -> bool {
        matches!(self, Self::OverpaymentConfirmationRequired { .. })
    }
}
