//! Identifiers and references to collaborator-owned records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tesouro_core::AggregateId;

/// Obligation identifier (aggregate id of a payable or receivable).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObligationId(pub AggregateId);

impl ObligationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.0
    }
}

impl core::fmt::Display for ObligationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Identifier of one entry in an obligation's settlement log.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettlementId(Uuid);

tesouro_core::impl_uuid_newtype!(SettlementId, "SettlementId");

macro_rules! string_ref {
    ($(#[$meta:meta])* $t:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(String);

        impl $t {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Blank references are treated as "not selected".
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $t {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

string_ref!(
    /// Reference into the bank-account registry (the account money leaves or enters).
    BankAccountRef
);
string_ref!(
    /// Supplier (payables) or client (receivables) reference.
    CounterpartyRef
);
string_ref!(
    /// Chart-of-accounts leaf reference.
    CategoryRef
);
