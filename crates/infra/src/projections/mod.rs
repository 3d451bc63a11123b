//! Read models built from ledger events.
//!
//! Every projection here is rebuildable from the event store, partitioned by
//! tenant and idempotent under at-least-once delivery.

pub mod open_obligations;

pub use open_obligations::{
    AlertKind, ObligationAlert, OpenObligation, OpenObligationsProjection,
    OpenObligationsProjectionError, OpenObligationsSummary, TrackedObligation,
};
