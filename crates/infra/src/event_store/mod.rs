//! Append-only event store boundary.
//!
//! Streams are keyed by `(tenant_id, aggregate_id)`: one stream per
//! obligation. The stream's last sequence number is the obligation's version,
//! and appends are checked against it, which is what serializes concurrent
//! writers on the same obligation.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
