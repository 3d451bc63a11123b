//! Event-sourcing mechanics shared by the ledger and the infrastructure layer.
//!
//! Nothing in here knows about obligations or payments: it defines what an
//! event and a command are, how events travel in tenant-scoped envelopes and
//! how they are fanned out to subscribers.

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use tenant::TenantScoped;
