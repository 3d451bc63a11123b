//! Infrastructure layer: event store, command dispatch, read models,
//! bank collaborator, configuration and the ledger service.

pub mod clock;
pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod ledger_service;
pub mod projections;
pub mod read_model;
pub mod treasury;
pub mod workers;


pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, LedgerConfig};
pub use ledger_service::{
    InMemoryLedger, LedgerError, NewObligation, ObligationChanges, ObligationLedger,
    PaymentOutcome, PaymentRequest,
};
pub use treasury::{
    BankGateway, BankGatewayError, BankMovement, CashFlowSummary, MovementId, MovementOrigin, TransferId,
    TreasuryRegister,
};

/// Load configuration (`.env` included) and install the tracing subscriber.
///
/// Call once at process start, before building a ledger.
pub fn init_from_env() -> Result<LedgerConfig, ConfigError> {
    let config = LedgerConfig::from_env()?;
    tesouro_observability::init(config.log_format);
    Ok(config)
}
