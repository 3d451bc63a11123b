use tesouro_core::AggregateId;

/// A command targets a specific aggregate.
///
/// Commands are intent ("register this payment"); events are the facts an
/// aggregate accepts in response ("payment registered"). A rejected command
/// leaves no trace in the stream.
///
/// Each command operates on exactly one aggregate, which is the unit of
/// serialization: appends are linearized per aggregate stream, different
/// aggregates never lock each other.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
