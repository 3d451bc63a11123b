/// Execute an aggregate command in place (no IO, no persistence).
///
/// The canonical event-sourced step: `handle` decides the events without
/// touching state, then each event is `apply`-ed. If `handle` rejects the
/// command the aggregate is left exactly as it was.
///
/// Used by domain tests and by read models that replay streams; production
/// writes go through the infrastructure dispatcher, which adds persistence,
/// optimistic concurrency and publication around the same two calls.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: tesouro_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
