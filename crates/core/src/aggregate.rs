//! Event-sourced aggregate contract.
//!
//! An aggregate is the unit of consistency: every write to it is decided
//! against its full history and appended as one batch. In this workspace the
//! only aggregate is the obligation, whose history is its settlement log.

/// Identity and revision of an aggregate.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied so far.
    ///
    /// Equals the stream revision, so it is what the next append must expect.
    fn version(&self) -> u64;
}

/// Revision an append expects its stream to be at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// No check. Only for imports and tooling; command handling never uses it.
    Any,
    /// The stream must be exactly at this revision (0 = does not exist yet).
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }
}

/// Decide/evolve split.
///
/// `handle` looks at the current state and returns the events a command
/// produces, or rejects it; it never mutates. `apply` folds one event into the
/// state and is the only way state changes, both when replaying history and
/// after a decision. Neither may read clocks, storage or anything else outside
/// `self` and its argument.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Must bump `version()` by exactly one.
    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}
