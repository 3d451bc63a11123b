//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. `Amount`
/// is the canonical example: two amounts of `1500.75` are the same amount no
/// matter where they came from.
///
/// ```ignore
/// let a = Amount::parse_localized("1.500,75")?;
/// let b = Amount::parse_localized("1500.75")?;
/// assert_eq!(a, b);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
