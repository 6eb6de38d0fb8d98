//! Error type shared by every fallible graph operation.

use crate::node::NodeId;

/// Errors that can occur during graph and property operations.
///
/// Every public operation on [`Server`](crate::Server) returns
/// `Result<_, Error>`; internal code propagates with `?`. Nothing is
/// retried — errors surface to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A value was outside a property's `[min, max]` range, or a slot or
    /// connection index was out of bounds.
    Range,
    /// An operation's type did not match the property's type.
    TypeMismatch,
    /// An attempt was made to set a read-only property.
    ReadOnly,
    /// Adding this edge would create a cycle.
    CausesCycle,
    /// The specified node was not found in the server's table.
    NodeNotFound(NodeId),
    /// The target property does not support a-rate modulation.
    CannotConnectToProperty,
    /// An internal invariant was violated (e.g. a forwarded property whose
    /// target node has been destroyed). Not recoverable; the operation is
    /// aborted.
    Internal,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Range => write!(f, "value or index out of range"),
            Self::TypeMismatch => write!(f, "operation type does not match property type"),
            Self::ReadOnly => write!(f, "property is read-only"),
            Self::CausesCycle => write!(f, "adding this edge would create a cycle"),
            Self::NodeNotFound(id) => write!(f, "node {id} not found"),
            Self::CannotConnectToProperty => {
                write!(f, "property does not support a-rate connections")
            }
            Self::Internal => write!(f, "internal invariant violated"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
