//! Error types for Treaty.

use std::fmt;
use std::panic::Location;

use thiserror::Error;

/// Result type alias using Treaty's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Which side of a node a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The inward (sink-facing) side.
    Inward,
    /// The outward (source-facing) side.
    Outward,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Inward => write!(f, "inward"),
            Side::Outward => write!(f, "outward"),
        }
    }
}

/// Source location captured at a push or at node creation.
///
/// Opaque to the core; used solely in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceInfo(&'static Location<'static>);

impl SourceInfo {
    /// Capture the caller's location.
    #[track_caller]
    pub fn caller() -> Self {
        Self(Location::caller())
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.0.file(), self.0.line(), self.0.column())
    }
}

/// Renders an optional source location as a diagnostic suffix.
#[derive(Debug, Clone, Copy)]
pub struct At(pub Option<SourceInfo>);

impl fmt::Display for At {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(info) => write!(f, " (at {info})"),
            None => Ok(()),
        }
    }
}

/// Main error type for elaboration failures.
///
/// All failures are synchronous and fatal to elaboration; they are never
/// caught or retried. Every message names the node's qualified name and,
/// when one was recorded, the source location of the offending binding.
#[derive(Debug, Error)]
pub enum Error {
    /// A binding was attempted outside an active scope.
    #[error("{node}: bound outside an active scope{at}")]
    OutOfScope {
        /// Qualified node name.
        node: String,
        /// Where the binding was written.
        at: At,
    },

    /// A push arrived after the side had been frozen by resolution.
    #[error("{node}: {side} bindings are frozen once resolution has started{at}")]
    Frozen {
        /// Qualified node name.
        node: String,
        /// Side whose push list was frozen.
        side: Side,
        /// Where the binding was written.
        at: At,
    },

    /// An inward binding was pushed onto a node that accepts none.
    #[error("{node}: accepts no inward bindings{at}")]
    NotASink {
        /// Qualified node name.
        node: String,
        /// Where the binding was written.
        at: At,
    },

    /// An outward binding was pushed onto a node that accepts none.
    #[error("{node}: accepts no outward bindings{at}")]
    NotASource {
        /// Qualified node name.
        node: String,
        /// Where the binding was written.
        at: At,
    },

    /// The node's shape forbids the observed star pattern.
    #[error("{node}: {detail}{at}")]
    StarShape {
        /// Qualified node name.
        node: String,
        /// What the shape forbids and what was observed.
        detail: String,
        /// Where the node was created.
        at: At,
    },

    /// Known widths are too small to resolve the star count.
    #[error("{node}: {detail}{at}")]
    UnderAssigned {
        /// Qualified node name.
        node: String,
        /// The failing width comparison.
        detail: String,
        /// Where the node was created.
        at: At,
    },

    /// Known widths exceed what the node can absorb.
    #[error("{node}: {detail}{at}")]
    OverAssigned {
        /// Qualified node name.
        node: String,
        /// The failing width comparison.
        detail: String,
        /// Where the node was created.
        at: At,
    },

    /// The resolved port total falls outside the acceptance range.
    #[error("{node}: resolved {total} {side} ports, outside the accepted range {range}{at}")]
    Arity {
        /// Qualified node name.
        node: String,
        /// Side whose total is out of range.
        side: Side,
        /// The resolved port total.
        total: usize,
        /// The acceptance range, rendered.
        range: String,
        /// Where the node was created.
        at: At,
    },

    /// A parameter-mapping function produced or consumed the wrong count.
    #[error("{node}: {detail}{at}")]
    ParamMismatch {
        /// Qualified node name.
        node: String,
        /// The failing count comparison.
        detail: String,
        /// Where the node was created.
        at: At,
    },

    /// The requested bundle side is not defined for this shape.
    #[error("{node}: no {side} bundle is defined for this node{at}")]
    BundleDisallowed {
        /// Qualified node name.
        node: String,
        /// Side with no bundle.
        side: Side,
        /// Where the node was created.
        at: At,
    },

    /// An internal consistency check failed; indicates a bug, not misuse.
    #[error("{node}: internal invariant violated: {detail}")]
    InternalInvariant {
        /// Qualified node name.
        node: String,
        /// Which invariant broke.
        detail: String,
    },
}

impl Error {
    /// Create a star-shape violation for `node`.
    pub(crate) fn star_shape(
        node: impl Into<String>,
        detail: impl Into<String>,
        at: Option<SourceInfo>,
    ) -> Self {
        Self::StarShape {
            node: node.into(),
            detail: detail.into(),
            at: At(at),
        }
    }

    /// Create an under-assignment failure for `node`.
    pub(crate) fn under_assigned(
        node: impl Into<String>,
        detail: impl Into<String>,
        at: Option<SourceInfo>,
    ) -> Self {
        Self::UnderAssigned {
            node: node.into(),
            detail: detail.into(),
            at: At(at),
        }
    }

    /// Create an over-assignment failure for `node`.
    pub(crate) fn over_assigned(
        node: impl Into<String>,
        detail: impl Into<String>,
        at: Option<SourceInfo>,
    ) -> Self {
        Self::OverAssigned {
            node: node.into(),
            detail: detail.into(),
            at: At(at),
        }
    }

    /// Create a parameter-count mismatch for `node`.
    pub(crate) fn param_mismatch(
        node: impl Into<String>,
        detail: impl Into<String>,
        at: Option<SourceInfo>,
    ) -> Self {
        Self::ParamMismatch {
            node: node.into(),
            detail: detail.into(),
            at: At(at),
        }
    }

    /// Create an internal-invariant failure for `node`.
    pub(crate) fn internal(node: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InternalInvariant {
            node: node.into(),
            detail: detail.into(),
        }
    }
}
