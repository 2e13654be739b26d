//! # Treaty
//!
//! A parameter-negotiation framework for wiring up statically sized
//! hardware modules. Modules are represented as *nodes*; nodes are linked
//! by *binding* operators; the framework then determines how many parallel
//! *ports* each binding carries, propagates downward and upward parameters
//! until every edge agrees on a negotiated contract, and materialises one
//! wire bundle per edge ready for connection.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                          Scope                                 │
//! ├────────────────────────────────────────────────────────────────┤
//! │  1. Create nodes from the catalog (source, sink, adapter, ...) │
//! │  2. Record bindings (once / star-left / star-right)            │
//! │  3. finish(): resolve stars, ports, parameters, edges, bundles │
//! │  4. Apply the deferred wiring actions in registration order    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Resolution is demand-driven: the first observation of any derived field
//! on a node freezes its bindings and computes that field, recursively
//! pulling whatever it needs from neighbours.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use treaty::prelude::*;
//!
//! let scope = Scope::root("top");
//! let src = Node::source(&scope, "rom", Mem, vec![MemParams::new(64)]);
//! let sink = Node::sink(&scope, "cpu", Mem, vec![MemRequirements::new(32)]);
//! sink.bind_once(&src)?;
//!
//! let elaborated = scope.finish()?;
//! for edge in sink.edges_in()?.iter() {
//!     // every edge carries the fused (down, up) contract
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod graph;
pub mod node;
pub mod protocol;
pub mod scope;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::node::{
        BaseNode, BindOp, Node, NodeFlags, NodeRef, PortRange, SplitterArg,
    };
    pub use crate::protocol::{BundlePair, BundleRef, Monitor, Protocol, WireFn};
    pub use crate::scope::{Elaborated, Scope};
}

pub use error::{Error, Result};
