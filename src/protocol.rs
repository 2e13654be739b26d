//! The per-protocol implementation contract.
//!
//! A [`Protocol`] value supplies everything the negotiation core cannot know
//! about a concrete interconnect: how downward and upward parameters fuse
//! into an edge, how an edge materialises as a wire bundle, and how a
//! resolved binding is physically connected. The core never inspects the
//! four associated types; it only routes them.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::node::NodeRef;

/// Shared handle to one wire bundle.
///
/// Bundles are handed out by reference so that node shapes which alias one
/// side to the other (output, input, blind and internal nodes) expose the
/// same underlying objects from both accessors rather than structural
/// copies.
pub type BundleRef<B> = Rc<RefCell<B>>;

/// Deferred wiring action produced by [`Protocol::connect`].
///
/// Applied by the enclosing scope, in binding-registration order, after all
/// bindings have been resolved.
pub type WireFn = Box<dyn FnOnce() -> Result<()>>;

/// The two bundle slices of one resolved port, ready for wiring.
pub struct BundlePair<B> {
    /// The sink-side bundle (inward port of the binding's sink).
    pub sink: BundleRef<B>,
    /// The source-side bundle (outward port of the binding's source).
    pub source: BundleRef<B>,
}

impl<B> fmt::Debug for BundlePair<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundlePair").finish_non_exhaustive()
    }
}

/// A transaction monitor built alongside a binding.
///
/// The core never looks inside a monitor; it only collects them during
/// elaboration so the enclosing system can attach them to its output.
pub trait Monitor: fmt::Debug {
    /// Name of this monitor instance.
    fn name(&self) -> &str;
}

/// Per-protocol callbacks consumed by the negotiation core.
///
/// Implementations are cheap, shared values: every node holds one for each
/// of its sides (homogeneous nodes hold the same value twice). The four
/// associated types mirror the flow of a negotiation:
///
/// * [`Down`](Protocol::Down) — configuration flowing source → sink,
/// * [`Up`](Protocol::Up) — constraints flowing sink → source,
/// * [`Edge`](Protocol::Edge) — the fused per-port contract,
/// * [`Bundle`](Protocol::Bundle) — the wire-level connection value.
pub trait Protocol: 'static {
    /// Downward parameter type.
    type Down: Clone + 'static;
    /// Upward parameter type.
    type Up: Clone + 'static;
    /// Negotiated edge descriptor.
    type Edge: 'static;
    /// Wire bundle constructed per edge.
    type Bundle: 'static;

    /// Fuse negotiated parameters into an edge descriptor.
    fn edge(&self, down: &Self::Down, up: &Self::Up) -> Self::Edge;

    /// Construct a fresh wire bundle for an edge.
    fn bundle(&self, edge: &Self::Edge) -> Self::Bundle;

    /// Annotate a downward parameter with the node it is leaving.
    ///
    /// Applied once per outward port during propagation. The handle may be
    /// stored inside the parameter (see [`common_node`]). The default is
    /// the identity.
    ///
    /// [`common_node`]: Protocol::common_node
    fn mix_down(&self, down: Self::Down, _node: &NodeRef) -> Self::Down {
        down
    }

    /// Annotate an upward parameter with the node it is leaving.
    ///
    /// Applied once per inward port during propagation. The default is the
    /// identity.
    fn mix_up(&self, up: Self::Up, _node: &NodeRef) -> Self::Up {
        up
    }

    /// For a one-port node, the most-common neighbour reachable through this
    /// parameter, if the protocol tracks one (see [`mix_down`]).
    ///
    /// Used by graph tooling; the core never calls it.
    ///
    /// [`mix_down`]: Protocol::mix_down
    fn common_node(&self, _down: &Self::Down) -> Option<NodeRef> {
        None
    }

    /// Human-readable label for an edge, used when rendering the graph.
    fn label(&self, _edge: &Self::Edge) -> String {
        String::new()
    }

    /// Colour used for this protocol's nodes when rendering the graph.
    fn colour(&self) -> &'static str {
        "#000000"
    }

    /// Whether rendered edges of this protocol point against the flow of
    /// downward parameters.
    fn reverse(&self) -> bool {
        false
    }

    /// Per-binding hook invoked once the binding's edges and bundles exist.
    ///
    /// Returns an optional monitor (suppressed when `monitored` is false)
    /// and a deferred action that physically wires the bundle pairs. The
    /// default builds no monitor and wires nothing.
    fn connect(
        &self,
        _edges: &[Self::Edge],
        _bundles: &[BundlePair<Self::Bundle>],
        _monitored: bool,
    ) -> (Option<Box<dyn Monitor>>, WireFn) {
        (None, Box::new(|| Ok(())))
    }
}
