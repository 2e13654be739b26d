//! Nodes and their binding discipline.
//!
//! A node is one statically sized module in the negotiation graph. It is
//! created inside an enclosing [`Scope`](crate::scope::Scope), accumulates
//! bindings on two append-only push lists during the mutative phase, and
//! resolves its star widths, port maps, parameters, edges and bundles on
//! first observation of any derived field.
//!
//! The module is split by concern:
//!
//! * this file — the node base: identity, acceptance ranges, push lists,
//!   freeze flags, the typed inward/outward views, and the public handle;
//! * `shape.rs` — the node catalog and its policy functions;
//! * `resolve.rs` — the four-stage resolution engine;
//! * `bind.rs` — the binding operators.

mod bind;
mod resolve;
mod shape;

pub use bind::BindOp;
pub use shape::{SplitterArg, SplitterMap};

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::ops::Range;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::error::{At, Error, Result, Side, SourceInfo};
use crate::protocol::{BundleRef, Protocol};
use crate::scope::{Scope, ScopeInner};

use shape::{BundleAlias, Shape};

/// Flavour of a single recorded binding, as seen from one side.
///
/// The two halves of a binding carry mirrored tags: `Once` mirrors `Once`,
/// while `Star` on one side mirrors `Query` on the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// Exactly one port.
    Once,
    /// As many ports as this node's resolved star width.
    Star,
    /// As many ports as the peer's resolved star width.
    Query,
}

/// Inclusive range of acceptable port counts for one side of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    min: usize,
    max: usize,
}

impl PortRange {
    /// Accept any count between `min` and `max`, inclusive.
    pub fn new(min: usize, max: usize) -> Self {
        debug_assert!(min <= max);
        Self { min, max }
    }

    /// Accept exactly `n` ports.
    pub fn exactly(n: usize) -> Self {
        Self { min: n, max: n }
    }

    /// Accept any port count, including zero.
    pub fn any() -> Self {
        Self {
            min: 0,
            max: usize::MAX,
        }
    }

    /// Whether `n` is an acceptable count.
    pub fn contains(&self, n: usize) -> bool {
        self.min <= n && n <= self.max
    }

    /// Whether this range only accepts zero (the side takes no bindings).
    pub fn is_closed(&self) -> bool {
        self.max == 0
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "exactly {}", self.min)
        } else if self.max == usize::MAX {
            write!(f, "{} or more", self.min)
        } else {
            write!(f, "{} to {}", self.min, self.max)
        }
    }
}

/// Bundle-visibility flags fixed by the node's shape.
#[derive(Debug, Clone, Copy)]
pub struct NodeFlags {
    /// Whether the inward bundle is visible outside the enclosing module.
    pub external_in: bool,
    /// Whether the outward bundle is visible outside the enclosing module.
    pub external_out: bool,
    /// Whether the bundles' logical direction is swapped when exposed.
    pub flip: bool,
    /// Whether the bundles materialise as free wires rather than ports.
    pub wire: bool,
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self {
            external_in: true,
            external_out: true,
            flip: false,
            wire: false,
        }
    }
}

/// Untyped view of a node, for identity and graph tooling.
pub trait BaseNode {
    /// The node's short name.
    fn name(&self) -> &str;

    /// The node's stable index within its scope.
    fn index(&self) -> usize;

    /// The node's scope-qualified name.
    fn qualified_name(&self) -> &str;

    /// The catalog shape this node was created as.
    fn shape_name(&self) -> &'static str;

    /// Render colour, taken from the outward protocol.
    fn colour(&self) -> &'static str;

    /// Whether rendered outward edges point against downward flow.
    fn graph_reversed(&self) -> bool;

    /// `(peer, label)` per resolved inward port.
    fn inputs(&self) -> Result<Vec<(NodeRef, String)>>;

    /// `(peer, label)` per resolved outward port.
    fn outputs(&self) -> Result<Vec<(NodeRef, String)>>;

    /// True when the node has no resolved ports on either side and can be
    /// left out of a rendered graph.
    fn omit_graph(&self) -> Result<bool> {
        Ok(self.inputs()?.is_empty() && self.outputs()?.is_empty())
    }
}

/// Shared untyped node handle.
pub type NodeRef = Rc<dyn BaseNode>;

/// One recorded inward binding: the source peer and how it was bound.
pub(crate) struct InwardBinding<P: Protocol> {
    /// Index of this binding on the peer's outward list.
    pub peer_index: usize,
    /// The source-side peer.
    pub peer: Rc<dyn OutwardNode<P>>,
    /// Tag recorded on this side.
    pub kind: BindingKind,
    /// Where the binding was written.
    pub info: SourceInfo,
}

impl<P: Protocol> Clone for InwardBinding<P> {
    fn clone(&self) -> Self {
        Self {
            peer_index: self.peer_index,
            peer: self.peer.clone(),
            kind: self.kind,
            info: self.info,
        }
    }
}

/// One recorded outward binding: the sink peer and how it was bound.
pub(crate) struct OutwardBinding<P: Protocol> {
    /// Index of this binding on the peer's inward list.
    pub peer_index: usize,
    /// The sink-side peer.
    pub peer: Rc<dyn InwardNode<P>>,
    /// Tag recorded on this side.
    pub kind: BindingKind,
    /// Where the binding was written.
    pub info: SourceInfo,
}

impl<P: Protocol> Clone for OutwardBinding<P> {
    fn clone(&self) -> Self {
        Self {
            peer_index: self.peer_index,
            peer: self.peer.clone(),
            kind: self.kind,
            info: self.info,
        }
    }
}

/// Typed view of a node's inward side, as seen by a source peer.
pub(crate) trait InwardNode<P: Protocol>: BaseNode {
    /// Current inward push-list length.
    fn i_pushed(&self) -> usize;

    /// Record an inward binding; returns the index it was assigned.
    fn i_push(
        &self,
        peer_index: usize,
        peer: Rc<dyn OutwardNode<P>>,
        kind: BindingKind,
        info: SourceInfo,
    ) -> Result<usize>;

    /// Resolved inward star width.
    fn i_star(&self) -> Result<usize>;

    /// Half-open inward port range of one binding.
    fn i_port_range(&self, binding: usize) -> Result<Range<usize>>;

    /// Upward parameters, one per inward port.
    fn i_params_rc(&self) -> Result<Rc<Vec<P::Up>>>;

    /// Negotiated inward edges.
    fn i_edges_rc(&self) -> Result<Rc<Vec<P::Edge>>>;

    /// Inward bundles.
    fn i_bundles_rc(&self) -> Result<Rc<Vec<BundleRef<P::Bundle>>>>;

    /// Upcast to the untyped view.
    fn as_base(self: Rc<Self>) -> NodeRef;
}

/// Typed view of a node's outward side, as seen by a sink peer.
pub(crate) trait OutwardNode<P: Protocol>: BaseNode {
    /// Current outward push-list length.
    fn o_pushed(&self) -> usize;

    /// Record an outward binding; returns the index it was assigned.
    fn o_push(
        &self,
        peer_index: usize,
        peer: Rc<dyn InwardNode<P>>,
        kind: BindingKind,
        info: SourceInfo,
    ) -> Result<usize>;

    /// Resolved outward star width.
    fn o_star(&self) -> Result<usize>;

    /// Half-open outward port range of one binding.
    fn o_port_range(&self, binding: usize) -> Result<Range<usize>>;

    /// Downward parameters, one per outward port.
    fn o_params_rc(&self) -> Result<Rc<Vec<P::Down>>>;

    /// Outward bundles.
    fn o_bundles_rc(&self) -> Result<Rc<Vec<BundleRef<P::Bundle>>>>;

    /// Upcast to the untyped view.
    fn as_base(self: Rc<Self>) -> NodeRef;
}

/// Parallel half-open port ranges, one per binding in push order.
pub(crate) struct PortMaps {
    pub i: Vec<Range<usize>>,
    pub o: Vec<Range<usize>>,
    pub i_total: usize,
    pub o_total: usize,
}

/// One-shot cache with a currently-resolving guard.
///
/// The guard turns a genuinely cyclic recurrence into an
/// [`Error::InternalInvariant`] instead of unbounded recursion.
pub(crate) struct Lazy<T> {
    what: &'static str,
    slot: OnceCell<T>,
    busy: Cell<bool>,
}

impl<T: Clone> Lazy<T> {
    pub fn new(what: &'static str) -> Self {
        Self {
            what,
            slot: OnceCell::new(),
            busy: Cell::new(false),
        }
    }

    /// Return the cached value, computing it with `f` on first touch.
    pub fn force(&self, node: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        if let Some(v) = self.slot.get() {
            return Ok(v.clone());
        }
        if self.busy.replace(true) {
            return Err(Error::internal(
                node,
                format!("cyclic dependency while resolving {}", self.what),
            ));
        }
        let out = f();
        self.busy.set(false);
        match out {
            Ok(v) => {
                let _ = self.slot.set(v.clone());
                Ok(v)
            }
            Err(e) => Err(e),
        }
    }
}

/// The shared node state behind a [`Node`] handle.
pub(crate) struct NodeCore<I: Protocol, O: Protocol> {
    scope: Weak<ScopeInner>,
    self_base: RefCell<Option<Weak<dyn BaseNode>>>,
    name: String,
    qualified: String,
    index: Cell<usize>,
    created_at: SourceInfo,
    kind_label: &'static str,

    pub(crate) protocol_in: Rc<I>,
    pub(crate) protocol_out: Rc<O>,
    pub(crate) shape: Shape<I, O>,
    pub(crate) alias: BundleAlias<I, O>,
    pub(crate) flags: NodeFlags,
    pub(crate) num_inward: PortRange,
    pub(crate) num_outward: PortRange,

    inward: RefCell<SmallVec<[InwardBinding<I>; 2]>>,
    outward: RefCell<SmallVec<[OutwardBinding<O>; 2]>>,
    frozen_in: Cell<bool>,
    frozen_out: Cell<bool>,

    pub(crate) stars: Lazy<(usize, usize)>,
    pub(crate) maps: Lazy<Rc<PortMaps>>,
    pub(crate) down_params: Lazy<Rc<Vec<O::Down>>>,
    pub(crate) up_params: Lazy<Rc<Vec<I::Up>>>,
    pub(crate) edges_out: Lazy<Rc<Vec<O::Edge>>>,
    pub(crate) edges_in: Lazy<Rc<Vec<I::Edge>>>,
    pub(crate) bundles_out: Lazy<Rc<Vec<BundleRef<O::Bundle>>>>,
    pub(crate) bundles_in: Lazy<Rc<Vec<BundleRef<I::Bundle>>>>,
}

impl<I: Protocol, O: Protocol> NodeCore<I, O> {
    /// Create a node and register it with its enclosing scope.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn register(
        scope: &Scope,
        name: String,
        kind_label: &'static str,
        protocol_in: Rc<I>,
        protocol_out: Rc<O>,
        shape: Shape<I, O>,
        alias: BundleAlias<I, O>,
        flags: NodeFlags,
        num_inward: PortRange,
        num_outward: PortRange,
        created_at: SourceInfo,
    ) -> Rc<Self> {
        let inner = scope.inner();
        let qualified = format!("{}.{}", inner.path(), name);
        let core = Rc::new(Self {
            scope: Rc::downgrade(&inner),
            self_base: RefCell::new(None),
            name,
            qualified,
            index: Cell::new(0),
            created_at,
            kind_label,
            protocol_in,
            protocol_out,
            shape,
            alias,
            flags,
            num_inward,
            num_outward,
            inward: RefCell::new(SmallVec::new()),
            outward: RefCell::new(SmallVec::new()),
            frozen_in: Cell::new(false),
            frozen_out: Cell::new(false),
            stars: Lazy::new("star widths"),
            maps: Lazy::new("port maps"),
            down_params: Lazy::new("downward parameters"),
            up_params: Lazy::new("upward parameters"),
            edges_out: Lazy::new("outward edges"),
            edges_in: Lazy::new("inward edges"),
            bundles_out: Lazy::new("outward bundles"),
            bundles_in: Lazy::new("inward bundles"),
        });
        core.index.set(inner.register(core.clone()));
        let base: Rc<dyn BaseNode> = core.clone();
        *core.self_base.borrow_mut() = Some(Rc::downgrade(&base));
        core
    }

    /// This node's own shared handle, for the `mix` hooks.
    pub(crate) fn self_node(&self) -> Result<NodeRef> {
        self.self_base
            .borrow()
            .as_ref()
            .and_then(|weak| weak.upgrade())
            .ok_or_else(|| {
                Error::internal(self.qualified_name(), "node handle dropped during resolution")
            })
    }

    pub(crate) fn created_at(&self) -> SourceInfo {
        self.created_at
    }

    pub(crate) fn scope_rc(&self) -> Option<Rc<ScopeInner>> {
        self.scope.upgrade()
    }

    /// Fail with `OutOfScope` unless the node's scope still accepts bindings.
    pub(crate) fn require_active_scope(&self, info: SourceInfo) -> Result<()> {
        match self.scope.upgrade() {
            Some(s) if s.is_open() => Ok(()),
            _ => Err(Error::OutOfScope {
                node: self.qualified.clone(),
                at: At(Some(info)),
            }),
        }
    }

    /// Check the inward-push gates without mutating.
    pub(crate) fn check_i_push(&self, info: SourceInfo) -> Result<()> {
        if self.frozen_in.get() {
            return Err(Error::Frozen {
                node: self.qualified.clone(),
                side: Side::Inward,
                at: At(Some(info)),
            });
        }
        if self.num_inward.is_closed() {
            return Err(Error::NotASink {
                node: self.qualified.clone(),
                at: At(Some(info)),
            });
        }
        Ok(())
    }

    /// Check the outward-push gates without mutating.
    pub(crate) fn check_o_push(&self, info: SourceInfo) -> Result<()> {
        if self.frozen_out.get() {
            return Err(Error::Frozen {
                node: self.qualified.clone(),
                side: Side::Outward,
                at: At(Some(info)),
            });
        }
        if self.num_outward.is_closed() {
            return Err(Error::NotASource {
                node: self.qualified.clone(),
                at: At(Some(info)),
            });
        }
        Ok(())
    }

    /// Freeze both push lists; called on first observation of any derived
    /// field.
    pub(crate) fn freeze(&self) {
        self.frozen_in.set(true);
        self.frozen_out.set(true);
    }

    /// Snapshot of the inward push list.
    pub(crate) fn inward_bindings(&self) -> SmallVec<[InwardBinding<I>; 2]> {
        self.inward.borrow().clone()
    }

    /// Snapshot of the outward push list.
    pub(crate) fn outward_bindings(&self) -> SmallVec<[OutwardBinding<O>; 2]> {
        self.outward.borrow().clone()
    }
}

impl<I: Protocol, O: Protocol> BaseNode for NodeCore<I, O> {
    fn name(&self) -> &str {
        &self.name
    }

    fn index(&self) -> usize {
        self.index.get()
    }

    fn qualified_name(&self) -> &str {
        &self.qualified
    }

    fn shape_name(&self) -> &'static str {
        self.kind_label
    }

    fn colour(&self) -> &'static str {
        self.protocol_out.colour()
    }

    fn graph_reversed(&self) -> bool {
        self.protocol_out.reverse()
    }

    fn inputs(&self) -> Result<Vec<(NodeRef, String)>> {
        self.node_inputs()
    }

    fn outputs(&self) -> Result<Vec<(NodeRef, String)>> {
        self.node_outputs()
    }
}

impl<I: Protocol, O: Protocol> InwardNode<I> for NodeCore<I, O> {
    fn i_pushed(&self) -> usize {
        self.inward.borrow().len()
    }

    fn i_push(
        &self,
        peer_index: usize,
        peer: Rc<dyn OutwardNode<I>>,
        kind: BindingKind,
        info: SourceInfo,
    ) -> Result<usize> {
        self.check_i_push(info)?;
        let mut list = self.inward.borrow_mut();
        let assigned = list.len();
        list.push(InwardBinding {
            peer_index,
            peer,
            kind,
            info,
        });
        Ok(assigned)
    }

    fn i_star(&self) -> Result<usize> {
        Ok(self.resolve_stars()?.0)
    }

    fn i_port_range(&self, binding: usize) -> Result<Range<usize>> {
        let maps = self.port_maps()?;
        maps.i.get(binding).cloned().ok_or_else(|| {
            Error::internal(
                &self.qualified,
                format!("inward binding {binding} out of range"),
            )
        })
    }

    fn i_params_rc(&self) -> Result<Rc<Vec<I::Up>>> {
        self.resolve_up_params()
    }

    fn i_edges_rc(&self) -> Result<Rc<Vec<I::Edge>>> {
        self.resolve_edges_in()
    }

    fn i_bundles_rc(&self) -> Result<Rc<Vec<BundleRef<I::Bundle>>>> {
        self.resolve_bundles_in()
    }

    fn as_base(self: Rc<Self>) -> NodeRef {
        self
    }
}

impl<I: Protocol, O: Protocol> OutwardNode<O> for NodeCore<I, O> {
    fn o_pushed(&self) -> usize {
        self.outward.borrow().len()
    }

    fn o_push(
        &self,
        peer_index: usize,
        peer: Rc<dyn InwardNode<O>>,
        kind: BindingKind,
        info: SourceInfo,
    ) -> Result<usize> {
        self.check_o_push(info)?;
        let mut list = self.outward.borrow_mut();
        let assigned = list.len();
        list.push(OutwardBinding {
            peer_index,
            peer,
            kind,
            info,
        });
        Ok(assigned)
    }

    fn o_star(&self) -> Result<usize> {
        Ok(self.resolve_stars()?.1)
    }

    fn o_port_range(&self, binding: usize) -> Result<Range<usize>> {
        let maps = self.port_maps()?;
        maps.o.get(binding).cloned().ok_or_else(|| {
            Error::internal(
                &self.qualified,
                format!("outward binding {binding} out of range"),
            )
        })
    }

    fn o_params_rc(&self) -> Result<Rc<Vec<O::Down>>> {
        self.resolve_down_params()
    }

    fn o_bundles_rc(&self) -> Result<Rc<Vec<BundleRef<O::Bundle>>>> {
        self.resolve_bundles_out()
    }

    fn as_base(self: Rc<Self>) -> NodeRef {
        self
    }
}

/// Cloneable handle to a node in the negotiation graph.
///
/// `I` is the inward protocol, `O` the outward one; homogeneous nodes leave
/// `O` at its default. Handles are cheap to clone and all refer to the same
/// shared node.
pub struct Node<I: Protocol, O: Protocol = I> {
    pub(crate) core: Rc<NodeCore<I, O>>,
}

impl<I: Protocol, O: Protocol> Clone for Node<I, O> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<I: Protocol, O: Protocol> fmt::Debug for Node<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.core.qualified_name())
            .field("shape", &self.core.shape_name())
            .finish_non_exhaustive()
    }
}

impl<I: Protocol, O: Protocol> Node<I, O> {
    /// The node's short name.
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// The node's scope-qualified name.
    pub fn qualified_name(&self) -> &str {
        self.core.qualified_name()
    }

    /// The node's stable index within its scope.
    pub fn index(&self) -> usize {
        self.core.index()
    }

    /// Bundle-visibility flags fixed by the node's shape.
    pub fn flags(&self) -> NodeFlags {
        self.core.flags
    }

    /// Acceptance range for inward ports.
    pub fn num_inward(&self) -> PortRange {
        self.core.num_inward
    }

    /// Acceptance range for outward ports.
    pub fn num_outward(&self) -> PortRange {
        self.core.num_outward
    }

    /// Untyped handle to the same node.
    pub fn as_node_ref(&self) -> NodeRef {
        self.core.clone()
    }

    /// Whether two handles refer to the same node.
    pub fn same_node(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    /// Resolved inward star width. First call triggers resolution.
    pub fn inward_star(&self) -> Result<usize> {
        self.core.i_star()
    }

    /// Resolved outward star width. First call triggers resolution.
    pub fn outward_star(&self) -> Result<usize> {
        self.core.o_star()
    }

    /// Half-open inward port range per binding, in push order.
    pub fn inward_mapping(&self) -> Result<Vec<Range<usize>>> {
        Ok(self.core.port_maps()?.i.clone())
    }

    /// Half-open outward port range per binding, in push order.
    pub fn outward_mapping(&self) -> Result<Vec<Range<usize>>> {
        Ok(self.core.port_maps()?.o.clone())
    }

    /// Upward parameters, one per inward port.
    pub fn inward_params(&self) -> Result<Rc<Vec<I::Up>>> {
        self.core.i_params_rc()
    }

    /// Downward parameters, one per outward port.
    pub fn outward_params(&self) -> Result<Rc<Vec<O::Down>>> {
        self.core.o_params_rc()
    }

    /// Negotiated inward edges, one per inward port.
    pub fn edges_in(&self) -> Result<Rc<Vec<I::Edge>>> {
        self.core.resolve_edges_in()
    }

    /// Negotiated outward edges, one per outward port.
    pub fn edges_out(&self) -> Result<Rc<Vec<O::Edge>>> {
        self.core.resolve_edges_out()
    }

    /// Inward edges when the inward side is external, empty otherwise.
    pub fn external_edges_in(&self) -> Result<Rc<Vec<I::Edge>>> {
        if self.core.flags.external_in {
            self.edges_in()
        } else {
            Ok(Rc::new(Vec::new()))
        }
    }

    /// Outward edges when the outward side is external, empty otherwise.
    pub fn external_edges_out(&self) -> Result<Rc<Vec<O::Edge>>> {
        if self.core.flags.external_out {
            self.edges_out()
        } else {
            Ok(Rc::new(Vec::new()))
        }
    }

    /// Inward bundles, one per inward port.
    pub fn bundle_in(&self) -> Result<Rc<Vec<BundleRef<I::Bundle>>>> {
        self.core.resolve_bundles_in()
    }

    /// Outward bundles, one per outward port.
    pub fn bundle_out(&self) -> Result<Rc<Vec<BundleRef<O::Bundle>>>> {
        self.core.resolve_bundles_out()
    }

    /// `(peer, label)` per resolved inward port.
    pub fn inputs(&self) -> Result<Vec<(NodeRef, String)>> {
        self.core.inputs()
    }

    /// `(peer, label)` per resolved outward port.
    pub fn outputs(&self) -> Result<Vec<(NodeRef, String)>> {
        self.core.outputs()
    }

    /// True when the node can be left out of a rendered graph.
    pub fn omit_graph(&self) -> Result<bool> {
        self.core.omit_graph()
    }
}
