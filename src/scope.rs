//! The enclosing elaboration scope.
//!
//! A [`Scope`] is the stack-structured context every node is created in: it
//! owns the node registry, accumulates the deferred binding closures the
//! operators register, and drives the final wiring pass. Nested scopes
//! model nested lazy-module construction; a child contributes its nodes and
//! bindings to the same elaboration.
//!
//! Lifecycle: create nodes and record bindings while the scope is open,
//! then call [`Scope::finish`] once. Finishing seals the subtree (any later
//! binding fails with `OutOfScope`), resolves every pending binding in
//! registration order, and applies the produced wiring actions in that same
//! order.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::node::NodeRef;
use crate::protocol::{Monitor, WireFn};

/// What one resolved binding produced: an optional monitor and the wiring
/// action to apply after all bindings have resolved.
pub(crate) struct BindingOutcome {
    pub monitor: Option<Box<dyn Monitor>>,
    pub wire: WireFn,
}

/// A deferred binding closure, run by [`Scope::finish`].
pub(crate) type Deferred = Box<dyn FnOnce() -> Result<BindingOutcome>>;

/// Shared scope state; nodes hold weak references to it.
pub(crate) struct ScopeInner {
    path: String,
    nodes: RefCell<Vec<NodeRef>>,
    pending: RefCell<Vec<Deferred>>,
    children: RefCell<Vec<Rc<ScopeInner>>>,
    open: Cell<bool>,
}

impl ScopeInner {
    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.get()
    }

    /// Add a node; returns its stable index within this scope.
    pub(crate) fn register(&self, node: NodeRef) -> usize {
        let mut nodes = self.nodes.borrow_mut();
        nodes.push(node);
        nodes.len() - 1
    }

    /// Queue a deferred binding closure.
    pub(crate) fn defer(&self, deferred: Deferred) {
        self.pending.borrow_mut().push(deferred);
    }

    fn seal(&self) {
        self.open.set(false);
        for child in self.children.borrow().iter() {
            child.seal();
        }
    }

    fn drain(&self, out: &mut Vec<Deferred>) {
        out.append(&mut self.pending.borrow_mut());
        for child in self.children.borrow().iter() {
            child.drain(out);
        }
    }

    fn collect_nodes(&self, out: &mut Vec<NodeRef>) {
        out.extend(self.nodes.borrow().iter().cloned());
        for child in self.children.borrow().iter() {
            child.collect_nodes(out);
        }
    }
}

/// An elaboration scope.
///
/// Dropping every handle to a scope deactivates it: nodes keep only weak
/// references, so later bindings fail with `OutOfScope` rather than keeping
/// a dead elaboration alive.
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl Scope {
    /// Create a root scope.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                path: name.into(),
                nodes: RefCell::new(Vec::new()),
                pending: RefCell::new(Vec::new()),
                children: RefCell::new(Vec::new()),
                open: Cell::new(true),
            }),
        }
    }

    /// Create a nested scope for a sub-module.
    ///
    /// The child's nodes and bindings are elaborated together with the
    /// parent's when the parent finishes.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let inner = Rc::new(ScopeInner {
            path: format!("{}.{}", self.inner.path, name.into()),
            nodes: RefCell::new(Vec::new()),
            pending: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            open: Cell::new(self.inner.is_open()),
        });
        self.inner.children.borrow_mut().push(inner.clone());
        Self { inner }
    }

    /// The scope's dotted path, used to qualify node names.
    pub fn path(&self) -> &str {
        self.inner.path()
    }

    /// Whether the scope still accepts nodes and bindings.
    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    /// Number of nodes created directly in this scope.
    pub fn node_count(&self) -> usize {
        self.inner.nodes.borrow().len()
    }

    /// Number of bindings recorded in this scope and not yet elaborated.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    /// All nodes of this scope and its descendants, in creation order.
    pub fn nodes(&self) -> Vec<NodeRef> {
        let mut out = Vec::new();
        self.inner.collect_nodes(&mut out);
        out
    }

    pub(crate) fn inner(&self) -> Rc<ScopeInner> {
        self.inner.clone()
    }

    /// Seal the scope subtree and elaborate every recorded binding.
    ///
    /// Each binding's deferred closure pulls the edge and bundle slices
    /// from the two nodes' lazy fields (triggering resolution on first
    /// touch) and invokes the protocol's `connect` hook. Once all bindings
    /// have resolved, the wiring actions run in registration order.
    pub fn finish(&self) -> Result<Elaborated> {
        self.inner.seal();
        let mut deferred = Vec::new();
        self.inner.drain(&mut deferred);

        let mut monitors = Vec::new();
        let mut wires: Vec<WireFn> = Vec::with_capacity(deferred.len());
        for d in deferred {
            let outcome = d()?;
            if let Some(monitor) = outcome.monitor {
                monitors.push(monitor);
            }
            wires.push(outcome.wire);
        }

        let bindings = wires.len();
        for wire in wires {
            wire()?;
        }

        tracing::debug!(
            scope = self.inner.path(),
            bindings,
            monitors = monitors.len(),
            "elaboration finished"
        );
        Ok(Elaborated { monitors, bindings })
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("path", &self.inner.path)
            .field("open", &self.inner.is_open())
            .field("nodes", &self.node_count())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Summary of a finished elaboration.
#[derive(Debug)]
pub struct Elaborated {
    /// Monitors built by the bindings' `connect` hooks, in registration
    /// order.
    pub monitors: Vec<Box<dyn Monitor>>,
    /// Number of bindings wired.
    pub bindings: usize,
}
