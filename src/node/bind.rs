//! The binding operators.
//!
//! A binding links a sink-side node to a source-side handle whose outward
//! protocol matches the sink's inward protocol. Each operator records
//! mirrored tags on the two push lists and registers a deferred closure on
//! the sink's scope; the closure later pulls this binding's edge and bundle
//! slices and hands them to the inward protocol's `connect` hook.

use std::rc::Rc;

use crate::error::{At, Error, Result, SourceInfo};
use crate::protocol::{BundlePair, Protocol};
use crate::scope::BindingOutcome;

use super::{BaseNode, BindingKind, InwardNode, Node, OutwardNode};

/// The user-facing binding operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOp {
    /// Exactly one port.
    Once,
    /// Width chosen by the sink's star resolution.
    StarLeft,
    /// Width chosen by the source's star resolution.
    StarRight,
}

impl BindOp {
    /// Mirrored `(sink, source)` tags recorded for this operator.
    pub(crate) fn tags(self) -> (BindingKind, BindingKind) {
        match self {
            BindOp::Once => (BindingKind::Once, BindingKind::Once),
            BindOp::StarLeft => (BindingKind::Star, BindingKind::Query),
            BindOp::StarRight => (BindingKind::Query, BindingKind::Star),
        }
    }

    fn name(self) -> &'static str {
        match self {
            BindOp::Once => "once",
            BindOp::StarLeft => "star-left",
            BindOp::StarRight => "star-right",
        }
    }
}

impl<I: Protocol, O: Protocol> Node<I, O> {
    /// Bind `source` into this node with the given operator.
    #[track_caller]
    pub fn bind<SI: Protocol>(&self, op: BindOp, source: &Node<SI, I>) -> Result<()> {
        self.bind_full(op, source, true, SourceInfo::caller())
    }

    /// Bind `source` into this node without building a monitor.
    #[track_caller]
    pub fn bind_silent<SI: Protocol>(&self, op: BindOp, source: &Node<SI, I>) -> Result<()> {
        self.bind_full(op, source, false, SourceInfo::caller())
    }

    /// Bind exactly one port from `source`.
    #[track_caller]
    pub fn bind_once<SI: Protocol>(&self, source: &Node<SI, I>) -> Result<()> {
        self.bind_full(BindOp::Once, source, true, SourceInfo::caller())
    }

    /// Bind as many ports as this node's star resolution chooses.
    #[track_caller]
    pub fn bind_star_left<SI: Protocol>(&self, source: &Node<SI, I>) -> Result<()> {
        self.bind_full(BindOp::StarLeft, source, true, SourceInfo::caller())
    }

    /// Bind as many ports as `source`'s star resolution chooses.
    #[track_caller]
    pub fn bind_star_right<SI: Protocol>(&self, source: &Node<SI, I>) -> Result<()> {
        self.bind_full(BindOp::StarRight, source, true, SourceInfo::caller())
    }

    /// [`bind_once`](Node::bind_once) without a monitor.
    #[track_caller]
    pub fn bind_once_silent<SI: Protocol>(&self, source: &Node<SI, I>) -> Result<()> {
        self.bind_full(BindOp::Once, source, false, SourceInfo::caller())
    }

    /// [`bind_star_left`](Node::bind_star_left) without a monitor.
    #[track_caller]
    pub fn bind_star_left_silent<SI: Protocol>(&self, source: &Node<SI, I>) -> Result<()> {
        self.bind_full(BindOp::StarLeft, source, false, SourceInfo::caller())
    }

    /// [`bind_star_right`](Node::bind_star_right) without a monitor.
    #[track_caller]
    pub fn bind_star_right_silent<SI: Protocol>(&self, source: &Node<SI, I>) -> Result<()> {
        self.bind_full(BindOp::StarRight, source, false, SourceInfo::caller())
    }

    fn bind_full<SI: Protocol>(
        &self,
        op: BindOp,
        source: &Node<SI, I>,
        monitored: bool,
        info: SourceInfo,
    ) -> Result<()> {
        let sink = &self.core;
        let src = &source.core;

        sink.require_active_scope(info)?;
        src.require_active_scope(info)?;
        // Check both gates before mutating either list, so a failed bind
        // never leaves a one-sided binding behind.
        sink.check_i_push(info)?;
        src.check_o_push(info)?;

        let (sink_tag, source_tag) = op.tags();
        let sink_index = sink.i_pushed();
        let source_index = src.o_pushed();

        let sink_dyn: Rc<dyn InwardNode<I>> = sink.clone();
        let src_dyn: Rc<dyn OutwardNode<I>> = src.clone();
        src.o_push(sink_index, sink_dyn, source_tag, info)?;
        sink.i_push(source_index, src_dyn, sink_tag, info)?;

        tracing::debug!(
            sink = sink.qualified_name(),
            source = src.qualified_name(),
            op = op.name(),
            "recorded binding"
        );

        let scope = sink.scope_rc().ok_or_else(|| Error::OutOfScope {
            node: sink.qualified_name().to_owned(),
            at: At(Some(info)),
        })?;

        let sink_rc = sink.clone();
        let src_rc: Rc<dyn OutwardNode<I>> = src.clone();
        scope.defer(Box::new(move || {
            let edges = sink_rc.i_edges_rc()?;
            let sink_range = sink_rc.i_port_range(sink_index)?;
            let sink_bundles = sink_rc.i_bundles_rc()?;
            let src_range = src_rc.o_port_range(source_index)?;
            let src_bundles = src_rc.o_bundles_rc()?;
            if sink_range.len() != src_range.len() {
                return Err(Error::internal(
                    sink_rc.qualified_name(),
                    format!(
                        "binding slices disagree with {}: {} inward, {} outward",
                        src_rc.qualified_name(),
                        sink_range.len(),
                        src_range.len()
                    ),
                ));
            }
            let pairs: Vec<BundlePair<I::Bundle>> = sink_range
                .clone()
                .zip(src_range)
                .map(|(a, b)| BundlePair {
                    sink: sink_bundles[a].clone(),
                    source: src_bundles[b].clone(),
                })
                .collect();
            let slice = &edges[sink_range];
            let (monitor, wire) = sink_rc.protocol_in.connect(slice, &pairs, monitored);
            Ok(BindingOutcome { monitor, wire })
        }));
        Ok(())
    }
}
