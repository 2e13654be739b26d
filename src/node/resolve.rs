//! The four-stage resolution engine.
//!
//! Resolution is per-node and first-touch lazy: reading any derived field
//! freezes the node's push lists and computes the field, recursively
//! pulling whatever it needs from neighbours. Each derived quantity is
//! cached behind a cycle-guarded cell, so the recursion is linear in graph
//! size and a genuinely cyclic recurrence fails cleanly instead of looping.
//!
//! Stage order per node:
//!
//! 1. freeze both push lists;
//! 2. resolve star widths (`resolve_stars`);
//! 3. lay out port maps and check arity (`port_maps`);
//! 4. propagate parameters, fuse edges, materialise bundles.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::error::{At, Error, Result, Side};
use crate::protocol::{BundleRef, Protocol};

use super::shape::{BundleAlias, Shape, StarCx};
use super::{
    BaseNode, BindingKind, InwardNode, NodeCore, NodeRef, OutwardNode, PortMaps,
};

impl<I: Protocol, O: Protocol> NodeCore<I, O> {
    /// Stage 2: resolve `(i_star, o_star)` for this node.
    pub(crate) fn resolve_stars(&self) -> Result<(usize, usize)> {
        self.stars.force(self.qualified_name(), || {
            self.freeze();
            let inward = self.inward_bindings();
            let outward = self.outward_bindings();

            let i_stars = inward
                .iter()
                .filter(|b| b.kind == BindingKind::Star)
                .count();
            let o_stars = outward
                .iter()
                .filter(|b| b.kind == BindingKind::Star)
                .count();

            let mut i_known = 0;
            for b in &inward {
                match b.kind {
                    BindingKind::Once => i_known += 1,
                    BindingKind::Query => i_known += b.peer.o_star()?,
                    BindingKind::Star => {}
                }
            }
            let mut o_known = 0;
            for b in &outward {
                match b.kind {
                    BindingKind::Once => o_known += 1,
                    BindingKind::Query => o_known += b.peer.i_star()?,
                    BindingKind::Star => {}
                }
            }

            let mut star_sites = String::new();
            for b in inward.iter().filter(|b| b.kind == BindingKind::Star) {
                let sep = if star_sites.is_empty() { " (star bindings at " } else { ", " };
                write!(star_sites, "{sep}{}", b.info).ok();
            }
            for b in outward.iter().filter(|b| b.kind == BindingKind::Star) {
                let sep = if star_sites.is_empty() { " (star bindings at " } else { ", " };
                write!(star_sites, "{sep}{}", b.info).ok();
            }
            if !star_sites.is_empty() {
                star_sites.push(')');
            }

            let resolved = self.shape.resolve_star(&StarCx {
                node: self.qualified_name(),
                at: self.created_at(),
                i_known,
                o_known,
                i_stars,
                o_stars,
                star_sites,
            })?;
            tracing::trace!(
                node = self.qualified_name(),
                i_star = resolved.0,
                o_star = resolved.1,
                i_known,
                o_known,
                "resolved star widths"
            );
            Ok(resolved)
        })
    }

    /// Stage 3: lay out per-binding port ranges and check arity.
    pub(crate) fn port_maps(&self) -> Result<Rc<PortMaps>> {
        self.maps.force(self.qualified_name(), || {
            let (i_star, o_star) = self.resolve_stars()?;
            let inward = self.inward_bindings();
            let outward = self.outward_bindings();

            let mut i = Vec::with_capacity(inward.len());
            let mut i_total = 0;
            for b in &inward {
                let width = match b.kind {
                    BindingKind::Once => 1,
                    BindingKind::Query => b.peer.o_star()?,
                    BindingKind::Star => i_star,
                };
                i.push(i_total..i_total + width);
                i_total += width;
            }

            let mut o = Vec::with_capacity(outward.len());
            let mut o_total = 0;
            for b in &outward {
                let width = match b.kind {
                    BindingKind::Once => 1,
                    BindingKind::Query => b.peer.i_star()?,
                    BindingKind::Star => o_star,
                };
                o.push(o_total..o_total + width);
                o_total += width;
            }

            if !self.num_inward.contains(i_total) {
                return Err(Error::Arity {
                    node: self.qualified_name().to_owned(),
                    side: Side::Inward,
                    total: i_total,
                    range: self.num_inward.to_string(),
                    at: At(Some(self.created_at())),
                });
            }
            if !self.num_outward.contains(o_total) {
                return Err(Error::Arity {
                    node: self.qualified_name().to_owned(),
                    side: Side::Outward,
                    total: o_total,
                    range: self.num_outward.to_string(),
                    at: At(Some(self.created_at())),
                });
            }

            tracing::trace!(
                node = self.qualified_name(),
                inward = i_total,
                outward = o_total,
                "laid out port maps"
            );
            Ok(Rc::new(PortMaps {
                i,
                o,
                i_total,
                o_total,
            }))
        })
    }

    /// Enumerate `(peer, peer_port_index)` per inward port, validating that
    /// mirrored slice widths agree.
    pub(crate) fn inward_peer_ports(&self) -> Result<Vec<(Rc<dyn OutwardNode<I>>, usize)>> {
        let maps = self.port_maps()?;
        let inward = self.inward_bindings();
        let mut ports = Vec::with_capacity(maps.i_total);
        for (k, b) in inward.iter().enumerate() {
            let ours = maps.i[k].clone();
            let theirs = b.peer.o_port_range(b.peer_index)?;
            if ours.len() != theirs.len() {
                return Err(Error::internal(
                    self.qualified_name(),
                    format!(
                        "binding widths disagree with {}: {} inward here, {} outward there",
                        b.peer.qualified_name(),
                        ours.len(),
                        theirs.len()
                    ),
                ));
            }
            for j in theirs {
                ports.push((b.peer.clone(), j));
            }
        }
        Ok(ports)
    }

    /// Enumerate `(peer, peer_port_index)` per outward port, validating
    /// that mirrored slice widths agree.
    pub(crate) fn outward_peer_ports(&self) -> Result<Vec<(Rc<dyn InwardNode<O>>, usize)>> {
        let maps = self.port_maps()?;
        let outward = self.outward_bindings();
        let mut ports = Vec::with_capacity(maps.o_total);
        for (k, b) in outward.iter().enumerate() {
            let ours = maps.o[k].clone();
            let theirs = b.peer.i_port_range(b.peer_index)?;
            if ours.len() != theirs.len() {
                return Err(Error::internal(
                    self.qualified_name(),
                    format!(
                        "binding widths disagree with {}: {} outward here, {} inward there",
                        b.peer.qualified_name(),
                        ours.len(),
                        theirs.len()
                    ),
                ));
            }
            for j in theirs {
                ports.push((b.peer.clone(), j));
            }
        }
        Ok(ports)
    }

    /// Stage 4, downward: one parameter per outward port.
    pub(crate) fn resolve_down_params(&self) -> Result<Rc<Vec<O::Down>>> {
        self.down_params.force(self.qualified_name(), || {
            let maps = self.port_maps()?;
            let ports = self.inward_peer_ports()?;
            let mut incoming = Vec::with_capacity(ports.len());
            for (peer, j) in &ports {
                let params = peer.o_params_rc()?;
                let param = params.get(*j).ok_or_else(|| {
                    Error::internal(
                        self.qualified_name(),
                        format!(
                            "{} has no downward parameter at port {j}",
                            peer.qualified_name()
                        ),
                    )
                })?;
                incoming.push(param.clone());
            }
            let mapped = self.shape.map_down(
                self.qualified_name(),
                self.created_at(),
                maps.o_total,
                &incoming,
            )?;
            if mapped.len() != maps.o_total {
                return Err(Error::param_mismatch(
                    self.qualified_name(),
                    format!(
                        "downward mapping produced {} parameters for {} outward ports",
                        mapped.len(),
                        maps.o_total
                    ),
                    Some(self.created_at()),
                ));
            }
            let me = self.self_node()?;
            let mixed = mapped
                .into_iter()
                .map(|d| self.protocol_out.mix_down(d, &me))
                .collect();
            Ok(Rc::new(mixed))
        })
    }

    /// Stage 4, upward: one parameter per inward port.
    pub(crate) fn resolve_up_params(&self) -> Result<Rc<Vec<I::Up>>> {
        self.up_params.force(self.qualified_name(), || {
            let maps = self.port_maps()?;
            let ports = self.outward_peer_ports()?;
            let mut incoming = Vec::with_capacity(ports.len());
            for (peer, j) in &ports {
                let params = peer.i_params_rc()?;
                let param = params.get(*j).ok_or_else(|| {
                    Error::internal(
                        self.qualified_name(),
                        format!(
                            "{} has no upward parameter at port {j}",
                            peer.qualified_name()
                        ),
                    )
                })?;
                incoming.push(param.clone());
            }
            let mapped = self.shape.map_up(
                self.qualified_name(),
                self.created_at(),
                maps.i_total,
                &incoming,
            )?;
            if mapped.len() != maps.i_total {
                return Err(Error::param_mismatch(
                    self.qualified_name(),
                    format!(
                        "upward mapping produced {} parameters for {} inward ports",
                        mapped.len(),
                        maps.i_total
                    ),
                    Some(self.created_at()),
                ));
            }
            let me = self.self_node()?;
            let mixed = mapped
                .into_iter()
                .map(|u| self.protocol_in.mix_up(u, &me))
                .collect();
            Ok(Rc::new(mixed))
        })
    }

    /// Fuse one outward edge per outward port.
    pub(crate) fn resolve_edges_out(&self) -> Result<Rc<Vec<O::Edge>>> {
        self.edges_out.force(self.qualified_name(), || {
            let down = self.resolve_down_params()?;
            let ports = self.outward_peer_ports()?;
            if ports.len() != down.len() {
                return Err(Error::internal(
                    self.qualified_name(),
                    format!(
                        "{} outward ports but {} downward parameters",
                        ports.len(),
                        down.len()
                    ),
                ));
            }
            let mut edges = Vec::with_capacity(ports.len());
            for (k, (peer, j)) in ports.iter().enumerate() {
                let ups = peer.i_params_rc()?;
                let up = ups.get(*j).ok_or_else(|| {
                    Error::internal(
                        self.qualified_name(),
                        format!(
                            "{} has no upward parameter at port {j}",
                            peer.qualified_name()
                        ),
                    )
                })?;
                edges.push(self.protocol_out.edge(&down[k], up));
            }
            tracing::debug!(
                node = self.qualified_name(),
                edges = edges.len(),
                "negotiated outward edges"
            );
            Ok(Rc::new(edges))
        })
    }

    /// Fuse one inward edge per inward port.
    pub(crate) fn resolve_edges_in(&self) -> Result<Rc<Vec<I::Edge>>> {
        self.edges_in.force(self.qualified_name(), || {
            let up = self.resolve_up_params()?;
            let ports = self.inward_peer_ports()?;
            if ports.len() != up.len() {
                return Err(Error::internal(
                    self.qualified_name(),
                    format!(
                        "{} inward ports but {} upward parameters",
                        ports.len(),
                        up.len()
                    ),
                ));
            }
            let mut edges = Vec::with_capacity(ports.len());
            for (k, (peer, j)) in ports.iter().enumerate() {
                let downs = peer.o_params_rc()?;
                let down = downs.get(*j).ok_or_else(|| {
                    Error::internal(
                        self.qualified_name(),
                        format!(
                            "{} has no downward parameter at port {j}",
                            peer.qualified_name()
                        ),
                    )
                })?;
                edges.push(self.protocol_in.edge(down, &up[k]));
            }
            tracing::debug!(
                node = self.qualified_name(),
                edges = edges.len(),
                "negotiated inward edges"
            );
            Ok(Rc::new(edges))
        })
    }

    /// Materialise outward bundles, honouring aliasing and shape limits.
    pub(crate) fn resolve_bundles_out(&self) -> Result<Rc<Vec<BundleRef<O::Bundle>>>> {
        self.bundles_out.force(self.qualified_name(), || {
            if let BundleAlias::OutFromIn(alias) = &self.alias {
                let inward = self.resolve_bundles_in()?;
                return Ok(Rc::new(alias(&inward)));
            }
            if matches!(self.shape, Shape::Sink { .. }) {
                return Err(Error::BundleDisallowed {
                    node: self.qualified_name().to_owned(),
                    side: Side::Outward,
                    at: At(Some(self.created_at())),
                });
            }
            let edges = self.resolve_edges_out()?;
            let bundles = edges
                .iter()
                .map(|e| Rc::new(RefCell::new(self.protocol_out.bundle(e))))
                .collect();
            Ok(Rc::new(bundles))
        })
    }

    /// Materialise inward bundles, honouring aliasing and shape limits.
    pub(crate) fn resolve_bundles_in(&self) -> Result<Rc<Vec<BundleRef<I::Bundle>>>> {
        self.bundles_in.force(self.qualified_name(), || {
            if let BundleAlias::InFromOut(alias) = &self.alias {
                let outward = self.resolve_bundles_out()?;
                return Ok(Rc::new(alias(&outward)));
            }
            if matches!(self.shape, Shape::Source { .. }) {
                return Err(Error::BundleDisallowed {
                    node: self.qualified_name().to_owned(),
                    side: Side::Inward,
                    at: At(Some(self.created_at())),
                });
            }
            let edges = self.resolve_edges_in()?;
            let bundles = edges
                .iter()
                .map(|e| Rc::new(RefCell::new(self.protocol_in.bundle(e))))
                .collect();
            Ok(Rc::new(bundles))
        })
    }

    /// `(peer, label)` per resolved inward port.
    pub(crate) fn node_inputs(&self) -> Result<Vec<(NodeRef, String)>> {
        let edges = self.resolve_edges_in()?;
        let ports = self.inward_peer_ports()?;
        Ok(ports
            .into_iter()
            .zip(edges.iter())
            .map(|((peer, _), edge)| (peer.as_base(), self.protocol_in.label(edge)))
            .collect())
    }

    /// `(peer, label)` per resolved outward port.
    pub(crate) fn node_outputs(&self) -> Result<Vec<(NodeRef, String)>> {
        let edges = self.resolve_edges_out()?;
        let ports = self.outward_peer_ports()?;
        Ok(ports
            .into_iter()
            .zip(edges.iter())
            .map(|((peer, _), edge)| (peer.as_base(), self.protocol_out.label(edge)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::node::{Node, PortRange};
    use crate::protocol::Protocol;
    use crate::scope::Scope;

    struct Width;

    impl Protocol for Width {
        type Down = u32;
        type Up = u32;
        type Edge = (u32, u32);
        type Bundle = u32;

        fn edge(&self, down: &u32, up: &u32) -> (u32, u32) {
            (*down, *up)
        }

        fn bundle(&self, edge: &(u32, u32)) -> u32 {
            edge.0.min(edge.1)
        }
    }

    fn identity(scope: &Scope, name: &str) -> Node<Width> {
        Node::identity(scope, name, Width, PortRange::any())
    }

    #[test]
    fn test_once_chain_resolves_exact_widths() {
        let scope = Scope::root("top");
        let src = Node::source(&scope, "src", Width, vec![8]);
        let sink = Node::sink(&scope, "sink", Width, vec![4]);
        sink.bind_once(&src).unwrap();

        assert_eq!(src.outward_star().unwrap(), 0);
        assert_eq!(sink.inward_star().unwrap(), 0);
        assert_eq!(*src.outward_params().unwrap(), vec![8]);
        assert_eq!(*sink.inward_params().unwrap(), vec![4]);
        assert_eq!(*sink.edges_in().unwrap(), vec![(8, 4)]);
        assert_eq!(*src.edges_out().unwrap(), vec![(8, 4)]);
    }

    #[test]
    fn test_query_width_follows_peer_star() {
        let scope = Scope::root("top");
        let src = Node::source(&scope, "src", Width, vec![8, 16, 32]);
        let mid = identity(&scope, "mid");
        let sink = Node::sink(&scope, "sink", Width, vec![1, 2, 3]);
        mid.bind_star_right(&src).unwrap();
        sink.bind_star_left(&mid).unwrap();

        assert_eq!(src.outward_star().unwrap(), 3);
        assert_eq!(sink.inward_star().unwrap(), 3);
        assert_eq!(mid.inward_star().unwrap(), 0);
        assert_eq!(mid.outward_star().unwrap(), 0);
        assert_eq!(mid.inward_mapping().unwrap(), vec![0..3]);
        assert_eq!(mid.outward_mapping().unwrap(), vec![0..3]);
        assert_eq!(*mid.outward_params().unwrap(), vec![8, 16, 32]);
        assert_eq!(*mid.inward_params().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_port_mapping_is_a_prefix_sum() {
        let scope = Scope::root("top");
        let wide = Node::source(&scope, "wide", Width, vec![8, 16]);
        let narrow = Node::source(&scope, "narrow", Width, vec![32]);
        let sink = Node::sink(&scope, "sink", Width, vec![0, 0, 0]);
        sink.bind_star_right(&wide).unwrap();
        sink.bind_star_right(&narrow).unwrap();

        assert_eq!(sink.inward_mapping().unwrap(), vec![0..2, 2..3]);
        assert_eq!(*sink.outward_params().unwrap(), Vec::<u32>::new());
        assert_eq!(*wide.edges_out().unwrap(), vec![(8, 0), (16, 0)]);
        assert_eq!(*narrow.edges_out().unwrap(), vec![(32, 0)]);
    }

    #[test]
    fn test_push_after_resolution_is_frozen() {
        let scope = Scope::root("top");
        let src = Node::source(&scope, "src", Width, vec![8]);
        let late = Node::source(&scope, "late", Width, vec![8]);
        let sink = Node::sink(&scope, "sink", Width, vec![4, 4]);
        sink.bind_once(&src).unwrap();
        assert_eq!(sink.inward_star().unwrap(), 1);

        let err = sink.bind_once(&late).unwrap_err();
        assert!(matches!(err, Error::Frozen { .. }));
    }

    #[test]
    fn test_arity_checked_after_stars() {
        let scope = Scope::root("top");
        let src = Node::source(&scope, "src", Width, vec![8]);
        let sink = Node::sink(&scope, "sink", Width, vec![4, 4]);
        sink.bind_once(&src).unwrap();

        let err = sink.inward_params().unwrap_err();
        assert!(matches!(err, Error::Arity { .. }));
    }

    #[test]
    fn test_star_cycle_is_detected() {
        let scope = Scope::root("top");
        let a = identity(&scope, "a");
        let b = identity(&scope, "b");
        a.bind_star_right(&b).unwrap();
        b.bind_star_right(&a).unwrap();

        let err = a.inward_star().unwrap_err();
        assert!(matches!(err, Error::InternalInvariant { .. }));
    }

    #[test]
    fn test_mirrored_widths_agree() {
        let scope = Scope::root("top");
        let src = Node::source(&scope, "src", Width, vec![8, 16]);
        let sink = Node::sink(&scope, "sink", Width, vec![4, 4]);
        sink.bind_star_right(&src).unwrap();

        let ours = sink.inward_mapping().unwrap();
        let theirs = src.outward_mapping().unwrap();
        assert_eq!(ours.len(), 1);
        assert_eq!(theirs.len(), 1);
        assert_eq!(ours[0].len(), theirs[0].len());
    }
}
