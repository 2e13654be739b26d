//! Integration tests for the Treaty negotiation core.

use std::cell::RefCell;
use std::rc::Rc;

use treaty::graph;
use treaty::prelude::*;

/// Downward offer flowing source -> sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Offer {
    beat_bytes: u32,
}

/// Upward demand flowing sink -> source.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Demand {
    beat_bytes: u32,
}

/// Fused contract: the narrower of offer and demand.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkEdge {
    beat_bytes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkBundle {
    beat_bytes: u32,
    driven: bool,
}

#[derive(Debug)]
struct LinkMonitor {
    name: String,
}

impl Monitor for LinkMonitor {
    fn name(&self) -> &str {
        &self.name
    }
}

/// A minimal link protocol that records wiring order for assertions.
#[derive(Clone)]
struct Link {
    wired: Rc<RefCell<Vec<u32>>>,
}

impl Link {
    fn new() -> (Self, Rc<RefCell<Vec<u32>>>) {
        let wired = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                wired: wired.clone(),
            },
            wired,
        )
    }
}

impl Protocol for Link {
    type Down = Offer;
    type Up = Demand;
    type Edge = LinkEdge;
    type Bundle = LinkBundle;

    fn edge(&self, down: &Offer, up: &Demand) -> LinkEdge {
        LinkEdge {
            beat_bytes: down.beat_bytes.min(up.beat_bytes),
        }
    }

    fn bundle(&self, edge: &LinkEdge) -> LinkBundle {
        LinkBundle {
            beat_bytes: edge.beat_bytes,
            driven: false,
        }
    }

    fn label(&self, edge: &LinkEdge) -> String {
        format!("{}B", edge.beat_bytes)
    }

    fn colour(&self) -> &'static str {
        "#1f77b4"
    }

    fn connect(
        &self,
        edges: &[LinkEdge],
        bundles: &[BundlePair<LinkBundle>],
        monitored: bool,
    ) -> (Option<Box<dyn Monitor>>, WireFn) {
        let tag = edges.first().map(|e| e.beat_bytes).unwrap_or(0);
        let monitor = monitored.then(|| {
            Box::new(LinkMonitor {
                name: format!("monitor_{tag}"),
            }) as Box<dyn Monitor>
        });
        let pairs: Vec<(BundleRef<LinkBundle>, BundleRef<LinkBundle>)> = bundles
            .iter()
            .map(|p| (p.sink.clone(), p.source.clone()))
            .collect();
        let wired = self.wired.clone();
        let wire: WireFn = Box::new(move || {
            for (sink, source) in &pairs {
                source.borrow_mut().driven = true;
                sink.borrow_mut().driven = true;
            }
            wired.borrow_mut().push(tag);
            Ok(())
        });
        (monitor, wire)
    }
}

fn offers(widths: &[u32]) -> Vec<Offer> {
    widths.iter().map(|&beat_bytes| Offer { beat_bytes }).collect()
}

fn demands(widths: &[u32]) -> Vec<Demand> {
    widths.iter().map(|&beat_bytes| Demand { beat_bytes }).collect()
}

#[test]
fn test_once_binding_negotiates_single_edge() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8]));
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[4]));
    sink.bind_once(&src).unwrap();

    assert_eq!(*src.outward_params().unwrap(), offers(&[8]));
    assert_eq!(*sink.inward_params().unwrap(), demands(&[4]));
    assert_eq!(*sink.edges_in().unwrap(), vec![LinkEdge { beat_bytes: 4 }]);
    assert_eq!(*src.edges_out().unwrap(), vec![LinkEdge { beat_bytes: 4 }]);
    assert_eq!(sink.bundle_in().unwrap().len(), 1);
    assert_eq!(src.bundle_out().unwrap().len(), 1);

    let elaborated = scope.finish().unwrap();
    assert_eq!(elaborated.bindings, 1);
    assert_eq!(elaborated.monitors.len(), 1);
    assert_eq!(elaborated.monitors[0].name(), "monitor_4");
    assert!(sink.bundle_in().unwrap()[0].borrow().driven);
    assert!(src.bundle_out().unwrap()[0].borrow().driven);
}

#[test]
fn test_star_right_fans_out_from_source() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8, 16, 32]));
    let widen = Node::adapter(
        &scope,
        "widen",
        link.clone(),
        link.clone(),
        PortRange::any(),
        |d: &Offer| Offer {
            beat_bytes: d.beat_bytes * 2,
        },
        |u: &Demand| Demand {
            beat_bytes: u.beat_bytes / 2,
        },
    );
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[64, 64, 64]));
    widen.bind_star_right(&src).unwrap();
    sink.bind_star_left(&widen).unwrap();

    assert_eq!(src.outward_star().unwrap(), 3);
    assert_eq!(widen.inward_star().unwrap(), 0);
    assert_eq!(widen.outward_star().unwrap(), 0);
    assert_eq!(widen.inward_mapping().unwrap(), vec![0..3]);
    assert_eq!(widen.outward_mapping().unwrap(), vec![0..3]);
    assert_eq!(
        *widen.outward_params().unwrap(),
        offers(&[16, 32, 64]),
    );
}

#[test]
fn test_star_left_fans_in_to_sink() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8, 8]));
    let ident = Node::identity(&scope, "pass", link.clone(), PortRange::any());
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[4, 2]));
    ident.bind_star_right(&src).unwrap();
    sink.bind_star_left(&ident).unwrap();

    assert_eq!(sink.inward_star().unwrap(), 2);
    assert_eq!(ident.outward_mapping().unwrap(), vec![0..2]);
    assert_eq!(ident.inward_mapping().unwrap(), vec![0..2]);
    assert_eq!(*sink.edges_in().unwrap(), vec![
        LinkEdge { beat_bytes: 4 },
        LinkEdge { beat_bytes: 2 },
    ]);
}

#[test]
fn test_nexus_collapses_parameters() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let s1 = Node::source(&scope, "s1", link.clone(), offers(&[8]));
    let s2 = Node::source(&scope, "s2", link.clone(), offers(&[32]));
    let xbar = Node::nexus(
        &scope,
        "xbar",
        link.clone(),
        link.clone(),
        |ds: &[Offer]| Offer {
            beat_bytes: ds.iter().map(|d| d.beat_bytes).min().unwrap_or(0),
        },
        |us: &[Demand]| Demand {
            beat_bytes: us.iter().map(|u| u.beat_bytes).max().unwrap_or(0),
        },
    );
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[16]));
    xbar.bind_once(&s1).unwrap();
    xbar.bind_once(&s2).unwrap();
    sink.bind_once(&xbar).unwrap();

    assert_eq!(*xbar.outward_params().unwrap(), offers(&[8]));
    assert_eq!(*xbar.inward_params().unwrap(), demands(&[16, 16]));
    assert_eq!(*sink.edges_in().unwrap(), vec![LinkEdge { beat_bytes: 8 }]);
}

#[test]
fn test_binding_after_observation_is_frozen() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8]));
    let late = Node::source(&scope, "late", link.clone(), offers(&[8]));
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[4]));
    sink.bind_once(&src).unwrap();

    assert_eq!(*sink.inward_params().unwrap(), demands(&[4]));

    let err = sink.bind_once(&late).unwrap_err();
    assert!(matches!(err, Error::Frozen { .. }));
    assert!(err.to_string().contains("top.cpu"));
}

#[test]
fn test_adapter_arity_violation() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8]));
    let pair = Node::identity(&scope, "pair", link.clone(), PortRange::exactly(2));
    pair.bind_once(&src).unwrap();

    let err = pair.inward_params().unwrap_err();
    assert!(matches!(err, Error::Arity { .. }));
    let message = err.to_string();
    assert!(message.contains("top.pair"));
    assert!(message.contains("exactly 2"));
}

#[test]
fn test_source_absorbs_star_or_once_bindings() {
    let (link, _) = Link::new();

    // One star binding takes every port.
    let scope = Scope::root("star");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8, 16, 32]));
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[4, 4, 4]));
    sink.bind_star_right(&src).unwrap();
    assert_eq!(src.outward_star().unwrap(), 3);
    assert_eq!(src.outward_mapping().unwrap(), vec![0..3]);

    // Three once bindings take one port each, in push order.
    let scope = Scope::root("once");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8, 16, 32]));
    let a = Node::sink(&scope, "a", link.clone(), demands(&[64]));
    let b = Node::sink(&scope, "b", link.clone(), demands(&[64]));
    let c = Node::sink(&scope, "c", link.clone(), demands(&[64]));
    a.bind_once(&src).unwrap();
    b.bind_once(&src).unwrap();
    c.bind_once(&src).unwrap();
    assert_eq!(src.outward_star().unwrap(), 0);
    assert_eq!(src.outward_mapping().unwrap(), vec![0..1, 1..2, 2..3]);
    assert_eq!(*a.edges_in().unwrap(), vec![LinkEdge { beat_bytes: 8 }]);
    assert_eq!(*b.edges_in().unwrap(), vec![LinkEdge { beat_bytes: 16 }]);
    assert_eq!(*c.edges_in().unwrap(), vec![LinkEdge { beat_bytes: 32 }]);
}

#[test]
fn test_identity_preserves_parameters() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8, 16]));
    let ident = Node::identity(&scope, "pass", link.clone(), PortRange::any());
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[4, 4]));
    ident.bind_star_right(&src).unwrap();
    sink.bind_star_left(&ident).unwrap();

    assert_eq!(*ident.outward_params().unwrap(), *src.outward_params().unwrap());
    assert_eq!(*ident.inward_params().unwrap(), *sink.inward_params().unwrap());
}

#[test]
fn test_splitter_replicates_inward_side() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let s1 = Node::source(&scope, "s1", link.clone(), offers(&[8]));
    let s2 = Node::source(&scope, "s2", link.clone(), offers(&[16]));
    let split = Node::splitter(
        &scope,
        "split",
        link.clone(),
        link.clone(),
        |arg: SplitterArg<'_, Offer>| {
            let copies = if arg.params.is_empty() {
                0
            } else {
                arg.n / arg.params.len()
            };
            arg.params.repeat(copies)
        },
        |arg: SplitterArg<'_, Demand>| arg.params[..arg.n].to_vec(),
    );
    let a = Node::sink(&scope, "a", link.clone(), demands(&[64, 64]));
    let b = Node::sink(&scope, "b", link.clone(), demands(&[64, 64]));
    split.bind_once(&s1).unwrap();
    split.bind_once(&s2).unwrap();
    a.bind_star_right(&split).unwrap();
    b.bind_star_right(&split).unwrap();

    assert_eq!(split.outward_star().unwrap(), 2);
    assert_eq!(split.outward_mapping().unwrap(), vec![0..2, 2..4]);
    assert_eq!(
        *split.outward_params().unwrap(),
        offers(&[8, 16, 8, 16]),
    );
    assert_eq!(*a.edges_in().unwrap(), vec![
        LinkEdge { beat_bytes: 8 },
        LinkEdge { beat_bytes: 16 },
    ]);
}

#[test]
fn test_splitter_rejects_known_outward_binding() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "src", link.clone(), offers(&[8]));
    let split = Node::splitter(
        &scope,
        "split",
        link.clone(),
        link.clone(),
        |arg: SplitterArg<'_, Offer>| arg.params.to_vec(),
        |arg: SplitterArg<'_, Demand>| arg.params[..arg.n].to_vec(),
    );
    let sink = Node::sink(&scope, "sink", link.clone(), demands(&[4]));
    split.bind_once(&src).unwrap();
    sink.bind_once(&split).unwrap();

    let err = split.outward_star().unwrap_err();
    assert!(matches!(err, Error::StarShape { .. }));
}

#[test]
fn test_degenerate_sides_reject_bindings() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8]));
    let src2 = Node::source(&scope, "rom2", link.clone(), offers(&[8]));
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[4]));
    let sink2 = Node::sink(&scope, "cpu2", link.clone(), demands(&[4]));

    // A source cannot be the sink side of a binding.
    let err = src.bind_once(&src2).unwrap_err();
    assert!(matches!(err, Error::NotASink { .. }));

    // A sink cannot be the source side of a binding.
    let err = sink2.bind_once(&sink).unwrap_err();
    assert!(matches!(err, Error::NotASource { .. }));
}

#[test]
fn test_binding_outside_scope_fails() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8]));
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[4]));
    scope.finish().unwrap();

    let err = sink.bind_once(&src).unwrap_err();
    assert!(matches!(err, Error::OutOfScope { .. }));
}

#[test]
fn test_binding_after_scope_dropped_fails() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8]));
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[4]));
    drop(scope);

    let err = sink.bind_once(&src).unwrap_err();
    assert!(matches!(err, Error::OutOfScope { .. }));
}

#[test]
fn test_fixed_shapes_have_one_bundle_side() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8]));
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[4]));
    sink.bind_once(&src).unwrap();

    let err = src.bundle_in().unwrap_err();
    assert!(matches!(err, Error::BundleDisallowed { .. }));
    let err = sink.bundle_out().unwrap_err();
    assert!(matches!(err, Error::BundleDisallowed { .. }));
}

#[test]
fn test_output_node_aliases_bundles() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8]));
    let out = Node::output(&scope, "out", link.clone());
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[4]));
    out.bind_once(&src).unwrap();
    sink.bind_once(&out).unwrap();

    let flags = out.flags();
    assert!(!flags.external_in);
    assert!(flags.external_out);

    let inward = out.bundle_in().unwrap();
    let outward = out.bundle_out().unwrap();
    assert_eq!(inward.len(), outward.len());
    for (a, b) in inward.iter().zip(outward.iter()) {
        assert!(Rc::ptr_eq(a, b));
    }
}

#[test]
fn test_input_node_aliases_bundles() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8]));
    let input = Node::input(&scope, "in", link.clone());
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[4]));
    input.bind_once(&src).unwrap();
    sink.bind_once(&input).unwrap();

    let flags = input.flags();
    assert!(flags.external_in);
    assert!(!flags.external_out);

    let inward = input.bundle_in().unwrap();
    let outward = input.bundle_out().unwrap();
    for (a, b) in inward.iter().zip(outward.iter()) {
        assert!(Rc::ptr_eq(a, b));
    }
}

#[test]
fn test_blind_and_internal_shapes() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");

    let blind_out = Node::blind_output(&scope, "bo", link.clone(), offers(&[8]));
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[4]));
    sink.bind_once(&blind_out).unwrap();
    let flags = blind_out.flags();
    assert!(flags.flip);
    assert!(!flags.external_in);
    let inward = blind_out.bundle_in().unwrap();
    let outward = blind_out.bundle_out().unwrap();
    for (a, b) in inward.iter().zip(outward.iter()) {
        assert!(Rc::ptr_eq(a, b));
    }

    let src = Node::source(&scope, "rom", link.clone(), offers(&[8]));
    let internal_out = Node::internal_output(&scope, "io", link.clone(), demands(&[4]));
    internal_out.bind_once(&src).unwrap();
    let flags = internal_out.flags();
    assert!(flags.wire);
    assert!(!flags.external_in);
    assert!(!flags.external_out);
    let inward = internal_out.bundle_in().unwrap();
    let outward = internal_out.bundle_out().unwrap();
    for (a, b) in inward.iter().zip(outward.iter()) {
        assert!(Rc::ptr_eq(a, b));
    }
}

#[test]
fn test_silent_binding_builds_no_monitor() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8]));
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[4]));
    sink.bind_once_silent(&src).unwrap();

    let elaborated = scope.finish().unwrap();
    assert_eq!(elaborated.bindings, 1);
    assert!(elaborated.monitors.is_empty());
    // The wiring action still runs.
    assert!(sink.bundle_in().unwrap()[0].borrow().driven);
}

#[test]
fn test_wiring_runs_in_registration_order() {
    let (link, wired) = Link::new();
    let scope = Scope::root("top");
    let s8 = Node::source(&scope, "s8", link.clone(), offers(&[8]));
    let s16 = Node::source(&scope, "s16", link.clone(), offers(&[16]));
    let s32 = Node::source(&scope, "s32", link.clone(), offers(&[32]));
    let a = Node::sink(&scope, "a", link.clone(), demands(&[64]));
    let b = Node::sink(&scope, "b", link.clone(), demands(&[64]));
    let c = Node::sink(&scope, "c", link.clone(), demands(&[64]));
    a.bind_once(&s8).unwrap();
    b.bind_once(&s16).unwrap();
    c.bind_once(&s32).unwrap();

    scope.finish().unwrap();
    assert_eq!(*wired.borrow(), vec![8, 16, 32]);
}

#[test]
fn test_external_edges_follow_flags() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8]));
    let out = Node::output(&scope, "out", link.clone());
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[4]));
    out.bind_once(&src).unwrap();
    sink.bind_once(&out).unwrap();

    assert_eq!(out.edges_in().unwrap().len(), 1);
    assert!(out.external_edges_in().unwrap().is_empty());
    assert_eq!(out.external_edges_out().unwrap().len(), 1);
}

#[test]
fn test_child_scope_elaborates_with_parent() {
    let (link, wired) = Link::new();
    let root = Scope::root("top");
    let dma = root.child("dma");
    let src = Node::source(&dma, "engine", link.clone(), offers(&[8]));
    let sink = Node::sink(&root, "cpu", link.clone(), demands(&[4]));
    sink.bind_once(&src).unwrap();

    assert_eq!(src.qualified_name(), "top.dma.engine");
    assert_eq!(sink.qualified_name(), "top.cpu");

    let elaborated = root.finish().unwrap();
    assert_eq!(elaborated.bindings, 1);
    assert_eq!(wired.borrow().len(), 1);
    assert!(!dma.is_open());
}

#[test]
fn test_under_assigned_adapter_star() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8]));
    let ident = Node::identity(&scope, "pass", link.clone(), PortRange::any());
    let a = Node::sink(&scope, "a", link.clone(), demands(&[4]));
    let b = Node::sink(&scope, "b", link.clone(), demands(&[4]));
    let c = Node::sink(&scope, "c", link.clone(), demands(&[4]));
    // Two known outward ports against one known inward port: the outward
    // star cannot be sized.
    ident.bind_once(&src).unwrap();
    a.bind_once(&ident).unwrap();
    b.bind_once(&ident).unwrap();
    c.bind_star_right(&ident).unwrap();

    let err = ident.outward_star().unwrap_err();
    assert!(matches!(err, Error::UnderAssigned { .. }));
}

#[test]
fn test_over_assigned_source() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8]));
    let a = Node::sink(&scope, "a", link.clone(), demands(&[4]));
    let b = Node::sink(&scope, "b", link.clone(), demands(&[4]));
    a.bind_once(&src).unwrap();
    b.bind_once(&src).unwrap();

    let err = src.outward_star().unwrap_err();
    assert!(matches!(err, Error::OverAssigned { .. }));
}

#[test]
fn test_parameter_conservation() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let s1 = Node::source(&scope, "s1", link.clone(), offers(&[8, 16]));
    let s2 = Node::source(&scope, "s2", link.clone(), offers(&[32]));
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[4, 4, 4]));
    sink.bind_star_right(&s1).unwrap();
    sink.bind_star_right(&s2).unwrap();

    let mapping = sink.inward_mapping().unwrap();
    let total: usize = mapping.iter().map(|r| r.len()).sum();
    assert_eq!(sink.inward_params().unwrap().len(), total);
    assert_eq!(sink.edges_in().unwrap().len(), total);
    assert_eq!(sink.bundle_in().unwrap().len(), total);
    assert_eq!(mapping, vec![0..2, 2..3]);
}

#[test]
fn test_dot_renders_nodes_and_edges() {
    let (link, _) = Link::new();
    let scope = Scope::root("top");
    let src = Node::source(&scope, "rom", link.clone(), offers(&[8]));
    let sink = Node::sink(&scope, "cpu", link.clone(), demands(&[4]));
    let _lonely = Node::sink(&scope, "lonely", link.clone(), demands(&[]));
    sink.bind_once(&src).unwrap();

    let rendered = graph::dot(&scope).unwrap();
    assert!(rendered.contains("top.rom"));
    assert!(rendered.contains("top.cpu"));
    assert!(rendered.contains("label=\"4B\""));
    assert!(rendered.contains("#1f77b4"));
    // Nodes with no resolved ports are omitted.
    assert!(!rendered.contains("lonely"));
}

/// Downward parameter that records every node it passed through.
#[derive(Clone)]
struct TracedOffer {
    via: Vec<String>,
    origin: Option<NodeRef>,
}

#[derive(Clone, Copy)]
struct Traced;

impl Protocol for Traced {
    type Down = TracedOffer;
    type Up = ();
    type Edge = Vec<String>;
    type Bundle = ();

    fn edge(&self, down: &TracedOffer, _up: &()) -> Vec<String> {
        down.via.clone()
    }

    fn bundle(&self, _edge: &Vec<String>) {}

    fn mix_down(&self, mut down: TracedOffer, node: &NodeRef) -> TracedOffer {
        down.via.push(node.name().to_owned());
        if down.origin.is_none() {
            down.origin = Some(node.clone());
        }
        down
    }

    fn common_node(&self, down: &TracedOffer) -> Option<NodeRef> {
        down.origin.clone()
    }
}

#[test]
fn test_mix_annotates_parameters() {
    let scope = Scope::root("top");
    let src = Node::source(
        &scope,
        "rom",
        Traced,
        vec![TracedOffer {
            via: Vec::new(),
            origin: None,
        }],
    );
    let ident = Node::identity(&scope, "pass", Traced, PortRange::any());
    let sink = Node::sink(&scope, "cpu", Traced, vec![()]);
    ident.bind_star_right(&src).unwrap();
    sink.bind_star_left(&ident).unwrap();

    let edges = sink.edges_in().unwrap();
    assert_eq!(edges[0], vec!["rom".to_owned(), "pass".to_owned()]);

    let params = src.outward_params().unwrap();
    let common = Traced.common_node(&params[0]).unwrap();
    assert_eq!(common.qualified_name(), "top.rom");
}
