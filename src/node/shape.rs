//! The node catalog.
//!
//! Each concrete node shape fixes three policy functions — star resolution,
//! downward parameter mapping, upward parameter mapping — and the four
//! bundle-visibility flags. The catalog constructors on [`Node`] are the
//! only way to create nodes.

use std::rc::Rc;

use crate::error::{Error, Result, SourceInfo};
use crate::protocol::{BundleRef, Protocol};
use crate::scope::Scope;

use super::{Node, NodeCore, NodeFlags, PortRange};

/// Argument handed to a splitter's mapping functions.
///
/// `n` is the number of parameters the mapping must produce; `params` are
/// the parameters collected from the opposite side. The divisibility
/// between the two has already been checked when the mapping runs.
pub struct SplitterArg<'a, T> {
    /// Number of parameters the mapping must return.
    pub n: usize,
    /// Parameters collected from the opposite side.
    pub params: &'a [T],
}

/// Boxed splitter mapping function.
pub type SplitterMap<T, R> = Box<dyn Fn(SplitterArg<'_, T>) -> Vec<R>>;

/// Per-shape policy data.
///
/// The identity, output, input, blind and internal shapes are adapter,
/// source or sink policies underneath; what distinguishes them lives in
/// [`NodeFlags`] and [`BundleAlias`].
pub(crate) enum Shape<I: Protocol, O: Protocol> {
    /// 1:1 parameter transform.
    Adapter {
        d_fn: Box<dyn Fn(&I::Down) -> O::Down>,
        u_fn: Box<dyn Fn(&O::Up) -> I::Up>,
    },
    /// Many-to-many collapse: all inputs fuse to one value, replicated out.
    Nexus {
        d_fn: Box<dyn Fn(&[I::Down]) -> O::Down>,
        u_fn: Box<dyn Fn(&[O::Up]) -> I::Up>,
    },
    /// Divisible fan-out of the inward side.
    Splitter {
        d_fn: SplitterMap<I::Down, O::Down>,
        u_fn: SplitterMap<O::Up, I::Up>,
    },
    /// Fixed downward parameters, no inward side.
    Source { down: Vec<O::Down> },
    /// Fixed upward parameters, no outward side.
    Sink { up: Vec<I::Up> },
}

/// Bundle aliasing between the two sides of a node.
///
/// Output, input, blind and internal nodes expose one side's bundles as the
/// other's. The closure is built by the homogeneous constructors, where the
/// two bundle types coincide, and simply clones the shared handles so both
/// accessors return the same underlying objects.
pub(crate) enum BundleAlias<I: Protocol, O: Protocol> {
    /// Each side materialises its own bundles.
    None,
    /// The inward bundles are the outward bundles.
    #[allow(clippy::type_complexity)]
    InFromOut(Box<dyn Fn(&[BundleRef<O::Bundle>]) -> Vec<BundleRef<I::Bundle>>>),
    /// The outward bundles are the inward bundles.
    #[allow(clippy::type_complexity)]
    OutFromIn(Box<dyn Fn(&[BundleRef<I::Bundle>]) -> Vec<BundleRef<O::Bundle>>>),
}

/// Inputs to a shape's star-resolution policy, plus diagnostic context.
pub(crate) struct StarCx<'a> {
    pub node: &'a str,
    pub at: SourceInfo,
    pub i_known: usize,
    pub o_known: usize,
    pub i_stars: usize,
    pub o_stars: usize,
    /// Rendered source locations of the star bindings, for diagnostics.
    pub star_sites: String,
}

impl<I: Protocol, O: Protocol> Shape<I, O> {
    /// Resolve this node's star widths from the known binding widths.
    pub(crate) fn resolve_star(&self, cx: &StarCx<'_>) -> Result<(usize, usize)> {
        match self {
            Shape::Adapter { .. } => {
                if cx.i_stars + cx.o_stars > 1 {
                    return Err(Error::star_shape(
                        cx.node,
                        format!(
                            "an adapter accepts at most one star binding, got {} inward and {} outward{}",
                            cx.i_stars, cx.o_stars, cx.star_sites
                        ),
                        Some(cx.at),
                    ));
                }
                if cx.o_stars > 0 {
                    if cx.i_known < cx.o_known {
                        return Err(Error::under_assigned(
                            cx.node,
                            format!(
                                "cannot size the outward star: {} known inward ports < {} known outward ports",
                                cx.i_known, cx.o_known
                            ),
                            Some(cx.at),
                        ));
                    }
                    Ok((0, cx.i_known - cx.o_known))
                } else if cx.i_stars > 0 {
                    if cx.o_known < cx.i_known {
                        return Err(Error::under_assigned(
                            cx.node,
                            format!(
                                "cannot size the inward star: {} known outward ports < {} known inward ports",
                                cx.o_known, cx.i_known
                            ),
                            Some(cx.at),
                        ));
                    }
                    Ok((cx.o_known - cx.i_known, 0))
                } else {
                    Ok((0, 0))
                }
            }
            Shape::Nexus { .. } => {
                if cx.i_stars > 0 || cx.o_stars > 0 {
                    return Err(Error::star_shape(
                        cx.node,
                        format!(
                            "a nexus accepts no star bindings, got {} inward and {} outward{}",
                            cx.i_stars, cx.o_stars, cx.star_sites
                        ),
                        Some(cx.at),
                    ));
                }
                Ok((0, 0))
            }
            Shape::Splitter { .. } => {
                if cx.i_stars > 0 {
                    return Err(Error::star_shape(
                        cx.node,
                        format!(
                            "a splitter accepts no inward star bindings, got {}{}",
                            cx.i_stars, cx.star_sites
                        ),
                        Some(cx.at),
                    ));
                }
                if cx.o_known > 0 {
                    return Err(Error::star_shape(
                        cx.node,
                        format!(
                            "a splitter's outward bindings must all be stars, got {} known outward ports",
                            cx.o_known
                        ),
                        Some(cx.at),
                    ));
                }
                Ok((0, cx.i_known))
            }
            Shape::Source { down } => {
                if cx.o_stars > 1 {
                    return Err(Error::star_shape(
                        cx.node,
                        format!(
                            "a source accepts at most one outward star binding, got {}{}",
                            cx.o_stars, cx.star_sites
                        ),
                        Some(cx.at),
                    ));
                }
                if down.len() < cx.o_known {
                    return Err(Error::over_assigned(
                        cx.node,
                        format!(
                            "{} known outward ports exceed the {} downward parameters supplied",
                            cx.o_known,
                            down.len()
                        ),
                        Some(cx.at),
                    ));
                }
                Ok((0, down.len() - cx.o_known))
            }
            Shape::Sink { up } => {
                if cx.i_stars > 1 {
                    return Err(Error::star_shape(
                        cx.node,
                        format!(
                            "a sink accepts at most one inward star binding, got {}{}",
                            cx.i_stars, cx.star_sites
                        ),
                        Some(cx.at),
                    ));
                }
                if up.len() < cx.i_known {
                    return Err(Error::over_assigned(
                        cx.node,
                        format!(
                            "{} known inward ports exceed the {} upward parameters supplied",
                            cx.i_known,
                            up.len()
                        ),
                        Some(cx.at),
                    ));
                }
                Ok((up.len() - cx.i_known, 0))
            }
        }
    }

    /// Map the collected inward downward parameters to `n` outward ones.
    pub(crate) fn map_down(
        &self,
        node: &str,
        at: SourceInfo,
        n: usize,
        incoming: &[I::Down],
    ) -> Result<Vec<O::Down>> {
        match self {
            Shape::Adapter { d_fn, .. } => {
                if incoming.len() != n {
                    return Err(Error::param_mismatch(
                        node,
                        format!(
                            "an adapter carries {} inward ports but {} outward ports; they must match",
                            incoming.len(),
                            n
                        ),
                        Some(at),
                    ));
                }
                Ok(incoming.iter().map(d_fn).collect())
            }
            Shape::Nexus { d_fn, .. } => {
                if n == 0 {
                    return Ok(Vec::new());
                }
                let fused = d_fn(incoming);
                Ok(vec![fused; n])
            }
            Shape::Splitter { d_fn, .. } => {
                if !incoming.is_empty() && n % incoming.len() != 0 {
                    return Err(Error::param_mismatch(
                        node,
                        format!(
                            "fan-out of {} outward ports is not divisible by {} inward ports",
                            n,
                            incoming.len()
                        ),
                        Some(at),
                    ));
                }
                let out = d_fn(SplitterArg {
                    n,
                    params: incoming,
                });
                if out.len() != n {
                    return Err(Error::param_mismatch(
                        node,
                        format!(
                            "splitter mapping produced {} downward parameters, expected {}",
                            out.len(),
                            n
                        ),
                        Some(at),
                    ));
                }
                Ok(out)
            }
            Shape::Source { down } => {
                if n != down.len() {
                    return Err(Error::param_mismatch(
                        node,
                        format!(
                            "source supplies {} downward parameters but resolved {} outward ports",
                            down.len(),
                            n
                        ),
                        Some(at),
                    ));
                }
                Ok(down.clone())
            }
            Shape::Sink { .. } => {
                if n != 0 {
                    return Err(Error::param_mismatch(
                        node,
                        "a sink maps no downward parameters",
                        Some(at),
                    ));
                }
                Ok(Vec::new())
            }
        }
    }

    /// Map the collected outward upward parameters to `n` inward ones.
    pub(crate) fn map_up(
        &self,
        node: &str,
        at: SourceInfo,
        n: usize,
        incoming: &[O::Up],
    ) -> Result<Vec<I::Up>> {
        match self {
            Shape::Adapter { u_fn, .. } => {
                if incoming.len() != n {
                    return Err(Error::param_mismatch(
                        node,
                        format!(
                            "an adapter carries {} outward ports but {} inward ports; they must match",
                            incoming.len(),
                            n
                        ),
                        Some(at),
                    ));
                }
                Ok(incoming.iter().map(u_fn).collect())
            }
            Shape::Nexus { u_fn, .. } => {
                if n == 0 {
                    return Ok(Vec::new());
                }
                let fused = u_fn(incoming);
                Ok(vec![fused; n])
            }
            Shape::Splitter { u_fn, .. } => {
                if n != 0 && incoming.len() % n != 0 {
                    return Err(Error::param_mismatch(
                        node,
                        format!(
                            "{} outward ports do not divide evenly into {} inward ports",
                            incoming.len(),
                            n
                        ),
                        Some(at),
                    ));
                }
                let out = u_fn(SplitterArg {
                    n,
                    params: incoming,
                });
                if out.len() != n {
                    return Err(Error::param_mismatch(
                        node,
                        format!(
                            "splitter mapping produced {} upward parameters, expected {}",
                            out.len(),
                            n
                        ),
                        Some(at),
                    ));
                }
                Ok(out)
            }
            Shape::Source { .. } => {
                if n != 0 {
                    return Err(Error::param_mismatch(
                        node,
                        "a source maps no upward parameters",
                        Some(at),
                    ));
                }
                Ok(Vec::new())
            }
            Shape::Sink { up } => {
                if n != up.len() {
                    return Err(Error::param_mismatch(
                        node,
                        format!(
                            "sink supplies {} upward parameters but resolved {} inward ports",
                            up.len(),
                            n
                        ),
                        Some(at),
                    ));
                }
                Ok(up.clone())
            }
        }
    }
}

impl<I: Protocol, O: Protocol> Node<I, O> {
    /// Create an adapter: a 1:1 parameter transform between two protocols.
    ///
    /// `num` bounds the port count, which must match on both sides.
    #[track_caller]
    pub fn adapter(
        scope: &Scope,
        name: impl Into<String>,
        protocol_in: I,
        protocol_out: O,
        num: PortRange,
        d_fn: impl Fn(&I::Down) -> O::Down + 'static,
        u_fn: impl Fn(&O::Up) -> I::Up + 'static,
    ) -> Self {
        let core = NodeCore::register(
            scope,
            name.into(),
            "adapter",
            Rc::new(protocol_in),
            Rc::new(protocol_out),
            Shape::Adapter {
                d_fn: Box::new(d_fn),
                u_fn: Box::new(u_fn),
            },
            BundleAlias::None,
            NodeFlags::default(),
            num,
            num,
            SourceInfo::caller(),
        );
        Self { core }
    }

    /// Create a nexus: a many-to-many fan point that collapses all inward
    /// parameters to one value and replicates it outward (and vice versa).
    #[track_caller]
    pub fn nexus(
        scope: &Scope,
        name: impl Into<String>,
        protocol_in: I,
        protocol_out: O,
        d_fn: impl Fn(&[I::Down]) -> O::Down + 'static,
        u_fn: impl Fn(&[O::Up]) -> I::Up + 'static,
    ) -> Self {
        let core = NodeCore::register(
            scope,
            name.into(),
            "nexus",
            Rc::new(protocol_in),
            Rc::new(protocol_out),
            Shape::Nexus {
                d_fn: Box::new(d_fn),
                u_fn: Box::new(u_fn),
            },
            BundleAlias::None,
            NodeFlags::default(),
            PortRange::any(),
            PortRange::any(),
            SourceInfo::caller(),
        );
        Self { core }
    }

    /// Create a splitter: its inward ports fan out to a divisible outward
    /// multiplicity chosen by the outward star bindings.
    #[track_caller]
    pub fn splitter(
        scope: &Scope,
        name: impl Into<String>,
        protocol_in: I,
        protocol_out: O,
        d_fn: impl Fn(SplitterArg<'_, I::Down>) -> Vec<O::Down> + 'static,
        u_fn: impl Fn(SplitterArg<'_, O::Up>) -> Vec<I::Up> + 'static,
    ) -> Self {
        let core = NodeCore::register(
            scope,
            name.into(),
            "splitter",
            Rc::new(protocol_in),
            Rc::new(protocol_out),
            Shape::Splitter {
                d_fn: Box::new(d_fn),
                u_fn: Box::new(u_fn),
            },
            BundleAlias::None,
            NodeFlags::default(),
            PortRange::any(),
            PortRange::any(),
            SourceInfo::caller(),
        );
        Self { core }
    }
}

impl<P: Protocol> Node<P> {
    /// Create a source holding a fixed sequence of downward parameters, one
    /// per outward port. Sources accept no inward bindings.
    #[track_caller]
    pub fn source(
        scope: &Scope,
        name: impl Into<String>,
        protocol: P,
        down: Vec<P::Down>,
    ) -> Self {
        Self::source_with(
            scope,
            name,
            protocol,
            down,
            "source",
            NodeFlags::default(),
            false,
            SourceInfo::caller(),
        )
    }

    /// Create a sink holding a fixed sequence of upward parameters, one per
    /// inward port. Sinks accept no outward bindings.
    #[track_caller]
    pub fn sink(scope: &Scope, name: impl Into<String>, protocol: P, up: Vec<P::Up>) -> Self {
        Self::sink_with(
            scope,
            name,
            protocol,
            up,
            "sink",
            NodeFlags::default(),
            false,
            SourceInfo::caller(),
        )
    }

    /// Create an identity node: an adapter whose parameter transforms are
    /// the identity.
    #[track_caller]
    pub fn identity(scope: &Scope, name: impl Into<String>, protocol: P, num: PortRange) -> Self {
        Self::identity_with(
            scope,
            name,
            protocol,
            num,
            "identity",
            NodeFlags::default(),
            BundleAliasKind::None,
            SourceInfo::caller(),
        )
    }

    /// Create an output node: an identity whose inward side is hidden from
    /// the enclosing module, aliasing the outward bundles.
    #[track_caller]
    pub fn output(scope: &Scope, name: impl Into<String>, protocol: P) -> Self {
        Self::identity_with(
            scope,
            name,
            protocol,
            PortRange::any(),
            "output",
            NodeFlags {
                external_in: false,
                ..NodeFlags::default()
            },
            BundleAliasKind::InFromOut,
            SourceInfo::caller(),
        )
    }

    /// Create an input node: an identity whose outward side is hidden from
    /// the enclosing module, aliasing the inward bundles.
    #[track_caller]
    pub fn input(scope: &Scope, name: impl Into<String>, protocol: P) -> Self {
        Self::identity_with(
            scope,
            name,
            protocol,
            PortRange::any(),
            "input",
            NodeFlags {
                external_out: false,
                ..NodeFlags::default()
            },
            BundleAliasKind::OutFromIn,
            SourceInfo::caller(),
        )
    }

    /// Create a blind output: a source whose bundles face inward when
    /// exposed, with the hidden side aliased to the visible one.
    #[track_caller]
    pub fn blind_output(
        scope: &Scope,
        name: impl Into<String>,
        protocol: P,
        down: Vec<P::Down>,
    ) -> Self {
        Self::source_with(
            scope,
            name,
            protocol,
            down,
            "blind-output",
            NodeFlags {
                external_in: false,
                flip: true,
                ..NodeFlags::default()
            },
            true,
            SourceInfo::caller(),
        )
    }

    /// Create a blind input: a sink whose bundles face outward when
    /// exposed, with the hidden side aliased to the visible one.
    #[track_caller]
    pub fn blind_input(
        scope: &Scope,
        name: impl Into<String>,
        protocol: P,
        up: Vec<P::Up>,
    ) -> Self {
        Self::sink_with(
            scope,
            name,
            protocol,
            up,
            "blind-input",
            NodeFlags {
                external_out: false,
                flip: true,
                ..NodeFlags::default()
            },
            true,
            SourceInfo::caller(),
        )
    }

    /// Create an internal output: a sink hidden on both sides whose bundles
    /// materialise as free wires rather than module ports.
    #[track_caller]
    pub fn internal_output(
        scope: &Scope,
        name: impl Into<String>,
        protocol: P,
        up: Vec<P::Up>,
    ) -> Self {
        Self::sink_with(
            scope,
            name,
            protocol,
            up,
            "internal-output",
            NodeFlags {
                external_in: false,
                external_out: false,
                wire: true,
                ..NodeFlags::default()
            },
            true,
            SourceInfo::caller(),
        )
    }

    /// Create an internal input: a source hidden on both sides whose
    /// bundles materialise as free wires rather than module ports.
    #[track_caller]
    pub fn internal_input(
        scope: &Scope,
        name: impl Into<String>,
        protocol: P,
        down: Vec<P::Down>,
    ) -> Self {
        Self::source_with(
            scope,
            name,
            protocol,
            down,
            "internal-input",
            NodeFlags {
                external_in: false,
                external_out: false,
                wire: true,
                ..NodeFlags::default()
            },
            true,
            SourceInfo::caller(),
        )
    }

    fn source_with(
        scope: &Scope,
        name: impl Into<String>,
        protocol: P,
        down: Vec<P::Down>,
        label: &'static str,
        flags: NodeFlags,
        alias_hidden_side: bool,
        at: SourceInfo,
    ) -> Self {
        let protocol = Rc::new(protocol);
        let alias = if alias_hidden_side {
            BundleAlias::InFromOut(Box::new(|bundles: &[BundleRef<P::Bundle>]| {
                bundles.to_vec()
            }))
        } else {
            BundleAlias::None
        };
        let outward = PortRange::exactly(down.len());
        let core = NodeCore::register(
            scope,
            name.into(),
            label,
            protocol.clone(),
            protocol,
            Shape::Source { down },
            alias,
            flags,
            PortRange::exactly(0),
            outward,
            at,
        );
        Self { core }
    }

    fn sink_with(
        scope: &Scope,
        name: impl Into<String>,
        protocol: P,
        up: Vec<P::Up>,
        label: &'static str,
        flags: NodeFlags,
        alias_hidden_side: bool,
        at: SourceInfo,
    ) -> Self {
        let protocol = Rc::new(protocol);
        let alias = if alias_hidden_side {
            BundleAlias::OutFromIn(Box::new(|bundles: &[BundleRef<P::Bundle>]| {
                bundles.to_vec()
            }))
        } else {
            BundleAlias::None
        };
        let inward = PortRange::exactly(up.len());
        let core = NodeCore::register(
            scope,
            name.into(),
            label,
            protocol.clone(),
            protocol,
            Shape::Sink { up },
            alias,
            flags,
            inward,
            PortRange::exactly(0),
            at,
        );
        Self { core }
    }

    fn identity_with(
        scope: &Scope,
        name: impl Into<String>,
        protocol: P,
        num: PortRange,
        label: &'static str,
        flags: NodeFlags,
        alias: BundleAliasKind,
        at: SourceInfo,
    ) -> Self {
        let protocol = Rc::new(protocol);
        let alias = match alias {
            BundleAliasKind::None => BundleAlias::None,
            BundleAliasKind::InFromOut => {
                BundleAlias::InFromOut(Box::new(|bundles: &[BundleRef<P::Bundle>]| {
                    bundles.to_vec()
                }))
            }
            BundleAliasKind::OutFromIn => {
                BundleAlias::OutFromIn(Box::new(|bundles: &[BundleRef<P::Bundle>]| {
                    bundles.to_vec()
                }))
            }
        };
        let core = NodeCore::register(
            scope,
            name.into(),
            label,
            protocol.clone(),
            protocol,
            Shape::Adapter {
                d_fn: Box::new(|d: &P::Down| d.clone()),
                u_fn: Box::new(|u: &P::Up| u.clone()),
            },
            alias,
            flags,
            num,
            num,
            at,
        );
        Self { core }
    }
}

/// Which side, if any, aliases the other's bundles.
enum BundleAliasKind {
    None,
    InFromOut,
    OutFromIn,
}
