//! Graphviz DOT output for an elaborated scope.
//!
//! Walks the untyped `inputs`/`outputs` surface of every node in a scope
//! subtree and emits a DOT digraph suitable for rendering with `dot` or any
//! other Graphviz layout engine. Rendering observes derived fields, so it
//! participates in (and may trigger) resolution.

use std::fmt::Write;

use crate::error::Result;
use crate::node::NodeRef;
use crate::scope::Scope;

/// Emit the scope's node graph as a Graphviz DOT string.
///
/// Nodes whose `omit_graph` is true are skipped. Each protocol's `colour`
/// styles its nodes; a protocol whose `reverse` is true has its edges drawn
/// against the flow of downward parameters.
pub fn dot(scope: &Scope) -> Result<String> {
    let nodes = scope.nodes();
    let mut buf = String::new();
    writeln!(buf, "digraph {} {{", sanitize(scope.path())).unwrap();
    writeln!(buf, "    rankdir=LR;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10, shape=box];").unwrap();
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];").unwrap();

    for node in &nodes {
        if node.omit_graph()? {
            continue;
        }
        writeln!(
            buf,
            "    {} [label=\"{}\\n{}\", color=\"{}\"];",
            node_id(node),
            node.qualified_name(),
            node.shape_name(),
            node.colour()
        )
        .unwrap();
    }

    for node in &nodes {
        if node.omit_graph()? {
            continue;
        }
        for (peer, label) in node.outputs()? {
            let (tail, head) = if node.graph_reversed() {
                (node_id(&peer), node_id(node))
            } else {
                (node_id(node), node_id(&peer))
            };
            if label.is_empty() {
                writeln!(buf, "    {tail} -> {head};").unwrap();
            } else {
                writeln!(buf, "    {tail} -> {head} [label=\"{label}\"];").unwrap();
            }
        }
    }

    writeln!(buf, "}}").unwrap();
    Ok(buf)
}

fn node_id(node: &NodeRef) -> String {
    format!("{}_{}", sanitize(node.qualified_name()), node.index())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
