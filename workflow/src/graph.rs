use std::fmt;

use anyhow::Result;
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::nodes::NodeContainer;
use crate::{Error, Errors, NodeDecl, ValueKind};

/// Slot pair carried by an edge: output `from` of the source node feeds input `to`
/// of the target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub from: &'static str,
    pub to: &'static str,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: &'static str,
    from_slot: &'static str,
    to: &'static str,
    to_slot: &'static str,
}

/// Collects nodes and edges, then validates everything at once in [finish](GraphBuilder::finish).
#[derive(Debug)]
pub struct GraphBuilder {
    name: String,
    nodes: Vec<NodeDecl>,
    edges: Vec<Edge>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Take ownership of a container's nodes. Containers must be configured first.
    pub fn add_container<C: NodeContainer>(&mut self, container: C) -> Result<()> {
        if !container.is_configured() {
            return Err(Error::NotConfigured(C::LABEL).into());
        }
        for decl in container.into_nodes() {
            self.add_node(decl)?;
        }
        Ok(())
    }

    pub fn add_node(&mut self, decl: NodeDecl) -> Result<()> {
        if self.nodes.iter().any(|n| n.name == decl.name) {
            return Err(Error::DuplicateNode(decl.name.to_owned()).into());
        }
        self.nodes.push(decl);
        Ok(())
    }

    /// Connect outputs of `from` to inputs of `to`, as `(output, input)` pairs.
    /// Nothing is checked until [finish](GraphBuilder::finish).
    pub fn connect(
        &mut self,
        from: &'static str,
        to: &'static str,
        slots: &[(&'static str, &'static str)],
    ) {
        for &(from_slot, to_slot) in slots {
            self.edges.push(Edge {
                from,
                from_slot,
                to,
                to_slot,
            });
        }
    }

    /// Validate all edges and mandatory inputs and build the graph.
    /// Nodes that no edge refers to are left out.
    pub fn finish(self) -> Result<WorkflowGraph> {
        let mut errors = Errors::default();
        let mut graph = DiGraph::with_capacity(self.nodes.len(), self.edges.len());
        let mut index = util::HashMap::default();

        for decl in self.nodes {
            let referenced = self
                .edges
                .iter()
                .any(|e| e.from == decl.name || e.to == decl.name);
            if referenced {
                let name = decl.name;
                index.insert(name, graph.add_node(decl));
            } else {
                log::debug!("leaving out unconnected node '{}'", decl.name);
            }
        }

        let mut connected: util::HashSet<(&'static str, &'static str)> = Default::default();

        for edge in &self.edges {
            let (Some(&from_ix), Some(&to_ix)) = (index.get(edge.from), index.get(edge.to)) else {
                for name in [edge.from, edge.to] {
                    if !index.contains_key(name) {
                        errors.add_context(
                            Error::UnknownNode(name.to_owned()).into(),
                            format!("while connecting '{}' to '{}'", edge.from, edge.to),
                        );
                    }
                }
                continue;
            };

            let from_node: &NodeDecl = &graph[from_ix];
            let to_node: &NodeDecl = &graph[to_ix];

            let Some(output) = from_node.output(edge.from_slot) else {
                errors.add(Error::UnknownOutput(edge.from.to_owned(), edge.from_slot.to_owned()));
                continue;
            };
            let to_kind = if to_node.open {
                ValueKind::Any
            } else if let Some(input) = to_node.input(edge.to_slot) {
                input.kind
            } else {
                errors.add(Error::UnknownInput(edge.to.to_owned(), edge.to_slot.to_owned()));
                continue;
            };

            let mut ok = true;
            if !to_kind.accepts(output.kind) {
                errors.add(Error::IncompatibleEdge {
                    from: format!("{}.{}", edge.from, edge.from_slot),
                    to: format!("{}.{}", edge.to, edge.to_slot),
                    from_kind: output.kind,
                    to_kind,
                });
                ok = false;
            }
            if !connected.insert((edge.to, edge.to_slot)) {
                errors.add(Error::DuplicateConnection(edge.to.to_owned(), edge.to_slot.to_owned()));
                ok = false;
            }
            if to_node.values.contains_key(edge.to_slot) {
                errors.add(Error::OverridesDefault(edge.to.to_owned(), edge.to_slot.to_owned()));
                ok = false;
            }

            if ok {
                let conn = Connection {
                    from: edge.from_slot,
                    to: edge.to_slot,
                };
                graph.add_edge(from_ix, to_ix, conn);
            }
        }

        for decl in graph.node_weights() {
            for input in decl.inputs.iter().filter(|i| i.mandatory) {
                let filled = decl.values.contains_key(input.name)
                    || connected.contains(&(decl.name, input.name))
                    || input.name_source.is_some();
                if !filled {
                    errors.add(Error::UnconnectedMandatory(
                        decl.name.to_owned(),
                        input.name.to_owned(),
                    ));
                }
            }
        }

        if let Err(cycle) = petgraph::algo::toposort(&graph, None) {
            errors.add(Error::Cycle(graph[cycle.node_id()].name.to_owned()));
        }

        errors.print_recap("assembling workflow graph")?;

        log::debug!(
            "assembled workflow '{}' with {} nodes and {} edges",
            self.name,
            graph.node_count(),
            graph.edge_count()
        );
        Ok(WorkflowGraph {
            name: self.name,
            graph,
            index,
        })
    }
}

/// Validated, acyclic workflow: nodes with their defaults, and one edge per connected slot.
#[derive(Debug)]
pub struct WorkflowGraph {
    name: String,
    graph: DiGraph<NodeDecl, Connection>,
    index: util::HashMap<&'static str, NodeIndex>,
}

impl WorkflowGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn find(&self, name: &str) -> Result<NodeIndex> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownNode(name.to_owned()).into())
    }

    pub fn node(&self, ix: NodeIndex) -> &NodeDecl {
        &self.graph[ix]
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> {
        self.graph.node_indices()
    }

    /// Upstream nodes of `ix`, with the slots each edge connects.
    pub fn incoming(&self, ix: NodeIndex) -> impl Iterator<Item = (NodeIndex, &Connection)> {
        self.graph
            .edges_directed(ix, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
    }

    /// Nodes whose outputs nothing consumes: sinks, plus any dead ends.
    pub fn goals(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|ix| {
                self.graph
                    .edges_directed(*ix, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .collect()
    }

    pub fn has_edge(&self, from: &str, from_slot: &str, to: &str, to_slot: &str) -> bool {
        let (Some(from_ix), Some(to_ix)) = (self.index.get(from), self.index.get(to)) else {
            return false;
        };
        self.graph
            .edges_connecting(*from_ix, *to_ix)
            .any(|e| e.weight().from == from_slot && e.weight().to == to_slot)
    }

    /// Graphviz rendering of the whole graph.
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::with_config(&self.graph, &[]))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::interfaces::{builtins, mrtrix};
    use crate::AggregatedErrors;

    fn builder() -> Result<GraphBuilder> {
        let mut b = GraphBuilder::new("test");
        let mut denoise = mrtrix::denoise("denoise");
        denoise.set("noise", "noise.mif")?;
        denoise.set("out_file", "denoised.mif")?;
        let mut degibbs = mrtrix::degibbs("ringing_removal");
        degibbs.set("out_file", "unring.mif")?;
        let mut convert = mrtrix::convert("mrconvert");
        convert.set("in_file", "/bids/dwi.nii.gz")?;
        b.add_node(convert)?;
        b.add_node(denoise)?;
        b.add_node(degibbs)?;
        b.add_node(builtins::datasink("datasink", "/out".into()))?;
        Ok(b)
    }

    fn error_count(result: Result<WorkflowGraph>) -> usize {
        result
            .unwrap_err()
            .downcast_ref::<AggregatedErrors>()
            .map_or(0, |agg| agg.1)
    }

    #[test]
    fn test_chain() -> Result<()> {
        let mut b = builder()?;
        b.connect("mrconvert", "denoise", &[("out_file", "in_file")]);
        b.connect("denoise", "ringing_removal", &[("out_file", "in_file")]);
        b.connect("ringing_removal", "datasink", &[("out_file", "preproc.@unring")]);
        let graph = b.finish()?;
        assert_eq!(4, graph.len());
        assert!(graph.has_edge("denoise", "out_file", "ringing_removal", "in_file"));
        assert_eq!(vec![graph.find("datasink")?], graph.goals());
        assert!(graph.to_dot().contains("out_file -> in_file"));
        Ok(())
    }

    #[test]
    fn test_unconnected_nodes_dropped() -> Result<()> {
        let mut b = builder()?;
        b.connect("mrconvert", "denoise", &[("out_file", "in_file")]);
        b.connect("denoise", "datasink", &[("out_file", "denoised")]);
        let graph = b.finish()?;
        assert!(!graph.contains("ringing_removal"));
        Ok(())
    }

    #[test]
    fn test_dangling_edge() -> Result<()> {
        let mut b = builder()?;
        b.connect("mrconvert", "denoise", &[("out_file", "in_file")]);
        b.connect("mrgrid", "denoise", &[("out_file", "in_file")]);
        assert!(b.finish().is_err());
        Ok(())
    }

    #[test]
    fn test_slot_errors() -> Result<()> {
        let mut b = builder()?;
        b.connect("mrconvert", "denoise", &[("out_file", "in_file")]);
        // unknown output, unknown input, duplicate:
        b.connect("mrconvert", "ringing_removal", &[("out_mask", "in_file")]);
        b.connect("mrconvert", "ringing_removal", &[("out_file", "mask")]);
        b.connect("mrconvert", "denoise", &[("out_bfile", "in_file")]);
        // ...and ringing_removal.in_file is still unconnected:
        assert_eq!(4, error_count(b.finish()));
        Ok(())
    }

    #[test]
    fn test_overrides_default() -> Result<()> {
        let mut b = builder()?;
        b.connect("mrconvert", "denoise", &[("out_file", "in_file")]);
        b.connect(
            "denoise",
            "ringing_removal",
            &[("out_file", "in_file"), ("noise", "out_file")],
        );
        assert_eq!(1, error_count(b.finish()));
        Ok(())
    }

    #[test]
    fn test_unconnected_mandatory() -> Result<()> {
        let mut b = builder()?;
        // ringing_removal.in_file is left unconnected:
        b.connect("ringing_removal", "datasink", &[("out_file", "unring")]);
        assert_eq!(1, error_count(b.finish()));
        Ok(())
    }

    #[test]
    fn test_cycle() -> Result<()> {
        let mut b = builder()?;
        b.connect("ringing_removal", "denoise", &[("out_file", "in_file")]);
        b.connect("denoise", "ringing_removal", &[("out_file", "in_file")]);
        assert_eq!(1, error_count(b.finish()));
        Ok(())
    }

    #[test]
    fn test_incompatible_kinds() -> Result<()> {
        let mut b = GraphBuilder::new("test");
        b.add_node(builtins::gradient_files("sub_grad_files", "nii.gz"))?;
        let mut gradcheck = mrtrix::gradcheck("dwigradcheck");
        gradcheck.set("in_file", "dwi.mif")?;
        b.add_node(gradcheck)?;
        b.connect("sub_grad_files", "dwigradcheck", &[("fslgrad", "grad_file")]);
        // gradient lookup's own mandatory input is also unconnected:
        assert_eq!(2, error_count(b.finish()));
        Ok(())
    }
}
