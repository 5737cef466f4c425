use anyhow::Result;
use colored::Colorize;

use workflow::{NodeIndex, WorkflowGraph};

use super::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first traversal over incoming edges, producing run order.
pub struct DfsTraverser<'a> {
    graph: &'a WorkflowGraph,
    marks: util::HashMap<NodeIndex, Mark>,
    order: Vec<NodeIndex>,
}

impl<'a> DfsTraverser<'a> {
    pub fn new(graph: &'a WorkflowGraph) -> Self {
        Self {
            graph,
            marks: util::HashMap::default(),
            order: Vec::with_capacity(graph.len()),
        }
    }

    /// Consume this struct and return the completed ordering.
    pub fn into_order(self) -> Vec<NodeIndex> {
        self.order
    }

    /// Add `goal` and everything it depends on, antecedents first.
    pub fn traverse(&mut self, goal: NodeIndex) -> Result<()> {
        match self.marks.get(&goal) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(Error::Cycle(self.graph.node(goal).name.to_owned()).into())
            }
            None => (),
        }
        self.marks.insert(goal, Mark::Visiting);

        let mut upstream: Vec<NodeIndex> = self.graph.incoming(goal).map(|(src, _)| src).collect();
        // petgraph lists incoming edges newest first; sort for a stable order:
        upstream.sort_unstable();
        upstream.dedup();
        for up in upstream {
            self.traverse(up)?;
        }

        log::trace!("ordered {}", self.graph.node(goal).name.cyan());
        self.marks.insert(goal, Mark::Done);
        self.order.push(goal);
        Ok(())
    }
}
