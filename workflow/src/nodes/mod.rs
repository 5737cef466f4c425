//! Node containers: the nodes of one pipeline stage, keyed by name.

use anyhow::Result;

use crate::{Error, NodeDecl, Value};

mod acpc;
mod postproc;
mod preproc;

pub use acpc::AcpcNodes;
pub use postproc::PostProcNodes;
pub use preproc::PreProcNodes;

/// Explicit name → declaration mapping, in insertion order.
#[derive(Debug, Default, Clone)]
pub struct NodeSet {
    nodes: Vec<NodeDecl>,
}

impl NodeSet {
    pub fn add(&mut self, decl: NodeDecl) -> Result<()> {
        if self.contains(decl.name) {
            return Err(Error::DuplicateNode(decl.name.to_owned()).into());
        }
        self.nodes.push(decl);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.iter().any(|n| n.name == name)
    }

    pub fn get(&self, name: &str) -> Result<&NodeDecl> {
        self.nodes
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| Error::UnknownNode(name.to_owned()).into())
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut NodeDecl> {
        self.nodes
            .iter_mut()
            .find(|n| n.name == name)
            .ok_or_else(|| Error::UnknownNode(name.to_owned()).into())
    }

    /// Give `slot` of `node` a default value.
    pub fn set(&mut self, node: &str, slot: &'static str, value: impl Into<Value>) -> Result<()> {
        self.get_mut(node)?.set(slot, value)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.nodes.iter().map(|n| n.name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl IntoIterator for NodeSet {
    type Item = NodeDecl;
    type IntoIter = std::vec::IntoIter<NodeDecl>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

/// A group of nodes for one pipeline stage.
///
/// Lifecycle: [new](NodeContainer::new) decides which nodes exist,
/// [configure_defaults](NodeContainer::configure_defaults) fills in output
/// names and tool parameters once, then the container is handed to the
/// assembler, which only adds edges.
pub trait NodeContainer: Sized {
    type Config;

    /// used in error messages
    const LABEL: &'static str;

    fn new(config: &Self::Config) -> Result<Self>;

    fn configure_defaults(&mut self, config: &Self::Config) -> Result<()>;

    fn is_configured(&self) -> bool;

    /// The node names this container must hold under `config`.
    fn expected_nodes(config: &Self::Config) -> Vec<&'static str>;

    fn nodes(&self) -> &NodeSet;

    fn into_nodes(self) -> NodeSet;

    /// Construct, configure, and check the result against the expected schema.
    fn build(config: &Self::Config) -> Result<Self> {
        let mut container = Self::new(config)?;
        container.configure_defaults(config)?;
        container.check_schema(config)?;
        Ok(container)
    }

    fn check_schema(&self, config: &Self::Config) -> Result<()> {
        let expected = Self::expected_nodes(config);
        let missing: Vec<_> = expected
            .iter()
            .copied()
            .filter(|name| !self.nodes().contains(name))
            .collect();
        let unexpected: Vec<_> = self
            .nodes()
            .names()
            .filter(|name| !expected.contains(name))
            .collect();
        if missing.is_empty() && unexpected.is_empty() {
            Ok(())
        } else {
            Err(Error::SchemaMismatch(Self::LABEL, missing, unexpected).into())
        }
    }
}
