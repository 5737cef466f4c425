//!
//! The functions in this mod order the nodes of a [`WorkflowGraph`](workflow::WorkflowGraph)
//! for execution by the structs in the `exec` mod of the main crate.
//!
//! The traversal is created in 3 steps:
//! 1. Perform a DFS backwards from the goal node(s) (sinks and other dead ends),
//!    emitting each node after all of its antecedents.
//! 2. Collect the iterable fields and expand them into realizations
//!    (the cross product over iterable nodes, with fields synchronized inside one node).
//! 3. Step forward through the ordered nodes, recording which iterable fields
//!    each node depends on, so that nodes upstream of an iterable are run once
//!    rather than once per realization.

/// post-order DFS from the goals
mod dfs;

/// struct returned by this mod
mod traversal;
pub use traversal::Traversal;

mod realization;
pub use realization::{Realization, RealizationId};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Workflow graph contains a cycle through node '{0}'")]
    Cycle(String),
    #[error("Iterable node '{0}' has a row with {1} values for {2} fields")]
    RaggedIterables(String, usize, usize),
    #[error("Field '{0}' is iterated by more than one node")]
    DuplicateField(String),
}
