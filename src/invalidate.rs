use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;

use traverse::Traversal;
use util::HashSet;
use workflow::{NodeIndex, WorkflowGraph};

use crate::fs::Fs;
use crate::ui::{Status, Ui};

/// Logic for invalidating nodes from previous executions.
pub struct Invalidator<'a> {
    fs: &'a Fs,
    ui: &'a Ui,
    graph: &'a WorkflowGraph,
    traversal: &'a Traversal,
}

impl<'a> Invalidator<'a> {
    /// Create a new `Invalidator`.
    pub fn new(
        graph: &'a WorkflowGraph,
        traversal: &'a Traversal,
        ui: &'a Ui,
        fs: &'a Fs,
    ) -> Self {
        Self {
            fs,
            ui,
            graph,
            traversal,
        }
    }
}

impl Invalidator<'_> {
    /// Invalidate node `name` and everything downstream of it, in every realization,
    /// by deleting their `exit_code` files. Returns the number of files deleted.
    pub fn invalidate(&self, name: &str) -> Result<usize> {
        let target = self.graph.find(name)?;
        let nodes = self.downstream_of(target);
        if self.ui.verbose {
            eprintln!(
                "{} {} and {} downstream nodes.",
                "Searching for node dirs to invalidate in".magenta(),
                name.cyan(),
                nodes.len().saturating_sub(1)
            );
        }

        let mut seen = HashSet::default();
        let mut to_delete = Vec::with_capacity(self.traversal.realizations.len());
        let mut pathbuf = PathBuf::with_capacity(256);
        for realization in self.traversal.realizations.iter() {
            for ix in &nodes {
                let dir = self
                    .traversal
                    .node_dir(self.fs.output_prefix(), self.graph, *ix, realization);
                if !seen.insert(dir.clone()) {
                    continue;
                }
                let exit_code = self.fs.exit_code(&dir, &mut pathbuf);
                if self.fs.exists(exit_code) {
                    to_delete.push(exit_code.to_path_buf());
                } else {
                    log::debug!("{dir:?} is already invalid");
                }
            }
        }

        if to_delete.is_empty() {
            eprintln!("No matching node dirs to invalidate.");
            return Ok(0);
        }
        for exit_code in &to_delete {
            self.ui.status(Status::Deleting, format_args!("{exit_code:?}"));
        }
        if self.fs.is_dry_run() || !self.ui.confirm("Proceed?")? {
            return Ok(0);
        }
        for exit_code in &to_delete {
            self.fs.delete_file(exit_code)?;
        }
        Ok(to_delete.len())
    }

    /// `target` plus every node that transitively consumes its outputs, in run order.
    fn downstream_of(&self, target: NodeIndex) -> Vec<NodeIndex> {
        let mut marked = HashSet::default();
        marked.insert(target);
        let mut nodes = Vec::with_capacity(self.traversal.order.len());
        for ix in &self.traversal.order {
            let consumes = self.graph.incoming(*ix).any(|(up, _)| marked.contains(&up));
            if *ix == target || consumes {
                marked.insert(*ix);
                nodes.push(*ix);
            }
        }
        nodes
    }
}
