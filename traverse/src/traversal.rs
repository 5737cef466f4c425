use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;

use util::IdVec;
use workflow::{NodeIndex, WorkflowGraph};

use super::{dfs::DfsTraverser, Error, Realization, RealizationId};

/// Run order for a workflow graph, plus the realizations it is run over.
#[derive(Debug)]
pub struct Traversal {
    /// every node comes after all of its antecedents
    pub order: Vec<NodeIndex>,
    pub realizations: IdVec<RealizationId, Realization>,
    /// iterable fields each node depends on, in realization field order
    scopes: util::HashMap<NodeIndex, Vec<&'static str>>,
}

impl Traversal {
    pub fn create(graph: &WorkflowGraph) -> Result<Self> {
        let mut traverser = DfsTraverser::new(graph);
        for goal in graph.goals() {
            traverser.traverse(goal)?;
        }
        let order = traverser.into_order();

        log::debug!("created traversal with {} nodes", order.len());
        for ix in &order {
            log::trace!("{}", graph.node(*ix).name.cyan());
        }

        let fields = iterable_fields(graph, &order)?;
        let realizations = expand(graph, &order)?;
        let scopes = scopes(graph, &order, &fields);

        Ok(Self {
            order,
            realizations,
            scopes,
        })
    }

    /// Iterable fields that node `ix` depends on.
    pub fn scope(&self, ix: NodeIndex) -> &[&'static str] {
        self.scopes.get(&ix).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `realization` reduced to the fields node `ix` depends on.
    pub fn realization_for(&self, ix: NodeIndex, realization: &Realization) -> Realization {
        realization.project(self.scope(ix))
    }

    /// Work dir of node `ix` under `realization`:
    /// `<base>/<workflow>/_<field>_<value>.../<node>`.
    pub fn node_dir(
        &self,
        base: &Path,
        graph: &WorkflowGraph,
        ix: NodeIndex,
        realization: &Realization,
    ) -> PathBuf {
        let mut dir = base.join(graph.name());
        let projected = self.realization_for(ix, realization);
        if !projected.is_empty() {
            dir.push(projected.dir_name());
        }
        dir.push(graph.node(ix).name);
        dir
    }

    pub fn realization(&self, id: RealizationId) -> &Realization {
        self.realizations.get(id)
    }
}

/// All iterable fields, in node order. A field may only be iterated by one node.
fn iterable_fields(graph: &WorkflowGraph, order: &[NodeIndex]) -> Result<Vec<&'static str>> {
    let mut fields = Vec::new();
    let nodes = iterable_nodes(graph, order);
    for iterables in nodes.iter().filter_map(|ix| graph.node(*ix).iterables.as_ref()) {
        for field in &iterables.fields {
            if fields.contains(field) {
                return Err(Error::DuplicateField((*field).to_owned()).into());
            }
            fields.push(*field);
        }
    }
    Ok(fields)
}

/// Iterable nodes in index order, so realization field order doesn't depend on traversal.
fn iterable_nodes(graph: &WorkflowGraph, order: &[NodeIndex]) -> Vec<NodeIndex> {
    let mut nodes: Vec<NodeIndex> = order
        .iter()
        .copied()
        .filter(|ix| graph.node(*ix).iterables.is_some())
        .collect();
    nodes.sort_unstable();
    nodes
}

/// Cross product over iterable nodes; the fields of one node move together.
fn expand(
    graph: &WorkflowGraph,
    order: &[NodeIndex],
) -> Result<IdVec<RealizationId, Realization>> {
    let mut combos: Vec<Vec<(&'static str, String)>> = vec![Vec::new()];

    for ix in iterable_nodes(graph, order) {
        let decl = graph.node(ix);
        let Some(iterables) = &decl.iterables else {
            continue;
        };
        for row in &iterables.rows {
            if row.len() != iterables.fields.len() {
                return Err(Error::RaggedIterables(
                    decl.name.to_owned(),
                    row.len(),
                    iterables.fields.len(),
                )
                .into());
            }
        }
        let mut next = Vec::with_capacity(combos.len() * iterables.rows.len());
        for combo in &combos {
            for row in &iterables.rows {
                let mut extended = combo.clone();
                extended.extend(iterables.fields.iter().copied().zip(row.iter().cloned()));
                next.push(extended);
            }
        }
        combos = next;
    }

    let mut realizations = IdVec::with_capacity(combos.len());
    for combo in combos {
        realizations.push(Realization::new(combo));
    }
    log::debug!("expanded {} realizations", realizations.len());
    Ok(realizations)
}

/// Step forward through `order`, inheriting the fields of every antecedent.
fn scopes(
    graph: &WorkflowGraph,
    order: &[NodeIndex],
    fields: &[&'static str],
) -> util::HashMap<NodeIndex, Vec<&'static str>> {
    let mut scopes: util::HashMap<NodeIndex, Vec<&'static str>> = util::HashMap::default();
    for ix in order {
        let mut own: Vec<&'static str> = graph
            .node(*ix)
            .iterables
            .as_ref()
            .map(|i| i.fields.clone())
            .unwrap_or_default();
        for (up, _) in graph.incoming(*ix) {
            if let Some(inherited) = scopes.get(&up) {
                own.extend(inherited.iter().copied());
            }
        }
        let scope = fields.iter().copied().filter(|f| own.contains(f)).collect();
        scopes.insert(*ix, scope);
    }
    scopes
}

#[cfg(test)]
mod test {
    use super::*;
    use workflow::{PeDesign, PipelineConfig, PostProcConfig};

    fn sessions() -> Vec<(String, String)> {
        vec![
            ("01".to_owned(), "1".to_owned()),
            ("02".to_owned(), "1".to_owned()),
        ]
    }

    fn preproc() -> Result<WorkflowGraph> {
        let mut config = PipelineConfig::new("/study/data");
        config.design = PeDesign::Paired;
        config.sessions = sessions();
        workflow::build_graph(&config)
    }

    #[test]
    fn test_order_is_topological() -> Result<()> {
        let graph = preproc()?;
        let traversal = Traversal::create(&graph)?;
        assert_eq!(graph.len(), traversal.order.len());

        let position = |ix: NodeIndex| traversal.order.iter().position(|o| *o == ix);
        for ix in graph.node_indices() {
            for (up, _) in graph.incoming(ix) {
                assert!(position(up) < position(ix));
            }
        }
        Ok(())
    }

    #[test]
    fn test_realizations() -> Result<()> {
        let graph = preproc()?;
        let traversal = Traversal::create(&graph)?;
        assert_eq!(2, traversal.realizations.len());

        let r = traversal.realization(RealizationId::from(1));
        assert_eq!(Some("02"), r.get("subject_id"));
        let flirt = graph.find("FLIRT")?;
        assert_eq!(&["subject_id", "session_id"], traversal.scope(flirt));
        assert_eq!(
            PathBuf::from("/study/derivatives/pipetography/_subject_id_02_session_id_1/FLIRT"),
            traversal.node_dir(Path::new("/study/derivatives"), &graph, flirt, r)
        );
        Ok(())
    }

    #[test]
    fn test_postproc_scopes() -> Result<()> {
        let mut config = PostProcConfig::new("/study", "/atlases");
        config.atlases = vec!["aal".to_owned(), "desikan".to_owned()];
        config.sessions = sessions();
        let graph = workflow::build_postproc_graph(&config)?;
        let traversal = Traversal::create(&graph)?;
        assert_eq!(4, traversal.realizations.len());

        let atlases = graph.find("select_atlases")?;
        assert_eq!(&["atlas_name"], traversal.scope(atlases));
        let fod = graph.find("dwiFOD")?;
        assert_eq!(&["subject_id", "session_id"], traversal.scope(fod));
        let connectome = graph.find("weight_connectome")?;
        assert_eq!(3, traversal.scope(connectome).len());
        Ok(())
    }

    #[test]
    fn test_empty_iterables() -> Result<()> {
        let mut config = PipelineConfig::new("/study/data");
        config.sessions = Vec::new();
        let graph = workflow::build_graph(&config)?;
        let traversal = Traversal::create(&graph)?;
        assert!(traversal.realizations.is_empty());
        Ok(())
    }
}
