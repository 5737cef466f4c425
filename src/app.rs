use anyhow::{Context, Result};
use colored::Colorize;

use bids::Layout;
use traverse::Traversal;
use workflow::{PipelineConfig, PostProcConfig, WorkflowGraph};

use crate::exec::WorkflowRunner;
use crate::fs::Fs;
use crate::invalidate::Invalidator;
use crate::prep;
use crate::settings::{Settings, Stage};
use crate::ui::Ui;

/// This struct actually runs the command-line app.
pub struct App {
    /// Interpreted command line settings
    settings: Settings,
    /// Filesystem interface
    fs: Fs,
    /// User interface
    ui: Ui,
}

impl App {
    /// Create a new `App`.
    pub fn new(settings: Settings) -> Self {
        let fs = Fs::new(&settings.output, settings.dry_run);
        let ui = Ui::new(&settings);
        Self { settings, fs, ui }
    }

    /// Run the app: index the dataset, assemble and traverse the workflow graph,
    /// then invalidate or run it as the settings say.
    pub fn run(mut self) -> Result<()> {
        if self.settings.skip_checks {
            log::warn!("Skipping environment check");
        } else {
            let freesurfer = self.settings.stage == Stage::PreProc && self.settings.recon;
            prep::check_environment(freesurfer)
                .context("while checking the neuroimaging environment")?;
        }

        if self.settings.verbose > 0 {
            eprintln!("Using output directory {:?}", self.settings.output);
        }
        self.fs.ensure_output_dir_exists(self.settings.verbose > 0)?;

        let sessions = self.index_sessions()?;
        let graph = self.assemble(sessions)?;

        if let Some(dot) = &self.settings.dot {
            self.ui.verbose_progress_debug("Writing workflow graph to", dot);
            self.fs.write_requested_file(dot, &graph.to_dot())?;
            self.ui.done();
        }

        let traversal = self.make_traversal(&graph)?;

        if let Some(node) = &self.settings.invalidate {
            let invalidator = Invalidator::new(&graph, &traversal, &self.ui, &self.fs);
            let n = invalidator.invalidate(node)?;
            log::info!("invalidated {n} node dirs");
            return Ok(());
        }

        self.run_traversal(&graph, &traversal)
    }

    fn index_sessions(&mut self) -> Result<Vec<(String, String)>> {
        self.ui.verbose_progress_debug("Indexing BIDS dataset", &self.settings.bids_dir);
        self.ui.start_timer();
        let layout = Layout::index(&self.settings.bids_dir)
            .with_context(|| format!("while indexing {:?}", self.settings.bids_dir))?;
        let list = layout.filter(&self.settings.exclude);
        self.ui.done();
        self.ui.print_elapsed("Indexing BIDS dataset");

        self.ui.sessions_found(list.len(), self.settings.exclude.len());
        Ok(list
            .pairs()
            .map(|(sub, ses)| (sub.to_owned(), ses.to_owned()))
            .collect())
    }

    fn assemble(&mut self, sessions: Vec<(String, String)>) -> Result<WorkflowGraph> {
        self.ui.verbose_progress("Assembling workflow");
        self.ui.start_timer();
        let graph = match self.settings.stage {
            Stage::PreProc => workflow::build_graph(&self.preproc_config(sessions))?,
            Stage::PostProc => workflow::build_postproc_graph(&self.postproc_config(sessions))?,
        };
        self.ui.done();
        self.ui.print_elapsed("Assembling workflow");

        if self.settings.verbose > 0 {
            eprintln!(
                "Assembled workflow '{}' with {} nodes and {} connections.",
                graph.name(),
                graph.len(),
                graph.edge_count()
            );
        }
        Ok(graph)
    }

    fn preproc_config(&self, sessions: Vec<(String, String)>) -> PipelineConfig {
        let s = &self.settings;
        let mut config = PipelineConfig::new(&s.bids_dir);
        if let Some(name) = &s.name {
            config.name = name.clone();
        }
        config.derivatives = self.fs.output_prefix().to_path_buf();
        config.ext = s.ext.clone();
        config.design = s.design;
        config.regrid = s.regrid;
        config.recon = s.recon;
        config.nthreads = s.nthreads;
        config.sessions = sessions;
        match &s.mni_template {
            Some(template) => config.mni_template = template.clone(),
            None => log::warn!(
                "FSLDIR is not set; using {:?} as the MNI template",
                config.mni_template
            ),
        }
        config
    }

    fn postproc_config(&self, sessions: Vec<(String, String)>) -> PostProcConfig {
        let s = &self.settings;
        // settings have already checked that the atlas dir is present for this stage:
        let atlas_dir = s.atlas_dir.clone().unwrap_or_default();
        let mut config = PostProcConfig::new(s.study_dir(), atlas_dir);
        if let Some(name) = &s.name {
            config.name = name.clone();
        }
        config.derivatives = self.fs.output_prefix().to_path_buf();
        config.atlases = s.atlases.clone();
        config.nthreads = s.nthreads;
        config.sessions = sessions;
        config
    }

    fn make_traversal(&self, graph: &WorkflowGraph) -> Result<Traversal> {
        self.ui.verbose_progress("Creating traversal");
        let traversal = Traversal::create(graph)?;
        self.ui.done();

        log::debug!(
            "Traversal has {} nodes and {} realizations.",
            traversal.order.len(),
            traversal.realizations.len(),
        );
        Ok(traversal)
    }

    fn run_traversal(&self, graph: &WorkflowGraph, traversal: &Traversal) -> Result<()> {
        if traversal.realizations.is_empty() {
            self.ui.finished("No sessions to run; exiting.");
            return Ok(());
        }

        let dispatch = self.settings.dispatch;
        let runner = WorkflowRunner::new(graph, traversal, &self.fs, &self.ui, dispatch);
        let to_run = runner.print_plan()?;
        if to_run == 0 {
            self.ui.finished("No nodes to run; exiting.");
            return Ok(());
        }
        if self.settings.dry_run || !self.ui.confirm("Proceed?")? {
            return Ok(());
        }

        eprintln!("\n{}.\n", "Starting workflow execution".magenta());
        runner.run().context("while running workflow")?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;
    use std::path::Path;
    use workflow::{Builtin, NodeKind};

    use crate::args::Args;

    #[test]
    fn test_postproc_reads_from_output_dir() -> Result<()> {
        let argv = [
            "ppt", "-d", "/study/data", "-o", "/scratch/out", "-s", "postproc",
            "--atlas-dir", "/atlases", "-a", "aal", "-y",
        ];
        let settings: Settings = Args::try_parse_from(argv)?.try_into()?;
        let app = App::new(settings);
        let sessions = vec![("01".to_owned(), "1".to_owned())];
        let graph = workflow::build_postproc_graph(&app.postproc_config(sessions))?;

        let select = graph.node(graph.find("select_subjects")?);
        let NodeKind::Builtin(Builtin::SelectFiles { base, .. }) = &select.kind else {
            panic!("select_subjects should select files");
        };
        assert_eq!(Path::new("/scratch/out"), base);
        let sink = graph.node(graph.find("datasink")?);
        let NodeKind::Builtin(Builtin::DataSink { base }) = &sink.kind else {
            panic!("datasink should sink");
        };
        assert_eq!(Path::new("/scratch/out"), base);
        Ok(())
    }
}
