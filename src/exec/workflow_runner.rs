use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use anyhow::{Context, Result};
use colored::Colorize;

use traverse::{Realization, RealizationId, Traversal};
use util::{HashMap, HashSet, Timer};
use workflow::{Errors, NodeDecl, NodeIndex, NodeKind, Value, ValueMap, WorkflowGraph};

use crate::fs::Fs;
use crate::ui::{Status, Ui};

use super::{builtins::run_builtin, run_cmd::run_cmd, Error};

/// How realizations are spread over threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// one realization after another, with subprocess output echoed to the terminal
    Serial,
    /// up to `n` realizations at once; subprocess output only goes to the log files
    Parallel(usize),
}

/// Outputs of one node dir, filled in by whichever realization runs it first.
type NodeOnce = Arc<Mutex<Option<ValueMap>>>;

/// `WorkflowRunner` is the struct that actually runs a workflow.
///
/// For every realization it steps through the traversal order, gathering each
/// node's inputs from its defaults and the outputs of its antecedents.
/// Builtin nodes run in-process. Command nodes are rendered, checked for
/// existing input files, and executed inside their node dir; afterwards all
/// output files must exist, and an `exit_code` file is written so that
/// subsequent runs will not execute the node again.
///
/// Nodes whose dir is shared by several realizations (because they depend on
/// only some of the iterable fields) run once; later realizations reuse their outputs.
/// The first failure stops dispatch of further nodes.
pub struct WorkflowRunner<'a> {
    graph: &'a WorkflowGraph,
    traversal: &'a Traversal,
    fs: &'a Fs,
    ui: &'a Ui,
    dispatch: Dispatch,
    finished: Mutex<HashMap<PathBuf, NodeOnce>>,
    stop: AtomicBool,
    errors: Mutex<Errors>,
}

impl<'a> WorkflowRunner<'a> {
    /// Create a new `WorkflowRunner`.
    pub fn new(
        graph: &'a WorkflowGraph,
        traversal: &'a Traversal,
        fs: &'a Fs,
        ui: &'a Ui,
        dispatch: Dispatch,
    ) -> Self {
        Self {
            graph,
            traversal,
            fs,
            ui,
            dispatch,
            finished: Mutex::new(HashMap::default()),
            stop: AtomicBool::new(false),
            errors: Mutex::new(Errors::default()),
        }
    }

    /// Print which command nodes are already complete and which will run.
    /// Completion is judged by `exit_code` alone here; output files are
    /// checked again right before each node runs.
    /// Returns the number of nodes to run.
    pub fn print_plan(&self) -> Result<usize> {
        let mut seen = HashSet::default();
        let mut completed = Vec::with_capacity(self.graph.len());
        let mut to_run = Vec::with_capacity(self.graph.len());
        let mut pathbuf = PathBuf::with_capacity(256);

        for realization in self.traversal.realizations.iter() {
            for ix in &self.traversal.order {
                let decl = self.graph.node(*ix);
                if !matches!(decl.kind, NodeKind::Command(_)) {
                    continue;
                }
                let dir = self.node_dir(*ix, realization);
                if !seen.insert(dir.clone()) {
                    continue;
                }
                if self.has_exit_code(&dir, &mut pathbuf)? {
                    completed.push((decl, dir));
                } else {
                    to_run.push((decl, dir));
                }
            }
        }

        if !completed.is_empty() {
            eprintln!(
                "\nThe following nodes are {} and will not run:",
                "already complete".green()
            );
            for (decl, dir) in &completed {
                self.ui.node(Status::Completed, decl, dir);
            }
        }

        if !to_run.is_empty() {
            eprintln!("\nThe following nodes {}:", "will run".green());
            for (decl, dir) in &to_run {
                self.ui.node(Status::Run, decl, dir);
            }
        }
        eprintln!();

        Ok(to_run.len())
    }

    /// Run every realization, then report all failures at once.
    pub fn run(&self) -> Result<()> {
        let n = self.traversal.realizations.len();
        match self.dispatch {
            Dispatch::Serial => {
                for id in self.traversal.realizations.ids() {
                    if self.stopped() {
                        break;
                    }
                    self.run_realization(id);
                }
            }
            Dispatch::Parallel(workers) => {
                log::info!("running {n} realizations on {} threads", workers.min(n));
                let next = AtomicUsize::new(0);
                thread::scope(|scope| {
                    for _ in 0..workers.min(n) {
                        scope.spawn(|| self.worker(&next, n));
                    }
                });
            }
        }

        let errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        errors.print_recap("running workflow")?;
        self.ui.finished("Completed workflow.\n");
        Ok(())
    }

    fn worker(&self, next: &AtomicUsize, n: usize) {
        loop {
            if self.stopped() {
                break;
            }
            let i = next.fetch_add(1, Ordering::SeqCst);
            if i >= n {
                break;
            }
            self.run_realization(RealizationId::from(i));
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn run_realization(&self, id: RealizationId) {
        let realization = self.traversal.realization(id);
        log::info!("starting realization [{realization}]");

        let mut outputs: HashMap<NodeIndex, ValueMap> = HashMap::default();
        for ix in &self.traversal.order {
            if self.stopped() {
                return;
            }
            match self.run_node(*ix, realization, &outputs) {
                Ok(out) => {
                    outputs.insert(*ix, out);
                }
                Err(e) => {
                    self.stop.store(true, Ordering::SeqCst);
                    let node = self.graph.node(*ix).name;
                    self.ui.status(Status::Failed, format_args!("{node} [{realization}]"));
                    let mut errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
                    errors.add_context(e, format!("while running node '{node}' for [{realization}]"));
                    return;
                }
            }
        }
    }

    fn run_node(
        &self,
        ix: NodeIndex,
        realization: &Realization,
        upstream: &HashMap<NodeIndex, ValueMap>,
    ) -> Result<ValueMap> {
        let dir = self.node_dir(ix, realization);
        let once = self.once_for(&dir);
        // held for the whole run, so other realizations sharing this dir wait for us:
        let mut done = once.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(outputs) = &*done {
            log::trace!("reusing outputs of {dir:?}");
            return Ok(outputs.clone());
        }

        let decl = self.graph.node(ix);
        let values = self.gather(ix, upstream);
        let outputs = match &decl.kind {
            NodeKind::Builtin(builtin) => {
                let projected = self.traversal.realization_for(ix, realization);
                run_builtin(decl, builtin, &values, &projected, self.fs)?
            }
            NodeKind::Command(_) => self.run_command(decl, values, &dir)?,
        };
        *done = Some(outputs.clone());
        Ok(outputs)
    }

    fn once_for(&self, dir: &Path) -> NodeOnce {
        let mut finished = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        finished.entry(dir.to_path_buf()).or_default().clone()
    }

    fn node_dir(&self, ix: NodeIndex, realization: &Realization) -> PathBuf {
        self.traversal
            .node_dir(self.fs.output_prefix(), self.graph, ix, realization)
    }

    /// Defaults of node `ix`, overlaid with the outputs of its antecedents.
    /// Absent optional outputs (e.g. an unknown phase-encoding direction) are left unset.
    fn gather(&self, ix: NodeIndex, upstream: &HashMap<NodeIndex, ValueMap>) -> ValueMap {
        let decl = self.graph.node(ix);
        let mut values = decl.values.clone();
        for (up, conn) in self.graph.incoming(ix) {
            match upstream.get(&up).and_then(|out| out.get(conn.from)) {
                Some(value) => {
                    values.insert(conn.to, value.clone());
                }
                None => log::debug!(
                    "{}: no value for '{}' from {}",
                    decl.name,
                    conn.to,
                    self.graph.node(up).name
                ),
            }
        }
        values
    }

    fn run_command(&self, decl: &NodeDecl, mut values: ValueMap, dir: &Path) -> Result<ValueMap> {
        let timer = Timer::now();
        let mut pathbuf = PathBuf::with_capacity(256);

        workflow::fill_generated(decl, &mut values);
        let cmdline = workflow::render(decl, &values, dir)?;
        let outputs = workflow::resolve_outputs(decl, &values, dir);

        if self.is_complete(dir, &outputs, &mut pathbuf)? {
            self.ui.node(Status::Completed, decl, dir);
            return Ok(outputs);
        }

        self.ui.verbose_heading("Checking that all inputs exist");
        self.check_inputs_exist(decl, &values, dir)
            .context("while checking for input files")?;

        if self.fs.exists(dir) {
            self.ui.status(Status::Deleting, format_args!("incomplete {dir:?}"));
            self.fs
                .delete_dir(dir)
                .context("while deleting incomplete node dir")?;
        }
        self.fs.create_dir(dir).context("creating node dir")?;
        let command = cmdline.to_string();
        self.fs
            .write_file(self.fs.command_txt(dir, &mut pathbuf), &command)
            .context("writing command.txt file")?;

        self.ui.node(Status::Run, decl, dir);
        self.ui.verbose_msg(&command);
        let status = run_cmd(
            &mut cmdline.to_command(dir),
            dir,
            cmdline.stdout.as_deref(),
            self.fs,
            self.dispatch == Dispatch::Serial,
        )?;
        if !status.success() {
            return Err(Error::SubprocessFailed(decl.name.to_owned(), status.to_string()).into());
        }

        self.ui.verbose_heading("Checking that all expected outputs exist");
        self.check_files_exist(outputs.values().flat_map(|v| v.files()))
            .context("while checking for output files")?;

        self.ui.print_elapsed_since(&timer, decl.name);
        self.ui.status(Status::Completed, format_args!("{decl}. Writing exit_code file.\n"));
        self.fs
            .write_file(self.fs.exit_code(dir, &mut pathbuf), "0")
            .context("while writing exit_code file for successful node.")?;
        Ok(outputs)
    }

    fn has_exit_code(&self, dir: &Path, pathbuf: &mut PathBuf) -> Result<bool> {
        let exit_code = self.fs.exit_code(dir, pathbuf);
        if !self.fs.exists(exit_code) {
            return Ok(false);
        }
        let code = self
            .fs
            .read_to_string(exit_code)
            .with_context(|| format!("while reading {exit_code:?}"))?;
        Ok(code.trim() == "0")
    }

    /// A node is complete if it exited successfully and all of its outputs are still there.
    fn is_complete(&self, dir: &Path, outputs: &ValueMap, pathbuf: &mut PathBuf) -> Result<bool> {
        Ok(self.has_exit_code(dir, pathbuf)?
            && outputs
                .values()
                .flat_map(|v| v.files())
                .all(|f| self.fs.exists(f)))
    }

    /// Relative input paths are resolved against the node dir.
    fn check_inputs_exist(&self, decl: &NodeDecl, values: &ValueMap, dir: &Path) -> Result<(), Error> {
        for slot in decl.inputs.iter().filter(|s| s.exists) {
            if let Some(value) = values.get(slot.name) {
                let files: Vec<PathBuf> = input_files(value).map(|f| dir.join(f)).collect();
                self.check_files_exist(files.iter().map(PathBuf::as_path))?;
            }
        }
        Ok(())
    }

    fn check_files_exist<'f>(&self, files: impl Iterator<Item = &'f Path>) -> Result<(), Error> {
        for file in files {
            if !self.fs.exists(file) {
                return Err(Error::ExpectedFileNotFound(file.display().to_string()));
            } else if self.ui.verbose {
                eprintln!(" - {}", file.display());
            }
        }
        Ok(())
    }
}

/// Files named by an input value; plain strings count as paths.
fn input_files(value: &Value) -> impl Iterator<Item = &Path> {
    let files = match value {
        Value::Str(s) => vec![Path::new(s.as_str())],
        other => other.files(),
    };
    files.into_iter()
}

#[cfg(all(test, unix))]
mod test {
    use super::*;
    use clap::Parser;
    use std::fs as stdfs;
    use tempfile::tempdir;
    use workflow::interfaces::builtins;
    use workflow::{GraphBuilder, InputSlot, Iterables, OutputSlot};

    use crate::args::Args;
    use crate::settings::Settings;

    fn ui() -> Result<Ui> {
        let settings: Settings = Args::try_parse_from(["ppt", "-y"])?.try_into()?;
        Ok(Ui::new(&settings))
    }

    /// `sub_source -> write_id (echo) -> copy (cp) -> datasink`, over two subjects.
    fn graph(base: &Path, copy_program: &'static str) -> Result<WorkflowGraph> {
        let mut b = GraphBuilder::new("test");
        b.add_node(builtins::identity(
            "sub_source",
            Iterables {
                fields: vec!["subject_id"],
                rows: vec![vec!["01".to_owned()], vec!["02".to_owned()]],
            },
        ))?;

        let mut write = NodeDecl::command(
            "write_id",
            "echo",
            vec![
                InputSlot::string("subject", "%s").at(0).mandatory(),
                InputSlot::file("out_file", "").mandatory(),
            ],
            vec![OutputSlot::from_input("out_file", "out_file")],
        )
        .stdout_to("out_file");
        write.set("out_file", "id.txt")?;
        b.add_node(write)?;

        let mut copy = NodeDecl::command(
            "copy",
            copy_program,
            vec![
                InputSlot::file("in_file", "%s").at(0).mandatory().exists(),
                InputSlot::file("out_file", "%s").at(1).mandatory(),
            ],
            vec![OutputSlot::from_input("out_file", "out_file")],
        );
        copy.set("out_file", "copied.txt")?;
        b.add_node(copy)?;
        b.add_node(builtins::datasink("datasink", base.to_path_buf()))?;

        b.connect("sub_source", "write_id", &[("subject_id", "subject")]);
        b.connect("write_id", "copy", &[("out_file", "in_file")]);
        b.connect("copy", "datasink", &[("out_file", "ids.@copy")]);
        b.finish()
    }

    /// `atlas_source -> prep_atlas -> combine <- sub_source`, then `datasink`:
    /// `prep_atlas` depends on the atlas alone, so both subjects share its dir.
    /// Every time `prep_atlas` actually runs it appends its atlas to `log`.
    fn atlas_graph(base: &Path, log: &Path) -> Result<WorkflowGraph> {
        let mut b = GraphBuilder::new("test");
        b.add_node(builtins::identity(
            "atlas_source",
            Iterables {
                fields: vec!["atlas_name"],
                rows: vec![vec!["aal".to_owned()], vec!["desikan".to_owned()]],
            },
        ))?;
        b.add_node(builtins::identity(
            "sub_source",
            Iterables {
                fields: vec!["subject_id"],
                rows: vec![vec!["01".to_owned()], vec!["02".to_owned()]],
            },
        ))?;

        let mut prep = NodeDecl::command(
            "prep_atlas",
            "sh",
            vec![
                InputSlot::string("log", "%s").at(0).mandatory(),
                InputSlot::string("atlas", "%s").at(1).mandatory(),
                InputSlot::file("out_file", "%s").at(2).mandatory(),
            ],
            vec![OutputSlot::from_input("out_file", "out_file")],
        )
        .leading(&["-c", r#"echo "$2" >> "$1"; echo "$2" > "$3""#, "sh"]);
        prep.set("log", log.display().to_string())?;
        prep.set("out_file", "atlas.txt")?;
        b.add_node(prep)?;

        let mut combine = NodeDecl::command(
            "combine",
            "sh",
            vec![
                InputSlot::file("atlas_file", "%s").at(0).mandatory().exists(),
                InputSlot::string("subject", "%s").at(1).mandatory(),
                InputSlot::file("out_file", "%s").at(2).mandatory(),
            ],
            vec![OutputSlot::from_input("out_file", "out_file")],
        )
        .leading(&["-c", r#"cat "$1" > "$3"; echo "$2" >> "$3""#, "sh"]);
        combine.set("out_file", "joined.txt")?;
        b.add_node(combine)?;
        b.add_node(builtins::datasink("datasink", base.to_path_buf()))?;

        b.connect("atlas_source", "prep_atlas", &[("atlas_name", "atlas")]);
        b.connect("prep_atlas", "combine", &[("out_file", "atlas_file")]);
        b.connect("sub_source", "combine", &[("subject_id", "subject")]);
        b.connect("combine", "datasink", &[("out_file", "joined.@out")]);
        b.finish()
    }

    fn run_graph(base: &Path, graph: &WorkflowGraph, dispatch: Dispatch) -> Result<()> {
        let fs = Fs::new(base, false);
        let ui = ui()?;
        let traversal = Traversal::create(graph)?;
        let runner = WorkflowRunner::new(graph, &traversal, &fs, &ui, dispatch);
        runner.run()
    }

    fn run(base: &Path, copy_program: &'static str, dispatch: Dispatch) -> Result<()> {
        run_graph(base, &graph(base, copy_program)?, dispatch)
    }

    fn check_shared_dirs(dispatch: Dispatch) -> Result<()> {
        let dir = tempdir()?;
        let out = dir.path().join("out");
        stdfs::create_dir(&out)?;
        let log = dir.path().join("prep_atlas.log");
        run_graph(&out, &atlas_graph(&out, &log)?, dispatch)?;

        let mut runs: Vec<String> = stdfs::read_to_string(&log)?
            .lines()
            .map(str::to_owned)
            .collect();
        runs.sort();
        assert_eq!(vec!["aal", "desikan"], runs, "one run per atlas, not per subject");

        for atlas in ["aal", "desikan"] {
            assert!(out.join(format!("test/_atlas_name_{atlas}/prep_atlas/exit_code")).exists());
            for sub in ["01", "02"] {
                let sunk = out.join(format!("joined/sub-{sub}/atlas-{atlas}/joined.txt"));
                assert_eq!(format!("{atlas}\n{sub}\n"), stdfs::read_to_string(sunk)?);
            }
        }
        Ok(())
    }

    #[test]
    fn test_shared_dir_runs_once() -> Result<()> {
        check_shared_dirs(Dispatch::Serial)
    }

    #[test]
    fn test_shared_dir_runs_once_parallel() -> Result<()> {
        check_shared_dirs(Dispatch::Parallel(2))
    }

    #[test]
    fn test_serial() -> Result<()> {
        let dir = tempdir()?;
        run(dir.path(), "cp", Dispatch::Serial)?;

        let node = dir.path().join("test/_subject_id_02/copy");
        assert_eq!("02\n", stdfs::read_to_string(node.join("copied.txt"))?);
        assert_eq!("0", stdfs::read_to_string(node.join("exit_code"))?);
        assert!(node.join("command.txt").exists());
        assert!(node.join("stderr.txt").exists());
        assert_eq!(
            "01\n",
            stdfs::read_to_string(dir.path().join("ids/sub-01/copied.txt"))?
        );

        // second run finds everything complete and changes nothing:
        stdfs::write(node.join("stdout.txt"), "marker")?;
        run(dir.path(), "cp", Dispatch::Serial)?;
        assert_eq!("marker", stdfs::read_to_string(node.join("stdout.txt"))?);
        Ok(())
    }

    #[test]
    fn test_parallel() -> Result<()> {
        let dir = tempdir()?;
        run(dir.path(), "cp", Dispatch::Parallel(2))?;
        for sub in ["01", "02"] {
            let sunk = dir.path().join(format!("ids/sub-{sub}/copied.txt"));
            assert_eq!(format!("{sub}\n"), stdfs::read_to_string(sunk)?);
        }
        Ok(())
    }

    #[test]
    fn test_failure_stops_dispatch() -> Result<()> {
        let dir = tempdir()?;
        assert!(run(dir.path(), "false", Dispatch::Serial).is_err());

        let failed = dir.path().join("test/_subject_id_01/copy");
        assert!(failed.is_dir());
        assert!(!failed.join("exit_code").exists());
        // the first failure keeps the second subject from starting:
        assert!(!dir.path().join("test/_subject_id_02").exists());
        assert!(!dir.path().join("ids").exists());
        Ok(())
    }
}
