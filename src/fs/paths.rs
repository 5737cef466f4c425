use std::path::{Path, PathBuf};

use super::Fs;

/// Utility fns for making common types of paths.
/// Node dirs are computed by the traversal; these fns only name the
/// bookkeeping files inside them.
impl Fs {
    /// $OUTPUT/workflow_name/_field_value.../node_name/exit_code
    pub fn exit_code<'a>(&self, node_dir: &Path, buf: &'a mut PathBuf) -> &'a Path {
        self.parts2(node_dir, "exit_code", buf)
    }

    /// $OUTPUT/workflow_name/_field_value.../node_name/stdout.txt
    pub fn stdout<'a>(&self, node_dir: &Path, buf: &'a mut PathBuf) -> &'a Path {
        self.parts2(node_dir, "stdout.txt", buf)
    }

    /// $OUTPUT/workflow_name/_field_value.../node_name/stderr.txt
    pub fn stderr<'a>(&self, node_dir: &Path, buf: &'a mut PathBuf) -> &'a Path {
        self.parts2(node_dir, "stderr.txt", buf)
    }

    /// $OUTPUT/workflow_name/_field_value.../node_name/command.txt
    pub fn command_txt<'a>(&self, node_dir: &Path, buf: &'a mut PathBuf) -> &'a Path {
        self.parts2(node_dir, "command.txt", buf)
    }

    fn parts2<'a, T, U>(&self, p1: T, p2: U, buf: &'a mut PathBuf) -> &'a Path
    where
        T: AsRef<Path>,
        U: AsRef<Path>,
    {
        buf.clear();
        buf.push(p1);
        buf.push(p2);
        &*buf
    }
}
