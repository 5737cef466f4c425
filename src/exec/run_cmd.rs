use std::fs::File;
use std::io::{stderr, stdout, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;

use anyhow::{Context, Result};

use crate::fs::Fs;

use super::Error;

/// Run a subprocess inside `node_dir`, storing stdout and stderr in files there.
/// If `capture` is set, stdout goes to that file instead of `stdout.txt`.
/// With `echo`, both streams are also copied to our own stdout/stderr.
/// Based on:
/// <https://stackoverflow.com/questions/66060139/how-to-tee-stdout-stderr-from-a-subprocess-in-rust>
pub fn run_cmd(
    cmd: &mut Command,
    node_dir: &Path,
    capture: Option<&Path>,
    fs: &Fs,
    echo: bool,
) -> Result<ExitStatus> {
    let (out_file, err_file) = make_log_files(fs, node_dir, capture)?;

    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::SpawnFailed(program, e))?;

    let child_out = child.stdout.take().ok_or(Error::ChildPipe("stdout"))?;
    let child_err = child.stderr.take().ok_or(Error::ChildPipe("stderr"))?;

    // a captured stdout is the node's output file, not a log; don't echo it:
    let echo_out = echo && capture.is_none();
    let thread_out =
        thread::spawn(move || communicate(child_out, out_file, echo_out.then(stdout)));
    let thread_err = thread::spawn(move || communicate(child_err, err_file, echo.then(stderr)));

    // join both before checking either, so no tee thread is left behind:
    let out_result = join_tee(thread_out, "stdout");
    let err_result = join_tee(thread_err, "stderr");
    if let Err(e) = out_result.and(err_result) {
        reap(&mut child);
        return Err(e);
    }

    let status = child.wait().context("failed to wait on child process")?;
    log::debug!("process finished with {status}");
    Ok(status)
}

fn join_tee(handle: thread::JoinHandle<std::io::Result<()>>, stream: &'static str) -> Result<()> {
    handle
        .join()
        .map_err(|_| Error::TeeThread(stream))?
        .with_context(|| format!("error communicating with child {stream}"))
}

/// Stop a child we can no longer talk to, so it doesn't outlive its node.
fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        log::debug!("could not kill child process: {e}");
    }
    match child.wait() {
        Ok(status) => log::debug!("killed child finished with {status}"),
        Err(e) => log::warn!("failed to wait on killed child process: {e}"),
    }
}

fn communicate<R: Read, W: Write>(
    mut stream: R,
    mut file: File,
    mut output: Option<W>,
) -> std::io::Result<()> {
    let mut buf = [0u8; 1024];
    loop {
        let num_read = stream.read(&mut buf)?;
        if num_read == 0 {
            break;
        }

        let buf = &buf[..num_read];
        file.write_all(buf)?;
        if let Some(output) = &mut output {
            output.write_all(buf)?;
        }
    }

    Ok(())
}

fn make_log_files(fs: &Fs, node_dir: &Path, capture: Option<&Path>) -> Result<(File, File)> {
    let mut pathbuf = node_dir.to_path_buf();
    let out_path = match capture {
        Some(path) => path,
        None => fs.stdout(node_dir, &mut pathbuf),
    };
    let out_file = fs
        .create_file(out_path)
        .with_context(|| format!("creating stdout file {out_path:?}"))?;

    let err_file = fs
        .create_file(fs.stderr(node_dir, &mut pathbuf))
        .context("creating stderr.txt file")?;

    Ok((out_file, err_file))
}

#[cfg(all(test, unix))]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_tee_to_files() -> Result<()> {
        let dir = tempdir()?;
        let fs = Fs::new(dir.path(), false);
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo tensor; echo warning >&2"]).current_dir(dir.path());

        let status = run_cmd(&mut cmd, dir.path(), None, &fs, false)?;
        assert!(status.success());
        assert_eq!("tensor\n", std::fs::read_to_string(dir.path().join("stdout.txt"))?);
        assert_eq!("warning\n", std::fs::read_to_string(dir.path().join("stderr.txt"))?);
        Ok(())
    }

    #[test]
    fn test_capture_and_failure() -> Result<()> {
        let dir = tempdir()?;
        let fs = Fs::new(dir.path(), false);
        let capture = dir.path().join("fs_id.txt");
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo sub-01_ses-1; exit 3"]);

        let status = run_cmd(&mut cmd, dir.path(), Some(&capture), &fs, false)?;
        assert_eq!(Some(3), status.code());
        assert_eq!("sub-01_ses-1\n", std::fs::read_to_string(&capture)?);
        assert!(!dir.path().join("stdout.txt").exists());
        Ok(())
    }

    #[test]
    fn test_reap_stops_child() -> Result<()> {
        let mut child = Command::new("sleep").arg("30").spawn()?;
        reap(&mut child);
        // already waited on, so the exit status is available at once:
        assert!(child.try_wait()?.is_some());
        Ok(())
    }

    #[test]
    fn test_missing_program() {
        let dir = tempdir().unwrap();
        let fs = Fs::new(dir.path(), false);
        let mut cmd = Command::new("definitely-not-an-mrtrix-tool");
        assert!(run_cmd(&mut cmd, dir.path(), None, &fs, false).is_err());
    }
}
