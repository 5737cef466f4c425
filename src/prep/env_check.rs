use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;

use workflow::Errors;

use super::Error;

/// Tool that must be on `PATH`, with the package it comes from.
const REQUIRED_PROGRAMS: &[(&str, &str)] = &[("dwifslpreproc", "MRtrix3")];

/// Dir inside `$FREESURFER_HOME` holding the runtime some FreeSurfer tools need.
const MCR_DIR: &str = "MCRv80";

/// Check the process environment for FSL, ANTs, MRtrix3 and (if `freesurfer`
/// is set) FreeSurfer. Every problem is reported before failing.
pub fn check_environment(freesurfer: bool) -> Result<()> {
    check_with(|var| std::env::var_os(var), freesurfer)
}

fn check_with<F>(lookup: F, freesurfer: bool) -> Result<()>
where
    F: Fn(&str) -> Option<OsString>,
{
    let mut errors = Errors::default();

    match lookup("FSLOUTPUTTYPE") {
        Some(_) => log::info!("FSLOUTPUTTYPE is valid"),
        None => errors.add(Error::MissingVar("FSLOUTPUTTYPE", "FSL")),
    }
    if let Err(e) = dir_var(&lookup, "FSLDIR", "FSL") {
        errors.add(e);
    }
    if lookup("ANTSPATH").is_none() {
        errors.add(Error::MissingVar("ANTSPATH", "ANTs"));
    }
    for (program, package) in REQUIRED_PROGRAMS {
        if !on_path(&lookup, program) {
            errors.add(Error::NotOnPath(program, package));
        }
    }

    if freesurfer {
        match dir_var(&lookup, "FREESURFER_HOME", "FreeSurfer") {
            Ok(home) => {
                let mcr = home.join(MCR_DIR);
                if mcr.is_dir() {
                    log::info!("Matlab Compiler Runtime found at {mcr:?}");
                } else {
                    errors.add(Error::MissingMcr(home));
                }
            }
            Err(e) => errors.add(e),
        }
    }

    errors.print_recap("checking environment")?;
    eprintln!("{}", "Environment check passed.".green());
    Ok(())
}

fn dir_var<F>(lookup: &F, var: &'static str, package: &'static str) -> Result<PathBuf, Error>
where
    F: Fn(&str) -> Option<OsString>,
{
    let dir = PathBuf::from(lookup(var).ok_or(Error::MissingVar(var, package))?);
    if dir.is_dir() {
        Ok(dir)
    } else {
        Err(Error::NotADirectory(var, dir))
    }
}

fn on_path<F>(lookup: &F, program: &str) -> bool
where
    F: Fn(&str) -> Option<OsString>,
{
    lookup("PATH").map_or(false, |path| {
        std::env::split_paths(&path).any(|dir| dir.join(program).is_file())
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use util::HashMap;

    fn env(vars: &[(&str, OsString)]) -> impl Fn(&str) -> Option<OsString> {
        let map: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_complete_environment() -> Result<()> {
        let dir = tempdir()?;
        let bin = dir.path().join("bin");
        fs::create_dir_all(&bin)?;
        fs::write(bin.join("dwifslpreproc"), "")?;
        let fs_home = dir.path().join("freesurfer");
        fs::create_dir_all(fs_home.join(MCR_DIR))?;

        let lookup = env(&[
            ("FSLOUTPUTTYPE", "NIFTI_GZ".into()),
            ("FSLDIR", dir.path().into()),
            ("ANTSPATH", bin.clone().into()),
            ("PATH", bin.into()),
            ("FREESURFER_HOME", fs_home.into()),
        ]);
        check_with(lookup, true)
    }

    #[test]
    fn test_reports_every_problem() -> Result<()> {
        let dir = tempdir()?;
        let lookup = env(&[("FREESURFER_HOME", dir.path().into())]);
        let err = check_with(lookup, true).unwrap_err();
        let agg = err
            .downcast_ref::<workflow::AggregatedErrors>()
            .expect("aggregated errors");
        // FSLOUTPUTTYPE, FSLDIR, ANTSPATH, dwifslpreproc, MCRv80:
        assert_eq!(5, agg.1);
        Ok(())
    }

    #[test]
    fn test_freesurfer_optional() -> Result<()> {
        let dir = tempdir()?;
        let bin = dir.path().join("bin");
        fs::create_dir_all(&bin)?;
        fs::write(bin.join("dwifslpreproc"), "")?;
        let lookup = env(&[
            ("FSLOUTPUTTYPE", "NIFTI_GZ".into()),
            ("FSLDIR", dir.path().into()),
            ("ANTSPATH", bin.clone().into()),
            ("PATH", bin.into()),
        ]);
        check_with(lookup, false)
    }
}
