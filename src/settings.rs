use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};

use bids::SessionKey;
use util::HashSet;
use workflow::{derivatives_for, PeDesign};

use crate::args::Args;
use crate::exec::Dispatch;

const MNI_TEMPLATE: &str = "data/standard/MNI152_T1_1mm.nii.gz";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unrecognized stage '{0}' (expected preproc or postproc)")]
    UnknownStage(String),
    #[error("--parallel must be at least 1")]
    ZeroParallel,
    #[error("--nthreads must be at least 1")]
    ZeroThreads,
    #[error("The postproc stage needs --atlas-dir and at least one --atlas")]
    NoAtlases,
}

/// Which workflow to assemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// DWI preprocessing and ACPC/MNI alignment
    PreProc,
    /// atlas registration and connectome construction
    PostProc,
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preproc" | "preprocessing" => Ok(Self::PreProc),
            "postproc" | "postprocessing" | "connectome" => Ok(Self::PostProc),
            _ => Err(Error::UnknownStage(s.to_owned())),
        }
    }
}

/// Settings are like Args, except all the logic has
/// been applied so e.g. defaults are added in.
#[derive(Debug)]
pub struct Settings {
    pub bids_dir: PathBuf,
    pub output: PathBuf,
    pub ext: String,
    pub design: PeDesign,
    pub regrid: bool,
    pub recon: bool,
    pub nthreads: u32,
    pub exclude: HashSet<SessionKey>,
    pub dispatch: Dispatch,
    pub stage: Stage,
    pub atlas_dir: Option<PathBuf>,
    pub atlases: Vec<String>,
    /// `None` if neither `--mni-template` nor `$FSLDIR` was given
    pub mni_template: Option<PathBuf>,
    pub dot: Option<PathBuf>,
    pub invalidate: Option<String>,
    pub name: Option<String>,

    pub yes: bool,
    pub verbose: u8,
    pub dry_run: bool,
    pub skip_checks: bool,
}

impl Settings {
    /// Study dir holding the dataset, `derivatives/` and tractography outputs.
    pub fn study_dir(&self) -> &Path {
        match self.bids_dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => &self.bids_dir,
        }
    }
}

impl TryFrom<Args> for Settings {
    type Error = anyhow::Error;
    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let mut bids_dir = PathBuf::from(&args.bids_dir);
        // a missing dataset is reported when we index it:
        if bids_dir.exists() {
            bids_dir = bids_dir
                .canonicalize()
                .with_context(|| format!("while resolving BIDS dir {bids_dir:?}"))?;
        }

        let output = match &args.output {
            Some(output) => PathBuf::from(output),
            None => derivatives_for(&bids_dir),
        };

        let design: PeDesign = args.rpe_design.parse()?;
        let stage: Stage = args.stage.parse()?;

        let mut exclude = HashSet::default();
        for text in &args.exclude {
            exclude.insert(SessionKey::parse(text)?);
        }

        let dispatch = match args.parallel {
            Some(0) => return Err(Error::ZeroParallel.into()),
            None | Some(1) => Dispatch::Serial,
            Some(n) => Dispatch::Parallel(n),
        };

        if args.nthreads == 0 {
            return Err(Error::ZeroThreads.into());
        }

        let atlas_dir = args.atlas_dir.map(PathBuf::from);
        if stage == Stage::PostProc && (atlas_dir.is_none() || args.atlases.is_empty()) {
            return Err(Error::NoAtlases.into());
        }

        let mni_template = match args.mni_template {
            Some(path) => Some(PathBuf::from(path)),
            None => std::env::var_os("FSLDIR").map(|fsl| PathBuf::from(fsl).join(MNI_TEMPLATE)),
        };

        Ok(Self {
            bids_dir,
            output,
            ext: args.ext.trim_start_matches('.').to_owned(),
            design,
            // the last of --x / --no-x wins; neither means on:
            regrid: args.regrid || !args.no_regrid,
            recon: args.recon || !args.no_recon,
            nthreads: args.nthreads,
            exclude,
            dispatch,
            stage,
            atlas_dir,
            atlases: args.atlases,
            mni_template,
            dot: args.dot.map(PathBuf::from),
            invalidate: args.invalidate,
            name: args.name,

            yes: args.yes,
            verbose: args.verbose,
            dry_run: args.dry_run,
            skip_checks: args.skip_checks,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::Parser;

    fn parse(extra: &[&str]) -> Result<Settings> {
        let mut argv = vec!["ppt", "--bids-dir", "/nonexistent/study/data"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)?.try_into()
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let settings = parse(&["--output", "/tmp/out"])?;
        assert_eq!(PeDesign::Single, settings.design);
        assert_eq!(Dispatch::Serial, settings.dispatch);
        assert_eq!(Stage::PreProc, settings.stage);
        assert!(settings.regrid && settings.recon);
        assert_eq!(6, settings.nthreads);
        assert_eq!(Path::new("/nonexistent/study"), settings.study_dir());
        Ok(())
    }

    #[test]
    fn test_derived_output() -> Result<()> {
        let settings = parse(&["--no-recon", "-x", "02.1", "-x", "sub-03.ses-2"])?;
        assert_eq!(PathBuf::from("/nonexistent/study/derivatives"), settings.output);
        assert!(!settings.recon);
        assert!(settings.exclude.contains(&SessionKey::new("02", "1")));
        assert!(settings.exclude.contains(&SessionKey::new("03", "2")));
        Ok(())
    }

    #[test]
    fn test_toggle_flags() -> Result<()> {
        let settings = parse(&["--no-regrid", "--regrid", "--recon", "--no-recon"])?;
        assert!(settings.regrid);
        assert!(!settings.recon);
        let settings = parse(&["--no-regrid"])?;
        assert!(!settings.regrid);
        Ok(())
    }

    #[test]
    fn test_invalid() {
        assert!(parse(&["-x", "02"]).is_err());
        assert!(parse(&["--parallel", "0"]).is_err());
        assert!(parse(&["--rpe-design", "rpe_pair"]).is_err());
        assert!(parse(&["--stage", "postproc"]).is_err());
        assert!(parse(&["--stage", "postproc", "--atlas-dir", "/atlases", "-a", "aal"]).is_ok());
    }

    #[test]
    fn test_parallel() -> Result<()> {
        let settings = parse(&["-j", "4", "--rpe-design", "rpe_all"])?;
        assert_eq!(Dispatch::Parallel(4), settings.dispatch);
        assert_eq!(PeDesign::Paired, settings.design);
        Ok(())
    }
}
