use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Whether reverse phase-encoded volumes were acquired. Fixed for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeDesign {
    /// one DWI volume per session
    #[default]
    Single,
    /// forward (`ap`) and reverse (`pa`) volumes per session
    Paired,
}

impl PeDesign {
    /// The `dwifslpreproc` option for this design.
    pub fn rpe_option(self) -> &'static str {
        match self {
            Self::Single => "-rpe_none",
            Self::Paired => "-rpe_all",
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[error("Unrecognized phase-encoding design '{0}' (expected rpe_none or rpe_all)")]
pub struct UnknownDesign(String);

impl FromStr for PeDesign {
    type Err = UnknownDesign;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('-') {
            "rpe_none" | "single" => Ok(Self::Single),
            "rpe_all" | "paired" => Ok(Self::Paired),
            _ => Err(UnknownDesign(s.to_owned())),
        }
    }
}

impl fmt::Display for PeDesign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rpe_option().trim_start_matches('-'))
    }
}

/// `derivatives` dir beside the dataset root, like `data/../derivatives`.
pub fn derivatives_for(bids_dir: &Path) -> PathBuf {
    match bids_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join("derivatives"),
        _ => bids_dir.join("derivatives"),
    }
}

/// Everything needed to assemble the preprocessing workflow.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub name: String,
    pub bids_dir: PathBuf,
    /// base dir for node work dirs and sinks
    pub derivatives: PathBuf,
    /// extension of the imaging files, without the leading dot
    pub ext: String,
    pub design: PeDesign,
    /// resample the aligned DWI to the template's voxel grid
    pub regrid: bool,
    /// run FreeSurfer's recon-all on the aligned T1
    pub recon: bool,
    /// thread count handed to MRtrix3 tools
    pub nthreads: u32,
    /// (subject, session) pairs to iterate over
    pub sessions: Vec<(String, String)>,
    pub mni_template: PathBuf,
}

impl PipelineConfig {
    pub fn new(bids_dir: impl Into<PathBuf>) -> Self {
        let bids_dir = bids_dir.into();
        Self {
            name: "pipetography".to_owned(),
            derivatives: derivatives_for(&bids_dir),
            bids_dir,
            ext: "nii.gz".to_owned(),
            design: PeDesign::default(),
            regrid: true,
            recon: true,
            nthreads: 6,
            sessions: Vec::new(),
            mni_template: PathBuf::from("MNI152_T1_1mm.nii.gz"),
        }
    }
}

/// Everything needed to assemble the connectome workflow.
#[derive(Debug, Clone)]
pub struct PostProcConfig {
    pub name: String,
    /// study dir containing `cuda_tracking/`
    pub data_dir: PathBuf,
    /// where preprocessing sank its results, and where connectomes are sunk
    pub derivatives: PathBuf,
    pub atlas_dir: PathBuf,
    /// atlas names; each is found as `<atlas_dir>/<name>.nii.gz`
    pub atlases: Vec<String>,
    pub sessions: Vec<(String, String)>,
    pub nthreads: u32,
}

impl PostProcConfig {
    pub fn new(data_dir: impl Into<PathBuf>, atlas_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            name: "connectome".to_owned(),
            derivatives: data_dir.join("derivatives"),
            data_dir,
            atlas_dir: atlas_dir.into(),
            atlases: Vec::new(),
            sessions: Vec::new(),
            nthreads: 6,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_design() {
        assert_eq!(PeDesign::Single, "rpe_none".parse().unwrap());
        assert_eq!(PeDesign::Paired, "-rpe_all".parse().unwrap());
        assert_eq!(PeDesign::Paired, "paired".parse().unwrap());
        assert!("rpe_pair".parse::<PeDesign>().is_err());
        assert_eq!("-rpe_all", PeDesign::Paired.rpe_option());
        assert_eq!("rpe_none", PeDesign::Single.to_string());
    }

    #[test]
    fn test_derivatives() {
        assert_eq!(
            PathBuf::from("/study/derivatives"),
            derivatives_for(Path::new("/study/data"))
        );
        assert_eq!(PathBuf::from("data/derivatives"), derivatives_for(Path::new("data")));
    }
}
