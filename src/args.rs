use clap::Parser;

const CMD_NAME: &str = "ppt";
const DEFAULT_BIDS_DIR: &str = "data";
const DEFAULT_EXT: &str = "nii.gz";
const DEFAULT_RPE_DESIGN: &str = "rpe_none";
const DEFAULT_NTHREADS: u32 = 6;

/// Stores our command-line args format.
#[derive(Parser, Debug)]
#[command(name = CMD_NAME, version, about = None, long_about = None)]
pub struct Args {
    /// BIDS dataset root
    #[arg(short = 'd', long, value_name = "DIR", default_value = DEFAULT_BIDS_DIR)]
    #[arg(env = "PIPETOGRAPHY_BIDS_DIR")]
    pub bids_dir: String,

    /// Output directory [default: derivatives dir beside the dataset]
    #[arg(short, long, value_name = "DIR")]
    #[arg(env = "PIPETOGRAPHY_OUTPUT")]
    pub output: Option<String>,

    /// Extension of the imaging files
    #[arg(long, value_name = "EXT", default_value = DEFAULT_EXT)]
    pub ext: String,

    /// Phase-encoding design: rpe_none (single) or rpe_all (paired)
    #[arg(long, value_name = "DESIGN", default_value = DEFAULT_RPE_DESIGN)]
    pub rpe_design: String,

    /// Resample the aligned DWI onto the template grid [default]
    #[arg(long, overrides_with = "no_regrid")]
    pub regrid: bool,

    /// Don't resample the aligned DWI onto the template grid
    #[arg(long, overrides_with = "regrid")]
    pub no_regrid: bool,

    /// Run FreeSurfer's recon-all on the aligned T1 [default]
    #[arg(long, overrides_with = "no_recon")]
    pub recon: bool,

    /// Don't run FreeSurfer's recon-all
    #[arg(long, overrides_with = "recon")]
    pub no_recon: bool,

    /// Thread count handed to MRtrix3 tools
    #[arg(long, value_name = "N", default_value_t = DEFAULT_NTHREADS)]
    pub nthreads: u32,

    /// Exclude a session from processing
    #[arg(short = 'x', long, value_name = "SUB.SES")]
    pub exclude: Vec<String>,

    /// Run up to N realizations at once
    #[arg(short = 'j', long, value_name = "N")]
    pub parallel: Option<usize>,

    /// Workflow to run
    #[arg(short, long, value_name = "STAGE", default_value = "preproc")]
    pub stage: String,

    /// Directory holding atlas images (connectome stage)
    #[arg(long, value_name = "DIR")]
    pub atlas_dir: Option<String>,

    /// Atlas to build connectomes for, found as <atlas-dir>/<NAME>.nii.gz
    #[arg(short, long = "atlas", value_name = "NAME")]
    pub atlases: Vec<String>,

    /// MNI template image [default: $FSLDIR/data/standard/MNI152_T1_1mm.nii.gz]
    #[arg(long, value_name = "FILE")]
    pub mni_template: Option<String>,

    /// Write the workflow graph in DOT format
    #[arg(long, value_name = "FILE")]
    pub dot: Option<String>,

    /// Invalidate the named node in every realization
    #[arg(short = 'i', long, value_name = "NODE")]
    pub invalidate: Option<String>,

    /// Bypass user confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Print additional debugging info
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Dry run; print info but don't modify anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the startup check of the neuroimaging environment
    #[arg(long)]
    pub skip_checks: bool,

    /// Workflow name, used as the work dir under the output directory
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,
}
