use anyhow::Result;
use pipetography::{App, Args};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn basic_args(bids_dir: &Path) -> Args {
    Args {
        bids_dir: bids_dir.to_str().unwrap().to_owned(),
        output: None,
        ext: String::from("nii.gz"),
        rpe_design: String::from("rpe_none"),
        regrid: false,
        no_regrid: false,
        recon: false,
        no_recon: false,
        nthreads: 6,
        exclude: Vec::with_capacity(0),
        parallel: None,
        stage: String::from("preproc"),
        atlas_dir: None,
        atlases: Vec::with_capacity(0),
        mni_template: Some(String::from("/opt/fsl/data/standard/MNI152_T1_1mm.nii.gz")),
        dot: None,
        invalidate: None,
        yes: true,
        verbose: 1,
        dry_run: false,
        skip_checks: true,
        name: None,
    }
}

/// `study/data/sub-XX/ses-Y/{anat,dwi}` with empty image files, for each session.
fn make_study(root: &Path, sessions: &[(&str, &str)]) -> Result<PathBuf> {
    let data = root.join("data");
    for (sub, ses) in sessions {
        let dir = data.join(format!("sub-{sub}/ses-{ses}"));
        let prefix = format!("sub-{sub}_ses-{ses}");
        fs::create_dir_all(dir.join("anat"))?;
        fs::create_dir_all(dir.join("dwi"))?;
        fs::write(dir.join(format!("anat/{prefix}_T1w.nii.gz")), "")?;
        for ext in ["nii.gz", "bvec", "bval"] {
            fs::write(dir.join(format!("dwi/{prefix}_dwi.{ext}")), "")?;
        }
        fs::write(
            dir.join(format!("dwi/{prefix}_dwi.json")),
            r#"{"TotalReadoutTime": 0.05, "PhaseEncodingDirection": "j-"}"#,
        )?;
    }
    Ok(data)
}

fn run(args: Args) -> Result<()> {
    simple_logging::log_to_stderr(log::LevelFilter::Trace);
    let settings = args.try_into()?;
    App::new(settings).run()
}

#[test]
fn test_dry_run_draws_graph() -> Result<()> {
    let study = tempdir()?;
    let data = make_study(study.path(), &[("01", "1"), ("02", "1")])?;
    let dot = study.path().join("pipeline.dot");

    let mut args = basic_args(&data);
    args.dry_run = true;
    args.exclude = vec![String::from("02.1")];
    args.dot = Some(dot.to_str().unwrap().to_owned());
    run(args)?;

    let text = fs::read_to_string(&dot)?;
    assert!(text.starts_with("digraph"), "Graph was written in DOT format");
    assert!(text.contains("dwifslpreproc"));
    assert!(text.contains("recon_all"));
    assert!(
        !study.path().join("derivatives").exists(),
        "Dry run did not create the output directory"
    );
    Ok(())
}

#[test]
fn test_missing_dataset() -> Result<()> {
    let study = tempdir()?;
    let args = basic_args(&study.path().join("data"));
    assert!(run(args).is_err());
    Ok(())
}

#[test]
fn test_everything_excluded() -> Result<()> {
    let study = tempdir()?;
    let data = make_study(study.path(), &[("01", "1")])?;

    let mut args = basic_args(&data);
    args.exclude = vec![String::from("sub-01.ses-1")];
    run(args)?;

    let derivatives = study.path().join("derivatives");
    assert!(derivatives.is_dir(), "Output directory was created");
    assert!(
        !derivatives.join("pipetography").exists(),
        "Nothing ran when every session was excluded"
    );
    Ok(())
}

#[test]
fn test_invalidate_downstream() -> Result<()> {
    let study = tempdir()?;
    let data = make_study(study.path(), &[("01", "1")])?;
    let realization = study
        .path()
        .join("derivatives/pipetography/_subject_id_01_session_id_1");

    // pretend a previous run completed these nodes:
    let nodes = ["fsl_bet", "mrtransform", "mrgrid"];
    for node in nodes {
        fs::create_dir_all(realization.join(node))?;
        fs::write(realization.join(node).join("exit_code"), "0")?;
    }

    let mut args = basic_args(&data);
    args.invalidate = Some(String::from("mrtransform"));
    run(args)?;

    assert!(
        realization.join("fsl_bet/exit_code").exists(),
        "Upstream node was not invalidated"
    );
    assert!(!realization.join("mrtransform/exit_code").exists());
    assert!(
        !realization.join("mrgrid/exit_code").exists(),
        "Downstream node was invalidated too"
    );
    assert!(realization.join("mrtransform").is_dir(), "Node dir was kept");
    Ok(())
}

#[test]
fn test_invalidate_unknown_node() -> Result<()> {
    let study = tempdir()?;
    let data = make_study(study.path(), &[("01", "1")])?;

    let mut args = basic_args(&data);
    args.no_regrid = true;
    // mrgrid is left out of the graph without regridding:
    args.invalidate = Some(String::from("mrgrid"));
    assert!(run(args).is_err());
    Ok(())
}

#[test]
fn test_postproc_graph() -> Result<()> {
    let study = tempdir()?;
    let data = make_study(study.path(), &[("01", "1")])?;
    let atlases = study.path().join("atlases");
    fs::create_dir_all(&atlases)?;
    let dot = study.path().join("connectome.dot");

    let mut args = basic_args(&data);
    args.stage = String::from("postproc");
    args.atlas_dir = Some(atlases.to_str().unwrap().to_owned());
    args.atlases = vec![String::from("aal"), String::from("desikan")];
    args.dot = Some(dot.to_str().unwrap().to_owned());
    args.dry_run = true;
    run(args)?;

    let text = fs::read_to_string(&dot)?;
    assert!(text.contains("weight_connectome"));
    assert!(text.contains("tck2connectome"));
    Ok(())
}
