use anyhow::Result;

use super::{NodeContainer, NodeSet};
use crate::interfaces::{builtins, fsl, mrtrix};
use crate::{Iterables, PeDesign, PipelineConfig, Value};

/// Fields every preprocessing realization is keyed by.
pub const SESSION_FIELDS: &[&str] = &["subject_id", "session_id"];

/// DWI preprocessing: conversion, denoising, artifact and bias correction,
/// normalization, b0 extraction and the MNI-space outputs.
#[derive(Debug)]
pub struct PreProcNodes {
    nodes: NodeSet,
    configured: bool,
}

fn select_templates(config: &PipelineConfig) -> Vec<(&'static str, String)> {
    let ext = &config.ext;
    let session = "sub-{subject_id}/ses-{session_id}";
    let prefix = "sub-{subject_id}_ses-{session_id}";
    let mut templates = vec![(
        "anat",
        format!("{session}/anat/{prefix}_T1w.{ext}"),
    )];
    match config.design {
        PeDesign::Single => {
            templates.push(("dwi", format!("{session}/dwi/{prefix}_dwi.{ext}")));
        }
        PeDesign::Paired => {
            templates.push(("dwi", format!("{session}/dwi/{prefix}_ap_dwi.{ext}")));
            templates.push(("rdwi", format!("{session}/dwi/{prefix}_pa_dwi.{ext}")));
        }
    }
    templates
}

/// `(subject, session)` rows for the iterable source.
pub(crate) fn session_rows(sessions: &[(String, String)]) -> Vec<Vec<String>> {
    sessions
        .iter()
        .map(|(sub, ses)| vec![sub.clone(), ses.clone()])
        .collect()
}

impl NodeContainer for PreProcNodes {
    type Config = PipelineConfig;
    const LABEL: &'static str = "Preprocessing";

    fn new(config: &PipelineConfig) -> Result<Self> {
        let mut nodes = NodeSet::default();

        nodes.add(builtins::identity(
            "sub_source",
            Iterables {
                fields: SESSION_FIELDS.to_vec(),
                rows: session_rows(&config.sessions),
            },
        ))?;
        nodes.add(builtins::select_files(
            "select_files",
            config.bids_dir.clone(),
            select_templates(config),
            SESSION_FIELDS,
        )?)?;
        nodes.add(builtins::metadata("get_metadata", config.bids_dir.clone()))?;

        match config.design {
            PeDesign::Single => {
                nodes.add(builtins::gradient_files("sub_grad_files", &config.ext))?;
                nodes.add(mrtrix::convert("mrtrix_image"))?;
            }
            PeDesign::Paired => {
                nodes.add(builtins::gradient_files("sub_grad_files1", &config.ext))?;
                nodes.add(builtins::gradient_files("sub_grad_files2", &config.ext))?;
                nodes.add(mrtrix::convert("mrtrix_image1"))?;
                nodes.add(mrtrix::convert("mrtrix_image2"))?;
                nodes.add(mrtrix::cat("concat_dwi"))?;
                nodes.add(mrtrix::gradcat("concat_grad"))?;
            }
        }

        for decl in [
            mrtrix::brain_mask("raw_dwi2mask"),
            mrtrix::gradcheck("dwigradcheck"),
            mrtrix::convert("mrconvert"),
            mrtrix::denoise("denoise"),
            mrtrix::degibbs("ringing_removal"),
            mrtrix::fslpreproc("dwifslpreproc"),
            mrtrix::gradcheck("alter_gradient"),
            mrtrix::info("modify_gradient"),
            mrtrix::convert("update_image"),
            mrtrix::brain_mask("recreate_mask"),
            mrtrix::biascorrect("dwibiascorrect"),
            mrtrix::info("NewGradient"),
            mrtrix::check_niz("LowNoiseMap"),
            mrtrix::rician_noise("RicianNoise"),
            mrtrix::check_niz("NoiseComparison"),
            mrtrix::convert("ConvertRician"),
            mrtrix::brain_mask("dwi2mask"),
            mrtrix::fit_tensor("dwi2tensor"),
            mrtrix::tensor_metrics("tensor2metrics"),
            mrtrix::threshold("mrthreshold"),
            mrtrix::normalise("dwinormalise"),
            mrtrix::extract("sub_b0extract"),
            mrtrix::math("sub_mrmath_mean"),
            mrtrix::brain_mask("sub_dwi2mask"),
            mrtrix::convert("sub_dwi2nii"),
            mrtrix::convert("sub_mask2nii"),
            fsl::apply_mask("sub_ApplyMask"),
            mrtrix::extract("mni_b0extract"),
            mrtrix::math("mni_mrmath_mean"),
            mrtrix::brain_mask("mni_dwi2mask"),
            mrtrix::convert("mni_dwi2nii"),
            mrtrix::convert("mni_mask2nii"),
            fsl::apply_mask("mni_ApplyMask"),
            mrtrix::convert("MNI_Outputs"),
        ] {
            nodes.add(decl)?;
        }
        nodes.add(builtins::datasink("datasink", config.derivatives.clone()))?;

        log::info!("Data sink (output folder) is set to {:?}", config.derivatives);
        Ok(Self {
            nodes,
            configured: false,
        })
    }

    fn configure_defaults(&mut self, config: &PipelineConfig) -> Result<()> {
        let n = &mut self.nodes;
        let threads = config.nthreads;

        match config.design {
            PeDesign::Single => {
                configure_conversion(n, "mrtrix_image", "raw_dwi", threads)?;
            }
            PeDesign::Paired => {
                configure_conversion(n, "mrtrix_image1", "raw_dwi1", threads)?;
                configure_conversion(n, "mrtrix_image2", "raw_dwi2", threads)?;
                n.set("concat_dwi", "out_file", "raw_dwi.mif")?;
                n.set("concat_grad", "out_file", "raw_dwi.b")?;
            }
        }

        n.set("raw_dwi2mask", "out_file", "b0_brain_mask.mif")?;
        n.set("raw_dwi2mask", "nthreads", threads)?;

        n.set("dwigradcheck", "export_grad", "corrected.b")?;
        set_housekeeping(n, "dwigradcheck", threads, true)?;

        n.set("mrconvert", "out_file", "corrected_dwi.mif")?;
        set_housekeeping(n, "mrconvert", threads, true)?;

        n.set("denoise", "out_file", "denoised.mif")?;
        n.set("denoise", "noise", "noise_map.mif")?;
        set_housekeeping(n, "denoise", threads, true)?;

        n.set("ringing_removal", "out_file", "unring.mif")?;

        n.set("dwifslpreproc", "out_file", "preproc.mif")?;
        n.set("dwifslpreproc", "rpe_options", config.design.rpe_option())?;
        n.set("dwifslpreproc", "eddy_options", "--slm=linear --repol ")?;
        n.set("dwifslpreproc", "export_grad", "eddy_dwi.b")?;
        set_housekeeping(n, "dwifslpreproc", threads, true)?;

        n.set("alter_gradient", "export_grad", "tmp.b")?;
        n.set("modify_gradient", "export_grad", "modified.b")?;

        n.set("dwibiascorrect", "use_ants", true)?;
        n.set("dwibiascorrect", "out_file", "dwi_bias.mif")?;
        n.set("dwibiascorrect", "bias", "biasfield.mif")?;

        n.set("NewGradient", "export_grad", "rician_tmp.b")?;
        set_housekeeping(n, "NewGradient", threads, true)?;

        n.set("LowNoiseMap", "out_file", "lownoisemap.mif")?;
        set_housekeeping(n, "LowNoiseMap", threads, true)?;

        n.set("RicianNoise", "power", 2)?;
        n.set("RicianNoise", "denoise", 2)?;
        n.set("RicianNoise", "out_file", "rician_removed_dwi.mif")?;
        set_housekeeping(n, "RicianNoise", threads, true)?;

        n.set("NoiseComparison", "out_file", "rician_tmp.mif")?;
        set_housekeeping(n, "NoiseComparison", threads, false)?;

        n.set("ConvertRician", "out_file", "rician_corrected_dwi.mif")?;
        set_housekeeping(n, "ConvertRician", threads, false)?;

        n.set("mrthreshold", "opt_abs", 0.5)?;
        n.set("mrthreshold", "out_file", "wm.mif")?;
        set_housekeeping(n, "mrthreshold", threads, true)?;

        n.set("dwinormalise", "opt_intensity", 1000)?;
        n.set("dwinormalise", "out_file", "dwi_norm_intensity.mif")?;
        set_housekeeping(n, "dwinormalise", threads, true)?;

        n.set("dwi2mask", "out_file", "dwi_mask.mif")?;
        n.set("dwi2tensor", "out_file", "dti.mif")?;
        n.set("tensor2metrics", "out_fa", "fa.mif")?;

        configure_b0(n, "sub", "b0_volume.mif", "b0_dwi.mif", "dwi_norm_mask.mif", threads)?;
        n.set("sub_dwi2nii", "out_file", "b0_dwi.nii.gz")?;
        n.set("sub_dwi2nii", "force", true)?;
        n.set("sub_mask2nii", "out_file", "dwi_norm_mask.nii.gz")?;
        n.set("sub_mask2nii", "force", true)?;
        n.set("sub_ApplyMask", "out_file", "b0_dwi_brain.nii.gz")?;

        configure_b0(
            n,
            "mni",
            "dwi_acpc_1mm_b0.mif",
            "dwi_acpc_1mm_b0mean.mif",
            "dwi_acpc_1mm_mask.mif",
            threads,
        )?;
        n.set("mni_dwi2nii", "out_file", "dwi_acpc_1mm_b0mean.nii.gz")?;
        n.set("mni_dwi2nii", "force", true)?;
        n.set("mni_mask2nii", "out_file", "dwi_acpc_1mm_mask.nii.gz")?;
        n.set("mni_mask2nii", "force", true)?;
        n.set("mni_ApplyMask", "out_file", "dwi_acpc_1mm_brain.nii.gz")?;

        n.set("MNI_Outputs", "out_file", "dwi_acpc_1mm.nii.gz")?;
        n.set("MNI_Outputs", "export_grad", "dwi_acpc_1mm.b")?;
        n.set(
            "MNI_Outputs",
            "export_fslgrad",
            Value::tuple([Value::str("dwi_acpc.bvecs"), Value::str("dwi_acpc.bvals")]),
        )?;
        n.set("MNI_Outputs", "out_json", "dwi_acpc_1mm.json")?;
        n.set("MNI_Outputs", "force", true)?;
        n.set("MNI_Outputs", "nthreads", threads)?;

        self.configured = true;
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn expected_nodes(config: &PipelineConfig) -> Vec<&'static str> {
        let mut names = vec!["sub_source", "select_files", "get_metadata"];
        match config.design {
            PeDesign::Single => names.extend(["sub_grad_files", "mrtrix_image"]),
            PeDesign::Paired => names.extend([
                "sub_grad_files1",
                "sub_grad_files2",
                "mrtrix_image1",
                "mrtrix_image2",
                "concat_dwi",
                "concat_grad",
            ]),
        }
        names.extend([
            "raw_dwi2mask",
            "dwigradcheck",
            "mrconvert",
            "denoise",
            "ringing_removal",
            "dwifslpreproc",
            "alter_gradient",
            "modify_gradient",
            "update_image",
            "recreate_mask",
            "dwibiascorrect",
            "NewGradient",
            "LowNoiseMap",
            "RicianNoise",
            "NoiseComparison",
            "ConvertRician",
            "dwi2mask",
            "dwi2tensor",
            "tensor2metrics",
            "mrthreshold",
            "dwinormalise",
            "sub_b0extract",
            "sub_mrmath_mean",
            "sub_dwi2mask",
            "sub_dwi2nii",
            "sub_mask2nii",
            "sub_ApplyMask",
            "mni_b0extract",
            "mni_mrmath_mean",
            "mni_dwi2mask",
            "mni_dwi2nii",
            "mni_mask2nii",
            "mni_ApplyMask",
            "MNI_Outputs",
            "datasink",
        ]);
        names
    }

    fn nodes(&self) -> &NodeSet {
        &self.nodes
    }

    fn into_nodes(self) -> NodeSet {
        self.nodes
    }
}

/// `-nthreads`, `-force` and optionally `-quiet`.
fn set_housekeeping(n: &mut NodeSet, node: &str, threads: u32, quiet: bool) -> Result<()> {
    n.set(node, "nthreads", threads)?;
    n.set(node, "force", true)?;
    if quiet {
        n.set(node, "quiet", true)?;
    }
    Ok(())
}

fn configure_conversion(n: &mut NodeSet, node: &str, stem: &str, threads: u32) -> Result<()> {
    n.set(node, "out_file", format!("{stem}.mif"))?;
    n.set(node, "export_grad", format!("{stem}.b"))?;
    set_housekeeping(n, node, threads, true)
}

/// b=0 extraction, mean over volumes and brain mask for one of the `sub_`/`mni_` chains.
fn configure_b0(
    n: &mut NodeSet,
    chain: &str,
    volume: &str,
    mean: &str,
    mask: &str,
    threads: u32,
) -> Result<()> {
    let extract = format!("{chain}_b0extract");
    let math = format!("{chain}_mrmath_mean");
    let dwi2mask = format!("{chain}_dwi2mask");

    n.set(&extract, "bzero", true)?;
    n.set(&extract, "out_file", volume)?;
    n.set(&extract, "nthreads", threads)?;

    n.set(&math, "operation", "mean")?;
    n.set(&math, "axis", 3)?;
    n.set(&math, "out_file", mean)?;
    n.set(&math, "nthreads", threads)?;

    n.set(&dwi2mask, "out_file", mask)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn config(design: PeDesign) -> PipelineConfig {
        let mut config = PipelineConfig::new("/study/data");
        config.design = design;
        config.sessions = vec![("01".to_owned(), "1".to_owned())];
        config
    }

    #[test]
    fn test_single() -> Result<()> {
        let nodes = PreProcNodes::build(&config(PeDesign::Single))?;
        assert!(nodes.is_configured());
        assert!(nodes.nodes().contains("mrtrix_image"));
        assert!(!nodes.nodes().contains("concat_dwi"));
        let conv = nodes.nodes().get("mrtrix_image")?;
        assert_eq!(Some(&Value::from("raw_dwi.b")), conv.value("export_grad"));
        assert_eq!(Some(&Value::Int(6)), conv.value("nthreads"));
        Ok(())
    }

    #[test]
    fn test_paired() -> Result<()> {
        let nodes = PreProcNodes::build(&config(PeDesign::Paired))?;
        for name in ["mrtrix_image1", "mrtrix_image2", "concat_dwi", "concat_grad"] {
            assert!(nodes.nodes().contains(name), "missing {name}");
        }
        assert!(!nodes.nodes().contains("mrtrix_image"));
        let fslpreproc = nodes.nodes().get("dwifslpreproc")?;
        assert_eq!(Some(&Value::from("-rpe_all")), fslpreproc.value("rpe_options"));
        Ok(())
    }

    #[test]
    fn test_templates() {
        let templates = select_templates(&config(PeDesign::Paired));
        assert_eq!(
            (
                "rdwi",
                "sub-{subject_id}/ses-{session_id}/dwi/sub-{subject_id}_ses-{session_id}_pa_dwi.nii.gz"
                    .to_owned()
            ),
            templates[2]
        );
    }
}
