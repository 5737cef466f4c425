use anyhow::Result;

use super::preproc::{session_rows, SESSION_FIELDS};
use super::{NodeContainer, NodeSet};
use crate::interfaces::{ants, builtins, mrtrix};
use crate::{Iterables, PostProcConfig, Value};

/// Connectome construction from preprocessed DWI and precomputed tractograms,
/// run once per atlas for every subject/session.
#[derive(Debug)]
pub struct PostProcNodes {
    nodes: NodeSet,
    configured: bool,
}

/// Inputs of the connectome stage. Preprocessing results are found where the
/// preprocessing sinks put them (relative to `derivatives`); the tractograms
/// sit beside the dataset, so their template is absolute.
fn subject_templates(config: &PostProcConfig) -> Vec<(&'static str, String)> {
    let preproc = "preproc_mni/sub-{subject_id}/ses-{session_id}";
    let tracks = config
        .data_dir
        .join("cuda_tracking/sub-{subject_id}/ses-{session_id}/*.tck");
    vec![
        ("dwi", format!("{preproc}/dwi_acpc_1mm.nii.gz")),
        ("bfile", format!("{preproc}/dwi_acpc_1mm.b")),
        ("mask", format!("{preproc}/dwi_acpc_1mm_mask.nii.gz")),
        ("brain", format!("{preproc}/dwi_acpc_1mm_brain.nii.gz")),
        (
            "act",
            "anat/sub-{subject_id}/ses-{session_id}/mrtrix3_5tt.mif".to_owned(),
        ),
        ("tck", tracks.display().to_string()),
    ]
}

impl NodeContainer for PostProcNodes {
    type Config = PostProcConfig;
    const LABEL: &'static str = "Postprocessing";

    fn new(config: &PostProcConfig) -> Result<Self> {
        let mut nodes = NodeSet::default();

        nodes.add(builtins::identity(
            "atlas_source",
            Iterables {
                fields: vec!["atlas_name"],
                rows: config.atlases.iter().map(|a| vec![a.clone()]).collect(),
            },
        ))?;
        nodes.add(builtins::select_files(
            "select_atlases",
            config.atlas_dir.clone(),
            vec![("atlas", "{atlas_name}.nii.gz".to_owned())],
            &["atlas_name"],
        )?)?;
        nodes.add(builtins::identity(
            "subj_source",
            Iterables {
                fields: SESSION_FIELDS.to_vec(),
                rows: session_rows(&config.sessions),
            },
        ))?;
        nodes.add(builtins::select_files(
            "select_subjects",
            config.derivatives.clone(),
            subject_templates(config),
            SESSION_FIELDS,
        )?)?;

        for decl in [
            ants::registration("linear_registration"),
            ants::registration("nonlinear_registration"),
            mrtrix::check_niz("round_parcellation"),
            mrtrix::response("SDResponse"),
            mrtrix::fod("dwiFOD"),
            mrtrix::sift2("sift2_filtering"),
            mrtrix::connectome("weight_connectome"),
            mrtrix::connectome("weight_distance"),
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

    fn configure_defaults(&mut self, config: &PostProcConfig) -> Result<()> {
        let n = &mut self.nodes;

        configure_registration(n, "linear_registration", "Affine", "atlas_in_dwi_affine", config.nthreads)?;
        configure_registration(n, "nonlinear_registration", "SyN", "atlas_in_dwi_syn", config.nthreads)?;

        n.set("round_parcellation", "args", "-round")?;
        n.set("round_parcellation", "out_file", "nodes.mif")?;

        n.set("SDResponse", "algorithm", "dhollander")?;
        n.set("SDResponse", "wm_file", "wm.txt")?;
        n.set("SDResponse", "gm_file", "gm.txt")?;
        n.set("SDResponse", "csf_file", "csf.txt")?;
        n.set("SDResponse", "nthreads", config.nthreads)?;

        n.set("dwiFOD", "algorithm", "msmt_csd")?;
        n.set("dwiFOD", "wm_odf", "wm.mif")?;
        n.set("dwiFOD", "gm_odf", "gm.mif")?;
        n.set("dwiFOD", "csf_odf", "csf.mif")?;
        n.set("dwiFOD", "nthreads", config.nthreads)?;

        n.set("sift2_filtering", "fd_scale_gm", true)?;
        n.set("sift2_filtering", "out_file", "sift2.txt")?;
        n.set("sift2_filtering", "nthreads", config.nthreads)?;

        n.set("weight_connectome", "out_file", "connectome.csv")?;
        n.set("weight_connectome", "symmetric", true)?;
        n.set("weight_connectome", "zero_diag", true)?;
        n.set("weight_connectome", "nthreads", config.nthreads)?;

        n.set("weight_distance", "scale_length", true)?;
        n.set("weight_distance", "stat_edge", "mean")?;
        n.set("weight_distance", "symmetric", true)?;
        n.set("weight_distance", "zero_diag", true)?;
        n.set("weight_distance", "out_file", "distances.csv")?;
        n.set("weight_distance", "nthreads", config.nthreads)?;

        self.configured = true;
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn expected_nodes(_config: &PostProcConfig) -> Vec<&'static str> {
        vec![
            "atlas_source",
            "select_atlases",
            "subj_source",
            "select_subjects",
            "linear_registration",
            "nonlinear_registration",
            "round_parcellation",
            "SDResponse",
            "dwiFOD",
            "sift2_filtering",
            "weight_connectome",
            "weight_distance",
            "datasink",
        ]
    }

    fn nodes(&self) -> &NodeSet {
        &self.nodes
    }

    fn into_nodes(self) -> NodeSet {
        self.nodes
    }
}

fn configure_registration(
    n: &mut NodeSet,
    node: &str,
    transform: &str,
    prefix: &str,
    threads: u32,
) -> Result<()> {
    n.set(node, "output_transform_prefix", prefix)?;
    n.set(node, "output_warped_image", format!("{prefix}.nii.gz"))?;
    n.set(node, "dimension", 3)?;
    n.set(node, "collapse_output_transforms", 1)?;
    n.set(node, "transform", Value::tuple([Value::str(transform), Value::Float(0.1)]))?;
    n.set(
        node,
        "metric",
        Value::tuple([Value::str("MI"), Value::Int(1), Value::Int(64)]),
    )?;
    n.set(
        node,
        "convergence",
        Value::tuple([Value::str("500x200x200x100"), Value::Float(1e-6), Value::Int(10)]),
    )?;
    n.set(node, "smoothing_sigmas", "4x2x1x0")?;
    n.set(node, "shrink_factors", "8x4x2x1")?;
    n.set(node, "use_histogram_matching", 1)?;
    // parcellations hold labels, so no blending between them:
    n.set(node, "interpolation", "NearestNeighbor")?;
    n.set(node, "num_threads", threads)?;
    Ok(())
}
