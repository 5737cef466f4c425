//! Wiring of the node containers into complete workflows.

use anyhow::Result;

use crate::graph::{GraphBuilder, WorkflowGraph};
use crate::nodes::{AcpcNodes, NodeContainer, PostProcNodes, PreProcNodes};
use crate::{PeDesign, PipelineConfig, PostProcConfig};

/// Preprocessing workflow: DWI preprocessing, ACPC alignment and MNI-space outputs
/// for every subject/session in `config`.
pub fn build_graph(config: &PipelineConfig) -> Result<WorkflowGraph> {
    let mut b = GraphBuilder::new(config.name.clone());
    b.add_container(PreProcNodes::build(config)?)?;
    b.add_container(AcpcNodes::build(config)?)?;

    connect_backbone(&mut b);
    connect_acpc(&mut b);
    connect_anat(&mut b);
    match config.design {
        PeDesign::Single => connect_single(&mut b),
        PeDesign::Paired => connect_paired(&mut b),
    }
    if config.recon {
        connect_recon(&mut b);
    }
    connect_mni(&mut b, config.regrid);

    b.finish()
}

fn connect_backbone(b: &mut GraphBuilder) {
    b.connect(
        "sub_source",
        "select_files",
        &[("subject_id", "subject_id"), ("session_id", "session_id")],
    );
    b.connect("select_files", "get_metadata", &[("dwi", "path")]);
    b.connect(
        "get_metadata",
        "dwifslpreproc",
        &[("ReadoutTime", "RO_time"), ("PE_DIR", "pe_dir")],
    );

    b.connect("raw_dwi2mask", "dwigradcheck", &[("out_file", "mask_file")]);
    b.connect("dwigradcheck", "mrconvert", &[("out_bfile", "grad_file")]);
    b.connect("mrconvert", "denoise", &[("out_file", "in_file")]);
    b.connect("denoise", "ringing_removal", &[("out_file", "in_file")]);
    b.connect("ringing_removal", "dwifslpreproc", &[("out_file", "in_file")]);
    b.connect("dwigradcheck", "dwifslpreproc", &[("out_bfile", "grad_file")]);

    // gradient reconciliation after eddy correction
    b.connect("dwifslpreproc", "alter_gradient", &[("out_file", "in_file")]);
    b.connect("dwifslpreproc", "modify_gradient", &[("out_file", "in_file")]);
    b.connect("alter_gradient", "modify_gradient", &[("out_bfile", "grad_file")]);
    b.connect("modify_gradient", "update_image", &[("out_bfile", "grad_file")]);
    b.connect("dwifslpreproc", "update_image", &[("out_file", "in_file")]);
    b.connect("update_image", "recreate_mask", &[("out_file", "in_file")]);
    b.connect("modify_gradient", "recreate_mask", &[("out_bfile", "grad_file")]);

    b.connect("update_image", "dwibiascorrect", &[("out_file", "in_file")]);
    b.connect("modify_gradient", "dwibiascorrect", &[("out_bfile", "grad_file")]);
    b.connect("recreate_mask", "dwibiascorrect", &[("out_file", "in_mask")]);
    b.connect("dwibiascorrect", "NewGradient", &[("out_file", "in_file")]);
    b.connect("modify_gradient", "NewGradient", &[("out_bfile", "grad_file")]);

    // Rician noise correction
    b.connect(
        "denoise",
        "LowNoiseMap",
        &[("noise", "isfinite"), ("noise", "cond_if")],
    );
    b.connect("LowNoiseMap", "RicianNoise", &[("out_file", "lownoisemap")]);
    b.connect("dwibiascorrect", "RicianNoise", &[("out_file", "in_file")]);
    b.connect(
        "RicianNoise",
        "NoiseComparison",
        &[("out_file", "isfinite"), ("out_file", "cond_if")],
    );
    b.connect("NoiseComparison", "ConvertRician", &[("out_file", "in_file")]);
    b.connect("NewGradient", "ConvertRician", &[("out_bfile", "grad_file")]);

    // tensor fit, WM mask, intensity normalization
    b.connect("ConvertRician", "dwi2mask", &[("out_file", "in_file")]);
    b.connect("dwi2mask", "dwi2tensor", &[("out_file", "in_mask")]);
    b.connect("ConvertRician", "dwi2tensor", &[("out_file", "in_file")]);
    b.connect("dwi2tensor", "tensor2metrics", &[("out_file", "in_file")]);
    b.connect("tensor2metrics", "mrthreshold", &[("out_fa", "in_file")]);
    b.connect("mrthreshold", "dwinormalise", &[("out_file", "mask_file")]);
    b.connect("ConvertRician", "dwinormalise", &[("out_file", "in_file")]);

    // mean b0 in subject space
    b.connect("dwinormalise", "sub_b0extract", &[("out_file", "in_file")]);
    b.connect("sub_b0extract", "sub_mrmath_mean", &[("out_file", "in_file")]);
    b.connect("dwinormalise", "sub_dwi2mask", &[("out_file", "in_file")]);
    b.connect("sub_dwi2mask", "sub_mask2nii", &[("out_file", "in_file")]);
    b.connect("sub_mrmath_mean", "sub_dwi2nii", &[("out_file", "in_file")]);
    b.connect("sub_dwi2nii", "sub_ApplyMask", &[("out_file", "in_file")]);
    b.connect("sub_mask2nii", "sub_ApplyMask", &[("out_file", "mask_file")]);

    // mean b0 and outputs in ACPC space
    b.connect("mni_b0extract", "mni_mrmath_mean", &[("out_file", "in_file")]);
    b.connect("mni_dwi2mask", "mni_mask2nii", &[("out_file", "in_file")]);
    b.connect("mni_mrmath_mean", "mni_dwi2nii", &[("out_file", "in_file")]);
    b.connect("mni_mask2nii", "mni_ApplyMask", &[("out_file", "mask_file")]);
    b.connect("mni_dwi2nii", "mni_ApplyMask", &[("out_file", "in_file")]);

    b.connect(
        "mni_ApplyMask",
        "datasink",
        &[("out_file", "preproc_mni.@dwi_brain")],
    );
    b.connect(
        "mni_mask2nii",
        "datasink",
        &[("out_file", "preproc_mni.@dwi_b0_brainmask")],
    );
    b.connect(
        "mni_dwi2nii",
        "datasink",
        &[("out_file", "preproc_mni.@dwi_b0_meanvolume")],
    );
    b.connect(
        "MNI_Outputs",
        "datasink",
        &[
            ("out_file", "preproc_mni.@dwi"),
            ("out_bfile", "preproc_mni.@b"),
            ("out_fslbvec", "preproc_mni.@fsl_bvec"),
            ("out_fslbval", "preproc_mni.@fsl_bval"),
            ("out_json", "preproc_mni.@json"),
        ],
    );
}

fn connect_acpc(b: &mut GraphBuilder) {
    b.connect("select_files", "reduce_FOV", &[("anat", "in_file")]);
    b.connect("select_files", "apply_warp", &[("anat", "in_file")]);
    b.connect("reduce_FOV", "transform_inverse", &[("out_transform", "in_file")]);
    b.connect("transform_inverse", "concat_transform", &[("out_file", "in_file")]);
    b.connect("reduce_FOV", "FLIRT", &[("out_roi", "in_file")]);
    b.connect("FLIRT", "concat_transform", &[("out_matrix_file", "in_file2")]);
    b.connect("concat_transform", "aff2rigid", &[("out_file", "in_file")]);
    b.connect("aff2rigid", "apply_warp", &[("out_file", "premat")]);
    b.connect("apply_warp", "datasink", &[("out_file", "t1_acpc_aligned")]);

    b.connect("apply_warp", "fsl_bet", &[("out_file", "in_file")]);
    b.connect("apply_warp", "fsl_epireg", &[("out_file", "t1_head")]);
    b.connect("fsl_bet", "fsl_epireg", &[("out_file", "t1_brain")]);
    b.connect("sub_ApplyMask", "fsl_epireg", &[("out_file", "epi")]);

    b.connect("fsl_epireg", "transformconvert", &[("epi2str_mat", "flirt_xfm")]);
    b.connect("sub_ApplyMask", "transformconvert", &[("out_file", "flirt_in")]);
    b.connect("fsl_bet", "transformconvert", &[("out_file", "flirt_ref")]);
    b.connect("transformconvert", "mrtransform", &[("out_file", "linear_xfm")]);
    b.connect("dwinormalise", "mrtransform", &[("out_file", "in_file")]);
}

/// Tissue segmentation of the ACPC-aligned T1.
fn connect_anat(b: &mut GraphBuilder) {
    b.connect("apply_warp", "mrtrix_5ttgen", &[("out_file", "in_file")]);
    b.connect("mrtrix_5ttgen", "5tt2wm", &[("out_file", "in_file")]);
    b.connect("mrtrix_5ttgen", "gen_gmwmi", &[("out_file", "in_file")]);
    b.connect("mrtrix_5ttgen", "datasink", &[("out_file", "anat.@5tt")]);
    b.connect("5tt2wm", "datasink", &[("out_file", "anat.@wm")]);
    b.connect("gen_gmwmi", "datasink", &[("out_file", "anat.@gmwmi")]);
}

fn connect_single(b: &mut GraphBuilder) {
    b.connect("select_files", "mrtrix_image", &[("dwi", "in_file")]);
    b.connect("select_files", "sub_grad_files", &[("dwi", "sub_dwi")]);
    b.connect("sub_grad_files", "mrtrix_image", &[("fslgrad", "grad_fsl")]);
    b.connect("mrtrix_image", "raw_dwi2mask", &[("out_file", "in_file")]);
    b.connect(
        "mrtrix_image",
        "dwigradcheck",
        &[("out_file", "in_file"), ("out_bfile", "grad_file")],
    );
    b.connect("mrtrix_image", "mrconvert", &[("out_file", "in_file")]);
    b.connect("dwifslpreproc", "alter_gradient", &[("out_bfile", "grad_file")]);
}

fn connect_paired(b: &mut GraphBuilder) {
    b.connect("select_files", "sub_grad_files1", &[("dwi", "sub_dwi")]);
    b.connect("select_files", "sub_grad_files2", &[("rdwi", "sub_dwi")]);
    b.connect("select_files", "mrtrix_image1", &[("dwi", "in_file")]);
    b.connect("select_files", "mrtrix_image2", &[("rdwi", "in_file")]);
    b.connect("sub_grad_files1", "mrtrix_image1", &[("fslgrad", "grad_fsl")]);
    b.connect("sub_grad_files2", "mrtrix_image2", &[("fslgrad", "grad_fsl")]);
    b.connect("mrtrix_image1", "concat_dwi", &[("out_file", "image1")]);
    b.connect("mrtrix_image2", "concat_dwi", &[("out_file", "image2")]);
    b.connect("mrtrix_image1", "concat_grad", &[("out_bfile", "grad1")]);
    b.connect("mrtrix_image2", "concat_grad", &[("out_bfile", "grad2")]);
    b.connect("concat_dwi", "raw_dwi2mask", &[("out_file", "in_file")]);
    b.connect("concat_dwi", "dwigradcheck", &[("out_file", "in_file")]);
    b.connect("concat_grad", "dwigradcheck", &[("out_file", "grad_file")]);
    b.connect("concat_dwi", "mrconvert", &[("out_file", "in_file")]);
    b.connect("mrtrix_image1", "alter_gradient", &[("out_bfile", "grad_file")]);
}

fn connect_recon(b: &mut GraphBuilder) {
    b.connect("select_files", "get_fs_id", &[("anat", "anat_files")]);
    b.connect("apply_warp", "recon_all", &[("out_file", "T1_files")]);
    b.connect("get_fs_id", "recon_all", &[("fs_id_list", "subject_id")]);
}

/// With `regrid`, the ACPC-space DWI is resampled onto the template grid before the
/// MNI-space consumers see it.
fn connect_mni(b: &mut GraphBuilder, regrid: bool) {
    let source = if regrid {
        b.connect("mrtransform", "mrgrid", &[("out_file", "in_file")]);
        b.connect("mrgrid", "datasink", &[("out_file", "dwi_acpc_aligned_1mm")]);
        "mrgrid"
    } else {
        "mrtransform"
    };
    for consumer in ["mni_b0extract", "mni_dwi2mask", "MNI_Outputs"] {
        b.connect(source, consumer, &[("out_file", "in_file")]);
    }
}

/// Connectome workflow: one realization per atlas and subject/session.
pub fn build_postproc_graph(config: &PostProcConfig) -> Result<WorkflowGraph> {
    let mut b = GraphBuilder::new(config.name.clone());
    b.add_container(PostProcNodes::build(config)?)?;

    b.connect(
        "subj_source",
        "select_subjects",
        &[("subject_id", "subject_id"), ("session_id", "session_id")],
    );
    b.connect("atlas_source", "select_atlases", &[("atlas_name", "atlas_name")]);

    // atlas into subject space, affine then SyN
    b.connect("select_atlases", "linear_registration", &[("atlas", "moving_image")]);
    b.connect("select_subjects", "linear_registration", &[("brain", "fixed_image")]);
    b.connect("select_subjects", "nonlinear_registration", &[("brain", "fixed_image")]);
    b.connect(
        "linear_registration",
        "nonlinear_registration",
        &[("warped_image", "moving_image")],
    );
    b.connect(
        "nonlinear_registration",
        "round_parcellation",
        &[("warped_image", "in_file")],
    );

    b.connect(
        "select_subjects",
        "SDResponse",
        &[("dwi", "in_file"), ("bfile", "grad_file"), ("mask", "in_mask")],
    );
    b.connect(
        "SDResponse",
        "dwiFOD",
        &[("wm_file", "wm_txt"), ("gm_file", "gm_txt"), ("csf_file", "csf_txt")],
    );
    b.connect(
        "select_subjects",
        "dwiFOD",
        &[("dwi", "in_file"), ("bfile", "grad_file"), ("mask", "mask_file")],
    );

    b.connect("select_subjects", "sift2_filtering", &[("tck", "in_file"), ("act", "act")]);
    b.connect("dwiFOD", "sift2_filtering", &[("wm_odf", "in_fod")]);

    b.connect("select_subjects", "weight_connectome", &[("tck", "in_file")]);
    b.connect("round_parcellation", "weight_connectome", &[("out_file", "in_parc")]);
    b.connect("sift2_filtering", "weight_connectome", &[("out_file", "in_weights")]);
    b.connect("select_subjects", "weight_distance", &[("tck", "in_file")]);
    b.connect("round_parcellation", "weight_distance", &[("out_file", "in_parc")]);

    b.connect("weight_connectome", "datasink", &[("out_file", "connectomes.@weights")]);
    b.connect("weight_distance", "datasink", &[("out_file", "connectomes.@distances")]);
    b.connect("sift2_filtering", "datasink", &[("out_file", "connectomes.@sift2")]);
    b.connect("round_parcellation", "datasink", &[("out_file", "connectomes.@nodes")]);

    b.finish()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Error;

    fn config(design: PeDesign) -> PipelineConfig {
        let mut config = PipelineConfig::new("/study/data");
        config.design = design;
        config.sessions = vec![("01".to_owned(), "1".to_owned())];
        config
    }

    type Edge = (&'static str, &'static str, &'static str, &'static str);
    type EdgeSet = std::collections::BTreeSet<Edge>;

    /// `(from, output, to, input)` for every edge.
    fn edges(graph: &WorkflowGraph) -> EdgeSet {
        graph
            .node_indices()
            .flat_map(|ix| {
                let to = graph.node(ix).name;
                graph
                    .incoming(ix)
                    .map(move |(up, conn)| (graph.node(up).name, conn.from, to, conn.to))
            })
            .collect()
    }

    #[test]
    fn test_designs() -> Result<()> {
        let single = build_graph(&config(PeDesign::Single))?;
        assert!(single.contains("mrtrix_image"));
        assert!(!single.contains("concat_dwi"));
        assert!(single.has_edge("dwifslpreproc", "out_bfile", "alter_gradient", "grad_file"));

        let paired = build_graph(&config(PeDesign::Paired))?;
        for name in ["mrtrix_image1", "mrtrix_image2", "concat_dwi", "concat_grad"] {
            assert!(paired.contains(name), "missing {name}");
        }
        assert!(!paired.contains("mrtrix_image"));
        assert!(paired.has_edge("mrtrix_image1", "out_bfile", "alter_gradient", "grad_file"));
        // one conversion becomes two, plus two concatenations, one more gradient lookup:
        assert_eq!(single.len() + 4, paired.len());
        Ok(())
    }

    #[test]
    fn test_recon_toggle() -> Result<()> {
        let mut cfg = config(PeDesign::Single);
        let with = build_graph(&cfg)?;
        cfg.recon = false;
        let without = build_graph(&cfg)?;

        assert!(with.has_edge("get_fs_id", "fs_id_list", "recon_all", "subject_id"));
        assert!(!without.contains("recon_all"));
        assert!(!without.contains("get_fs_id"));
        assert_eq!(with.len() - 2, without.len());

        let (with, without) = (edges(&with), edges(&without));
        assert!(without.is_subset(&with), "turning recon off only removes edges");
        let recon_only: EdgeSet = with.difference(&without).copied().collect();
        let expected: EdgeSet = [
            ("select_files", "anat", "get_fs_id", "anat_files"),
            ("apply_warp", "out_file", "recon_all", "T1_files"),
            ("get_fs_id", "fs_id_list", "recon_all", "subject_id"),
        ]
        .into_iter()
        .collect();
        assert_eq!(expected, recon_only);
        Ok(())
    }

    #[test]
    fn test_regrid_toggle() -> Result<()> {
        let mut cfg = config(PeDesign::Single);
        let with = build_graph(&cfg)?;
        cfg.regrid = false;
        let without = build_graph(&cfg)?;

        for consumer in ["mni_b0extract", "mni_dwi2mask", "MNI_Outputs"] {
            assert!(with.has_edge("mrgrid", "out_file", consumer, "in_file"));
            assert!(without.has_edge("mrtransform", "out_file", consumer, "in_file"));
        }
        assert!(with.has_edge("mrgrid", "out_file", "datasink", "dwi_acpc_aligned_1mm"));
        assert!(!without.contains("mrgrid"));
        assert_eq!(with.len() - 1, without.len());
        Ok(())
    }

    #[test]
    fn test_anat_outputs() -> Result<()> {
        let graph = build_graph(&config(PeDesign::Single))?;
        assert!(graph.has_edge("mrtrix_5ttgen", "out_file", "gen_gmwmi", "in_file"));
        assert!(graph.has_edge("gen_gmwmi", "out_file", "datasink", "anat.@gmwmi"));
        Ok(())
    }

    #[test]
    fn test_rejects_absent_node() -> Result<()> {
        let cfg = config(PeDesign::Single);
        let mut b = GraphBuilder::new("pipetography");
        b.add_container(PreProcNodes::build(&cfg)?)?;
        b.add_container(AcpcNodes::build(&cfg)?)?;
        connect_backbone(&mut b);
        connect_acpc(&mut b);
        connect_single(&mut b);
        connect_mni(&mut b, true);
        // paired-design node, absent under a single design:
        b.connect("concat_dwi", "raw_dwi2mask", &[("out_file", "in_file")]);
        assert!(b.finish().is_err());
        Ok(())
    }

    #[test]
    fn test_unconfigured_container() -> Result<()> {
        let cfg = config(PeDesign::Single);
        let mut b = GraphBuilder::new("pipetography");
        let err = b.add_container(PreProcNodes::new(&cfg)?).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::NotConfigured("Preprocessing"))
        ));
        Ok(())
    }

    #[test]
    fn test_postproc() -> Result<()> {
        let mut cfg = PostProcConfig::new("/study", "/atlases");
        cfg.atlases = vec!["aal".to_owned()];
        cfg.sessions = vec![("01".to_owned(), "1".to_owned())];
        let graph = build_postproc_graph(&cfg)?;
        assert_eq!(13, graph.len());
        assert!(graph.has_edge("sift2_filtering", "out_file", "weight_connectome", "in_weights"));
        assert_eq!(vec![graph.find("datasink")?], graph.goals());
        Ok(())
    }
}
