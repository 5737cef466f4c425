use anyhow::Result;

use super::{NodeContainer, NodeSet};
use crate::interfaces::{builtins, freesurfer, fsl, mrtrix};
use crate::{PipelineConfig, Value};

/// Anatomical nodes: ACPC alignment of the T1 and of the DWI,
/// tissue segmentation, and optionally FreeSurfer reconstruction.
#[derive(Debug)]
pub struct AcpcNodes {
    nodes: NodeSet,
    configured: bool,
}

impl NodeContainer for AcpcNodes {
    type Config = PipelineConfig;
    const LABEL: &'static str = "ACPC";

    fn new(config: &PipelineConfig) -> Result<Self> {
        let mut nodes = NodeSet::default();
        for decl in [
            fsl::robust_fov("reduce_FOV"),
            fsl::convert_xfm("transform_inverse"),
            fsl::flirt("FLIRT"),
            fsl::convert_xfm("concat_transform"),
            fsl::aff2rigid("aff2rigid"),
            fsl::applywarp("apply_warp"),
            fsl::bet("fsl_bet"),
            fsl::epi_reg("fsl_epireg"),
            mrtrix::transform_convert("transformconvert"),
            mrtrix::transform("mrtransform"),
            mrtrix::regrid("mrgrid"),
            mrtrix::gen_5tt("mrtrix_5ttgen"),
            mrtrix::convert("5tt2wm"),
            mrtrix::gmwmi("gen_gmwmi"),
        ] {
            nodes.add(decl)?;
        }
        if config.recon {
            nodes.add(builtins::freesurfer_id("get_fs_id"))?;
            nodes.add(freesurfer::recon_all("recon_all"))?;
        }
        Ok(Self {
            nodes,
            configured: false,
        })
    }

    fn configure_defaults(&mut self, config: &PipelineConfig) -> Result<()> {
        let n = &mut self.nodes;
        let mni = Value::from(config.mni_template.as_path());

        n.set("reduce_FOV", "out_transform", "roi2full.mat")?;
        n.set("reduce_FOV", "out_roi", "robustfov.nii.gz")?;

        n.set("FLIRT", "reference", mni.clone())?;
        n.set("FLIRT", "interp", "spline")?;
        n.set("FLIRT", "out_matrix_file", "roi2std.mat")?;
        n.set("FLIRT", "out_file", "acpc_mni.nii.gz")?;

        n.set("transform_inverse", "out_file", "full2roi.mat")?;
        n.set("transform_inverse", "invert_xfm", true)?;

        n.set("concat_transform", "concat_xfm", true)?;
        n.set("concat_transform", "out_file", "full2std.mat")?;

        n.set("aff2rigid", "out_file", "outputmatrix")?;

        n.set("apply_warp", "out_file", "acpc_t1.nii")?;
        n.set("apply_warp", "relwarp", true)?;
        n.set("apply_warp", "output_type", "NIFTI")?;
        n.set("apply_warp", "interp", "spline")?;
        n.set("apply_warp", "ref_file", mni.clone())?;

        n.set("fsl_bet", "mask", true)?;
        n.set("fsl_bet", "robust", true)?;
        n.set("fsl_bet", "out_file", "acpc_t1_brain.nii.gz")?;

        n.set("fsl_epireg", "out_base", "dwi2acpc")?;

        n.set("transformconvert", "flirt", true)?;
        n.set("transformconvert", "out_file", "dwi2acpc_xfm.mat")?;
        n.set("transformconvert", "force", true)?;

        n.set("mrtransform", "out_file", "dwi_acpc.mif")?;

        n.set("mrgrid", "out_file", "dwi_acpc_1mm.mif")?;
        n.set("mrgrid", "regrid", mni)?;

        n.set("mrtrix_5ttgen", "out_file", "mrtrix3_5tt.mif")?;
        n.set("mrtrix_5ttgen", "nthreads", config.nthreads)?;

        n.set("5tt2wm", "coord", Value::ints(&[3, 2]))?;
        n.set("5tt2wm", "axes", Value::ints(&[0, 1, 2]))?;
        n.set("5tt2wm", "out_file", "5tt_wm.nii.gz")?;

        n.set("gen_gmwmi", "out_file", "gmwmi.mif")?;
        n.set("gen_gmwmi", "nthreads", config.nthreads)?;

        if config.recon {
            n.set("recon_all", "openmp", config.nthreads)?;
        }

        self.configured = true;
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn expected_nodes(config: &PipelineConfig) -> Vec<&'static str> {
        let mut names = vec![
            "reduce_FOV",
            "transform_inverse",
            "FLIRT",
            "concat_transform",
            "aff2rigid",
            "apply_warp",
            "fsl_bet",
            "fsl_epireg",
            "transformconvert",
            "mrtransform",
            "mrgrid",
            "mrtrix_5ttgen",
            "5tt2wm",
            "gen_gmwmi",
        ];
        if config.recon {
            names.extend(["get_fs_id", "recon_all"]);
        }
        names
    }

    fn nodes(&self) -> &NodeSet {
        &self.nodes
    }

    fn into_nodes(self) -> NodeSet {
        self.nodes
    }
}
