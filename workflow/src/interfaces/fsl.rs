//! FSL commands.

use crate::{InputSlot, NodeDecl, OutputSlot};

/// `robustfov`: crop the neck from a T1 and record the crop transform.
pub fn robust_fov(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "robustfov",
        vec![
            InputSlot::file("in_file", "-i %s").at(0).mandatory().exists(),
            InputSlot::file("out_roi", "-r %s").mandatory(),
            InputSlot::file("out_transform", "-m %s"),
            InputSlot::int("brainsize", "-b %d"),
        ],
        vec![
            OutputSlot::from_input("out_roi", "out_roi"),
            OutputSlot::from_input("out_transform", "out_transform"),
        ],
    )
}

/// `convert_xfm`: invert or concatenate affine matrices.
pub fn convert_xfm(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "convert_xfm",
        vec![
            InputSlot::file("out_file", "-omat %s").at(1).mandatory(),
            InputSlot::flag("invert_xfm", "-inverse")
                .at(-3)
                .xor(&["concat_xfm", "fix_scale_skew"]),
            InputSlot::flag("concat_xfm", "-concat")
                .at(-3)
                .xor(&["invert_xfm", "fix_scale_skew"])
                .requires(&["in_file2"]),
            InputSlot::flag("fix_scale_skew", "-fixscaleskew")
                .at(-3)
                .xor(&["invert_xfm", "concat_xfm"])
                .requires(&["in_file2"]),
            InputSlot::file("in_file2", "%s").at(-2).exists(),
            InputSlot::file("in_file", "%s").at(-1).mandatory().exists(),
        ],
        vec![OutputSlot::from_input("out_file", "out_file")],
    )
}

pub fn flirt(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "flirt",
        vec![
            InputSlot::file("in_file", "-in %s").at(0).mandatory().exists(),
            InputSlot::file("reference", "-ref %s").at(1).mandatory().exists(),
            InputSlot::file("out_file", "-out %s").at(2),
            InputSlot::file("out_matrix_file", "-omat %s").at(3),
            InputSlot::string("interp", "-interp %s"),
            InputSlot::int("dof", "-dof %d"),
            InputSlot::string("cost", "-cost %s"),
        ],
        vec![
            OutputSlot::from_input("out_file", "out_file"),
            OutputSlot::from_input("out_matrix_file", "out_matrix_file"),
        ],
    )
}

/// `aff2rigid`: reduce a 12 DOF transform to a 6 DOF one.
pub fn aff2rigid(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "aff2rigid",
        vec![
            InputSlot::file("in_file", "%s").at(1).mandatory().exists(),
            InputSlot::file("out_file", "%s").at(2).mandatory(),
        ],
        vec![OutputSlot::from_input("out_file", "out_file")],
    )
}

/// `applywarp`. `output_type` is handed to FSL as `FSLOUTPUTTYPE`.
pub fn applywarp(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "applywarp",
        vec![
            InputSlot::file("in_file", "--in=%s").at(0).mandatory().exists(),
            InputSlot::file("ref_file", "--ref=%s").at(1).mandatory().exists(),
            InputSlot::file("out_file", "--out=%s").at(2).mandatory(),
            InputSlot::file("field_file", "--warp=%s").exists(),
            InputSlot::file("premat", "--premat=%s").exists(),
            InputSlot::file("postmat", "--postmat=%s").exists(),
            InputSlot::flag("relwarp", "--rel").xor(&["abswarp"]),
            InputSlot::flag("abswarp", "--abs").xor(&["relwarp"]),
            InputSlot::file("mask_file", "--mask=%s").exists(),
            InputSlot::string("interp", "--interp=%s").at(-2),
            InputSlot::string("output_type", ""),
        ],
        vec![OutputSlot::from_input("out_file", "out_file")],
    )
    .env(&[("FSLOUTPUTTYPE", "output_type")])
}

/// `bet` brain extraction. With `mask` set, the mask lands beside the output as `<out>_mask`.
pub fn bet(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "bet",
        vec![
            InputSlot::file("in_file", "%s").at(0).mandatory().exists(),
            InputSlot::file("out_file", "%s").at(1).mandatory(),
            InputSlot::flag("mask", "-m"),
            InputSlot::flag("robust", "-R"),
            InputSlot::float("frac", "-f %f"),
        ],
        vec![
            OutputSlot::from_input("out_file", "out_file"),
            OutputSlot::derived("mask_file", "out_file", "_mask"),
        ],
    )
}

/// `epi_reg`: register an EPI (here the mean b0) to a T1.
pub fn epi_reg(name: &'static str) -> NodeDecl {
    let mut decl = NodeDecl::command(
        name,
        "epi_reg",
        vec![
            InputSlot::file("epi", "--epi=%s").at(-4).mandatory().exists(),
            InputSlot::file("t1_head", "--t1=%s").at(-3).mandatory().exists(),
            InputSlot::file("t1_brain", "--t1brain=%s").at(-2).mandatory().exists(),
            InputSlot::string("out_base", "--out=%s").at(-1),
            InputSlot::file("fmap", "--fmap=%s").exists(),
            InputSlot::file("wmseg", "--wmseg=%s").exists(),
            InputSlot::flag("no_clean", "--noclean"),
        ],
        vec![
            OutputSlot::derived("out_file", "out_base", ".nii.gz"),
            OutputSlot::derived("epi2str_mat", "out_base", ".mat"),
        ],
    );
    decl.values.insert("out_base", "epi2struct".into());
    decl
}

/// `fslmaths <in> -mas <mask> <out>`.
pub fn apply_mask(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "fslmaths",
        vec![
            InputSlot::file("in_file", "%s").at(0).mandatory().exists(),
            InputSlot::file("mask_file", "-mas %s").at(1).mandatory().exists(),
            InputSlot::file("out_file", "%s").at(-2).mandatory(),
            InputSlot::string("output_datatype", "-odt %s").at(-1),
        ],
        vec![OutputSlot::from_input("out_file", "out_file")],
    )
}
