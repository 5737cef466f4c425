//! MRtrix3 commands.

use crate::{InputSlot, NodeDecl, OutputPath, OutputSlot, ValueKind};

/// Gradient import/export and housekeeping options shared by MRtrix3 commands.
fn common() -> Vec<InputSlot> {
    vec![
        InputSlot::string("export_grad", "-export_grad_mrtrix %s"),
        InputSlot::new("export_fslgrad", ValueKind::FileTuple, "-export_grad_fsl %s %s"),
        InputSlot::new("grad_fsl", ValueKind::FileTuple, "-fslgrad %s %s")
            .exists()
            .xor(&["grad_file"]),
        InputSlot::file("grad_file", "-grad %s").exists().xor(&["grad_fsl"]),
        InputSlot::int("nthreads", "-nthreads %d"),
        InputSlot::flag("force", "-force"),
        InputSlot::flag("quiet", "-quiet"),
    ]
}

fn with_common(mut inputs: Vec<InputSlot>) -> Vec<InputSlot> {
    inputs.extend(common());
    inputs
}

fn threads_and_force() -> [InputSlot; 2] {
    [
        InputSlot::int("nthreads", "-nthreads %d"),
        InputSlot::flag("force", "-force"),
    ]
}

fn out_file() -> OutputSlot {
    OutputSlot::from_input("out_file", "out_file")
}

fn out_bfile() -> OutputSlot {
    OutputSlot::from_input("out_bfile", "export_grad")
}

fn simple(name: &'static str, program: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        program,
        with_common(vec![
            InputSlot::file("in_file", "%s").at(-2).mandatory().exists(),
            InputSlot::file("out_file", "%s").at(-1).mandatory(),
        ]),
        vec![out_file()],
    )
}

/// `mrconvert`, optionally exporting gradients and a JSON header.
pub fn convert(name: &'static str) -> NodeDecl {
    let mut decl = NodeDecl::command(
        name,
        "mrconvert",
        with_common(vec![
            InputSlot::file("in_file", "%s").at(1).mandatory().exists(),
            InputSlot::file("out_file", "%s").at(2).mandatory(),
            InputSlot::new("coord", ValueKind::IntList, "-coord %s").sep(" "),
            InputSlot::new("vox", ValueKind::FloatList, "-vox %s").sep(","),
            InputSlot::new("axes", ValueKind::IntList, "-axes %s").sep(","),
            InputSlot::new("scaling", ValueKind::FloatList, "-scaling %s").sep(","),
            InputSlot::string("out_json", "-json_export %s").at(-1),
        ]),
        vec![
            out_file(),
            out_bfile(),
            OutputSlot::new(
                "out_fslbvec",
                ValueKind::File,
                OutputPath::TupleItem("export_fslgrad", 0),
            ),
            OutputSlot::new(
                "out_fslbval",
                ValueKind::File,
                OutputPath::TupleItem("export_fslgrad", 1),
            ),
            OutputSlot::from_input("out_json", "out_json"),
        ],
    );
    decl.values.insert("out_file", "dwi.mif".into());
    decl
}

/// `mrcat`: concatenate two images.
pub fn cat(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "mrcat",
        vec![
            InputSlot::file("image1", "%s").at(1).mandatory().exists(),
            InputSlot::file("image2", "%s").at(2).mandatory().exists(),
            InputSlot::file("out_file", "%s").at(3).mandatory(),
        ],
        vec![out_file()],
    )
}

/// Plain `cat` of two gradient tables, written to `out_file` via stdout.
pub fn gradcat(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "cat",
        vec![
            InputSlot::file("grad1", "%s").at(1).mandatory().exists(),
            InputSlot::file("grad2", "%s").at(2).mandatory().exists(),
            InputSlot::file("out_file", "").mandatory(),
        ],
        vec![out_file()],
    )
    .stdout_to("out_file")
}

/// `dwigradcheck`: check gradient orientation against a brain mask.
pub fn gradcheck(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "dwigradcheck",
        with_common(vec![
            InputSlot::file("in_file", "%s").at(1).mandatory().exists(),
            InputSlot::file("mask_file", "-mask %s").at(3).exists(),
            InputSlot::int("tract_number", "-number %d"),
        ]),
        vec![out_bfile()],
    )
}

pub fn denoise(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "dwidenoise",
        with_common(vec![
            InputSlot::file("in_file", "%s").at(1).mandatory().exists(),
            InputSlot::file("noise", "-noise %s").at(2).mandatory(),
            InputSlot::file("out_file", "%s").at(-1).mandatory(),
        ]),
        vec![out_file(), OutputSlot::from_input("noise", "noise")],
    )
}

/// `mrdegibbs`: Gibbs ringing removal.
pub fn degibbs(name: &'static str) -> NodeDecl {
    let mut decl = simple(name, "mrdegibbs");
    decl.inputs.push(InputSlot::new("axes", ValueKind::IntList, "-axes %s").sep(","));
    decl.inputs.push(InputSlot::int("nshifts", "-nshifts %d"));
    decl
}

/// `dwifslpreproc`: motion and eddy current correction through FSL.
pub fn fslpreproc(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "dwifslpreproc",
        with_common(vec![
            InputSlot::file("in_file", "%s").at(0).mandatory().exists(),
            InputSlot::file("out_file", "%s").at(1).mandatory(),
            InputSlot::string("eddy_options", "-eddy_options %s").at(2),
            InputSlot::string("rpe_options", "%s").at(3).mandatory(),
            InputSlot::string("pe_dir", "-pe_dir %s").at(4).mandatory(),
            InputSlot::float("RO_time", "-readout_time %f").at(-1),
        ]),
        vec![out_file(), out_bfile()],
    )
}

/// `dwibiascorrect` with either the ANTs or the FSL algorithm.
pub fn biascorrect(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "dwibiascorrect",
        with_common(vec![
            InputSlot::flag("use_ants", "ants").at(0).xor(&["use_fsl"]),
            InputSlot::flag("use_fsl", "fsl").at(0).xor(&["use_ants"]),
            InputSlot::file("in_file", "%s").at(1).mandatory().exists(),
            InputSlot::string("args", "%s").at(1).raw(),
            InputSlot::file("out_file", "%s")
                .at(2)
                .name_from("in_file", "_biascorr"),
            InputSlot::file("in_mask", "-mask %s"),
            InputSlot::file("bias", "-bias %s"),
        ]),
        vec![out_file(), OutputSlot::from_input("bias", "bias")],
    )
}

/// `mrinfo`, used here only to export a gradient table.
pub fn info(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "mrinfo",
        with_common(vec![
            InputSlot::string("args", "%s").at(0).raw(),
            InputSlot::file("in_file", "%s").at(1).mandatory().exists(),
        ]),
        vec![out_bfile()],
    )
}

/// `mrcalc` that replaces non-finite voxels with zero:
/// `mrcalc <in> <isfinite> -finite <cond_if> 0 -if [args] <out>`.
pub fn check_niz(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "mrcalc",
        with_common(vec![
            InputSlot::file("in_file", "%s").at(0).exists(),
            InputSlot::string("isfinite", "%s -finite").at(1),
            InputSlot::string("cond_if", "%s 0 -if").at(2),
            InputSlot::string("args", "%s").at(3).raw(),
            InputSlot::file("out_file", "%s").at(4).mandatory(),
        ]),
        vec![out_file()],
    )
}

/// `mrcalc` Rician bias removal: `sqrt(|in^p - noise^d|)`.
pub fn rician_noise(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "mrcalc",
        with_common(vec![
            InputSlot::file("in_file", "%s").at(0).mandatory().exists(),
            InputSlot::int("power", "%d -pow").at(1),
            InputSlot::file("lownoisemap", "%s").at(2).exists(),
            InputSlot::int("denoise", "%d -pow -sub -abs -sqrt").at(3),
            InputSlot::file("out_file", "%s").at(4).mandatory(),
        ]),
        vec![out_file()],
    )
}

pub fn threshold(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "mrthreshold",
        with_common(vec![
            InputSlot::float("opt_abs", "-abs %f")
                .at(0)
                .xor(&["opt_per", "opt_top", "opt_bot"]),
            InputSlot::float("opt_per", "-percentile %f")
                .at(0)
                .xor(&["opt_abs", "opt_top", "opt_bot"]),
            InputSlot::float("opt_top", "-top %f")
                .at(0)
                .xor(&["opt_abs", "opt_per", "opt_bot"]),
            InputSlot::float("opt_bot", "-bot %f")
                .at(0)
                .xor(&["opt_abs", "opt_per", "opt_top"]),
            InputSlot::file("in_file", "%s").at(1).mandatory().exists(),
            InputSlot::file("out_file", "%s").at(2),
        ]),
        vec![out_file()],
    )
}

/// `dwinormalise individual`.
pub fn normalise(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "dwinormalise",
        with_common(vec![
            InputSlot::float("opt_intensity", "-intensity %f").at(0),
            InputSlot::int("opt_percent", "-percentile %d").at(0),
            InputSlot::file("in_file", "%s").at(1).mandatory().exists(),
            InputSlot::file("mask_file", "%s").at(2),
            InputSlot::file("out_file", "%s").at(3),
        ]),
        vec![out_file()],
    )
    .leading(&["individual"])
}

/// `transformconvert`, importing a FLIRT or ITK transform.
pub fn transform_convert(name: &'static str) -> NodeDecl {
    const FLIRT: &[&str] = &["flirt_xfm", "flirt_in", "flirt_ref"];
    NodeDecl::command(
        name,
        "transformconvert",
        with_common(vec![
            InputSlot::file("flirt_xfm", "%s").at(0).exists().xor(&["itk_xfm"]),
            InputSlot::file("flirt_in", "%s").at(1).exists().xor(&["itk_xfm"]),
            InputSlot::file("flirt_ref", "%s").at(2).exists().xor(&["itk_xfm"]),
            InputSlot::file("itk_xfm", "%s").at(0).exists().xor(FLIRT),
            InputSlot::flag("flirt", "flirt_import").at(3).xor(&["itk"]),
            InputSlot::flag("itk", "itk_import").at(3).xor(&["flirt"]),
            InputSlot::file("out_file", "%s").at(4).mandatory(),
        ]),
        vec![out_file()],
    )
}

pub fn transform(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "mrtransform",
        with_common(vec![
            InputSlot::file("linear_xfm", "-linear %s").at(0),
            InputSlot::file("in_file", "%s").at(1).mandatory(),
            InputSlot::file("out_file", "%s").at(2).mandatory(),
        ]),
        vec![out_file()],
    )
}

/// `mrgrid <in> regrid -template <template> <out>`.
pub fn regrid(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "mrgrid",
        with_common(vec![
            InputSlot::file("in_file", "%s").at(0).mandatory().exists(),
            InputSlot::file("regrid", "regrid -template %s").at(1).exists(),
            InputSlot::file("out_file", "%s").at(2),
            InputSlot::string("args", "%s").at(-1).raw(),
        ]),
        vec![out_file()],
    )
}

pub fn brain_mask(name: &'static str) -> NodeDecl {
    let mut decl = simple(name, "dwi2mask");
    decl.values.insert("out_file", "brainmask.mif".into());
    decl
}

pub fn fit_tensor(name: &'static str) -> NodeDecl {
    let mut decl = simple(name, "dwi2tensor");
    decl.inputs.push(InputSlot::file("in_mask", "-mask %s").exists());
    decl.values.insert("out_file", "dti.mif".into());
    decl
}

pub fn tensor_metrics(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "tensor2metric",
        with_common(vec![
            InputSlot::file("in_file", "%s").at(-1).mandatory().exists(),
            InputSlot::file("out_fa", "-fa %s"),
            InputSlot::file("out_adc", "-adc %s"),
            InputSlot::file("in_mask", "-mask %s").exists(),
        ]),
        vec![
            OutputSlot::from_input("out_fa", "out_fa"),
            OutputSlot::from_input("out_adc", "out_adc"),
        ],
    )
}

/// `dwiextract`, e.g. the b=0 volumes with `-bzero`.
pub fn extract(name: &'static str) -> NodeDecl {
    let mut decl = simple(name, "dwiextract");
    decl.inputs.extend([
        InputSlot::flag("bzero", "-bzero"),
        InputSlot::flag("nobzero", "-no_bzero"),
        InputSlot::flag("singleshell", "-singleshell"),
        InputSlot::new("shell", ValueKind::FloatList, "-shells %s").sep(","),
    ]);
    decl
}

/// `mrmath <in> <operation> <out>`.
pub fn math(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "mrmath",
        with_common(vec![
            InputSlot::file("in_file", "%s").at(-3).mandatory().exists(),
            InputSlot::string("operation", "%s").at(-2).mandatory(),
            InputSlot::file("out_file", "%s").at(-1).mandatory(),
            InputSlot::int("axis", "-axis %d"),
        ]),
        vec![out_file()],
    )
}

/// `5ttgen fsl`: five-tissue-type segmentation of a T1.
pub fn gen_5tt(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "5ttgen",
        with_common(vec![
            InputSlot::file("in_file", "%s").at(-2).mandatory().exists(),
            InputSlot::file("out_file", "%s").at(-1).mandatory(),
            InputSlot::file("t2_file", "-t2 %s").exists(),
            InputSlot::file("mask", "-mask %s").exists(),
            InputSlot::flag("premasked", "-premasked"),
            InputSlot::flag("nocrop", "-nocrop"),
            InputSlot::flag("sgm_amyg_hipp", "-sgm_amyg_hipp"),
        ]),
        vec![out_file()],
    )
    .leading(&["fsl"])
}

/// `5tt2gmwmi`: grey/white matter interface mask.
pub fn gmwmi(name: &'static str) -> NodeDecl {
    let mut inputs = vec![
        InputSlot::file("in_file", "%s").at(-3).mandatory().exists(),
        InputSlot::file("out_file", "%s").at(-2).mandatory(),
        InputSlot::file("in_mask", "-mask_in %s").at(1).exists(),
    ];
    inputs.extend(threads_and_force());
    NodeDecl::command(name, "5tt2gmwmi", inputs, vec![out_file()])
}

/// `dwi2response`: per-tissue response functions.
pub fn response(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "dwi2response",
        with_common(vec![
            InputSlot::string("algorithm", "%s").at(1).mandatory(),
            InputSlot::file("in_file", "%s").at(2).mandatory().exists(),
            InputSlot::file("wm_file", "%s").at(3).mandatory(),
            InputSlot::file("gm_file", "%s").at(4),
            InputSlot::file("csf_file", "%s").at(5),
            InputSlot::file("in_mask", "-mask %s").exists(),
            InputSlot::new("max_sh", ValueKind::IntList, "-lmax %s").sep(","),
        ]),
        vec![
            OutputSlot::from_input("wm_file", "wm_file"),
            OutputSlot::from_input("gm_file", "gm_file"),
            OutputSlot::from_input("csf_file", "csf_file"),
        ],
    )
}

/// `dwi2fod`: constrained spherical deconvolution.
pub fn fod(name: &'static str) -> NodeDecl {
    let mut decl = NodeDecl::command(
        name,
        "dwi2fod",
        with_common(vec![
            InputSlot::string("algorithm", "%s").at(1).mandatory(),
            InputSlot::file("in_file", "%s").at(2).mandatory().exists(),
            InputSlot::file("wm_txt", "%s").at(3).mandatory().exists(),
            InputSlot::file("wm_odf", "%s").at(4).mandatory(),
            InputSlot::file("gm_txt", "%s").at(5).exists(),
            InputSlot::file("gm_odf", "%s").at(6),
            InputSlot::file("csf_txt", "%s").at(7).exists(),
            InputSlot::file("csf_odf", "%s").at(8),
            InputSlot::file("mask_file", "-mask %s").exists(),
        ]),
        vec![
            OutputSlot::from_input("wm_odf", "wm_odf"),
            OutputSlot::from_input("gm_odf", "gm_odf"),
            OutputSlot::from_input("csf_odf", "csf_odf"),
        ],
    );
    decl.values.insert("wm_odf", "wm.mif".into());
    decl
}

/// `tcksift2`: per-streamline weights fitted to the FOD.
pub fn sift2(name: &'static str) -> NodeDecl {
    let mut inputs = vec![
        InputSlot::file("in_file", "%s").at(-3).mandatory().exists(),
        InputSlot::file("in_fod", "%s").at(-2).mandatory().exists(),
        InputSlot::file("out_file", "%s").at(-1).mandatory(),
        InputSlot::file("proc_mask", "-proc_mask %s").exists(),
        InputSlot::file("act", "-act %s").exists(),
        InputSlot::flag("fd_scale_gm", "-fd_scale_gm").requires(&["act"]),
    ];
    inputs.extend(threads_and_force());
    NodeDecl::command(name, "tcksift2", inputs, vec![out_file()])
}

/// `tck2connectome`: streamline counts (or weighted stats) between parcels.
pub fn connectome(name: &'static str) -> NodeDecl {
    let mut inputs = vec![
        InputSlot::file("in_file", "%s").at(-3).mandatory().exists(),
        InputSlot::file("in_parc", "%s").at(-2).exists(),
        InputSlot::file("out_file", "%s").at(-1).mandatory(),
        InputSlot::file("in_weights", "-tck_weights_in %s").exists(),
        InputSlot::flag("scale_length", "-scale_length"),
        InputSlot::string("stat_edge", "-stat_edge %s"),
        InputSlot::flag("symmetric", "-symmetric"),
        InputSlot::flag("zero_diag", "-zero_diagonal"),
    ];
    inputs.extend(threads_and_force());
    NodeDecl::command(name, "tck2connectome", inputs, vec![out_file()])
}
