//! ANTs commands.

use crate::{InputSlot, NodeDecl, OutputSlot, ValueKind};

/// `antsRegistration` with a single transform stage.
///
/// The fixed and moving images are not rendered on their own; the
/// `--metric` template pulls them in by name.
pub fn registration(name: &'static str) -> NodeDecl {
    NodeDecl::command(
        name,
        "antsRegistration",
        vec![
            InputSlot::file("fixed_image", "").mandatory().exists(),
            InputSlot::file("moving_image", "").mandatory().exists(),
            InputSlot::string("output_transform_prefix", "").mandatory(),
            InputSlot::int("collapse_output_transforms", "--collapse-output-transforms %d"),
            InputSlot::int("dimension", "--dimensionality %d"),
            InputSlot::file(
                "output_warped_image",
                "--output [%(output_transform_prefix)s,%s]",
            )
            .requires(&["output_transform_prefix"]),
            InputSlot::new("transform", ValueKind::Tuple, "--transform %s[%g]"),
            InputSlot::new(
                "metric",
                ValueKind::Tuple,
                "--metric %s[%(fixed_image)s,%(moving_image)s,%g,%d]",
            ),
            InputSlot::new("convergence", ValueKind::Tuple, "--convergence [%s,%g,%d]"),
            InputSlot::string("smoothing_sigmas", "--smoothing-sigmas %svox"),
            InputSlot::string("shrink_factors", "--shrink-factors %s"),
            InputSlot::int("use_histogram_matching", "--use-histogram-matching %d"),
            InputSlot::string("interpolation", "--interpolation %s"),
            InputSlot::int("num_threads", ""),
        ],
        vec![
            OutputSlot::from_input("warped_image", "output_warped_image"),
            OutputSlot::derived(
                "forward_transforms",
                "output_transform_prefix",
                "0GenericAffine.mat",
            ),
        ],
    )
    .env(&[("ITK_GLOBAL_DEFAULT_NUMBER_OF_THREADS", "num_threads")])
}
