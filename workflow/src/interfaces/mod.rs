//! Declarations of the wrapped tools, grouped by package.
//!
//! Each function returns a fresh, unconfigured [NodeDecl](crate::NodeDecl)
//! with the given node name.

pub mod ants;
pub mod builtins;
pub mod freesurfer;
pub mod fsl;
pub mod mrtrix;
