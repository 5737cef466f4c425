//! Small `combine` grammars for the strings pipetography deals with:
//! BIDS file and directory names, file-selection path templates,
//! and command-line argument templates.

#[macro_use]
mod macros;
mod parse;
pub use parse::{parse_argstr, parse_bids_name, parse_entity, parse_template, Error};
pub mod ast;
