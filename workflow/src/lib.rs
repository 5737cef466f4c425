//! Node declarations for the wrapped neuroimaging tools, the containers that group them
//! into pipeline stages, and the assembler that wires them into a validated graph.

mod value;
pub use value::{Value, ValueKind, ValueMap};

mod decl;
pub use decl::{Builtin, Command, InputSlot, Iterables, NodeDecl, NodeKind, OutputPath, OutputSlot};

mod error;
pub use error::{AggregatedErrors, Error, Errors};

mod config;
pub use config::{derivatives_for, PeDesign, PipelineConfig, PostProcConfig, UnknownDesign};

mod render;
pub use render::{check_inputs, fill_generated, render, resolve_outputs, CommandLine};

pub mod interfaces;
pub mod nodes;

mod graph;
pub use graph::{Connection, GraphBuilder, WorkflowGraph};

mod assemble;
pub use assemble::{build_graph, build_postproc_graph};

pub use petgraph::graph::NodeIndex;
