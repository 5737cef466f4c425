//! Steps that run in-process rather than as external commands.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::{Builtin, Error, InputSlot, Iterables, NodeDecl, OutputSlot, ValueKind};

/// Iterable source: emits one value per field for every realization.
pub fn identity(name: &'static str, iterables: Iterables) -> NodeDecl {
    let outputs = iterables
        .fields
        .iter()
        .map(|f| OutputSlot::runtime(*f, ValueKind::Str))
        .collect();
    NodeDecl::builtin(name, Builtin::Identity, Vec::new(), outputs).iterate(iterables)
}

/// File selection by path template. Every `{field}` a template uses must be one of `fields`,
/// and each field becomes a mandatory input.
pub fn select_files(
    name: &'static str,
    base: PathBuf,
    templates: Vec<(&'static str, String)>,
    fields: &[&'static str],
) -> Result<NodeDecl> {
    for (key, template) in &templates {
        let parsed = syntax::parse_template(template)
            .with_context(|| format!("while parsing template '{key}' of node '{name}'"))?;
        if let Some(unknown) = parsed.fields().find(|f| !fields.iter().any(|known| known == f)) {
            return Err(Error::UnknownTemplateField(
                name.to_owned(),
                (*key).to_owned(),
                unknown.to_owned(),
            )
            .into());
        };
    }
    let inputs = fields
        .iter()
        .map(|f| InputSlot::string(*f, "").mandatory())
        .collect();
    let outputs = templates
        .iter()
        .map(|(key, _)| OutputSlot::runtime(*key, ValueKind::File))
        .collect();
    let builtin = Builtin::SelectFiles { base, templates };
    Ok(NodeDecl::builtin(name, builtin, inputs, outputs))
}

/// `(bvec, bval)` lookup beside a DWI volume.
pub fn gradient_files(name: &'static str, ext: &str) -> NodeDecl {
    NodeDecl::builtin(
        name,
        Builtin::GradientFiles {
            ext: ext.to_owned(),
        },
        vec![InputSlot::file("sub_dwi", "").mandatory().exists()],
        vec![OutputSlot::runtime("fslgrad", ValueKind::FileTuple)],
    )
}

/// Readout time and phase-encoding direction from sidecars under `root`.
pub fn metadata(name: &'static str, root: PathBuf) -> NodeDecl {
    NodeDecl::builtin(
        name,
        Builtin::Metadata { root },
        vec![InputSlot::file("path", "").mandatory()],
        vec![
            OutputSlot::runtime("ReadoutTime", ValueKind::Float),
            OutputSlot::runtime("PE_DIR", ValueKind::Str),
        ],
    )
}

pub fn freesurfer_id(name: &'static str) -> NodeDecl {
    NodeDecl::builtin(
        name,
        Builtin::FreesurferId,
        vec![InputSlot::file("anat_files", "").mandatory()],
        vec![OutputSlot::runtime("fs_id_list", ValueKind::Str)],
    )
}

/// Copies whatever it receives into the derivatives tree under `base`.
/// Input names are `folder` or `folder.@name`.
pub fn datasink(name: &'static str, base: PathBuf) -> NodeDecl {
    NodeDecl::builtin(name, Builtin::DataSink { base }, Vec::new(), Vec::new()).open()
}
