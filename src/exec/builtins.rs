use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;

use syntax::ast::TemplatePart;
use traverse::Realization;
use workflow::{Builtin, NodeDecl, Value, ValueMap};

use crate::fs::Fs;

use super::Error;

/// Separates the sink folder from the file label in sink input names, e.g. `preproc_mni.@dwi`.
const SINK_LABEL_DELIM: &str = ".@";

/// Run a builtin node over its gathered input `values`, returning its outputs.
pub fn run_builtin(
    decl: &NodeDecl,
    builtin: &Builtin,
    values: &ValueMap,
    realization: &Realization,
    fs: &Fs,
) -> Result<ValueMap> {
    log::debug!("running builtin {} for [{realization}]", decl.name);
    match builtin {
        Builtin::Identity => identity(decl, realization),
        Builtin::SelectFiles { base, templates } => select_files(decl, base, templates, values, fs),
        Builtin::GradientFiles { ext } => {
            let dwi = input_path(decl, values, "sub_dwi")?;
            let files = bids::gradient_files(dwi, ext)?;
            let mut outputs = ValueMap::default();
            outputs.insert(
                "fslgrad",
                Value::tuple([Value::File(files.bvec), Value::File(files.bval)]),
            );
            Ok(outputs)
        }
        Builtin::Metadata { root } => {
            let path = input_path(decl, values, "path")?;
            let meta = bids::read_metadata(path, root)?;
            let mut outputs = ValueMap::default();
            outputs.insert("ReadoutTime", Value::Float(meta.total_readout_time));
            if let Some(pe_dir) = meta.phase_encoding_direction {
                outputs.insert("PE_DIR", Value::Str(pe_dir));
            }
            Ok(outputs)
        }
        Builtin::FreesurferId => {
            let anat = input_path(decl, values, "anat_files")?;
            let mut outputs = ValueMap::default();
            outputs.insert("fs_id_list", Value::Str(bids::freesurfer_id(anat)?));
            Ok(outputs)
        }
        Builtin::DataSink { base } => {
            sink(base, values, realization, fs)?;
            Ok(ValueMap::default())
        }
    }
}

fn input_path<'a>(decl: &NodeDecl, values: &'a ValueMap, slot: &str) -> Result<&'a Path, Error> {
    values
        .get(slot)
        .and_then(Value::as_path)
        .ok_or_else(|| Error::MissingInput(decl.name.to_owned(), slot.to_owned()))
}

fn identity(decl: &NodeDecl, realization: &Realization) -> Result<ValueMap> {
    let mut outputs = ValueMap::default();
    for output in &decl.outputs {
        let value = realization
            .get(output.name)
            .ok_or_else(|| Error::MissingField(output.name.to_owned()))?;
        outputs.insert(output.name, Value::str(value));
    }
    Ok(outputs)
}

/// Fill each template's fields from `values` and expand its wildcards under `base`.
/// A single match becomes a file; several become a list.
fn select_files(
    decl: &NodeDecl,
    base: &Path,
    templates: &[(&'static str, String)],
    values: &ValueMap,
    fs: &Fs,
) -> Result<ValueMap> {
    let mut outputs = ValueMap::default();
    for (key, template) in templates {
        let parsed = syntax::parse_template(template)?;
        let mut pattern = String::with_capacity(template.len() + 16);
        for part in &parsed.parts {
            match part {
                TemplatePart::Literal(text) => pattern.push_str(text),
                TemplatePart::Wildcard => pattern.push('*'),
                TemplatePart::Field(field) => match values.get(*field) {
                    Some(Value::Str(s)) => pattern.push_str(s),
                    Some(other) => pattern.push_str(&other.to_string()),
                    None => {
                        let field = (*field).to_owned();
                        return Err(Error::MissingInput(decl.name.to_owned(), field).into());
                    }
                },
            }
        }
        let pattern = base.join(pattern);
        let mut found = fs
            .glob(&pattern)
            .with_context(|| format!("while selecting '{key}' for node '{}'", decl.name))?;
        let value = match found.len() {
            0 => {
                return Err(Error::NoMatch(
                    decl.name.to_owned(),
                    (*key).to_owned(),
                    pattern.display().to_string(),
                )
                .into())
            }
            1 => Value::File(found.remove(0)),
            _ => Value::List(found.into_iter().map(Value::File).collect()),
        };
        log::trace!("{}: {key} = {value}", decl.name);
        outputs.insert(*key, value);
    }
    Ok(outputs)
}

/// Copy every file received into `<base>/<folder>/sub-<s>/ses-<t>/...`.
fn sink(base: &Path, values: &ValueMap, realization: &Realization, fs: &Fs) -> Result<()> {
    let subdir = realization.sink_subdir();
    // sort for a stable copy order:
    let mut entries: Vec<(&&'static str, &Value)> = values.iter().collect();
    entries.sort_unstable_by_key(|(name, _)| **name);
    for (name, value) in entries {
        let folder = sink_folder(name);
        let dir: PathBuf = base.join(folder).join(&subdir);
        fs.create_dir(&dir)
            .with_context(|| format!("while creating sink dir {dir:?}"))?;
        for file in value.files() {
            let Some(fname) = file.file_name() else {
                continue;
            };
            let tgt = dir.join(fname);
            eprintln!("{} {file:?} to {tgt:?}", "Sinking".magenta());
            fs.copy(file, &tgt)?;
        }
    }
    Ok(())
}

fn sink_folder(input: &str) -> &str {
    input
        .split_once(SINK_LABEL_DELIM)
        .map_or(input, |(folder, _)| folder)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs as stdfs;
    use tempfile::tempdir;
    use workflow::interfaces::builtins;

    fn realization() -> Realization {
        Realization::new(vec![
            ("subject_id", "01".to_owned()),
            ("session_id", "1".to_owned()),
        ])
    }

    #[test]
    fn test_sink_folder() {
        assert_eq!("preproc_mni", sink_folder("preproc_mni.@dwi"));
        assert_eq!("anat", sink_folder("anat"));
    }

    #[test]
    fn test_select_and_gradients() -> Result<()> {
        let dir = tempdir()?;
        let dwi_dir = dir.path().join("sub-01/ses-1/dwi");
        stdfs::create_dir_all(&dwi_dir)?;
        for ext in ["nii.gz", "bvec", "bval"] {
            stdfs::write(dwi_dir.join(format!("sub-01_ses-1_dwi.{ext}")), "")?;
        }
        let fs = Fs::new(dir.path(), true);

        let select = builtins::select_files(
            "select_files",
            dir.path().to_path_buf(),
            vec![("dwi", "sub-{subject_id}/ses-{session_id}/dwi/*_dwi.nii.gz".to_owned())],
            &["subject_id", "session_id"],
        )?;
        let sub_source = builtins::identity(
            "sub_source",
            workflow::Iterables {
                fields: vec!["subject_id", "session_id"],
                rows: vec![vec!["01".to_owned(), "1".to_owned()]],
            },
        );
        let ids = run(&sub_source, &ValueMap::default(), &fs)?;
        assert_eq!(Some(&Value::str("01")), ids.get("subject_id"));

        let selected = run(&select, &ids, &fs)?;
        let dwi = dwi_dir.join("sub-01_ses-1_dwi.nii.gz");
        assert_eq!(Some(&Value::File(dwi.clone())), selected.get("dwi"));

        let grad = builtins::gradient_files("sub_grad_files", "nii.gz");
        let mut values = ValueMap::default();
        values.insert("sub_dwi", Value::File(dwi));
        let out = run(&grad, &values, &fs)?;
        assert_eq!(
            Some(&Value::tuple([
                Value::File(dwi_dir.join("sub-01_ses-1_dwi.bvec")),
                Value::File(dwi_dir.join("sub-01_ses-1_dwi.bval")),
            ])),
            out.get("fslgrad")
        );

        let mut missing = ids.clone();
        missing.insert("subject_id", Value::str("02"));
        assert!(run(&select, &missing, &fs).is_err());
        Ok(())
    }

    #[test]
    fn test_sink() -> Result<()> {
        let dir = tempdir()?;
        let work = dir.path().join("pipetography/_subject_id_01_session_id_1/mrtransform");
        stdfs::create_dir_all(&work)?;
        let dwi = work.join("dwi_mni.mif");
        stdfs::write(&dwi, "dwi")?;

        let fs = Fs::new(dir.path(), false);
        let decl = builtins::datasink("datasink", dir.path().to_path_buf());
        let mut values = ValueMap::default();
        values.insert("preproc_mni.@dwi", Value::File(dwi));
        run(&decl, &values, &fs)?;

        let sunk = dir.path().join("preproc_mni/sub-01/ses-1/dwi_mni.mif");
        assert_eq!("dwi", stdfs::read_to_string(sunk)?);
        Ok(())
    }

    fn run(decl: &NodeDecl, values: &ValueMap, fs: &Fs) -> Result<ValueMap> {
        let workflow::NodeKind::Builtin(builtin) = &decl.kind else {
            panic!("expected a builtin");
        };
        run_builtin(decl, builtin, values, &realization(), fs)
    }
}
