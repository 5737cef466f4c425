//! Turning a command node plus its input values into an argv.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use syntax::ast::{ArgPart, Conversion};

use crate::{Error, InputSlot, NodeDecl, NodeKind, OutputPath, Value, ValueMap};

/// A fully rendered external command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandLine {
    pub program: &'static str,
    pub args: Vec<String>,
    /// file that receives the program's stdout, if the node captures it
    pub stdout: Option<PathBuf>,
    pub env: Vec<(&'static str, String)>,
}

impl CommandLine {
    /// Build a `std::process::Command` that runs inside `cwd`.
    pub fn to_command(&self, cwd: &Path) -> std::process::Command {
        let mut cmd = std::process::Command::new(self.program);
        cmd.args(&self.args).current_dir(cwd);
        for (var, val) in &self.env {
            cmd.env(var, val);
        }
        cmd
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (var, val) in &self.env {
            write!(f, "{var}={val} ")?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        if let Some(stdout) = &self.stdout {
            write!(f, " > {}", stdout.display())?;
        }
        Ok(())
    }
}

fn is_set(values: &ValueMap, name: &str) -> bool {
    values.get(name).map_or(false, Value::is_set)
}

/// Fill in unset slots whose names are generated from another slot,
/// e.g. `dwi.mif` → `dwi_biascorr.mif`.
pub fn fill_generated(decl: &NodeDecl, values: &mut ValueMap) {
    for slot in &decl.inputs {
        if let Some((source, infix)) = slot.name_source {
            if values.contains_key(slot.name) {
                continue;
            }
            let generated = values
                .get(source)
                .and_then(Value::as_path)
                .and_then(|p| p.file_name())
                .and_then(|f| f.to_str())
                .map(|fname| insert_before_ext(fname, infix));
            if let Some(generated) = generated {
                log::trace!("{}: generated {} = {generated}", decl.name, slot.name);
                values.insert(slot.name, Value::Str(generated));
            }
        }
    }
}

/// `acpc_t1_brain.nii.gz` + `_mask` → `acpc_t1_brain_mask.nii.gz`; `dwi2acpc` + `.mat` → `dwi2acpc.mat`.
fn insert_before_ext(fname: &str, infix: &str) -> String {
    match fname.split_once('.') {
        Some((stem, ext)) => format!("{stem}{infix}.{ext}"),
        None => format!("{fname}{infix}"),
    }
}

/// Check mandatory, mutually exclusive and required-together inputs.
pub fn check_inputs(decl: &NodeDecl, values: &ValueMap) -> Result<(), Error> {
    let node = decl.name;
    for slot in &decl.inputs {
        if !is_set(values, slot.name) {
            if slot.mandatory {
                return Err(Error::MissingMandatory(node.to_owned(), slot.name.to_owned()));
            }
            continue;
        }
        if let Some(other) = slot.xor.iter().find(|x| is_set(values, x)) {
            return Err(Error::XorConflict(
                node.to_owned(),
                slot.name.to_owned(),
                (*other).to_owned(),
            ));
        }
        if let Some(missing) = slot.requires.iter().find(|r| !is_set(values, r)) {
            return Err(Error::MissingRequirement(
                node.to_owned(),
                slot.name.to_owned(),
                (*missing).to_owned(),
            ));
        }
    }
    Ok(())
}

/// Render the command line for a command node.
/// Relative output names stay relative; the command runs inside `dir`.
pub fn render(decl: &NodeDecl, values: &ValueMap, dir: &Path) -> Result<CommandLine> {
    let NodeKind::Command(cmd) = &decl.kind else {
        return Err(Error::NotACommand(decl.name.to_owned()).into());
    };
    check_inputs(decl, values)?;

    let mut slots: Vec<&InputSlot> = decl
        .inputs
        .iter()
        .filter(|s| !s.argstr.is_empty() && is_set(values, s.name))
        .collect();
    // sort is stable, so unpositioned slots keep declaration order:
    slots.sort_by_key(|s| match s.position {
        Some(p) if p >= 0 => (0, p),
        None => (1, 0),
        Some(p) => (2, p),
    });

    let mut args: Vec<String> = cmd.leading.iter().map(|w| (*w).to_owned()).collect();
    for slot in slots {
        if let Some(value) = values.get(slot.name) {
            let words = render_slot(decl.name, slot, value, values)
                .with_context(|| format!("while rendering '{}' of node '{}'", slot.name, decl.name))?;
            args.extend(words);
        }
    }

    let stdout = match cmd.stdout_to {
        Some(slot) => {
            let path = values
                .get(slot)
                .and_then(Value::as_path)
                .ok_or_else(|| Error::MissingMandatory(decl.name.to_owned(), slot.to_owned()))?;
            Some(dir.join(path))
        }
        None => None,
    };

    let mut env = Vec::with_capacity(cmd.env.len());
    for (var, slot) in cmd.env {
        if let Some(value) = values.get(slot) {
            env.push((*var, format_scalar(value, Conversion::Str)));
        }
    }

    Ok(CommandLine {
        program: cmd.program,
        args,
        stdout,
        env,
    })
}

fn render_slot(
    node: &str,
    slot: &InputSlot,
    value: &Value,
    values: &ValueMap,
) -> Result<Vec<String>> {
    let template = syntax::parse_argstr(slot.argstr)?;

    if slot.raw {
        return Ok(format_scalar(value, Conversion::Str)
            .split_whitespace()
            .map(str::to_owned)
            .collect());
    }

    let n = template.placeholders();
    if let Value::Bool(flag) = value {
        if n == 0 {
            let words = if *flag { literal_words(&template.tokens) } else { Vec::new() };
            return Ok(words);
        }
    }

    let items: Vec<&Value> = match n {
        0 => Vec::new(),
        1 => vec![value],
        _ => value.items().iter().collect(),
    };
    if items.len() != n {
        return Err(Error::PlaceholderMismatch(
            node.to_owned(),
            slot.name.to_owned(),
            n,
            items.len(),
        )
        .into());
    }

    let sep = slot.sep.unwrap_or(" ");
    let mut items = items.into_iter();
    let mut words = Vec::with_capacity(template.tokens.len());
    for token in &template.tokens {
        // a lone placeholder holding a list can expand into several words:
        if let [ArgPart::Placeholder(conv)] = &token.parts[..] {
            if let Some(item) = items.next() {
                words.extend(format_list(item, *conv, sep));
            }
            continue;
        }
        let mut word = String::new();
        for part in &token.parts {
            match part {
                ArgPart::Literal(text) => word.push_str(text),
                ArgPart::Placeholder(conv) => {
                    if let Some(item) = items.next() {
                        word.push_str(&format_list(item, *conv, sep).join(sep));
                    }
                }
                ArgPart::Named(name, conv) => {
                    let other = values.get(*name).ok_or_else(|| {
                        Error::MissingRequirement(
                            node.to_owned(),
                            slot.name.to_owned(),
                            (*name).to_owned(),
                        )
                    })?;
                    word.push_str(&format_list(other, *conv, sep).join(sep));
                }
            }
        }
        words.push(word);
    }
    Ok(words)
}

fn literal_words(tokens: &[syntax::ast::ArgToken]) -> Vec<String> {
    tokens
        .iter()
        .map(|t| {
            t.parts
                .iter()
                .filter_map(|p| match p {
                    ArgPart::Literal(text) => Some(*text),
                    _ => None,
                })
                .collect()
        })
        .collect()
}

/// Lists joined by a whitespace separator become one word per element.
fn format_list(value: &Value, conv: Conversion, sep: &str) -> Vec<String> {
    match value {
        Value::List(items) if sep.trim().is_empty() => {
            items.iter().map(|v| format_scalar(v, conv)).collect()
        }
        Value::List(items) => {
            let joined: Vec<String> = items.iter().map(|v| format_scalar(v, conv)).collect();
            vec![joined.join(sep)]
        }
        _ => vec![format_scalar(value, conv)],
    }
}

fn format_scalar(value: &Value, conv: Conversion) -> String {
    match (conv, value) {
        (_, Value::Str(s)) => s.clone(),
        (_, Value::File(p)) => p.display().to_string(),
        (Conversion::Float, Value::Float(x)) => format!("{x:.6}"),
        (Conversion::Float, Value::Int(i)) => format!("{:.6}", *i as f64),
        (Conversion::Int, Value::Float(x)) => format!("{}", x.trunc() as i64),
        (Conversion::General, Value::Float(x)) => format_general(*x),
        (_, Value::Int(i)) => i.to_string(),
        (_, Value::Float(x)) => x.to_string(),
        (_, Value::Bool(b)) => u8::from(*b).to_string(),
        (_, Value::Tuple(items) | Value::List(items)) => items
            .iter()
            .map(|v| format_scalar(v, conv))
            .collect::<Vec<_>>()
            .join(","),
    }
}

/// Like printf's `%g`: plain for ordinary magnitudes, scientific for tiny or huge ones.
fn format_general(x: f64) -> String {
    let abs = x.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        format!("{x:e}")
    } else {
        x.to_string()
    }
}

/// Resolve the paths of a node's outputs from its input values.
/// Outputs whose source inputs are unset are left out.
pub fn resolve_outputs(decl: &NodeDecl, values: &ValueMap, dir: &Path) -> ValueMap {
    let mut outputs = ValueMap::default();
    for out in &decl.outputs {
        let path = match out.path {
            OutputPath::FromInput(slot) => values.get(slot).and_then(Value::as_path).map(Path::to_path_buf),
            OutputPath::TupleItem(slot, i) => values
                .get(slot)
                .and_then(|v| v.items().get(i))
                .and_then(Value::as_path)
                .map(Path::to_path_buf),
            OutputPath::Derived { from, insert } => values
                .get(from)
                .and_then(Value::as_path)
                .and_then(|p| Some((p, p.file_name()?.to_str()?)))
                .map(|(p, fname)| p.with_file_name(insert_before_ext(fname, insert))),
            OutputPath::Fixed(name) => Some(PathBuf::from(name)),
            OutputPath::Runtime => None,
        };
        if let Some(path) = path {
            outputs.insert(out.name, Value::File(dir.join(path)));
        }
    }
    outputs
}
