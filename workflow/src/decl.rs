use std::fmt;
use std::path::PathBuf;

use anyhow::Result;

use crate::{Error, Value, ValueKind, ValueMap};

/// Declaration of one named input of a node.
#[derive(Debug, Clone)]
pub struct InputSlot {
    pub name: &'static str,
    pub kind: ValueKind,
    /// printf-style argument template; empty if the slot is never rendered directly.
    pub argstr: &'static str,
    /// Non-negative positions come first in ascending order, then unpositioned slots
    /// in declaration order, then negative positions (-1 is last).
    pub position: Option<i32>,
    pub mandatory: bool,
    /// file(s) must exist before the command runs
    pub exists: bool,
    pub xor: &'static [&'static str],
    pub requires: &'static [&'static str],
    /// separator for list values; whitespace separators produce separate words
    pub sep: Option<&'static str>,
    /// value is split on whitespace and passed through, like a free-form `args` option
    pub raw: bool,
    /// when unset, generate the value from another slot's file name plus this infix
    pub name_source: Option<(&'static str, &'static str)>,
}

impl InputSlot {
    pub fn new(name: &'static str, kind: ValueKind, argstr: &'static str) -> Self {
        Self {
            name,
            kind,
            argstr,
            position: None,
            mandatory: false,
            exists: false,
            xor: &[],
            requires: &[],
            sep: None,
            raw: false,
            name_source: None,
        }
    }

    pub fn file(name: &'static str, argstr: &'static str) -> Self {
        Self::new(name, ValueKind::File, argstr)
    }

    pub fn string(name: &'static str, argstr: &'static str) -> Self {
        Self::new(name, ValueKind::Str, argstr)
    }

    pub fn int(name: &'static str, argstr: &'static str) -> Self {
        Self::new(name, ValueKind::Int, argstr)
    }

    pub fn float(name: &'static str, argstr: &'static str) -> Self {
        Self::new(name, ValueKind::Float, argstr)
    }

    pub fn flag(name: &'static str, argstr: &'static str) -> Self {
        Self::new(name, ValueKind::Bool, argstr)
    }

    pub fn at(mut self, position: i32) -> Self {
        self.position = Some(position);
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn exists(mut self) -> Self {
        self.exists = true;
        self
    }

    pub fn xor(mut self, others: &'static [&'static str]) -> Self {
        self.xor = others;
        self
    }

    pub fn requires(mut self, others: &'static [&'static str]) -> Self {
        self.requires = others;
        self
    }

    pub fn sep(mut self, sep: &'static str) -> Self {
        self.sep = Some(sep);
        self
    }

    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    pub fn name_from(mut self, source: &'static str, infix: &'static str) -> Self {
        self.name_source = Some((source, infix));
        self
    }
}

/// How the path of an output file is derived once the node's inputs are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPath {
    /// the value of an input slot, e.g. `out_file`
    FromInput(&'static str),
    /// one element of a tuple-valued input, e.g. `export_fslgrad.1`
    TupleItem(&'static str, usize),
    /// an input's file name with text inserted before its extension
    /// (appended if there is no extension)
    Derived {
        from: &'static str,
        insert: &'static str,
    },
    /// fixed file name inside the node dir
    Fixed(&'static str),
    /// only known after the node has run (builtin nodes)
    Runtime,
}

#[derive(Debug, Clone)]
pub struct OutputSlot {
    pub name: &'static str,
    pub kind: ValueKind,
    pub path: OutputPath,
}

impl OutputSlot {
    pub fn new(name: &'static str, kind: ValueKind, path: OutputPath) -> Self {
        Self { name, kind, path }
    }

    /// A file output whose path is the value of input `slot`.
    pub fn from_input(name: &'static str, slot: &'static str) -> Self {
        Self::new(name, ValueKind::File, OutputPath::FromInput(slot))
    }

    pub fn derived(name: &'static str, from: &'static str, insert: &'static str) -> Self {
        Self::new(name, ValueKind::File, OutputPath::Derived { from, insert })
    }

    pub fn runtime(name: &'static str, kind: ValueKind) -> Self {
        Self::new(name, kind, OutputPath::Runtime)
    }
}

/// An external program invocation.
#[derive(Debug, Clone)]
pub struct Command {
    pub program: &'static str,
    /// words placed right after the program, e.g. the `individual` in `dwinormalise individual`
    pub leading: &'static [&'static str],
    /// input slot naming a file that receives the program's stdout
    pub stdout_to: Option<&'static str>,
    /// environment variables set from slot values, as `(VAR, slot)` pairs
    pub env: &'static [(&'static str, &'static str)],
}

/// Steps performed in-process rather than by an external program.
#[derive(Debug, Clone, PartialEq)]
pub enum Builtin {
    /// passes its iterable fields through as outputs
    Identity,
    /// resolves `{field}` path templates (with `*` wildcards) under `base`
    SelectFiles {
        base: PathBuf,
        templates: Vec<(&'static str, String)>,
    },
    /// finds the `.bvec`/`.bval` pair beside a DWI volume
    GradientFiles { ext: String },
    /// reads readout time and phase-encoding direction from sidecars
    Metadata { root: PathBuf },
    /// derives a FreeSurfer subject id from an anatomical file name
    FreesurferId,
    /// copies inputs into the derivatives tree
    DataSink { base: PathBuf },
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Command(Command),
    Builtin(Builtin),
}

/// Values a node is run over. Fields are synchronized: row `i` assigns
/// `rows[i][j]` to `fields[j]` for every field at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Iterables {
    pub fields: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

/// One processing step: an external command or builtin, its slots, and the
/// values its slots have been given so far.
#[derive(Debug, Clone)]
pub struct NodeDecl {
    pub name: &'static str,
    pub kind: NodeKind,
    pub inputs: Vec<InputSlot>,
    pub outputs: Vec<OutputSlot>,
    pub values: ValueMap,
    pub iterables: Option<Iterables>,
    /// accepts inputs under any name (sinks)
    pub open: bool,
}

impl NodeDecl {
    pub fn command(
        name: &'static str,
        program: &'static str,
        inputs: Vec<InputSlot>,
        outputs: Vec<OutputSlot>,
    ) -> Self {
        let cmd = Command {
            program,
            leading: &[],
            stdout_to: None,
            env: &[],
        };
        Self::new(name, NodeKind::Command(cmd), inputs, outputs)
    }

    pub fn builtin(
        name: &'static str,
        builtin: Builtin,
        inputs: Vec<InputSlot>,
        outputs: Vec<OutputSlot>,
    ) -> Self {
        Self::new(name, NodeKind::Builtin(builtin), inputs, outputs)
    }

    fn new(
        name: &'static str,
        kind: NodeKind,
        inputs: Vec<InputSlot>,
        outputs: Vec<OutputSlot>,
    ) -> Self {
        Self {
            name,
            kind,
            inputs,
            outputs,
            values: ValueMap::default(),
            iterables: None,
            open: false,
        }
    }

    pub fn leading(mut self, words: &'static [&'static str]) -> Self {
        if let NodeKind::Command(cmd) = &mut self.kind {
            cmd.leading = words;
        }
        self
    }

    pub fn stdout_to(mut self, slot: &'static str) -> Self {
        if let NodeKind::Command(cmd) = &mut self.kind {
            cmd.stdout_to = Some(slot);
        }
        self
    }

    pub fn env(mut self, vars: &'static [(&'static str, &'static str)]) -> Self {
        if let NodeKind::Command(cmd) = &mut self.kind {
            cmd.env = vars;
        }
        self
    }

    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }

    pub fn iterate(mut self, iterables: Iterables) -> Self {
        self.iterables = Some(iterables);
        self
    }

    pub fn input(&self, name: &str) -> Option<&InputSlot> {
        self.inputs.iter().find(|s| s.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&OutputSlot> {
        self.outputs.iter().find(|s| s.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Program name for command nodes.
    pub fn program(&self) -> Option<&'static str> {
        match &self.kind {
            NodeKind::Command(cmd) => Some(cmd.program),
            NodeKind::Builtin(_) => None,
        }
    }

    /// Give input `slot` a value, checking that the slot exists and the value fits it.
    pub fn set(&mut self, slot: &'static str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let input = self
            .input(slot)
            .ok_or_else(|| Error::UnknownInput(self.name.to_owned(), slot.to_owned()))?;
        if !value.fits(input.kind) {
            return Err(Error::KindMismatch {
                node: self.name.to_owned(),
                slot: slot.to_owned(),
                value: value.to_string(),
                expected: input.kind,
            }
            .into());
        }
        self.values.insert(slot, value);
        Ok(())
    }
}

impl fmt::Display for NodeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Command(cmd) => write!(f, "{} ({})", self.name, cmd.program),
            NodeKind::Builtin(_) => write!(f, "{}", self.name),
        }
    }
}
