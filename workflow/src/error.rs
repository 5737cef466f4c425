use anyhow::Result;
use colored::Colorize;

use crate::ValueKind;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Node '{0}' is not part of this workflow")]
    UnknownNode(String),
    #[error("Node '{0}' is declared more than once")]
    DuplicateNode(String),
    #[error("Node '{0}' has no input slot named '{1}'")]
    UnknownInput(String, String),
    #[error("Node '{0}' has no output slot named '{1}'")]
    UnknownOutput(String, String),
    #[error("Value {value} does not fit input '{slot}' of node '{node}' (expected {expected:?})")]
    KindMismatch {
        node: String,
        slot: String,
        value: String,
        expected: ValueKind,
    },
    #[error("Cannot connect {from_kind:?} output '{from}' to {to_kind:?} input '{to}'")]
    IncompatibleEdge {
        from: String,
        to: String,
        from_kind: ValueKind,
        to_kind: ValueKind,
    },
    #[error("Input '{1}' of node '{0}' is connected more than once")]
    DuplicateConnection(String, String),
    #[error("Input '{1}' of node '{0}' already has a default value; connecting it would override it")]
    OverridesDefault(String, String),
    #[error("Mandatory input '{1}' of node '{0}' is neither set nor connected")]
    UnconnectedMandatory(String, String),
    #[error("Workflow graph contains a cycle through node '{0}'")]
    Cycle(String),
    #[error("{0} nodes were handed to the assembler before their defaults were configured")]
    NotConfigured(&'static str),
    #[error("{0} nodes don't match the expected set: missing {1:?}, unexpected {2:?}")]
    SchemaMismatch(&'static str, Vec<&'static str>, Vec<&'static str>),
    #[error("Mandatory input '{1}' of node '{0}' is not set")]
    MissingMandatory(String, String),
    #[error("Inputs '{1}' and '{2}' of node '{0}' are mutually exclusive")]
    XorConflict(String, String, String),
    #[error("Input '{1}' of node '{0}' requires '{2}' to be set")]
    MissingRequirement(String, String, String),
    #[error("Argument template for '{1}' of node '{0}' expects {2} values but got {3}")]
    PlaceholderMismatch(String, String, usize, usize),
    #[error("Node '{0}' is not an external command")]
    NotACommand(String),
    #[error("Template for '{1}' in node '{0}' refers to unknown field '{2}'")]
    UnknownTemplateField(String, String, String),
}

/// For re-throwing after we've printed a list of errors to the user.
#[derive(Debug, thiserror::Error)]
#[error("{0} failed due to {1} errors")]
pub struct AggregatedErrors(pub String, pub usize);

/// Collects errors so that they can all be reported at once.
pub struct Errors {
    errors: Vec<anyhow::Error>,
}

impl Default for Errors {
    fn default() -> Self {
        Self {
            // ideally we won't have any,
            // and we don't mind reallocating if we're already in an error state:
            errors: Vec::with_capacity(0),
        }
    }
}

impl Errors {
    pub fn add_context(&mut self, e: anyhow::Error, msg: String) {
        log::trace!("{msg}: {e:?}");
        self.errors.push(e.context(msg));
    }

    pub fn add(&mut self, e: impl Into<anyhow::Error>) {
        let e = e.into();
        log::trace!("error: {e:?}");
        self.errors.push(e);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Print full list of errors to stderr, fail w/ an aggregated error
    /// if there were one or more errors.
    pub fn print_recap(&self, label: &str) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            eprintln!("\n{} {}:\n", "Encountered errors while".red(), label.red());
            for e in &self.errors {
                recap(e);
            }
            Err(AggregatedErrors(label.to_owned(), self.errors.len()).into())
        }
    }
}

fn recap(e: &anyhow::Error) {
    eprint!("{}: {}", "ERROR".red(), e);
    for cause in e.chain().skip(1) {
        eprint!("\nCaused by:\n\t{}", cause);
    }
    eprintln!();
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_recap() {
        let mut errors = Errors::default();
        assert!(errors.print_recap("checking nothing").is_ok());

        errors.add(Error::UnknownNode("mrgrid".to_owned()));
        errors.add_context(
            Error::Cycle("denoise".to_owned()).into(),
            "while sorting".to_owned(),
        );
        assert_eq!(2, errors.len());

        let e = errors.print_recap("checking graph").unwrap_err();
        let agg = e.downcast_ref::<AggregatedErrors>().unwrap();
        assert_eq!(2, agg.1);
    }
}
