/// A `key-value` pair from a BIDS name, e.g. `sub-01`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Entity<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

impl<'a> Entity<'a> {
    pub fn new(key: &'a str, value: &'a str) -> Self {
        Self { key, value }
    }
}

/// A BIDS file name such as `sub-01_ses-1_ap_dwi.nii.gz`, split into
/// its entities (`sub-01`, `ses-1`), bare labels (`ap`),
/// suffix (`dwi`) and extension (`nii.gz`).
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BidsName<'a> {
    pub entities: Vec<Entity<'a>>,
    pub labels: Vec<&'a str>,
    pub suffix: Option<&'a str>,
    pub extension: Option<&'a str>,
}

impl<'a> BidsName<'a> {
    pub(crate) fn from_chunks(
        chunks: Vec<(&'a str, Option<&'a str>)>,
        extension: Option<&'a str>,
    ) -> Self {
        // the suffix is the trailing bare label, if the name ends with one.
        let ends_with_label = matches!(chunks.last(), Some((_, None)));
        let mut entities = Vec::with_capacity(chunks.len());
        let mut labels = Vec::new();
        for (key, value) in chunks {
            match value {
                Some(value) => entities.push(Entity { key, value }),
                None => labels.push(key),
            }
        }
        let suffix = if ends_with_label { labels.pop() } else { None };
        Self {
            entities,
            labels,
            suffix,
            extension,
        }
    }

    /// Value of the entity named `key`, if present.
    pub fn get(&self, key: &str) -> Option<&'a str> {
        self.entities.iter().find(|e| e.key == key).map(|e| e.value)
    }

    /// True if every entity in `self` appears with the same value in `other`.
    pub fn entities_subset_of(&self, other: &BidsName) -> bool {
        self.entities.iter().all(|e| other.get(e.key) == Some(e.value))
    }
}

/// One piece of a file-selection template.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TemplatePart<'a> {
    /// text copied as-is
    Literal(&'a str),
    /// `{subject_id}`
    Field(&'a str),
    /// `*`, matches any run of characters within one path component
    Wildcard,
}

/// A path template like `sub-{subject_id}/ses-{session_id}/anat/*_T1w.nii.gz`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PathTemplate<'a> {
    pub parts: Vec<TemplatePart<'a>>,
}

impl<'a> PathTemplate<'a> {
    /// Names of all `{fields}` referenced by the template, in order of appearance.
    pub fn fields(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.parts.iter().filter_map(|p| match p {
            TemplatePart::Field(f) => Some(*f),
            _ => None,
        })
    }

    pub fn has_wildcard(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, TemplatePart::Wildcard))
    }
}

/// printf-style conversion inside an argument template.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Conversion {
    /// %s
    Str,
    /// %d
    Int,
    /// %f
    Float,
    /// %g
    General,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ArgPart<'a> {
    Literal(&'a str),
    /// `%s`, `%d` etc. Takes the next value of the slot being rendered.
    Placeholder(Conversion),
    /// `%(slot)s`. Takes the value of another slot.
    Named(&'a str, Conversion),
}

/// One whitespace-delimited word of an argument template.
/// `-export_grad_fsl %s %s` has three tokens.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ArgToken<'a> {
    pub parts: Vec<ArgPart<'a>>,
}

impl<'a> ArgToken<'a> {
    pub fn placeholders(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, ArgPart::Placeholder(_)))
            .count()
    }
}

/// A parsed `argstr`, like `-readout_time %f` or `%d -pow -sub -abs -sqrt`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ArgTemplate<'a> {
    pub tokens: Vec<ArgToken<'a>>,
}

impl<'a> ArgTemplate<'a> {
    /// Total number of positional placeholders across all tokens.
    pub fn placeholders(&self) -> usize {
        self.tokens.iter().map(ArgToken::placeholders).sum()
    }
}
