use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use util::{HashSet, PathEncodingError};

use crate::{Error, SESSION_KEY, SUBJECT_KEY};

/// Delimiter between subject and session in a session key, e.g. `01.1`.
const KEY_DELIM: char = '.';

/// One imaging session. The pair is the key; neither label is unique by itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub subject: String,
    pub session: String,
}

impl SessionKey {
    pub fn new(subject: &str, session: &str) -> Self {
        Self {
            subject: subject.to_owned(),
            session: session.to_owned(),
        }
    }

    /// Parse `SUBJECT.SESSION`. The `sub-` and `ses-` prefixes are optional.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let (sub, ses) = text
            .split_once(KEY_DELIM)
            .ok_or_else(|| Error::InvalidSessionKey(text.to_owned()))?;
        let sub = sub.strip_prefix("sub-").unwrap_or(sub);
        let ses = ses.strip_prefix("ses-").unwrap_or(ses);
        if sub.is_empty() || ses.is_empty() {
            return Err(Error::InvalidSessionKey(text.to_owned()));
        }
        Ok(Self::new(sub, ses))
    }

    /// `root/sub-<subject>/ses-<session>`
    pub fn dir(&self, root: &Path) -> PathBuf {
        let mut buf = PathBuf::from(root);
        buf.push(format!("{SUBJECT_KEY}-{}", self.subject));
        buf.push(format!("{SESSION_KEY}-{}", self.session));
        buf
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{SUBJECT_KEY}-{}_{SESSION_KEY}-{}", self.subject, self.session)
    }
}

/// Parallel subject and session sequences, one entry per session to process.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionList {
    pub subjects: Vec<String>,
    pub sessions: Vec<String>,
}

impl SessionList {
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.subjects
            .iter()
            .zip(&self.sessions)
            .map(|(s, t)| (s.as_str(), t.as_str()))
    }

    fn push(&mut self, key: SessionKey) {
        self.subjects.push(key.subject);
        self.sessions.push(key.session);
    }
}

/// Subject and session labels found in a BIDS dataset.
#[derive(Debug)]
pub struct Layout {
    pub root: PathBuf,
    pub subjects: Vec<String>,
    pub sessions: Vec<String>,
}

impl Layout {
    /// Scan `root` for `sub-*` directories, and each of those for `ses-*` directories.
    /// Labels come back sorted and deduplicated; sessions are the union across subjects.
    pub fn index(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            let root = root.to_str().ok_or(PathEncodingError)?;
            return Err(Error::DatasetNotFound(root.to_owned()).into());
        }
        log::info!("Indexing BIDS dataset at {root:?}");

        let mut subjects = BTreeSet::new();
        let mut sessions = BTreeSet::new();
        for (subject, subject_dir) in entity_dirs(root, SUBJECT_KEY)? {
            for (session, _) in entity_dirs(&subject_dir, SESSION_KEY)? {
                sessions.insert(session);
            }
            subjects.insert(subject);
        }

        log::debug!(
            "Found {} subjects and {} sessions",
            subjects.len(),
            sessions.len()
        );
        Ok(Self {
            root: root.to_path_buf(),
            subjects: subjects.into_iter().collect(),
            sessions: sessions.into_iter().collect(),
        })
    }

    /// Shorthand for [`filter_sessions`] over every label in the layout.
    pub fn filter(&self, exclude: &HashSet<SessionKey>) -> SessionList {
        filter_sessions(&self.root, &self.subjects, &self.sessions, exclude)
    }
}

/// Subdirectories of `dir` named `<key>-<label>`, as `(label, path)` pairs.
fn entity_dirs(dir: &Path, key: &str) -> Result<Vec<(String, PathBuf)>> {
    let mut found = Vec::new();
    let entries = fs::read_dir(dir).with_context(|| format!("while listing {dir:?}"))?;
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let fname = entry.file_name();
        let Some(fname) = fname.to_str() else {
            log::debug!("Skipping non-utf8 entry {:?}", entry.path());
            continue;
        };
        match syntax::parse_entity(fname) {
            Ok(entity) if entity.key == key => {
                found.push((entity.value.to_owned(), entry.path()));
            }
            _ => log::trace!("Ignoring {fname} while looking for '{key}-' dirs"),
        }
    }
    Ok(found)
}

/// Compute `(present ∩ subjects × sessions) − exclude`, as parallel sequences.
///
/// A pair is present when `root/sub-<s>/ses-<t>` is a directory.
/// Pairs that aren't present are skipped with a warning.
/// Output is sorted by `(subject, session)` and holds each pair once,
/// whatever the order of `subjects` and `sessions`.
pub fn filter_sessions(
    root: &Path,
    subjects: &[String],
    sessions: &[String],
    exclude: &HashSet<SessionKey>,
) -> SessionList {
    let combos: BTreeSet<SessionKey> = subjects
        .iter()
        .flat_map(|subject| sessions.iter().map(move |session| SessionKey::new(subject, session)))
        .collect();

    let mut list = SessionList::default();
    for key in combos {
        if !key.dir(root).is_dir() {
            log::warn!("No directory for {key} in {root:?}; skipping");
            continue;
        }
        if exclude.contains(&key) {
            log::info!("Excluding {key}");
            continue;
        }
        list.push(key);
    }
    list
}
