use std::path::PathBuf;

util::id!(RealizationId, u32);

/// One assignment of values to the iterable fields, e.g. `subject_id=01, session_id=1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Realization {
    assignments: Vec<(&'static str, String)>,
}

impl Realization {
    pub fn new(assignments: Vec<(&'static str, String)>) -> Self {
        Self { assignments }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.assignments.iter().map(|(f, v)| (*f, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Keep only the assignments for `fields`.
    pub fn project(&self, fields: &[&'static str]) -> Self {
        Self {
            assignments: self
                .assignments
                .iter()
                .filter(|(f, _)| fields.contains(f))
                .cloned()
                .collect(),
        }
    }

    /// Work dir component, e.g. `_subject_id_01_session_id_1`.
    pub fn dir_name(&self) -> String {
        let mut name = String::with_capacity(32);
        for (field, value) in &self.assignments {
            name.push('_');
            name.push_str(field);
            name.push('_');
            name.push_str(value);
        }
        name
    }

    /// Derivatives subdir, e.g. `sub-01/ses-1/atlas-aal`.
    pub fn sink_subdir(&self) -> PathBuf {
        let mut dir = PathBuf::new();
        let mut push = |field: &str, value: &str| {
            let prefix = match field {
                "subject_id" => "sub",
                "session_id" => "ses",
                other => other.split('_').next().unwrap_or(other),
            };
            dir.push(format!("{prefix}-{value}"));
        };
        for first in ["subject_id", "session_id"] {
            if let Some(value) = self.get(first) {
                push(first, value);
            }
        }
        for (field, value) in self.iter() {
            if field != "subject_id" && field != "session_id" {
                push(field, value);
            }
        }
        dir
    }
}

impl std::fmt::Display for Realization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (field, value)) in self.assignments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{field}={value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn realization() -> Realization {
        Realization::new(vec![
            ("atlas_name", "aal".to_owned()),
            ("subject_id", "01".to_owned()),
            ("session_id", "1".to_owned()),
        ])
    }

    #[test]
    fn test_names() {
        let r = realization();
        assert_eq!("_atlas_name_aal_subject_id_01_session_id_1", r.dir_name());
        assert_eq!(PathBuf::from("sub-01/ses-1/atlas-aal"), r.sink_subdir());
        assert_eq!("atlas_name=aal, subject_id=01, session_id=1", r.to_string());
    }

    #[test]
    fn test_project() {
        let r = realization().project(&["atlas_name"]);
        assert_eq!(Some("aal"), r.get("atlas_name"));
        assert_eq!(None, r.get("subject_id"));
        assert_eq!("_atlas_name_aal", r.dir_name());
        assert!(realization().project(&[]).is_empty());
    }
}
