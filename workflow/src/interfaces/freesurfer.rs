//! FreeSurfer commands.

use crate::{InputSlot, NodeDecl, OutputSlot};

/// `recon-all` cortical reconstruction of one subject.
pub fn recon_all(name: &'static str) -> NodeDecl {
    let mut decl = NodeDecl::command(
        name,
        "recon-all",
        vec![
            InputSlot::string("subject_id", "-subjid %s").mandatory(),
            InputSlot::file("T1_files", "-i %s").mandatory().exists(),
            InputSlot::string("directive", "-%s").at(0),
            InputSlot::file("subjects_dir", "-sd %s"),
            InputSlot::int("openmp", "-openmp %d"),
            InputSlot::string("args", "%s").at(-1).raw(),
        ],
        vec![OutputSlot::from_input("subjects_dir", "subjects_dir")],
    );
    decl.values.insert("directive", "all".into());
    decl.values.insert("subjects_dir", ".".into());
    decl
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::render::render;
    use crate::Value;
    use anyhow::Result;
    use std::path::Path;

    #[test]
    fn test_recon_all() -> Result<()> {
        let mut decl = recon_all("recon_all");
        decl.set("openmp", 4)?;
        let mut values = decl.values.clone();
        values.insert("subject_id", Value::str("sub-01_ses-1"));
        values.insert("T1_files", Value::file("/w/acpc_t1.nii"));
        let cmd = render(&decl, &values, Path::new("/w/recon_all"))?;
        assert_eq!(
            "recon-all -all -subjid sub-01_ses-1 -i /w/acpc_t1.nii -sd . -openmp 4",
            cmd.to_string()
        );
        Ok(())
    }
}
