use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::Result;

use util::PathEncodingError;

use super::Error;

/// Copy `src` to `tgt`, recursively if needed.
/// Symlinks are followed, so the copy holds real data even when
/// a tool left a link to a file in some other node's dir.
pub fn copy(src: &Path, tgt: &Path) -> Result<()> {
    if src.is_file() {
        fs::copy(src, tgt)?;
    } else if src.is_dir() {
        cp_dir(src, tgt)?;
    } else {
        return Err(
            Error::UnknownPathType(src.to_str().ok_or(PathEncodingError)?.to_owned()).into(),
        );
    }
    Ok(())
}

fn cp_dir(src: &Path, tgt: &Path) -> Result<()> {
    fs::create_dir_all(tgt)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_entry = entry.path();
        let tgt_entry = tgt.join(entry.file_name());
        // metadata() follows symlinks, unlike entry.file_type():
        let meta = fs::metadata(&src_entry)?;
        if meta.is_dir() {
            cp_dir(&src_entry, &tgt_entry)?;
        } else if meta.is_file() {
            fs::copy(&src_entry, &tgt_entry)?;
        } else {
            return Err(Error::UnknownPathType(
                src_entry.to_str().ok_or(PathEncodingError)?.to_owned(),
            )
            .into());
        }
    }
    Ok(())
}

/// All existing paths matching `pattern`, where `*` in a path component
/// matches any run of characters within that component. Sorted.
pub fn expand_wildcards(pattern: &Path) -> Result<Vec<PathBuf>> {
    let mut found = vec![PathBuf::new()];
    for component in pattern.components() {
        let Component::Normal(part) = component else {
            for path in &mut found {
                path.push(component);
            }
            continue;
        };
        let part = part.to_str().ok_or(PathEncodingError)?;
        let mut next = Vec::with_capacity(found.len());
        if !part.contains('*') {
            for mut path in found {
                path.push(part);
                next.push(path);
            }
        } else {
            for path in found {
                let dir = if path.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    path.as_path()
                };
                let Ok(entries) = fs::read_dir(dir) else {
                    continue;
                };
                for entry in entries {
                    let entry = entry?;
                    let fname = entry.file_name();
                    let Some(fname) = fname.to_str() else {
                        continue;
                    };
                    if wildcard_match(part, fname) {
                        next.push(path.join(fname));
                    }
                }
            }
        }
        found = next;
    }
    found.retain(|p| p.exists());
    found.sort();
    Ok(found)
}

/// Match `name` against `pattern`, where each `*` matches any (possibly empty) run of characters.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let mut pieces = pattern.split('*');
    let Some(first) = pieces.next() else {
        return name.is_empty();
    };
    let Some(mut rest) = name.strip_prefix(first) else {
        return false;
    };
    let pieces: Vec<&str> = pieces.collect();
    let Some((last, middle)) = pieces.split_last() else {
        // no wildcard at all:
        return rest.is_empty();
    };
    for piece in middle {
        match rest.find(piece) {
            Some(i) => rest = &rest[i + piece.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_copy_file() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("dwi_denoised.mif");
        fs::write(&src, "denoised")?;

        let tgt = dir.path().join("copy.mif");
        copy(&src, &tgt)?;

        assert!(tgt.exists());
        assert_eq!(fs::read_to_string(&tgt)?, "denoised");
        Ok(())
    }

    #[test]
    fn test_copy_dir_follows_links() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("recon_all/sub-01_ses-1");
        fs::create_dir_all(src.join("mri"))?;
        let brain = src.join("mri/brain.mgz");
        fs::write(&brain, "brain")?;

        #[cfg(unix)]
        std::os::unix::fs::symlink(&brain, src.join("brain_link.mgz"))?;

        let tgt = dir.path().join("sink/sub-01_ses-1");
        copy(&src, &tgt)?;

        assert!(tgt.join("mri").is_dir());
        assert_eq!(fs::read_to_string(tgt.join("mri/brain.mgz"))?, "brain");
        #[cfg(unix)]
        {
            let link = tgt.join("brain_link.mgz");
            assert!(!link.is_symlink());
            assert_eq!(fs::read_to_string(link)?, "brain");
        }
        Ok(())
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*_dwi.nii.gz", "sub-01_ses-1_dwi.nii.gz"));
        assert!(wildcard_match("*ap*_dwi.nii.gz", "sub-01_ses-1_ap_dwi.nii.gz"));
        assert!(!wildcard_match("*ap*_dwi.nii.gz", "sub-01_ses-1_pa_dwi.nii.gz"));
        assert!(wildcard_match("anat", "anat"));
        assert!(!wildcard_match("anat", "anat2"));
        assert!(wildcard_match("*", ""));
        assert!(!wildcard_match("a*a", "a"));
    }

    #[test]
    fn test_expand_wildcards() -> Result<()> {
        let dir = tempdir()?;
        let dwi = dir.path().join("sub-01/ses-1/dwi");
        fs::create_dir_all(&dwi)?;
        fs::write(dwi.join("sub-01_ses-1_dwi.nii.gz"), "")?;
        fs::write(dwi.join("sub-01_ses-1_dwi.bval"), "")?;

        let found = expand_wildcards(&dir.path().join("sub-01/ses-*/dwi/*_dwi.nii.gz"))?;
        assert_eq!(vec![dwi.join("sub-01_ses-1_dwi.nii.gz")], found);

        let none = expand_wildcards(&dir.path().join("sub-02/ses-1/dwi/*_dwi.nii.gz"))?;
        assert!(none.is_empty());
        Ok(())
    }
}
