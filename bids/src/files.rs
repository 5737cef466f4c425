use std::path::{Path, PathBuf};

use anyhow::Result;

use util::PathEncodingError;

use crate::{Error, SESSION_KEY, SUBJECT_KEY};

/// FSL-format gradient table belonging to one DWI volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradientFiles {
    pub bvec: PathBuf,
    pub bval: PathBuf,
}

/// Find the `.bvec`/`.bval` pair beside `dwi`, by swapping out extension `ext`.
/// Both files must exist.
pub fn gradient_files(dwi: &Path, ext: &str) -> Result<GradientFiles> {
    let dwi_str = dwi.to_str().ok_or(PathEncodingError)?;
    let stem = dwi_str
        .strip_suffix(ext)
        .filter(|s| s.ends_with('.'))
        .ok_or_else(|| Error::UnexpectedExtension(dwi_str.to_owned(), ext.to_owned()))?;

    let files = GradientFiles {
        bvec: PathBuf::from(format!("{stem}bvec")),
        bval: PathBuf::from(format!("{stem}bval")),
    };
    if files.bvec.is_file() && files.bval.is_file() {
        log::debug!("Found gradient files for {dwi_str}");
        Ok(files)
    } else {
        Err(Error::MissingGradientFiles(dwi_str.to_owned()).into())
    }
}

/// FreeSurfer subject id for an anatomical image, e.g. `sub-01_ses-1`.
pub fn freesurfer_id(anat: &Path) -> Result<String> {
    let fname = anat
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or(PathEncodingError)?;
    let name =
        syntax::parse_bids_name(fname).map_err(|_| Error::NotBidsName(fname.to_owned()))?;
    let sub = name
        .get(SUBJECT_KEY)
        .ok_or_else(|| Error::MissingEntity(fname.to_owned(), SUBJECT_KEY))?;
    let ses = name
        .get(SESSION_KEY)
        .ok_or_else(|| Error::MissingEntity(fname.to_owned(), SESSION_KEY))?;
    Ok(format!("{SUBJECT_KEY}-{sub}_{SESSION_KEY}-{ses}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_gradient_files() -> Result<()> {
        let dir = tempdir()?;
        let dwi = dir.path().join("sub-01_ses-1_dwi.nii.gz");
        fs::write(&dwi, "")?;
        fs::write(dir.path().join("sub-01_ses-1_dwi.bvec"), "0 1")?;
        fs::write(dir.path().join("sub-01_ses-1_dwi.bval"), "0 1000")?;

        let files = gradient_files(&dwi, "nii.gz")?;
        assert_eq!(dir.path().join("sub-01_ses-1_dwi.bvec"), files.bvec);
        assert_eq!(dir.path().join("sub-01_ses-1_dwi.bval"), files.bval);
        Ok(())
    }

    #[test]
    fn test_missing_gradient_files() -> Result<()> {
        let dir = tempdir()?;
        let dwi = dir.path().join("sub-01_ses-1_dwi.nii.gz");
        fs::write(&dwi, "")?;
        fs::write(dir.path().join("sub-01_ses-1_dwi.bvec"), "0 1")?;

        let err = gradient_files(&dwi, "nii.gz").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::MissingGradientFiles(_))
        ));
        Ok(())
    }

    #[test]
    fn test_wrong_extension() {
        assert!(gradient_files(Path::new("sub-01_dwi.mif"), "nii.gz").is_err());
    }

    #[test]
    fn test_freesurfer_id() -> Result<()> {
        let anat = Path::new("/data/sub-01/ses-1/anat/sub-01_ses-1_T1w.nii.gz");
        assert_eq!("sub-01_ses-1", freesurfer_id(anat)?);
        assert!(freesurfer_id(Path::new("T1w.nii.gz")).is_err());
        Ok(())
    }
}
