use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

use util::PathEncodingError;

use crate::Error;

/// Readout time used when a sidecar doesn't provide one.
pub const DEFAULT_TOTAL_READOUT_TIME: f64 = 0.1;

/// Acquisition parameters needed by eddy-current correction.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionMetadata {
    pub total_readout_time: f64,
    pub phase_encoding_direction: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Sidecar {
    #[serde(rename = "TotalReadoutTime")]
    total_readout_time: Option<f64>,
    #[serde(rename = "PhaseEncodingDirection")]
    phase_encoding_direction: Option<String>,
}

/// Look up acquisition metadata for the image at `path`.
///
/// Sidecars are merged according to BIDS inheritance: every JSON file between
/// `root` and the image's directory with the same suffix and a subset of the
/// image's entities applies, with more specific sidecars overriding less specific ones.
/// Absent values are not an error: the readout time falls back to
/// [`DEFAULT_TOTAL_READOUT_TIME`] and the phase-encoding direction is `None`.
pub fn read_metadata(path: &Path, root: &Path) -> Result<AcquisitionMetadata> {
    let mut merged = Map::new();
    for sidecar in applicable_sidecars(path, root)? {
        log::debug!("Reading sidecar {sidecar:?}");
        let text = fs::read_to_string(&sidecar)
            .with_context(|| format!("while reading sidecar {sidecar:?}"))?;
        let json: Value = serde_json::from_str(&text)
            .with_context(|| format!("while parsing sidecar {sidecar:?}"))?;
        match json {
            Value::Object(obj) => merged.extend(obj),
            _ => {
                let sidecar = sidecar.to_str().ok_or(PathEncodingError)?;
                return Err(Error::SidecarNotObject(sidecar.to_owned()).into());
            }
        }
    }

    let sidecar: Sidecar = serde_json::from_value(Value::Object(merged))
        .with_context(|| format!("while reading metadata for {path:?}"))?;

    let total_readout_time = match sidecar.total_readout_time {
        Some(t) => t,
        None => {
            log::warn!(
                "No TotalReadoutTime in sidecar metadata for {path:?}; using default {DEFAULT_TOTAL_READOUT_TIME}"
            );
            DEFAULT_TOTAL_READOUT_TIME
        }
    };
    if sidecar.phase_encoding_direction.is_none() {
        log::warn!(
            "No PhaseEncodingDirection in sidecar metadata for {path:?}! Please add it to all DWI JSON files"
        );
    }

    Ok(AcquisitionMetadata {
        total_readout_time,
        phase_encoding_direction: sidecar.phase_encoding_direction,
    })
}

/// Sidecars that apply to `path`, least specific first.
fn applicable_sidecars(path: &Path, root: &Path) -> Result<Vec<PathBuf>> {
    let fname = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or(PathEncodingError)?;
    let target = syntax::parse_bids_name(fname)
        .map_err(|_| Error::NotBidsName(fname.to_owned()))?;

    // directories from root down to the image's own dir:
    let parent = path.parent().unwrap_or(Path::new(""));
    let mut dirs: Vec<&Path> = parent.ancestors().take_while(|d| d.starts_with(root)).collect();
    if dirs.is_empty() {
        dirs.push(parent);
    }
    dirs.reverse();

    let mut found = Vec::new();
    for (depth, dir) in dirs.into_iter().enumerate() {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        for entry in entries {
            let entry = entry?;
            let entry_path = entry.path();
            let Some(name) = entry_path.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            let Ok(candidate) = syntax::parse_bids_name(name) else {
                continue;
            };
            let applies = candidate.extension == Some("json")
                && candidate.suffix == target.suffix
                && candidate.entities_subset_of(&target)
                && candidate.labels.iter().all(|l| target.labels.contains(l));
            if applies {
                found.push((depth, candidate.entities.len(), entry_path.clone()));
            }
        }
    }
    found.sort();
    Ok(found.into_iter().map(|(_, _, p)| p).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn dwi_dir(root: &Path) -> Result<PathBuf> {
        let dir = root.join("sub-01/ses-1/dwi");
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    #[test]
    fn test_complete_sidecar() -> Result<()> {
        let root = tempdir()?;
        let dir = dwi_dir(root.path())?;
        let dwi = dir.join("sub-01_ses-1_dwi.nii.gz");
        fs::write(
            dir.join("sub-01_ses-1_dwi.json"),
            r#"{"TotalReadoutTime": 0.0542, "PhaseEncodingDirection": "j-"}"#,
        )?;

        let meta = read_metadata(&dwi, root.path())?;
        assert_eq!(0.0542, meta.total_readout_time);
        assert_eq!(Some("j-".to_owned()), meta.phase_encoding_direction);
        Ok(())
    }

    #[test]
    fn test_default_readout_time() -> Result<()> {
        let root = tempdir()?;
        let dir = dwi_dir(root.path())?;
        let dwi = dir.join("sub-01_ses-1_dwi.nii.gz");
        fs::write(dir.join("sub-01_ses-1_dwi.json"), r#"{"PhaseEncodingDirection": "j"}"#)?;

        let meta = read_metadata(&dwi, root.path())?;
        assert_eq!(DEFAULT_TOTAL_READOUT_TIME, meta.total_readout_time);
        assert_eq!(0.1, meta.total_readout_time);
        Ok(())
    }

    #[test]
    fn test_missing_phase_encoding_direction() -> Result<()> {
        let root = tempdir()?;
        let dir = dwi_dir(root.path())?;
        let dwi = dir.join("sub-01_ses-1_dwi.nii.gz");
        fs::write(dir.join("sub-01_ses-1_dwi.json"), r#"{"TotalReadoutTime": 0.05}"#)?;

        let meta = read_metadata(&dwi, root.path())?;
        assert_eq!(None, meta.phase_encoding_direction);
        Ok(())
    }

    #[test]
    fn test_no_sidecar_at_all() -> Result<()> {
        let root = tempdir()?;
        let dir = dwi_dir(root.path())?;
        let meta = read_metadata(&dir.join("sub-01_ses-1_dwi.nii.gz"), root.path())?;
        assert_eq!(0.1, meta.total_readout_time);
        assert_eq!(None, meta.phase_encoding_direction);
        Ok(())
    }

    #[test]
    fn test_inheritance() -> Result<()> {
        let root = tempdir()?;
        let dir = dwi_dir(root.path())?;
        let dwi = dir.join("sub-01_ses-1_dwi.nii.gz");
        // dataset-level default, overridden per file:
        fs::write(
            root.path().join("dwi.json"),
            r#"{"TotalReadoutTime": 0.07, "PhaseEncodingDirection": "j-"}"#,
        )?;
        fs::write(dir.join("sub-01_ses-1_dwi.json"), r#"{"TotalReadoutTime": 0.05}"#)?;
        // doesn't apply: different session.
        fs::write(
            root.path().join("sub-01/ses-2_dwi.json"),
            r#"{"PhaseEncodingDirection": "i"}"#,
        )?;

        let meta = read_metadata(&dwi, root.path())?;
        assert_eq!(0.05, meta.total_readout_time);
        assert_eq!(Some("j-".to_owned()), meta.phase_encoding_direction);
        Ok(())
    }

    #[test]
    fn test_malformed_sidecar() -> Result<()> {
        let root = tempdir()?;
        let dir = dwi_dir(root.path())?;
        fs::write(dir.join("sub-01_ses-1_dwi.json"), "{ not json")?;
        assert!(read_metadata(&dir.join("sub-01_ses-1_dwi.nii.gz"), root.path()).is_err());
        Ok(())
    }
}
