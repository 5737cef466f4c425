//! Everything pipetography needs to know about a BIDS dataset on disk:
//! which subject/session pairs exist, the acquisition metadata stored in
//! JSON sidecars, and the companion files that sit beside each image.

mod layout;
pub use layout::{filter_sessions, Layout, SessionKey, SessionList};

mod metadata;
pub use metadata::{read_metadata, AcquisitionMetadata, DEFAULT_TOTAL_READOUT_TIME};

mod files;
pub use files::{freesurfer_id, gradient_files, GradientFiles};

/// Prefix of subject directories and entities, e.g. `sub-01`.
pub const SUBJECT_KEY: &str = "sub";
/// Prefix of session directories and entities, e.g. `ses-1`.
pub const SESSION_KEY: &str = "ses";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("BIDS directory not found: {0}")]
    DatasetNotFound(String),
    #[error("Gradient files missing for {0}")]
    MissingGradientFiles(String),
    #[error("Expected '{0}' to end with extension '.{1}'")]
    UnexpectedExtension(String, String),
    #[error("Not a BIDS file name: '{0}'")]
    NotBidsName(String),
    #[error("Missing '{1}' entity in file name '{0}'")]
    MissingEntity(String, &'static str),
    #[error("Invalid session key '{0}' (should be formatted 'SUBJECT.SESSION')")]
    InvalidSessionKey(String),
    #[error("Sidecar '{0}' does not contain a JSON object")]
    SidecarNotObject(String),
}
