/// Check that the neuroimaging toolboxes we call out to are installed and configured.
mod env_check;
pub use env_check::check_environment;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} is not defined; make sure {1} is configured")]
    MissingVar(&'static str, &'static str),
    #[error("{0} points to {1:?}, which is not a directory")]
    NotADirectory(&'static str, std::path::PathBuf),
    #[error("'{0}' not found on PATH; make sure {1} is installed")]
    NotOnPath(&'static str, &'static str),
    #[error("Matlab Compiler Runtime (MCRv80) not found in {0:?}")]
    MissingMcr(std::path::PathBuf),
}
