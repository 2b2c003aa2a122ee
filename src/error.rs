use crate::fileset::FileSetError;
use crate::manifest::ManifestError;
use crate::package::LoadError;
use crate::scanner::ScanError;
use crate::service::ServiceError;
use thiserror::Error;

/// Anything that aborts a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    FileSet(#[from] FileSetError),
    #[error("loading package {package}: {source}")]
    Load {
        package: String,
        #[source]
        source: LoadError,
    },
    #[error("scanning package {package}: {source}")]
    Scan {
        package: String,
        #[source]
        source: ScanError,
    },
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("encoding model: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
