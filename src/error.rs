//! Errors raised by the extractors.

use std::path::PathBuf;

/// Failure to read one of the app's databases.
///
/// Extractors return this only when an existing store cannot be read at
/// all. Missing stores and malformed individual records are not errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Failed to open database {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Query failed on {path:?}: {source}")]
    Query {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
}

impl ExtractError {
    pub(crate) fn query(path: &std::path::Path) -> impl FnOnce(rusqlite::Error) -> Self + '_ {
        move |source| ExtractError::Query {
            path: path.to_path_buf(),
            source,
        }
    }
}
