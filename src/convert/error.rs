use std::path::PathBuf;

use thiserror::Error;

use crate::convert::yaml_edit::EditError;
use crate::locator::error::LocateError;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed YAML in {path:?}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to edit {path:?}: {source}")]
    Edit {
        path: PathBuf,
        #[source]
        source: EditError,
    },

    #[error("Failed to walk element directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// A lookup failure for an element that did not use a tarball before
    #[error("Could not find site for {module}: {source}")]
    Unresolvable {
        module: String,
        #[source]
        source: LocateError,
    },

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error("Module {0} missing from BuildStream projects")]
    MissingFromProject(String),

    #[error("{0:?} is not a valid {1} document")]
    UnexpectedLayout(PathBuf, &'static str),
}

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| ConvertError::Io { path, source }
    }

    pub(crate) fn yaml(path: impl Into<PathBuf>) -> impl FnOnce(serde_yaml::Error) -> Self {
        let path = path.into();
        move |source| ConvertError::Yaml { path, source }
    }

    pub(crate) fn edit(path: impl Into<PathBuf>) -> impl FnOnce(EditError) -> Self {
        let path = path.into();
        move |source| ConvertError::Edit { path, source }
    }
}
