/// Error taxonomy shared by every store

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Category, sub-category, parent category or project name collision
    #[error("a {kind} named \"{name}\" already exists")]
    DuplicateName { kind: &'static str, name: String },

    /// Unknown project, group, parent category or category
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Rejected input; raised before anything is written
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    /// The key-value store itself failed
    #[error("storage failure: {0}")]
    Storage(String),

    #[error("failed to decode {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Error::DuplicateName {
            kind,
            name: name.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn is_duplicate_name(&self) -> bool {
        matches!(self, Error::DuplicateName { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
