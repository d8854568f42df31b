use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unrecognized category code `{code}` in source data")]
    UnrecognizedCategory { code: i16 },
    #[error("event references author `{key}` missing from the author directory")]
    UnknownAuthor { key: String },
}

impl DomainError {
    pub fn unknown_author(key: impl Into<String>) -> Self {
        Self::UnknownAuthor { key: key.into() }
    }
}
