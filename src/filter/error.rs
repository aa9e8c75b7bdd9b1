use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid column name: {0}")]
    InvalidColumn(String),

    #[error("Invalid relation alias: {0}")]
    InvalidAlias(String),

    #[error("Empty search term")]
    EmptySearchTerm,

    #[error("Invalid limit: {0}")]
    InvalidLimit(String),
}
