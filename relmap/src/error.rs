use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelmapError {
    #[error("Duplicate primary key for field: {0}")]
    DuplicatePrimaryKey(String),

    #[error("Primary key not found for model: {0}")]
    MissingPrimaryKey(String),

    #[error("Duplicate field declaration: {0}")]
    DuplicateField(String),

    #[error("Unknown field '{field}' on model {model}")]
    UnknownField { model: String, field: String },

    #[error("Invalid limit value: {0}")]
    InvalidLimit(String),

    #[error("Statement error: {0}")]
    Statement(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),
}

pub type Result<T> = std::result::Result<T, RelmapError>;
