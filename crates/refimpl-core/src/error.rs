//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("File not found: {path}")]
    MissingFile { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse {path}: {message}")]
    DocumentParse { path: String, message: String },

    #[error("Failed to encode JSON: {0}")]
    JsonEncode(#[from] serde_json::Error),

    #[error("Secrets directory not found: {path}")]
    DirectoryMissing { path: String },

    #[error("No *.{extension} files found in {path}")]
    NoInputFiles { path: String, extension: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Whether this error came from the secret input data rather than the config
    pub fn is_input_data(&self) -> bool {
        matches!(
            self,
            CoreError::DirectoryMissing { .. }
                | CoreError::NoInputFiles { .. }
                | CoreError::DocumentParse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
