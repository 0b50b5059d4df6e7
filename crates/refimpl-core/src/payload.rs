//! Secret payload assembly
//!
//! A payload is one JSON object handed to a secret store in a single write.
//! Payloads are built completely in memory before any store sees them.

use serde_json::{Map, Value as JsonValue};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::Settings;
use crate::error::{CoreError, Result};

/// Payload aggregating the per-file credential documents
pub const GITHUB_APP_PAYLOAD: &str = "github-app";

/// Payload holding the configuration document
pub const CONFIG_PAYLOAD: &str = "config";

/// Extension of candidate documents in the private directory
pub const DOCUMENT_EXTENSION: &str = "yaml";

/// A named JSON document destined for one or more secret stores
#[derive(Debug, Clone, PartialEq)]
pub struct SecretPayload {
    name: String,
    data: JsonValue,
}

impl SecretPayload {
    /// Wrap an already assembled JSON value
    pub fn new(name: impl Into<String>, data: JsonValue) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Aggregate every `*.<extension>` file directly inside `dir`
    ///
    /// Files are visited in name order. Each becomes a top-level key named
    /// after the file stem, with the document converted to JSON as its value.
    pub fn from_directory<P: AsRef<Path>>(
        name: impl Into<String>,
        dir: P,
        extension: &str,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(CoreError::DirectoryMissing {
                path: dir.display().to_string(),
            });
        }

        let mut entries = Map::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(std::io::Error::from)?;
            let path = entry.path();

            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };

            let content = std::fs::read_to_string(path)?;
            let value: JsonValue =
                serde_yaml::from_str(&content).map_err(|e| CoreError::DocumentParse {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
            entries.insert(stem, value);
        }

        if entries.is_empty() {
            return Err(CoreError::NoInputFiles {
                path: dir.display().to_string(),
                extension: extension.to_string(),
            });
        }

        Ok(Self::new(name, JsonValue::Object(entries)))
    }

    /// The `config` payload: the whole configuration document
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(CONFIG_PAYLOAD, settings.document().clone())
    }

    /// Payload name (used to derive store entry names)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The assembled document
    pub fn data(&self) -> &JsonValue {
        &self.data
    }

    /// Number of top-level keys
    pub fn len(&self) -> usize {
        self.data.as_object().map(Map::len).unwrap_or(0)
    }

    /// Whether the payload has no top-level keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compact JSON encoding of the whole payload
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.data)?)
    }
}
