//! Refimpl Core - configuration and payload types for the CNOE reference implementation
//!
//! This crate provides the pieces that never touch a cluster:
//! - `Settings`: the parsed `config.yaml`, immutable for a run
//! - `SecretPayload`: JSON documents assembled for the secret stores

pub mod config;
pub mod error;
pub mod payload;

pub use config::{Distro, K0sSettings, ReadinessSettings, SecretsSettings, Settings};
pub use error::{CoreError, Result};
pub use payload::{CONFIG_PAYLOAD, DOCUMENT_EXTENSION, GITHUB_APP_PAYLOAD, SecretPayload};
