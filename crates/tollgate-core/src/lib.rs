//! # Tollgate Core
//!
//! Core types, configuration, and storage for Tollgate.
//!
//! This crate provides:
//! - The role/action access model and its permission rule set
//! - Configuration loading and validation (JSON5 format)
//! - Signing secret handling with redaction and zeroize-on-drop
//! - Input validation for usernames, passwords and collection names
//! - Record storage for the generic resource collections

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod access;
pub mod config;
pub mod records;
pub mod secrets;
pub mod validation;

pub use access::{Action, Role};
pub use config::{AuthConfig, Config, ConfigError};
pub use records::{RecordStore, RecordStoreError};
pub use secrets::{SecretError, SigningSecret};
pub use validation::ValidationError;
