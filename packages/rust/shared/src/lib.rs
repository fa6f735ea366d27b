//! Shared types, error model, and configuration for the code.json exporter.
//!
//! This crate is the foundation depended on by all other workspace crates.
//! It provides:
//! - [`CodeJsonError`]: the unified error type
//! - Domain types ([`ImportRecord`], [`AppendRecord`], [`ManifestDocument`], [`ReleaseEntry`])
//! - Configuration ([`AppConfig`], [`ExportSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ExportSettings, GitHubConfig, ImportFilterConfig, LicensingConfig,
    OrganizationConfig, SharePointConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, resolve_token, validate_sharepoint,
};
pub use error::{CodeJsonError, Result};
pub use types::{
    AGENCY, AppendRecord, Contact, ImportRecord, License, MANIFEST_VERSION, MEASUREMENT_METHOD,
    ManifestDocument, MeasurementType, Permissions, ReleaseDates, ReleaseEntry, RunId, UsageType,
};
