//! Request model, service configuration, and revision metadata for pkgexport.
//!
//! This crate defines the schema layer shared by every other crate: the
//! immutable `ExportRequest` describing one run, the TOML-backed
//! `ServiceConfig` with its environment overrides, the `RevisionMeta` record
//! written when a caller asks for revision metadata, and string newtypes for
//! commit identifiers and revision specs.

pub mod config;
pub mod meta;
pub mod request;
pub mod types;

pub use config::{ConfigError, ServiceConfig, DEFAULT_EXPORT_TOOL};
pub use meta::{CommitInfo, RevisionMeta};
pub use request::{
    default_spec_name, parse_exit_codes, ExportRequest, IdentityConfig, RequestError,
    DEFAULT_PACKAGING_DIR, DEFAULT_REVISION,
};
pub use types::{CommitId, RevisionSpec};
