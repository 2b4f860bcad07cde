//! # Quillon Config
//!
//! Typed, reactively-validated configuration core for the Quillon platform.
//!
//! The crate merges raw configuration from multiple sources, applies schema
//! validation with cross-field context, reconciles deprecated settings while
//! rewriting paths, tracks which configuration paths have been consumed
//! versus left dangling, and exposes all of this as a live, re-validating
//! stream over the lifetime of the process.
//!
//! ## Features
//!
//! - **Schema-driven validation**: per-path schemas with defaults, coercion
//!   and context-derived values
//! - **Live value streams**: subscribers receive only genuinely changed
//!   values; a bad value fails one path without disturbing the rest
//! - **Deprecation reconciliation**: renamed/unused/removed settings are
//!   rewritten before validation, with queryable records and warnings
//! - **Usage tracking**: dangling configuration keys are reported instead of
//!   silently ignored
//! - **Multi-source loading**: TOML files, environment overlays and
//!   explicit overrides, with watch-driven reloads
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use quillon_config::{
//!     ConfigService, Env, EnvOptions, PackageInfo, RawConfigSource,
//!     schema::{NumberSchema, ObjectSchema, StringSchema},
//! };
//!
//! fn main() -> quillon_config::Result<()> {
//!     let source = RawConfigSource::new(json!({
//!         "server": { "host": "0.0.0.0", "port": 7878 },
//!     }));
//!     let env = Env::new(
//!         "/opt/quillon",
//!         PackageInfo {
//!             version: "1.0.0".into(),
//!             branch: "main".into(),
//!             build_num: 1,
//!             build_sha: "dev".into(),
//!             dist: false,
//!         },
//!         EnvOptions::default(),
//!     );
//!
//!     let service = ConfigService::new(Arc::new(source.clone()), env);
//!     service.set_schema(
//!         "server",
//!         ObjectSchema::new()
//!             .field("host", StringSchema::new())
//!             .field("port", NumberSchema::new().with_min(1024.0)),
//!     )?;
//!
//!     service.validate()?;
//!     let server = service.at_path_sync("server")?;
//!     assert_eq!(server["port"], json!(7878));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`service`]: the orchestrator tying everything together
//! - [`schema`]: validation schemas with defaults and context references
//! - [`deprecation`]: deprecated-setting reconciliation
//! - [`raw`]: raw trees, sources, loading and file watching
//! - [`registry`] / [`usage`]: per-path bookkeeping
//! - [`env`]: immutable process metadata
//! - [`error`]: error types and result handling

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod deprecation;
pub mod env;
pub mod error;
pub mod path;
pub mod prelude;
pub mod raw;
pub mod registry;
pub mod schema;
pub mod service;
pub mod usage;

// Core re-exports for convenience
pub use crate::{
    deprecation::{ChangedPath, DeprecationLevel, DeprecationRecord},
    env::{Env, EnvOptions, PackageInfo, SchemaContext},
    error::{Error, Result},
    path::ConfigPath,
    raw::{ConfigLoader, FileConfigSource, RawConfigProvider, RawConfigSource},
    schema::Schema,
    service::{ChangedPathsSubscription, ConfigService, ConfigSubscription, ValidateOptions},
};
