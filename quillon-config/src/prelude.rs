//! # Prelude
//!
//! Convenient access to the commonly used types of the configuration core.

pub use crate::{
    deprecation::{ChangedPath, DeprecationFactory, DeprecationLevel, DeprecationRecord},
    env::{Env, EnvOptions, PackageInfo, SchemaContext},
    error::{Error, Result},
    path::ConfigPath,
    raw::{ConfigLoader, FileConfigSource, RawConfigProvider, RawConfigSource},
    schema::{
        AnySchema, ArraySchema, BooleanSchema, ContextRef, NumberSchema, ObjectSchema, Schema,
        SchemaDefault, StringSchema, Unknowns,
    },
    service::{ConfigService, ConfigSubscription, ValidateOptions},
};

// Re-export commonly used external types
pub use serde_json::{json, Value};
