//! Error types for the Quillon configuration core.

use crate::path::ConfigPath;
use thiserror::Error;

/// Main error type for configuration operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A schema was registered twice for the same path. This is a programmer
    /// error and is never recovered from.
    #[error("Validation schema for [{path}] was already registered.")]
    SchemaAlreadyRegistered {
        /// The path of the duplicate registration.
        path: ConfigPath,
    },

    /// A value was requested for a path that has no registered schema.
    #[error("No validation schema has been defined for [{path}]")]
    SchemaMissing {
        /// The unregistered path.
        path: ConfigPath,
    },

    /// The raw value at a path does not satisfy its schema.
    #[error("[config validation of [{path}]]: {detail}")]
    Validation {
        /// The path whose subtree failed validation.
        path: ConfigPath,
        /// Schema-level detail, including the offending key where known.
        detail: String,
    },

    /// A synchronous accessor was used before the first validation pass.
    #[error("`at_path_sync` called before config was validated")]
    NotYetValidated,

    /// A raw configuration source failed to load or watch.
    #[error("Configuration source error: {message}")]
    Source {
        /// Human-readable description of the source failure.
        message: String,
    },
}

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_stable() {
        let err = Error::SchemaAlreadyRegistered { path: ConfigPath::from("key") };
        assert_eq!(err.to_string(), "Validation schema for [key] was already registered.");

        let err = Error::SchemaMissing { path: ConfigPath::from("key") };
        assert_eq!(err.to_string(), "No validation schema has been defined for [key]");

        let err = Error::Validation {
            path: ConfigPath::from("key"),
            detail: "expected value of type [string] but got [number]".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "[config validation of [key]]: expected value of type [string] but got [number]"
        );

        let err = Error::NotYetValidated;
        assert_eq!(err.to_string(), "`at_path_sync` called before config was validated");
    }
}
