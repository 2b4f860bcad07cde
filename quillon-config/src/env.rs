//! Process environment metadata.
//!
//! [`Env`] is a process-wide, read-only record of where the platform is
//! installed and what build is running. It is constructed once at startup,
//! never mutated, and shared by reference across all components. Schemas may
//! reference pieces of it as context-derived defaults (see
//! [`SchemaContext`]).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Package metadata for the running build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Release version, e.g. `"8.0.0"`.
    pub version: String,
    /// VCS branch the build was produced from.
    pub branch: String,
    /// Monotonic build number.
    pub build_num: u64,
    /// VCS revision the build was produced from.
    pub build_sha: String,
    /// Whether this is a distributable (release) build.
    pub dist: bool,
}

/// CLI-derived startup options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOptions {
    /// Run in development mode.
    pub dev: bool,
    /// Start an interactive REPL instead of the server.
    pub repl: bool,
}

/// Whether the process runs in development or production mode.
///
/// Derived from [`EnvOptions`]; the two flags are always complementary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentMode {
    /// Development mode.
    pub dev: bool,
    /// Production mode.
    pub prod: bool,
}

/// Process-wide, read-only environment record.
///
/// Constructed once at startup and safe to share by reference for the
/// process lifetime.
#[derive(Debug, Clone)]
pub struct Env {
    home_dir: PathBuf,
    package_info: PackageInfo,
    options: EnvOptions,
    mode: EnvironmentMode,
}

impl Env {
    /// Create the environment record.
    ///
    /// `home_dir` is the platform installation directory; `package_info`
    /// comes from build metadata; `options` from the command line.
    pub fn new(home_dir: impl Into<PathBuf>, package_info: PackageInfo, options: EnvOptions) -> Self {
        let mode = EnvironmentMode { dev: options.dev, prod: !options.dev };
        Self { home_dir: home_dir.into(), package_info, options, mode }
    }

    /// The platform installation directory.
    #[must_use]
    pub fn home_dir(&self) -> &Path {
        &self.home_dir
    }

    /// Build metadata of the running process.
    #[must_use]
    pub fn package_info(&self) -> &PackageInfo {
        &self.package_info
    }

    /// CLI-derived startup options.
    #[must_use]
    pub fn options(&self) -> &EnvOptions {
        &self.options
    }

    /// Dev/prod mode of the process.
    #[must_use]
    pub fn mode(&self) -> EnvironmentMode {
        self.mode
    }

    /// Derive the fixed context record passed into every schema validation.
    #[must_use]
    pub fn schema_context(&self) -> SchemaContext {
        SchemaContext {
            branch: self.package_info.branch.clone(),
            version: self.package_info.version.clone(),
            build_num: self.package_info.build_num,
            build_sha: self.package_info.build_sha.clone(),
            dev: self.mode.dev,
            prod: self.mode.prod,
        }
    }
}

/// Fixed per-process metadata injectable as schema defaults.
///
/// Immutable for the process lifetime; every validation call receives the
/// same record.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaContext {
    /// VCS branch of the build.
    pub branch: String,
    /// Release version.
    pub version: String,
    /// Monotonic build number.
    pub build_num: u64,
    /// VCS revision of the build.
    pub build_sha: String,
    /// Development mode flag.
    pub dev: bool,
    /// Production mode flag.
    pub prod: bool,
}
