//! Solver configuration loading.
//!
//! Provides format detection (RON/JSON/TOML), file discovery, and
//! deserialization helpers, plus the entry points hosts use to build a
//! [`SolverConfig`] from a file, a directory, or the environment.

use serde::de::DeserializeOwned;
use std::env;
use std::path::{Path, PathBuf};

use substation_core::config::SolverConfig;

/// Environment variable naming a solver config file.
pub const CONFIG_ENV_VAR: &str = "SUBSTATION_CONFIG";

/// Base name of the solver config file inside a config directory.
pub const SOLVER_CONFIG_NAME: &str = "solver";

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// The file parsed but holds values the solver cannot use.
    #[error("invalid {field} in {file}: {detail}")]
    Invalid {
        file: PathBuf,
        field: &'static str,
        detail: String,
    },

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported config file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, ConfigError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ron") => Ok(Format::Ron),
        Some("toml") => Ok(Format::Toml),
        Some("json") => Ok(Format::Json),
        _ => Err(ConfigError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Scan a directory for a config file with the given base name.
///
/// Looks for `{base_name}.ron`, `{base_name}.toml`, and `{base_name}.json`.
/// Returns `Ok(None)` if no file is found, or `Err(ConflictingFormats)` if
/// more than one format exists.
pub fn find_config_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, ConfigError> {
    let mut found: Option<PathBuf> = None;

    for ext in ["ron", "toml", "json"] {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if candidate.exists() {
            if let Some(existing) = found {
                return Err(ConfigError::ConflictingFormats {
                    a: existing,
                    b: candidate,
                });
            }
            found = Some(candidate);
        }
    }

    Ok(found)
}

// ===========================================================================
// Deserialization
// ===========================================================================

/// Read a file and deserialize it according to its extension.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    let parse_error = |detail: String| ConfigError::Parse {
        file: path.to_path_buf(),
        detail,
    };

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(e.to_string())),
    }
}

fn check_solver_config(path: &Path, config: &SolverConfig) -> Result<(), ConfigError> {
    if config.parallelism == 0 {
        return Err(ConfigError::Invalid {
            file: path.to_path_buf(),
            field: "parallelism",
            detail: "must be at least 1".to_string(),
        });
    }
    if !(config.ramp_snap_threshold.is_finite() && config.ramp_snap_threshold >= 0.0) {
        return Err(ConfigError::Invalid {
            file: path.to_path_buf(),
            field: "ramp_snap_threshold",
            detail: format!(
                "{} is not a finite non-negative number",
                config.ramp_snap_threshold
            ),
        });
    }
    Ok(())
}

// ===========================================================================
// Solver config entry points
// ===========================================================================

/// Load a solver config from a single file. Missing keys take their
/// defaults.
pub fn load_solver_config(path: &Path) -> Result<SolverConfig, ConfigError> {
    let config: SolverConfig = deserialize_file(path)?;
    check_solver_config(path, &config)?;
    tracing::info!(
        target: "substation::config",
        path = %path.display(),
        parallelism = config.parallelism,
        "solver_config.loaded=file"
    );
    Ok(config)
}

/// Load `solver.{ron,toml,json}` from `dir`, or the defaults if the
/// directory has none.
pub fn load_solver_config_from_dir(dir: &Path) -> Result<SolverConfig, ConfigError> {
    match find_config_file(dir, SOLVER_CONFIG_NAME)? {
        Some(path) => load_solver_config(&path),
        None => {
            tracing::info!(
                target: "substation::config",
                dir = %dir.display(),
                "solver_config.loaded=default"
            );
            Ok(SolverConfig::default())
        }
    }
}

/// Load the solver config named by `SUBSTATION_CONFIG`. Never fails: an
/// unset variable or an unreadable file yields the defaults.
pub fn load_solver_config_from_env() -> SolverConfig {
    let override_path = env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from);
    load_solver_config_or_default(override_path.as_deref())
}

/// Load from `path` if given, falling back to the defaults on any error.
pub fn load_solver_config_or_default(path: Option<&Path>) -> SolverConfig {
    if let Some(path) = path {
        match load_solver_config(path) {
            Ok(config) => return config,
            Err(err) => {
                tracing::warn!(
                    target: "substation::config",
                    path = %path.display(),
                    error = %err,
                    "solver_config.load_failed"
                );
            }
        }
    }

    tracing::info!(target: "substation::config", "solver_config.loaded=default");
    SolverConfig::default()
}

// ===========================================================================
// Tests
// ===========================================================================
