//! Reading and writing the config document, including `~` expansion, key
//! conversion, and migration.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::keys::{convert_keys_to_camel, convert_keys_to_snake};
use crate::migration::migrate;
use crate::schema::Config;

/// Errors produced while loading or saving the config document.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The document could not be read from or written to disk.
    #[error("config I/O error at {path}: {source}")]
    Io {
        /// Path that was being read or written.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The document was not valid JSON, or did not match [`Config`]'s shape.
    #[error("config at {path} is malformed: {source}")]
    Parse {
        /// Path of the offending document.
        path: PathBuf,
        /// Underlying parse/validation failure.
        #[source]
        source: serde_json::Error,
    },
    /// No `$HOME` could be resolved to compute the default config path.
    #[error("could not resolve a home directory for the default config path")]
    NoHomeDirectory,
}

/// Result alias for loader operations.
pub type LoaderResult<T> = std::result::Result<T, LoaderError>;

/// Returns the default config path, `<HOME>/.nanocrew/config.json`.
///
/// # Errors
///
/// Returns [`LoaderError::NoHomeDirectory`] if the home directory cannot be
/// resolved on this platform.
pub fn config_path() -> LoaderResult<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".nanocrew").join("config.json"))
        .ok_or(LoaderError::NoHomeDirectory)
}

/// Expands a leading `~` or `~/` in `path` to the resolved home directory.
/// Paths without a leading `~` are returned unchanged.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Loads the config document at `path`, applying migration and key
/// conversion.
///
/// # Errors
///
/// Returns [`LoaderError::Parse`] if the document is not valid JSON or does
/// not match [`Config`]'s shape after migration. Does not error when the
/// file is absent; callers that need "defaults if missing" behavior should
/// check [`Path::exists`] themselves (the registry does, to preserve the
/// previous in-memory config on a transient read failure).
pub fn load_config(path: &Path) -> LoaderResult<Config> {
    let raw = std::fs::read_to_string(path).map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|source| LoaderError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    migrate(&mut value);
    let value = convert_keys_to_snake(value);

    serde_json::from_value(value).map_err(|source| LoaderError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Saves `config` to `path` in camelCase form, creating parent directories
/// as needed.
///
/// # Errors
///
/// Returns [`LoaderError::Io`] if the parent directory or file cannot be
/// written, or [`LoaderError::Parse`] if `config` cannot be serialized
/// (never expected in practice since [`Config`] is always constructible).
pub fn save_config(config: &Config, path: &Path) -> LoaderResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| LoaderError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let value = serde_json::to_value(config).map_err(|source| LoaderError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let camel = convert_keys_to_camel(value);
    let rendered = serde_json::to_string_pretty(&camel).map_err(|source| LoaderError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    std::fs::write(path, rendered).map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the document at `path`, falling back to [`Config::default`] (which
/// always carries a `main` entry) when the file does not yet exist.
///
/// Mirrors the donor's `load_config`, which prints a warning and returns a
/// default configuration on a missing or malformed file rather than
/// propagating the error to the caller's startup path.
#[must_use]
pub fn load_config_or_default(path: &Path) -> Config {
    if !path.exists() {
        return Config::default();
    }

    match load_config(path) {
        Ok(config) => config,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to load config, using defaults");
            Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("nanocrew-config-{}-{name}", Uuid::new_v4()));
        path
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let path = scratch_path("roundtrip.json");
        let mut config = Config::default();
        config.agents.bindings.insert("telegram:1".to_owned(), "main".to_owned());

        save_config(&config, &path).unwrap();
        let loaded = load_config(&path).unwrap();

        assert_eq!(loaded.agents.registry.len(), config.agents.registry.len());
        assert_eq!(
            loaded.agents.bindings.get("telegram:1"),
            Some(&"main".to_owned())
        );

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let path = scratch_path("malformed.json");
        std::fs::write(&path, "{ not valid json").unwrap();

        let err = load_config(&path).expect_err("malformed JSON must fail to load");
        assert!(matches!(err, LoaderError::Parse { .. }));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_falls_back_to_default_with_main() {
        let path = scratch_path("missing.json");
        let config = load_config_or_default(&path);
        assert!(config.agents.registry.contains_key("main"));
    }

    #[test]
    fn expand_tilde_resolves_home_prefix() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/foo"), home.join("foo"));
        }
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }
}
