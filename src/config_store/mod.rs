//! Reads and writes the JSON build configuration file.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

use crate::config::BuildConfig;

/// Errors raised while reading or writing the build configuration.
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the file is not valid build configuration JSON.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the path cannot name a configuration file.
    #[error("invalid configuration path {path}: {message}")]
    InvalidPath {
        /// Offending path.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Build configuration stored at a fixed path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildConfigStore {
    path: Utf8PathBuf,
}

impl BuildConfigStore {
    /// Creates a store for the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the configuration file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns `true` when the configuration file exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::Io`] when the parent directory cannot be
    /// inspected.
    pub fn exists(&self) -> Result<bool, ConfigStoreError> {
        path_exists(&self.path)
    }

    /// Loads the configuration, applying defaults and resolving relative
    /// provisioning directories against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError`] when the file cannot be read or parsed.
    pub fn load(&self) -> Result<BuildConfig, ConfigStoreError> {
        let contents = read_config(&self.path)?;
        let mut config = serde_json::from_str::<BuildConfig>(&contents)
            .map_err(|err| ConfigStoreError::Parse {
                path: self.path.clone(),
                message: err.to_string(),
            })?
            .with_defaults();
        if let Some(plan) = config.provisioning.as_mut() {
            plan.rebase(parent_of(&self.path));
        }
        Ok(config)
    }

    /// Writes the configuration as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError`] when serialisation or the write fails.
    pub fn save(&self, config: &BuildConfig) -> Result<(), ConfigStoreError> {
        let mut rendered =
            serde_json::to_string_pretty(config).map_err(|err| ConfigStoreError::Parse {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
        rendered.push('\n');
        write_config(&self.path, &rendered)
    }
}

fn parent_of(path: &Utf8Path) -> &Utf8Path {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    }
}

fn file_name_of(path: &Utf8Path) -> Result<&str, ConfigStoreError> {
    path.file_name()
        .ok_or_else(|| ConfigStoreError::InvalidPath {
            path: path.to_path_buf(),
            message: String::from("configuration file path is missing a filename"),
        })
}

fn path_exists(path: &Utf8Path) -> Result<bool, ConfigStoreError> {
    let parent = parent_of(path);
    let file_name = file_name_of(path)?;

    match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir
            .try_exists(file_name)
            .map_err(|err| ConfigStoreError::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(ConfigStoreError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

fn read_config(path: &Utf8Path) -> Result<String, ConfigStoreError> {
    let parent = parent_of(path);
    let file_name = file_name_of(path)?;

    let dir =
        Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| ConfigStoreError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        })?;

    dir.read_to_string(file_name)
        .map_err(|err| ConfigStoreError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

fn write_config(path: &Utf8Path, rendered: &str) -> Result<(), ConfigStoreError> {
    let parent = parent_of(path);
    Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|err| {
        ConfigStoreError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        }
    })?;

    let file_name = file_name_of(path)?;
    let dir =
        Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| ConfigStoreError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        })?;

    dir.write(file_name, rendered)
        .map_err(|err| ConfigStoreError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests;
