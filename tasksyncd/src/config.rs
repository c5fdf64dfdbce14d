//! Server configuration.
//!
//! The grammar is `name=value` per line. `#` starts a trailing comment,
//! blank lines are ignored, and `include <absolute-path>` loads another file
//! in place, at most ten levels deep.

use std::{collections::BTreeMap, fs, io, path::Path};

use thiserror::Error;

const MAX_NESTING: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read configuration file '{path}': {source}")]
    Unreadable { path: String, source: io::Error },
    #[error("Configuration file nested to more than 10 levels deep - this has to be a mistake.")]
    NestedTooDeep,
    #[error("Can only include files with absolute paths, not '{0}'")]
    RelativeInclude(String),
    #[error("Malformed entry '{0}' in config file.")]
    MalformedEntry(String),
}

/// A loaded configuration: a flat name/value map.
#[derive(Clone, Debug, Default)]
pub struct Config {
    values: BTreeMap<String, String>,
}

impl Config {
    pub fn load(file: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.load_nested(file, 1)?;
        Ok(config)
    }

    fn load_nested(&mut self, file: &Path, nest: usize) -> Result<(), ConfigError> {
        if nest > MAX_NESTING {
            return Err(ConfigError::NestedTooDeep);
        }

        let contents = fs::read_to_string(file).map_err(|source| ConfigError::Unreadable {
            path: file.display().to_string(),
            source,
        })?;

        self.parse(&contents, nest)
    }

    fn parse(&mut self, input: &str, nest: usize) -> Result<(), ConfigError> {
        for line in input.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            if let Some((name, value)) = line.split_once('=') {
                self.values
                    .insert(name.trim().to_string(), value.trim().to_string());
            } else if let Some(path) = line.strip_prefix("include ") {
                let path = Path::new(path.trim());
                if !path.is_absolute() {
                    return Err(ConfigError::RelativeInclude(path.display().to_string()));
                }
                self.load_nested(path, nest + 1)?;
            } else {
                return Err(ConfigError::MalformedEntry(line.to_string()));
            }
        }

        Ok(())
    }

    /// A value, with absence read as the empty string.
    pub fn get(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    /// A numeric value; absent or unparseable is 0.
    pub fn get_integer(&self, name: &str) -> i64 {
        self.get(name).parse().unwrap_or(0)
    }

    /// A numeric value with a default for absence.
    pub fn get_integer_or(&self, name: &str, default: i64) -> i64 {
        if self.values.contains_key(name) {
            self.get_integer(name)
        } else {
            default
        }
    }

    pub fn get_boolean(&self, name: &str) -> bool {
        matches!(
            self.get(name).to_ascii_lowercase().as_str(),
            "true" | "1" | "y" | "yes" | "on"
        )
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }
}
