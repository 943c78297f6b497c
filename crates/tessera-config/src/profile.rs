//! The on-disk config file.
//!
//! ```toml
//! apikey = "default-key"
//! endpoint = "https://api.example.com"
//!
//! [profiles.staging]
//! apikey = "staging-key"
//! endpoint = "https://staging.example.com"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Directory under the home directory holding the config file.
pub const CONFIG_DIR: &str = ".tessera";

/// Config file name.
pub const CONFIG_FILE: &str = "config.toml";

/// A set of credentials in the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub apikey: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub endpoint: Option<String>,
}

/// Parsed config file: a top-level default profile plus named profiles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub apikey: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub endpoint: Option<String>,
  #[serde(default, skip_serializing_if = "HashMap::is_empty")]
  pub profiles: HashMap<String, Profile>,
}

impl ConfigFile {
  /// `~/.tessera/config.toml`.
  pub fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
  }

  /// Read and parse the config file at `path`.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Select a named profile, or the top-level default when `name` is `None`.
  ///
  /// `path` is only used for error reporting.
  pub fn select(&self, name: Option<&str>, path: &Path) -> Result<Profile, ConfigError> {
    match name {
      None => Ok(Profile {
        apikey: self.apikey.clone(),
        endpoint: self.endpoint.clone(),
      }),
      Some(name) => {
        self
          .profiles
          .get(name)
          .cloned()
          .ok_or_else(|| ConfigError::ProfileNotFound {
            name: name.to_string(),
            path: path.to_path_buf(),
          })
      }
    }
  }
}
