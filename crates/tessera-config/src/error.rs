use std::path::PathBuf;

use thiserror::Error;

use crate::credentials::API_KEY_ENV;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error(
    "no API key provided: pass one explicitly, set {API_KEY_ENV}, or add `apikey` to the config file"
  )]
  MissingApiKey,

  #[error("API key must not be empty")]
  EmptyApiKey,

  #[error("profile '{name}' not found in {}", .path.display())]
  ProfileNotFound { name: String, path: PathBuf },

  #[error("config file not found: {}", .path.display())]
  ConfigFileNotFound { path: PathBuf },

  #[error("could not determine home directory")]
  NoHomeDirectory,

  #[error("failed to read config file {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config file {}: {source}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
}
