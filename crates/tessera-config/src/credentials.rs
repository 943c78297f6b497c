//! API key resolution.

use std::fmt;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::profile::ConfigFile;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "TESSERA_API_KEY";

/// Environment variable selecting a named profile from the config file.
pub const PROFILE_ENV: &str = "TESSERA_PROFILE";

/// Where a resolved API key came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
  Explicit,
  Environment,
  /// `None` is the top-level default profile.
  Profile(Option<String>),
}

/// Caller-provided inputs to credential resolution.
#[derive(Debug, Clone, Default)]
pub struct CredentialSource {
  /// Explicit API key. Takes precedence over everything else.
  pub api_key: Option<String>,
  /// Named profile in the config file. Falls back to `TESSERA_PROFILE`.
  pub profile: Option<String>,
  /// Config file location. Falls back to `~/.tessera/config.toml`.
  pub config_path: Option<PathBuf>,
}

/// A resolved API key plus the endpoint its profile pins, if any.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
  pub api_key: String,
  pub endpoint: Option<String>,
  pub source: KeySource,
}

impl fmt::Debug for Credentials {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Credentials")
      .field("api_key", &"<redacted>")
      .field("endpoint", &self.endpoint)
      .field("source", &self.source)
      .finish()
  }
}

impl CredentialSource {
  /// Resolve against the process environment.
  pub fn resolve(&self) -> Result<Credentials, ConfigError> {
    self.resolve_with(|key| std::env::var(key).ok())
  }

  /// Resolve using `env` to look up environment variables.
  pub fn resolve_with<F>(&self, env: F) -> Result<Credentials, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    if let Some(api_key) = &self.api_key {
      if api_key.is_empty() {
        return Err(ConfigError::EmptyApiKey);
      }
      return Ok(Credentials {
        api_key: api_key.clone(),
        endpoint: None,
        source: KeySource::Explicit,
      });
    }

    if let Some(api_key) = env(API_KEY_ENV).filter(|k| !k.is_empty()) {
      return Ok(Credentials {
        api_key,
        endpoint: None,
        source: KeySource::Environment,
      });
    }

    let profile_name = self
      .profile
      .clone()
      .or_else(|| env(PROFILE_ENV).filter(|p| !p.is_empty()));

    let path = match &self.config_path {
      Some(path) if !path.is_file() => {
        return Err(ConfigError::ConfigFileNotFound { path: path.clone() });
      }
      Some(path) => path.clone(),
      None => match ConfigFile::default_path() {
        Some(path) => path,
        None if profile_name.is_some() => return Err(ConfigError::NoHomeDirectory),
        None => return Err(ConfigError::MissingApiKey),
      },
    };

    if !path.is_file() {
      return match profile_name {
        Some(name) => Err(ConfigError::ProfileNotFound { name, path }),
        None => Err(ConfigError::MissingApiKey),
      };
    }

    let file = ConfigFile::load(&path)?;
    let profile = file.select(profile_name.as_deref(), &path)?;
    let api_key = profile
      .apikey
      .filter(|k| !k.is_empty())
      .ok_or(ConfigError::MissingApiKey)?;

    Ok(Credentials {
      api_key,
      endpoint: profile.endpoint,
      source: KeySource::Profile(profile_name),
    })
  }
}
