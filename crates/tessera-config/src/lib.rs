//! Tessera Config
//!
//! Resolves the API key (and optional endpoint) a client authenticates with.
//! Resolution order is:
//! - an explicit key passed by the caller
//! - the `TESSERA_API_KEY` environment variable
//! - a profile in the TOML config file (`~/.tessera/config.toml` by default)
//!
//! Failing every level is a [`ConfigError`] raised when the client is built,
//! never at request time.

mod credentials;
mod error;
mod profile;

pub use credentials::{API_KEY_ENV, CredentialSource, Credentials, KeySource, PROFILE_ENV};
pub use error::ConfigError;
pub use profile::{CONFIG_DIR, CONFIG_FILE, ConfigFile, Profile};
