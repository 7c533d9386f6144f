//! Per-link HTTP authentication for remote corridor fetches
//!
//! Values may reference environment variables as `${VAR}`; they are resolved
//! at request time so secrets never land in the config file.

use crate::error::{PalaceError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::RequestBuilder;
use serde::{Deserialize, Serialize};

static ENV_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env reference regex"));

/// How to authenticate against a linked workspace URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    /// `Authorization: Bearer <token>`
    Bearer { token: String },
    /// HTTP basic auth
    Basic { username: String, password: String },
    /// Arbitrary header, e.g. `X-Api-Key`
    Header { name: String, value: String },
}

impl AuthConfig {
    /// Attach credentials to a request, resolving `${VAR}` references first
    pub fn apply(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(match self {
            AuthConfig::Bearer { token } => request.bearer_auth(resolve_env(token)?),
            AuthConfig::Basic { username, password } => {
                request.basic_auth(resolve_env(username)?, Some(resolve_env(password)?))
            }
            AuthConfig::Header { name, value } => {
                request.header(resolve_env(name)?, resolve_env(value)?)
            }
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthConfig::Bearer { .. } => "bearer",
            AuthConfig::Basic { .. } => "basic",
            AuthConfig::Header { .. } => "header",
        }
    }
}

/// Substitute every `${VAR}` in `value` from the environment
///
/// A reference to an unset variable is an error rather than an empty string.
pub fn resolve_env(value: &str) -> Result<String> {
    let mut missing = None;
    let resolved = ENV_REF_RE.replace_all(value, |caps: &regex::Captures<'_>| {
        match std::env::var(&caps[1]) {
            Ok(v) => v,
            Err(_) => {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var) => Err(PalaceError::Validation(format!(
            "environment variable '{}' referenced by corridor auth is not set",
            var
        ))),
        None => Ok(resolved.into_owned()),
    }
}
