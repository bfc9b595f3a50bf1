use std::fmt;

use crate::errors::{CodeAnalysisError, Result};

/// Environment variable holding the graph database URI.
pub const URI_VAR: &str = "GRAPH_URI";

/// Environment variable holding the graph database user name.
pub const USER_VAR: &str = "GRAPH_USER";

/// Environment variable holding the graph database password.
pub const PASSWORD_VAR: &str = "GRAPH_PASSWORD";

/// URI used when `GRAPH_URI` is not set.
pub const DEFAULT_URI: &str = "neo4j://localhost:7687";

/// User used when `GRAPH_USER` is not set.
pub const DEFAULT_USER: &str = "neo4j";

/// Connection settings for the graph database.
#[derive(Clone, PartialEq, Eq)]
pub struct GraphConfig {
    /// Bolt/neo4j URI of the database.
    pub uri: String,
    /// User name for basic authentication.
    pub user: String,
    /// Password for basic authentication.
    pub password: String,
}

impl GraphConfig {
    /// Builds the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// Unset and empty variables are treated alike: the URI and user fall back
    /// to their defaults, while a missing password is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let password = get(PASSWORD_VAR).ok_or_else(|| CodeAnalysisError::Config {
            message: format!("{PASSWORD_VAR} environment variable is required"),
        })?;

        Ok(Self {
            uri: get(URI_VAR).unwrap_or_else(|| DEFAULT_URI.to_string()),
            user: get(USER_VAR).unwrap_or_else(|| DEFAULT_USER.to_string()),
            password,
        })
    }

    /// Replaces the URI and user with explicit overrides, when given.
    pub fn with_overrides(mut self, uri: Option<String>, user: Option<String>) -> Self {
        if let Some(uri) = uri {
            self.uri = uri;
        }
        if let Some(user) = user {
            self.user = user;
        }
        self
    }
}

impl fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphConfig")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}
