//! Configuration for the sign-in orchestrator
//!
//! Values can come from a TOML string, a TOML file, environment variables, or
//! a file layered under the environment:
//!
//! ```toml
//! default_handler = "graph"
//! auto_sign_in = true
//!
//! [logging]
//! filter = "synapsed_signin=debug"
//! ```
//!
//! With the prefix `SYNAPSED_SIGNIN`, `SYNAPSED_SIGNIN__AUTO_SIGN_IN=false`
//! and `SYNAPSED_SIGNIN__LOGGING__JSON=true` override the file.

use crate::flow::DEFAULT_COMPLETION_EVENT_NAME;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment prefix used by [`SignInConfig::load`] callers by default
pub const DEFAULT_ENV_PREFIX: &str = "SYNAPSED_SIGNIN";

/// Default user-visible failure message
pub const DEFAULT_FAILURE_MESSAGE: &str =
    "Sign in for '{handler}' completed without a token. Status={cause}";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set
    pub filter: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignInConfig {
    /// Explicit default handler; the first registered handler otherwise
    pub default_handler: Option<String>,
    /// Start sign-in automatically on every turn without an active flow
    pub auto_sign_in: bool,
    /// Name of the synthetic completion event
    pub completion_event_name: String,
    /// Message sent when a flow fails and no failure handler is registered.
    /// `{handler}` and `{cause}` are substituted.
    pub failure_message_template: String,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for SignInConfig {
    fn default() -> Self {
        Self {
            default_handler: None,
            auto_sign_in: false,
            completion_event_name: DEFAULT_COMPLETION_EVENT_NAME.to_string(),
            failure_message_template: DEFAULT_FAILURE_MESSAGE.to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl SignInConfig {
    /// Parse from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(Some(path.as_ref()), None)
    }

    /// Load from an optional TOML file, then let prefixed environment
    /// variables override it
    pub fn load(path: Option<&Path>, env_prefix: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }
        if let Some(prefix) = env_prefix {
            builder = builder.add_source(
                config::Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }
        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the orchestrator relies on
    pub fn validate(&self) -> Result<()> {
        if self.completion_event_name.trim().is_empty() {
            return Err(Error::config("completion_event_name must not be empty"));
        }
        if !self.failure_message_template.contains("{handler}") {
            return Err(Error::config(
                "failure_message_template must contain '{handler}'",
            ));
        }
        if matches!(&self.default_handler, Some(name) if name.trim().is_empty()) {
            return Err(Error::config("default_handler must not be blank"));
        }
        Ok(())
    }

    /// Render the default failure message
    pub fn failure_message(&self, handler: &str, cause: impl std::fmt::Display) -> String {
        self.failure_message_template
            .replace("{handler}", handler)
            .replace("{cause}", &cause.to_string())
    }
}
