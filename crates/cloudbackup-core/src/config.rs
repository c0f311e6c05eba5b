//! Configuration module for cloud-backup.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use anyhow::Context;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for cloud-backup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub auth: AuthConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

/// Authentication / OAuth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Azure AD Application (client) ID. `None` until the user provides one.
    pub app_id: Option<String>,
    /// Local port the OAuth redirect lands on.
    pub redirect_port: u16,
    /// OAuth scopes requested at login.
    pub scopes: Vec<String>,
}

/// Remote drive (Microsoft Graph) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the Graph API.
    pub base_url: String,
    /// Files up to this size (in MiB) are sent in a single request.
    pub simple_upload_limit_mb: u64,
    /// Size of each upload-session chunk (in KiB). Must be a multiple of 320.
    pub chunk_size_kib: u64,
    /// Maximum retries after an HTTP 429 response.
    pub max_retries: u32,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Load from `path`, or use [`Config::default`] if no file exists there.
    ///
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match std::fs::metadata(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            _ => Self::load(path),
        }
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/cloud-backup/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("cloud-backup")
            .join("config.yaml")
    }

    /// Upload limit for single-request uploads, in bytes.
    pub fn simple_upload_limit_bytes(&self) -> u64 {
        self.remote.simple_upload_limit_mb * 1024 * 1024
    }

    /// Upload-session chunk size, in bytes.
    pub fn chunk_size_bytes(&self) -> usize {
        (self.remote.chunk_size_kib * 1024) as usize
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default Graph API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            redirect_port: 8400,
            scopes: vec!["Files.ReadWrite".to_string(), "offline_access".to_string()],
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            simple_upload_limit_mb: 4,
            chunk_size_kib: 10 * 1024,
            max_retries: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"remote.chunk_size_kib"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Upload-session chunks must be multiples of this many KiB.
const CHUNK_GRANULARITY_KIB: u64 = 320;

/// Largest chunk an upload session accepts: the last 320 KiB step below 60 MiB.
pub const MAX_CHUNK_SIZE_KIB: u64 = 60 * 1024 - CHUNK_GRANULARITY_KIB;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- auth ---
        if let Some(app_id) = &self.auth.app_id {
            if app_id.trim().is_empty() {
                errors.push(ValidationError {
                    field: "auth.app_id".into(),
                    message: "must not be empty when set".into(),
                });
            }
        }
        if self.auth.redirect_port == 0 {
            errors.push(ValidationError {
                field: "auth.redirect_port".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.auth.scopes.is_empty() {
            errors.push(ValidationError {
                field: "auth.scopes".into(),
                message: "at least one scope is required".into(),
            });
        }

        // --- remote ---
        if !self.remote.base_url.starts_with("https://")
            && !self.remote.base_url.starts_with("http://")
        {
            errors.push(ValidationError {
                field: "remote.base_url".into(),
                message: format!("not an http(s) URL: {}", self.remote.base_url),
            });
        }
        if self.remote.simple_upload_limit_mb == 0 {
            errors.push(ValidationError {
                field: "remote.simple_upload_limit_mb".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.remote.chunk_size_kib == 0 {
            errors.push(ValidationError {
                field: "remote.chunk_size_kib".into(),
                message: "must be greater than 0".into(),
            });
        } else if self.remote.chunk_size_kib % CHUNK_GRANULARITY_KIB != 0 {
            errors.push(ValidationError {
                field: "remote.chunk_size_kib".into(),
                message: format!(
                    "must be a multiple of {CHUNK_GRANULARITY_KIB} (got {})",
                    self.remote.chunk_size_kib
                ),
            });
        } else if self.remote.chunk_size_kib > MAX_CHUNK_SIZE_KIB {
            errors.push(ValidationError {
                field: "remote.chunk_size_kib".into(),
                message: format!(
                    "must be at most {MAX_CHUNK_SIZE_KIB} (got {})",
                    self.remote.chunk_size_kib
                ),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use cloudbackup_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .auth_app_id("00000000-0000-0000-0000-000000000000")
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- auth ---

    pub fn auth_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.config.auth.app_id = Some(app_id.into());
        self
    }

    pub fn auth_redirect_port(mut self, port: u16) -> Self {
        self.config.auth.redirect_port = port;
        self
    }

    pub fn auth_scopes(mut self, scopes: Vec<String>) -> Self {
        self.config.auth.scopes = scopes;
        self
    }

    // --- remote ---

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.base_url = url.into();
        self
    }

    pub fn remote_simple_upload_limit_mb(mut self, mb: u64) -> Self {
        self.config.remote.simple_upload_limit_mb = mb;
        self
    }

    pub fn remote_chunk_size_kib(mut self, kib: u64) -> Self {
        self.config.remote.chunk_size_kib = kib;
        self
    }

    pub fn remote_max_retries(mut self, n: u32) -> Self {
        self.config.remote.max_retries = n;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
