//! Project configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Default worker count for concurrent batches.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Project configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Values for `{{name}}` placeholders (override suite variables)
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// HTTP headers sent with every test (a test's own headers win)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum in-flight tests in concurrent mode
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Run batches concurrently by default
    #[serde(default)]
    pub concurrent: bool,

    /// User-Agent header for live requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Pattern store location (default: ~/.apicheck/patterns.json)
    #[serde(default)]
    pub patterns_file: Option<PathBuf>,

    /// Save run reports under ~/.apicheck/reports
    #[serde(default = "default_true")]
    pub save_reports: bool,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_user_agent() -> String {
    format!("apicheck/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            variables: BTreeMap::new(),
            headers: BTreeMap::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            concurrent: false,
            user_agent: default_user_agent(),
            patterns_file: None,
            save_reports: true,
        }
    }
}

impl Config {
    /// Load config from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from default location (.apicheck.toml)
    ///
    /// # Errors
    ///
    /// Returns error if a config file exists but cannot be read or parsed
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load_from_dir(Path::new("."))
    }

    /// Look for a config file in `dir`, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns error if a config file exists but cannot be read or parsed
    pub fn load_from_dir(dir: &Path) -> Result<Self, ConfigError> {
        let candidates = [".apicheck.toml", ".apicheck.json", "apicheck.toml"];

        for name in candidates {
            let path = dir.join(name);
            if path.exists() {
                return Self::load(&path);
            }
        }

        // No config file, return default
        Ok(Self::default())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::Invalid("max_concurrent must be at least 1".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    /// Create example config file
    pub fn example() -> &'static str {
        r#"# apicheck configuration

# Request timeout in seconds
# timeout_secs = 30

# Run tests in parallel, at most max_concurrent at a time
# concurrent = false
# max_concurrent = 5

# user_agent = "apicheck"

# Where learned assertion patterns are kept (default: ~/.apicheck/patterns.json)
# patterns_file = ".apicheck/patterns.json"

# Save run reports under ~/.apicheck/reports (default: true)
# save_reports = true

# Placeholder values: "{{base_url}}/users" in a test URL
[variables]
base_url = "http://localhost:8080"
# user_id = "1"

# HTTP headers sent with every test (auth, api keys)
[headers]
# Authorization = "Bearer your-token-here"
# X-API-Key = "your-api-key"
"#
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
