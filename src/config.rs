//! Configuration for clinicstore
//!
//! Read from a YAML file, then overlaid with `CLINIC_*` environment
//! variables (a `.env` file in the working directory is honoured).
//!
//! ```yaml
//! data_dir: ./clinic-data
//! remote:
//!   url: https://xyz.supabase.co
//!   api_key: <service key>
//!   timeout_secs: 10
//! retry:
//!   max_attempts: 3
//!   backoff_ms: 1000
//! staff_seed:
//!   username: admin
//!   password: admin
//! ```

use crate::error::{Error, Result};
use crate::storage::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the local collection files
    pub data_dir: PathBuf,
    /// Hosted relational service; local-only when absent
    pub remote: Option<RemoteConfig>,
    /// Local write retry policy
    pub retry: RetryPolicy,
    /// Default administrator written when the staff collection is created
    pub staff_seed: StaffSeed,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("clinic-data"),
            remote: None,
            retry: RetryPolicy::default(),
            staff_seed: StaffSeed::default(),
        }
    }
}

/// Connection settings for the remote service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

/// Credentials of the seeded administrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StaffSeed {
    pub username: String,
    pub password: String,
    /// bcrypt cost used to hash the password
    pub credential_cost: u32,
}

impl Default for StaffSeed {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin".to_string(),
            credential_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Defaults overlaid with the environment
    pub fn from_env() -> Result<Self> {
        Config::default().with_env()
    }

    /// Overlay `CLINIC_DATA_DIR`, `CLINIC_REMOTE_URL` and `CLINIC_REMOTE_KEY`
    pub fn with_env(mut self) -> Result<Self> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();

        if let Ok(dir) = std::env::var("CLINIC_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }

        let url = std::env::var("CLINIC_REMOTE_URL").ok();
        let key = std::env::var("CLINIC_REMOTE_KEY").ok();
        match (url, key) {
            (Some(url), Some(api_key)) => {
                let timeout_secs = self
                    .remote
                    .as_ref()
                    .map(|r| r.timeout_secs)
                    .unwrap_or_else(default_timeout_secs);
                self.remote = Some(RemoteConfig {
                    url,
                    api_key,
                    timeout_secs,
                });
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(Error::Config {
                    message: "CLINIC_REMOTE_URL and CLINIC_REMOTE_KEY must be set together"
                        .to_string(),
                });
            }
            (None, None) => {}
        }

        Ok(self)
    }
}
