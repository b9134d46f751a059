use filecrypt_crypto::{KdfParams, ProcessorOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FilecryptError, FilecryptResult};

/// Upper bound for the processing window (64 MiB); two windows are held per run.
pub const MAX_CHUNK_SIZE_KIB: usize = 64 * 1024;

/// Top-level configuration (loaded from filecrypt.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilecryptConfig {
    pub server: ServerConfig,
    pub crypto: CryptoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address (default: 127.0.0.1:3001)
    pub listen: String,
    /// Root for `temp/` (raw uploads) and `uploads/` (encrypted artifacts)
    pub data_dir: PathBuf,
    /// Upload size ceiling in MiB (default: 500)
    pub max_upload_mb: u64,
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
    /// Serve Prometheus metrics on /metrics
    pub metrics: bool,
}

impl ServerConfig {
    pub fn temp_dir(&self) -> PathBuf {
        self.data_dir.join("temp")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn max_upload_bytes(&self) -> usize {
        (self.max_upload_mb as usize).saturating_mul(1024 * 1024)
    }
}

/// Chunking and key-derivation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Processing window in KiB (default: 1024 = 1 MiB)
    pub chunk_size_kib: usize,
    /// Minimum gap between progress events in milliseconds (default: 100)
    pub progress_interval_ms: u64,
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
}

impl CryptoConfig {
    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            mem_cost_kib: self.argon2_mem_cost_kib,
            time_cost: self.argon2_time_cost,
            parallelism: self.argon2_parallelism,
        }
    }

    pub fn processor_options(&self) -> ProcessorOptions {
        ProcessorOptions {
            chunk_size: self.chunk_size_kib.saturating_mul(1024),
            progress_interval: Duration::from_millis(self.progress_interval_ms),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3001".into(),
            data_dir: PathBuf::from("data"),
            max_upload_mb: 500,
            log_level: "info".into(),
            log_format: "text".into(),
            metrics: true,
        }
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        let kdf = KdfParams::default();
        Self {
            chunk_size_kib: 1024,
            progress_interval_ms: 100,
            argon2_mem_cost_kib: kdf.mem_cost_kib,
            argon2_time_cost: kdf.time_cost,
            argon2_parallelism: kdf.parallelism,
        }
    }
}

impl FilecryptConfig {
    /// Load from `path`, falling back to defaults (with a warning) when the
    /// file is absent. Needs a subscriber installed for the warning to show.
    pub fn load(path: &Path) -> FilecryptResult<Self> {
        match Self::read(path)? {
            Some(config) => Ok(config),
            None => {
                tracing::warn!("config file not found: {}  (using defaults)", path.display());
                Ok(Self::default())
            }
        }
    }

    /// Parse and validate `path`; `None` if the file does not exist.
    pub fn read(path: &Path) -> FilecryptResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            FilecryptError::Config(format!("reading config {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            FilecryptError::Config(format!("parsing config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(Some(config))
    }

    pub fn validate(&self) -> FilecryptResult<()> {
        if self.crypto.chunk_size_kib == 0 || self.crypto.chunk_size_kib > MAX_CHUNK_SIZE_KIB {
            return Err(FilecryptError::Config(format!(
                "crypto.chunk_size_kib must be in 1..={MAX_CHUNK_SIZE_KIB}, got {}",
                self.crypto.chunk_size_kib
            )));
        }
        self.crypto
            .kdf_params()
            .validate()
            .map_err(|e| FilecryptError::Config(format!("crypto.argon2_*: {e}")))?;
        if self.server.max_upload_mb == 0 {
            return Err(FilecryptError::Config("server.max_upload_mb must be > 0".into()));
        }
        match self.server.log_format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(FilecryptError::Config(format!(
                "server.log_format must be \"json\" or \"text\", got {other:?}"
            ))),
        }
    }
}
