use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::job::JobOptions;
use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per chunk or segment (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
    /// Randomise each backoff by up to half the base delay.
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
            jitter: true,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(cfg.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(cfg.max_delay_secs),
            jitter: cfg.jitter,
        }
    }
}

/// Tuning of the per-job adaptive concurrency limiter (optional `[limiter]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Permit ceiling a fresh limiter starts with.
    pub initial: usize,
    /// Upper bound for the ceiling. The lower bound is always 1.
    pub max: usize,
    /// Number of recent samples kept for the latency baseline.
    pub window: usize,
    /// Multiplier applied to the ceiling on failure or latency regression.
    pub decrease_factor: f64,
    /// Permits added after a sustained run of healthy samples.
    pub increase_step: usize,
    /// Consecutive healthy samples required before increasing.
    pub increase_after: usize,
    /// A sample slower than `latency_factor` x the window average counts as a regression.
    pub latency_factor: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            initial: 4,
            max: 16,
            window: 16,
            decrease_factor: 0.5,
            increase_step: 1,
            increase_after: 4,
            latency_factor: 2.0,
        }
    }
}

/// Global configuration loaded from `~/.config/dlx/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlxConfig {
    /// Number of jobs that may run at the same time (one worker thread each).
    pub workers: usize,
    /// HTTP resources larger than this are fetched in parallel slices when resumable.
    pub slice_threshold_bytes: u64,
    /// Size of each HTTP slice; the last one may be shorter.
    pub slice_size_bytes: u64,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Maximum idle time between two body reads, in seconds.
    pub read_timeout_secs: u64,
    /// Verify TLS certificates (HTTPS, FTPS, SFTP host keys are left to libcurl).
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    /// Custom User-Agent header for HTTP requests.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Proxy URL applied to every request (e.g. `http://127.0.0.1:8080`).
    #[serde(default)]
    pub proxy: Option<String>,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Optional limiter tuning; if missing, built-in defaults are used.
    #[serde(default)]
    pub limiter: Option<LimiterConfig>,
}

fn default_true() -> bool {
    true
}

impl Default for DlxConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            slice_threshold_bytes: 16 * 1024 * 1024,
            slice_size_bytes: 8 * 1024 * 1024,
            connect_timeout_secs: 15,
            read_timeout_secs: 30,
            verify_tls: true,
            user_agent: None,
            proxy: None,
            retry: None,
            limiter: None,
        }
    }
}

impl DlxConfig {
    /// Default per-job options derived from this configuration.
    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            verify_tls: self.verify_tls,
            user_agent: self.user_agent.clone(),
            proxy: self.proxy.clone(),
            slice_threshold: self.slice_threshold_bytes,
            slice_size: self.slice_size_bytes.max(1),
            limiter: self.limiter.clone().unwrap_or_default(),
            retry: self
                .retry
                .as_ref()
                .map(RetryPolicy::from)
                .unwrap_or_default(),
            ..JobOptions::default()
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("dlx")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DlxConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DlxConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: DlxConfig = toml::from_str(&data)?;
    Ok(cfg)
}
