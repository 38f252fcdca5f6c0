//! Service configuration.

use serde::Deserialize;
use std::path::Path;

use quota_gate_core::DEFAULT_GENERATION_COST;

/// Service configuration loaded from environment variables.
#[derive(Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/quota-gate/db").
    pub data_dir: String,

    /// Directory generated artifacts are written to (default: "/data/quota-gate/artifacts").
    pub blob_dir: String,

    /// Public base URL of this service, used to build artifact references.
    pub public_base_url: String,

    /// Credits charged per generation in CREDIT mode.
    pub generation_cost_credits: u64,

    /// System-wide provider credential used for TRIAL and CREDIT generations.
    pub system_generation_key: Option<String>,

    /// Base URL of the image generation provider.
    pub generation_base_url: String,

    /// Upper bound on one generation (provider call plus blob write), in seconds.
    pub generation_timeout_seconds: u64,

    /// Base URL of the Graph API used for publishing.
    pub graph_api_url: String,

    /// Upper bound on one publish call, in seconds.
    pub publish_timeout_seconds: u64,

    /// Interval of the in-process publish loop in seconds (0 disables it).
    pub publish_interval_seconds: u64,

    /// Maximum due posts handled per run.
    pub publish_batch_size: usize,

    /// Maximum concurrent publish calls within a run.
    pub publish_concurrency: usize,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Generation provider secrets file structure.
#[derive(Debug, Deserialize)]
struct GenerationSecrets {
    api_key: String,
    #[serde(default)]
    base_url: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let (system_generation_key, secrets_base_url) = load_generation_secrets();

        Self {
            listen_addr: env_or("LISTEN_ADDR", defaults.listen_addr),
            data_dir: env_or("DATA_DIR", defaults.data_dir),
            blob_dir: env_or("BLOB_DIR", defaults.blob_dir),
            public_base_url: env_or("PUBLIC_BASE_URL", defaults.public_base_url)
                .trim_end_matches('/')
                .to_string(),
            generation_cost_credits: at_least(
                "GENERATION_COST_CREDITS",
                env_parse("GENERATION_COST_CREDITS", defaults.generation_cost_credits),
                1,
            ),
            system_generation_key,
            generation_base_url: std::env::var("GENERATION_BASE_URL")
                .ok()
                .or(secrets_base_url)
                .unwrap_or(defaults.generation_base_url),
            generation_timeout_seconds: env_parse(
                "GENERATION_TIMEOUT_SECONDS",
                defaults.generation_timeout_seconds,
            ),
            graph_api_url: env_or("GRAPH_API_URL", defaults.graph_api_url),
            publish_timeout_seconds: env_parse(
                "PUBLISH_TIMEOUT_SECONDS",
                defaults.publish_timeout_seconds,
            ),
            publish_interval_seconds: env_parse(
                "PUBLISH_INTERVAL_SECONDS",
                defaults.publish_interval_seconds,
            ),
            publish_batch_size: at_least(
                "PUBLISH_BATCH_SIZE",
                env_parse("PUBLISH_BATCH_SIZE", defaults.publish_batch_size),
                1,
            ),
            publish_concurrency: at_least(
                "PUBLISH_CONCURRENCY",
                env_parse("PUBLISH_CONCURRENCY", defaults.publish_concurrency),
                1,
            ),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES", defaults.max_body_bytes),
            request_timeout_seconds: env_parse(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
        }
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Raise `value` to `min`, warning when the configured value was too low.
fn at_least<T>(name: &str, value: T, min: T) -> T
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min {
        tracing::warn!(setting = name, value = %value, min = %min, "Configured value too low, using minimum");
        min
    } else {
        value
    }
}

/// Load the system generation key from file or environment.
fn load_generation_secrets() -> (Option<String>, Option<String>) {
    let secret_paths = [
        ".secrets/generation.json",
        "quota-gate/.secrets/generation.json",
        "../.secrets/generation.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<GenerationSecrets>(path) {
            tracing::info!(path = %path, "Loaded generation secrets from file");
            return (Some(secrets.api_key), secrets.base_url);
        }
    }

    tracing::debug!("Generation secrets file not found, using environment variables");
    (std::env::var("SYSTEM_GENERATION_KEY").ok(), None)
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/quota-gate/db".into(),
            blob_dir: "/data/quota-gate/artifacts".into(),
            public_base_url: "http://localhost:8080".into(),
            generation_cost_credits: DEFAULT_GENERATION_COST,
            system_generation_key: None,
            generation_base_url: "https://image.pollinations.ai".into(),
            generation_timeout_seconds: 45,
            graph_api_url: "https://graph.facebook.com".into(),
            publish_timeout_seconds: 30,
            publish_interval_seconds: 60,
            publish_batch_size: 100,
            publish_concurrency: 4,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 60,
        }
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("listen_addr", &self.listen_addr)
            .field("data_dir", &self.data_dir)
            .field("blob_dir", &self.blob_dir)
            .field("public_base_url", &self.public_base_url)
            .field("generation_cost_credits", &self.generation_cost_credits)
            .field("system_generation_key", &self.system_generation_key.is_some())
            .field("generation_base_url", &self.generation_base_url)
            .field("graph_api_url", &self.graph_api_url)
            .field("publish_interval_seconds", &self.publish_interval_seconds)
            .finish_non_exhaustive()
    }
}
