use std::env;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Process-level settings read from the environment (and `.env`, via dotenv).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub model_dir: PathBuf,
    pub pipeline_config: PathBuf,
    pub capture_features: bool,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = get("PORT", "8081");
        let port = port
            .parse::<u16>()
            .map_err(|_| ConfigError::Invalid(format!("PORT must be a port number, got '{}'", port)))?;

        let max_upload_bytes = get("MAX_UPLOAD_BYTES", "10485760");
        let max_upload_bytes = max_upload_bytes.parse::<usize>().map_err(|_| {
            ConfigError::Invalid(format!(
                "MAX_UPLOAD_BYTES must be a byte count, got '{}'",
                max_upload_bytes
            ))
        })?;
        if max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("MAX_UPLOAD_BYTES must be positive".into()));
        }

        let capture_features = parse_flag("CAPTURE_FEATURES", &get("CAPTURE_FEATURES", "true"))?;

        Ok(Self {
            host: get("HOST", "0.0.0.0"),
            port,
            database_url: get("DATABASE_URL", "sqlite://blood_group.db?mode=rwc"),
            upload_dir: PathBuf::from(get("UPLOAD_DIR", "uploads")),
            model_dir: PathBuf::from(get("MODEL_DIR", "saved_models")),
            pipeline_config: PathBuf::from(get("PIPELINE_CONFIG", "config/pipeline.yaml")),
            capture_features,
            max_upload_bytes,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}
