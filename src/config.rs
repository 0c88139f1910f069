use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    /// Root for track data: meta records, pending and approved audio,
    /// activity log, backups.
    pub data_dir: String,
    /// Directory of per-user account documents.
    pub users_dir: String,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
    /// HMAC secret for session tokens.
    pub jwt_secret: String,
    pub token_expiry_hours: i64,
    /// When set, an `admin` account is created at startup if none exists.
    pub bootstrap_admin_password: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let users_dir = std::env::var("USERS_DIR").unwrap_or_else(|_| "./users".to_string());

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(200 * 1024 * 1024); // 200MB

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_default();

        let token_expiry_hours = std::env::var("TOKEN_EXPIRY_HOURS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(12);

        let bootstrap_admin_password = std::env::var("BOOTSTRAP_ADMIN_PASSWORD")
            .ok()
            .filter(|s| !s.is_empty());

        let config = Config {
            bind_address,
            data_dir,
            users_dir,
            max_upload_size,
            jwt_secret,
            token_expiry_hours,
            bootstrap_admin_password,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "JWT_SECRET must be set and non-empty".to_string(),
            ));
        }

        if self.token_expiry_hours <= 0 {
            return Err(ConfigError::ValidationError(
                "TOKEN_EXPIRY_HOURS must be positive".to_string(),
            ));
        }

        if self.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
