use crate::error::VaultError;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub database_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
}

impl VaultConfig {
    pub fn from_env() -> Result<Self, VaultError> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| VaultError::ConfigError {
            message: "DATABASE_URL must be set".to_string(),
        })?;

        Ok(Self {
            database_url,
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.is_empty()),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string()),
        })
    }
}
