use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: set {env_var}")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Map a settings field path like `provider.api_key` to the environment
/// variable a user would set for it
pub fn to_env_var(field: &str) -> String {
    format!("PLOTLINE_{}", field.replace('.', "__").to_uppercase())
}
