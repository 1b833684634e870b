use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config validation error: {0}")]
    ConfigValidation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("plan error: {0}")]
    Plan(String),

    #[error("prompt error: {0}")]
    Prompt(#[from] upon::Error),

    #[error("oracle error: {0}")]
    Oracle(String),
}

pub type Result<T> = std::result::Result<T, Error>;
