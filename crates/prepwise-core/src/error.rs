use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrepwiseError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Call error: {0}")]
    Call(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PrepwiseError {
    /// Machine-readable classification reported to API callers as `errorType`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigError",
            Self::Store(_) => "StoreError",
            Self::Provider(_) => "ProviderError",
            Self::Parse(_) => "ParseError",
            Self::Call(_) => "CallError",
            Self::Io(_) => "IoError",
            Self::Json(_) => "JsonError",
            Self::Other(_) => "Error",
        }
    }

    /// The message without the category prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::Config(m)
            | Self::Store(m)
            | Self::Provider(m)
            | Self::Parse(m)
            | Self::Call(m) => m.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PrepwiseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        assert_eq!(PrepwiseError::Parse("x".into()).kind(), "ParseError");
        assert_eq!(PrepwiseError::Store("x".into()).kind(), "StoreError");
        let err: PrepwiseError = anyhow::anyhow!("boom").into();
        assert_eq!(err.kind(), "Error");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_error_detail_strips_prefix() {
        let err = PrepwiseError::Parse("Could not parse questions".into());
        assert_eq!(err.to_string(), "Parse error: Could not parse questions");
        assert_eq!(err.detail(), "Could not parse questions");
    }
}
