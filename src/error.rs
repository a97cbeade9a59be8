use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResonanceError {
    #[error("已有运行中的 runner，请先停止或等待完成")]
    AlreadyRunning,

    #[error("runner 没有任何请求")]
    EmptyRunner,

    #[error("未找到 {kind}: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("不支持的 Digest 算法: {0}")]
    UnsupportedAlgorithm(String),

    #[error("无效的 URL: {0}")]
    InvalidUrl(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("存储错误: {0}")]
    Store(String),

    #[error("HTTP 请求失败: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON 解析错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("URL 解析错误: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("TOML 解析错误: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("{0}")]
    Other(String),
}

impl ResonanceError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ResonanceError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

// Add conversion from anyhow::Error
impl From<anyhow::Error> for ResonanceError {
    fn from(err: anyhow::Error) -> Self {
        ResonanceError::Other(err.to_string())
    }
}

/// Result type for resonance crate
pub type Result<T> = std::result::Result<T, ResonanceError>;
