use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::http::types::{Headers, header_value};

/// 成功（2xx）的响应
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    /// 能解析为 JSON 时为 JSON 值，否则为原始文本
    pub data: Value,
    #[serde(skip)]
    pub duration: Duration,
    pub size: usize,
}

impl DispatchResponse {
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            status,
            status_text: reason_phrase(status).to_string(),
            headers: Headers::new(),
            data,
            duration: Duration::ZERO,
            size: 0,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// 传输失败：非 2xx 响应或网络层错误
///
/// 这是单个请求的结果，不会让整个 run 失败。
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct TransportError {
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub headers: Headers,
    pub data: Option<Value>,
    pub message: String,
}

impl TransportError {
    /// 网络层错误（没有 HTTP 响应）
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            status_text: None,
            headers: Headers::new(),
            data: None,
            message: message.into(),
        }
    }

    /// 服务端返回了非 2xx 状态
    pub fn status(status: u16, headers: Headers, data: Value) -> Self {
        let status_text = reason_phrase(status).to_string();
        Self {
            message: format!("Request failed with status {} {}", status, status_text),
            status: Some(status),
            status_text: Some(status_text),
            headers,
            data: Some(data),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        // 常见错误给出更具体的提示
        let message = if e.is_timeout() {
            "Request timed out. Try increasing the timeout in settings.".to_string()
        } else if e.is_connect() {
            "Connection failed. Check the URL and your network connection.".to_string()
        } else if e.is_redirect() {
            "Too many redirects.".to_string()
        } else if e.is_body() {
            "Error reading request body.".to_string()
        } else if e.is_decode() {
            "Error decoding response.".to_string()
        } else if e.is_builder() || e.is_request() {
            format!("Request error: {}", e)
        } else {
            format!("Request failed: {}", e)
        };

        Self {
            status: e.status().map(|s| s.as_u16()),
            ..Self::network(message)
        }
    }
}

/// 响应体：优先解析 JSON，失败则作为文本
pub(crate) fn decode_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

pub fn reason_phrase(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown")
}
