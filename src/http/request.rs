use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::http::types::{Headers, Method, set_header};
use crate::variable::ProxyConfig;

/// 交给 [`Transport`](crate::http::Transport) 的一次请求，所有模板均已解析
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub method: Method,
    /// 完整 URL（查询参数已拼接）
    pub url: String,
    pub headers: Headers,
    /// 字符串按原文发送，其余 JSON 值序列化后以 application/json 发送
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
    pub proxy: Option<ProxyConfig>,
}

impl DispatchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: None,
            timeout: None,
            proxy: None,
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        set_header(&mut self.headers, key, value);
        self
    }

    pub fn with_json<T: Serialize>(mut self, data: &T) -> crate::Result<Self> {
        self.body = Some(serde_json::to_value(data)?);
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<ProxyConfig>) -> Self {
        self.proxy = proxy;
        self
    }

    /// 注入 Authorization header（Digest 重试时使用）
    pub fn set_authorization(&mut self, value: impl Into<String>) {
        set_header(&mut self.headers, "Authorization", value);
    }

    /// Digest 计算使用的 request-uri：路径 + 查询串
    pub fn request_uri(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(parsed) => match parsed.query() {
                Some(query) => format!("{}?{}", parsed.path(), query),
                None => parsed.path().to_string(),
            },
            Err(_) => "/".to_string(),
        }
    }
}
