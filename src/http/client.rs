use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;

use crate::Result;
use crate::http::request::DispatchRequest;
use crate::http::response::{DispatchResponse, TransportError, decode_body, reason_phrase};
use crate::http::types::collect_headers;
use crate::variable::ProxyConfig;

/// 发送一次 HTTP 请求的能力
///
/// 2xx 返回 `Ok`；非 2xx 或网络错误返回携带状态、header 与响应体的 [`TransportError`]。
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dispatch(&self, request: &DispatchRequest)
    -> std::result::Result<DispatchResponse, TransportError>;
}

/// 基于 reqwest 的默认传输实现
#[derive(Clone)]
pub struct HttpTransport {
    inner: reqwest::Client,
    user_agent: String,
}

impl HttpTransport {
    pub fn new(user_agent: impl Into<String>) -> Result<Self> {
        let user_agent = user_agent.into();
        let inner = reqwest::Client::builder()
            .user_agent(user_agent.clone())
            .build()?;
        Ok(Self { inner, user_agent })
    }

    /// 带代理的请求使用单独构建的 client
    fn proxied_client(&self, proxy: &ProxyConfig) -> Result<reqwest::Client> {
        let mut reqwest_proxy = reqwest::Proxy::all(&proxy.url)?;
        if let Some(username) = &proxy.username {
            reqwest_proxy =
                reqwest_proxy.basic_auth(username, proxy.password.as_deref().unwrap_or(""));
        }
        if let Some(no_proxy) = &proxy.no_proxy {
            reqwest_proxy = reqwest_proxy.no_proxy(reqwest::NoProxy::from_string(no_proxy));
        }

        Ok(reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .proxy(reqwest_proxy)
            .build()?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn dispatch(
        &self,
        request: &DispatchRequest,
    ) -> std::result::Result<DispatchResponse, TransportError> {
        let client = match &request.proxy {
            Some(proxy) => self
                .proxied_client(proxy)
                .map_err(|e| TransportError::network(format!("Client build error: {}", e)))?,
            None => self.inner.clone(),
        };

        let mut req = client.request(request.method.to_reqwest(), &request.url);
        for (key, value) in &request.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }
        req = match &request.body {
            None | Some(Value::Null) => req,
            Some(Value::String(text)) => req.body(text.clone()),
            Some(json) => req.json(json),
        };

        tracing::debug!(method = %request.method, url = %request.url, "Dispatching request");
        let start = Instant::now();
        let response = req
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(&e))?;
        let duration = start.elapsed();
        let data = decode_body(&bytes);

        if !(200..=299).contains(&status) {
            return Err(TransportError::status(status, headers, data));
        }

        Ok(DispatchResponse {
            status,
            status_text: reason_phrase(status).to_string(),
            headers,
            data,
            duration,
            size: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::types::Method;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport() -> HttpTransport {
        HttpTransport::new("resonance-test").unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_json_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/items"))
            .and(header("X-Trace", "t-1"))
            .and(body_json(serde_json::json!({"name": "widget"})))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"id": 7}))
                    .insert_header("X-Id", "7"),
            )
            .mount(&server)
            .await;

        let request = DispatchRequest::new(Method::Post, format!("{}/items", server.uri()))
            .with_header("X-Trace", "t-1")
            .with_json(&serde_json::json!({"name": "widget"}))
            .unwrap();

        let response = transport().dispatch(&request).await.unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.status_text, "Created");
        assert_eq!(response.data, serde_json::json!({"id": 7}));
        assert_eq!(response.header("x-id"), Some("7"));
    }

    #[tokio::test]
    async fn test_dispatch_non_success_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
            .mount(&server)
            .await;

        let request = DispatchRequest::new(Method::Get, format!("{}/missing", server.uri()));
        let err = transport().dispatch(&request).await.unwrap_err();
        assert_eq!(err.status, Some(404));
        assert_eq!(err.data, Some(serde_json::json!("nope")));
    }

    #[tokio::test]
    async fn test_dispatch_connection_failure() {
        // 端口 1 上通常没有服务
        let request = DispatchRequest::new(Method::Get, "http://127.0.0.1:1/");
        let err = transport().dispatch(&request).await.unwrap_err();
        assert_eq!(err.status, None);
        assert!(!err.message.is_empty());
    }
}
