use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::AuthConfig;
use crate::http::{Headers, Method};

/// 一组共享 base URL、默认 header 与变量的端点
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Collection {
    pub id: String,
    pub name: String,
    pub base_url: String,
    /// 默认 header，端点 header 同名时覆盖
    pub headers: Headers,
    /// collection 级变量（优先级最低）
    pub variables: HashMap<String, String>,
    pub endpoints: Vec<Endpoint>,
}

impl Collection {
    pub fn endpoint(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.id == id)
    }
}

/// 单个请求定义，除 `method` 外的字符串字段都可以包含模板
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Endpoint {
    pub id: String,
    pub name: String,
    pub method: Method,
    /// 相对 base URL 的路径，或完整 URL
    pub path: String,
    pub headers: Headers,
    pub query_params: IndexMap<String, String>,
    pub path_params: IndexMap<String, String>,
    pub body: Option<Value>,
    pub auth: AuthConfig,
    pub pre_request_script: String,
    pub test_script: String,
}

impl Endpoint {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.path
        } else {
            &self.name
        }
    }
}

/// 端点脚本的覆盖配置，非空时优先于端点自带的脚本
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointScripts {
    pub pre_request_script: String,
    pub test_script: String,
}

impl EndpointScripts {
    /// 存储中使用的键
    pub fn key(collection_id: &str, endpoint_id: &str) -> String {
        format!("{}_{}", collection_id, endpoint_id)
    }

    /// 合并端点自带脚本与覆盖脚本
    pub fn effective(endpoint: &Endpoint, overrides: Option<&EndpointScripts>) -> EndpointScripts {
        let pick = |own: &str, over: Option<&str>| match over {
            Some(s) if !s.trim().is_empty() => s.to_string(),
            _ => own.to_string(),
        };
        EndpointScripts {
            pre_request_script: pick(
                &endpoint.pre_request_script,
                overrides.map(|o| o.pre_request_script.as_str()),
            ),
            test_script: pick(&endpoint.test_script, overrides.map(|o| o.test_script.as_str())),
        }
    }
}

/// 是否为完整 URL（带 scheme）
pub fn is_absolute_url(path: &str) -> bool {
    path.split_once("://")
        .map(|(scheme, _)| {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        })
        .unwrap_or(false)
}

/// 拼接 base URL 与路径；路径本身是完整 URL 时直接使用
pub fn join_url(base_url: &str, path: &str) -> String {
    if is_absolute_url(path) || base_url.is_empty() {
        return path.to_string();
    }
    if path.is_empty() {
        return base_url.to_string();
    }
    if path.starts_with('?') {
        return format!("{}{}", base_url, path);
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// 替换路径中的 `:name` 与 `{name}` 段；host、端口和查询串不受影响
pub fn substitute_path_params(url: &str, params: &IndexMap<String, String>) -> String {
    if params.is_empty() {
        return url.to_string();
    }

    // 定位路径部分
    let path_start = match url.find("://") {
        Some(idx) => url[idx + 3..].find('/').map(|p| idx + 3 + p),
        None => url.find('/'),
    };
    let Some(path_start) = path_start else {
        return url.to_string();
    };
    let path_end = url[path_start..]
        .find(['?', '#'])
        .map(|p| path_start + p)
        .unwrap_or(url.len());

    let path = url[path_start..path_end]
        .split('/')
        .map(|segment| {
            let name = segment
                .strip_prefix(':')
                .or_else(|| segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')));
            match name.and_then(|n| params.get(n)) {
                Some(value) => value.as_str(),
                None => segment,
            }
        })
        .collect::<Vec<_>>()
        .join("/");

    format!("{}{}{}", &url[..path_start], path, &url[path_end..])
}
