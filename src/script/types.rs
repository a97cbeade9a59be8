use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::DispatchResponse;
use crate::variable::EnvDiff;

/// 脚本运行的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptPhase {
    PreRequest,
    Test,
}

impl ScriptPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptPhase::PreRequest => "pre-request",
            ScriptPhase::Test => "test",
        }
    }
}

/// 脚本中可见的 `request` 对象
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScriptRequest {
    pub url: String,
    pub method: String,
    pub headers: IndexMap<String, String>,
    pub body: Option<Value>,
    pub query_params: IndexMap<String, String>,
    pub path_params: IndexMap<String, String>,
}

impl ScriptRequest {
    /// 从脚本修改后的 JSON 还原请求；header/参数中的非字符串值会被转为字符串
    pub fn from_script_value(value: Value) -> Result<Self, String> {
        let Value::Object(mut object) = value else {
            return Err("request must remain an object".to_string());
        };

        let text = |v: Option<Value>| match v {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        Ok(Self {
            url: text(object.remove("url")),
            method: text(object.remove("method")),
            headers: coerce_string_map(object.remove("headers")),
            body: match object.remove("body") {
                Some(Value::Null) | None => None,
                Some(body) => Some(body),
            },
            query_params: coerce_string_map(object.remove("queryParams")),
            path_params: coerce_string_map(object.remove("pathParams")),
        })
    }
}

fn coerce_string_map(value: Option<Value>) -> IndexMap<String, String> {
    let Some(Value::Object(object)) = value else {
        return IndexMap::new();
    };
    object
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect()
}

/// 响应耗时信息（毫秒）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseTimings {
    pub total: u64,
}

/// 测试脚本中只读的 `response` 对象
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: IndexMap<String, String>,
    pub body: Value,
    pub timings: ResponseTimings,
    pub cookies: IndexMap<String, String>,
}

impl ScriptResponse {
    pub fn from_dispatch(response: &DispatchResponse) -> Self {
        let cookies = response
            .header("set-cookie")
            .map(parse_cookies)
            .unwrap_or_default();

        Self {
            status: response.status,
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: response.data.clone(),
            timings: ResponseTimings {
                total: response.duration.as_millis() as u64,
            },
            cookies,
        }
    }
}

/// 解析以换行分隔的 set-cookie 值
fn parse_cookies(header: &str) -> IndexMap<String, String> {
    header
        .lines()
        .filter_map(|line| cookie::Cookie::parse(line.trim()).ok())
        .map(|c| (c.name().to_string(), c.value().to_string()))
        .collect()
}

/// 脚本中 console.* 的一条输出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: String,
    pub message: String,
    /// Unix 毫秒
    pub timestamp: i64,
}

/// 一次断言（或 test 块）的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub passed: bool,
    pub message: String,
}

/// 脚本执行结果；执行器从不返回错误，失败也以数据形式给出
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResult {
    pub success: bool,
    pub logs: Vec<LogEntry>,
    pub errors: Vec<String>,
    pub test_results: Vec<TestResult>,
    /// 仅 pre-request 脚本有值；失败时回退为原始请求
    pub modified_request: Option<ScriptRequest>,
    pub modified_environment: EnvDiff,
    /// 失败原因是超时
    pub timed_out: bool,
}

impl ScriptResult {
    /// 空脚本的结果
    pub fn noop(modified_request: Option<ScriptRequest>) -> Self {
        Self {
            success: true,
            modified_request,
            ..Self::default()
        }
    }

    pub fn passed_tests(&self) -> usize {
        self.test_results.iter().filter(|t| t.passed).count()
    }

    pub fn failed_tests(&self) -> usize {
        self.test_results.iter().filter(|t| !t.passed).count()
    }
}

/// 交给脚本宿主的全部绑定
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptBindings {
    pub phase: ScriptPhase,
    pub request: ScriptRequest,
    pub response: Option<ScriptResponse>,
    /// 当前请求可见的变量快照
    pub environment: HashMap<String, String>,
}
