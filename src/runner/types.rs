use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http::{DispatchResponse, TransportError};
use crate::script::{ScriptResult, TestResult};

/// 用户主动停止后剩余请求的跳过原因
pub const SKIP_STOPPED: &str = "stopped by user";
/// stopOnError 触发后剩余请求的跳过原因
pub const SKIP_PREVIOUS_ERROR: &str = "previous error";
/// runner 中被禁用的请求
pub const SKIP_DISABLED: &str = "disabled";

fn enabled_by_default() -> bool {
    true
}

/// 一次运行的选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunOptions {
    pub stop_on_error: bool,
    /// 请求之间的固定间隔（毫秒），第一个之前和最后一个之后不等待
    pub delay_ms: u64,
    /// 运行开始时注入 run 层的变量（如 CLI 的 --var）
    pub variables: HashMap<String, String>,
}

impl RunOptions {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// runner 中的一项：引用某个 collection 的某个端点
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerItem {
    pub collection_id: String,
    pub endpoint_id: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl RunnerItem {
    pub fn new(collection_id: impl Into<String>, endpoint_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            endpoint_id: endpoint_id.into(),
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// 持久化的 runner 定义
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunnerDefinition {
    pub id: String,
    pub name: String,
    pub environment_id: Option<String>,
    pub requests: Vec<RunnerItem>,
    pub options: RunOptions,
}

/// 单个请求的结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Success,
    Error,
    Skipped,
}

/// 单个请求的执行结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResult {
    /// 在 runner 中的位置（从 0 开始）
    pub index: usize,
    pub collection_id: String,
    pub endpoint_id: String,
    pub name: String,
    pub method: String,
    /// 实际发送的 URL；跳过或未能构建时为端点的原始路径
    pub url: String,
    pub status: RequestStatus,
    /// HTTP 状态码（成功或非 2xx 失败时）
    pub response_status: Option<u16>,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub skip_reason: Option<String>,
    pub response: Option<DispatchResponse>,
    pub transport_error: Option<TransportError>,
    pub pre_request_script: Option<ScriptResult>,
    /// test 脚本失败只影响变量合并，不会让请求变成 error
    pub test_script: Option<ScriptResult>,
}

/// 构造结果时使用的请求描述
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestLabel {
    pub collection_id: String,
    pub endpoint_id: String,
    pub name: String,
    pub method: String,
    pub url: String,
}

impl RequestLabel {
    pub fn from_item(item: &RunnerItem) -> Self {
        Self {
            collection_id: item.collection_id.clone(),
            endpoint_id: item.endpoint_id.clone(),
            name: item.endpoint_id.clone(),
            ..Self::default()
        }
    }
}

impl RequestResult {
    fn base(index: usize, label: RequestLabel, status: RequestStatus) -> Self {
        Self {
            index,
            collection_id: label.collection_id,
            endpoint_id: label.endpoint_id,
            name: label.name,
            method: label.method,
            url: label.url,
            status,
            response_status: None,
            duration_ms: 0,
            error: None,
            skip_reason: None,
            response: None,
            transport_error: None,
            pre_request_script: None,
            test_script: None,
        }
    }

    pub fn success(index: usize, label: RequestLabel, response: DispatchResponse, duration: Duration) -> Self {
        Self {
            response_status: Some(response.status),
            duration_ms: duration.as_millis() as u64,
            response: Some(response),
            ..Self::base(index, label, RequestStatus::Success)
        }
    }

    pub fn error(index: usize, label: RequestLabel, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            duration_ms: duration.as_millis() as u64,
            error: Some(error.into()),
            ..Self::base(index, label, RequestStatus::Error)
        }
    }

    pub fn transport_failure(
        index: usize,
        label: RequestLabel,
        failure: TransportError,
        duration: Duration,
    ) -> Self {
        let message = failure.message.clone();
        Self {
            response_status: failure.status,
            transport_error: Some(failure),
            ..Self::error(index, label, message, duration)
        }
    }

    pub fn skipped(index: usize, label: RequestLabel, reason: impl Into<String>) -> Self {
        Self {
            skip_reason: Some(reason.into()),
            ..Self::base(index, label, RequestStatus::Skipped)
        }
    }

    pub fn with_scripts(mut self, pre_request: Option<ScriptResult>, test: Option<ScriptResult>) -> Self {
        self.pre_request_script = pre_request;
        self.test_script = test;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == RequestStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == RequestStatus::Error
    }

    pub fn is_skipped(&self) -> bool {
        self.status == RequestStatus::Skipped
    }

    /// test 脚本记录的断言
    pub fn assertions(&self) -> &[TestResult] {
        self.test_script
            .as_ref()
            .map(|s| s.test_results.as_slice())
            .unwrap_or(&[])
    }
}

/// 运行的终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Running,
    Completed,
    Stopped,
    FailedFast,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Stopped => "stopped",
            RunStatus::FailedFast => "failed-fast",
        }
    }
}

/// 运行摘要
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_assertions: usize,
    pub passed_assertions: usize,
    pub failed_assertions: usize,
}

impl RunSummary {
    pub fn from_results(results: &[RequestResult]) -> Self {
        let passed = results.iter().filter(|r| r.is_success()).count();
        let skipped = results.iter().filter(|r| r.is_skipped()).count();

        // 统计断言
        let total_assertions: usize = results.iter().map(|r| r.assertions().len()).sum();
        let passed_assertions = results
            .iter()
            .flat_map(|r| r.assertions())
            .filter(|a| a.passed)
            .count();

        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed - skipped,
            skipped,
            total_assertions,
            passed_assertions,
            failed_assertions: total_assertions - passed_assertions,
        }
    }
}

/// 一次运行的完整记录
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: String,
    pub runner_id: String,
    pub runner_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// 从第一次发送到最后一次完成
    pub total_time_ms: u64,
    pub results: Vec<RequestResult>,
    pub summary: RunSummary,
    /// 结束时 run 层累积的变量
    pub variables: HashMap<String, String>,
}

impl RunRecord {
    pub fn new(run_id: impl Into<String>, definition: &RunnerDefinition) -> Self {
        Self {
            run_id: run_id.into(),
            runner_id: definition.id.clone(),
            runner_name: definition.name.clone(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            total_time_ms: 0,
            results: Vec::with_capacity(definition.requests.len()),
            summary: RunSummary::default(),
            variables: HashMap::new(),
        }
    }

    pub fn push(&mut self, result: RequestResult) {
        self.results.push(result);
        self.summary = RunSummary::from_results(&self.results);
    }

    /// 封存记录
    pub fn seal(&mut self, status: RunStatus, total_time: Duration, variables: HashMap<String, String>) {
        self.status = status;
        self.finished_at = Some(Utc::now());
        self.total_time_ms = total_time.as_millis() as u64;
        self.variables = variables;
        self.summary = RunSummary::from_results(&self.results);
    }

    pub fn has_errors(&self) -> bool {
        self.summary.failed > 0
    }
}
