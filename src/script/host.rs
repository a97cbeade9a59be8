use std::time::Duration;

use crate::script::types::{LogEntry, ScriptBindings, ScriptRequest, TestResult};
use crate::variable::EnvDiff;

/// 脚本失败的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostFailure {
    /// 超出时间预算
    Timeout(Duration),
    /// 未捕获的异常或宿主自身错误，已格式化为 "Name: message"
    Error(String),
}

impl HostFailure {
    pub fn message(&self) -> String {
        match self {
            HostFailure::Timeout(budget) => {
                format!("Script timed out after {} ms", budget.as_millis())
            }
            HostFailure::Error(message) => message.clone(),
        }
    }
}

/// 一次脚本执行的原始产出
///
/// 失败时 `logs`、`test_results`、`environment_diff` 保留失败前已经产生的部分。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostOutcome {
    pub logs: Vec<LogEntry>,
    pub test_results: Vec<TestResult>,
    pub environment_diff: EnvDiff,
    /// pre-request 阶段成功结束后读回的请求
    pub request: Option<ScriptRequest>,
    pub failure: Option<HostFailure>,
}

/// 隔离执行用户脚本的宿主
///
/// 实现必须保证：脚本无法访问文件系统、网络、进程或宿主内存，
/// 超过 `timeout` 后强制中止，并且不得 panic 到调用方。
pub trait ScriptHost: Send + Sync {
    fn execute(&self, bindings: &ScriptBindings, source: &str, timeout: Duration) -> HostOutcome;
}
