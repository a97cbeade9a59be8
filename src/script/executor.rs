use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::script::host::{HostFailure, HostOutcome, ScriptHost};
use crate::script::quickjs::QuickJsHost;
use crate::script::types::{
    ScriptBindings, ScriptPhase, ScriptRequest, ScriptResponse, ScriptResult,
};

/// 默认脚本时间预算
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(10);

/// 脚本执行器
///
/// 对调用方从不返回错误：语法错误、异常、断言失败、超时都体现在
/// [`ScriptResult`] 中。
#[derive(Clone)]
pub struct ScriptExecutor {
    host: Arc<dyn ScriptHost>,
    timeout: Duration,
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self::new(Arc::new(QuickJsHost::new()), DEFAULT_SCRIPT_TIMEOUT)
    }
}

impl std::fmt::Debug for ScriptExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptExecutor")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ScriptExecutor {
    pub fn new(host: Arc<dyn ScriptHost>, timeout: Duration) -> Self {
        Self { host, timeout }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 运行 pre-request 脚本
    ///
    /// 成功时 `modified_request` 为脚本修改后的请求；失败时为原始请求，
    /// 环境变更保留失败前已写入的部分。
    pub fn execute_pre_request(
        &self,
        script: &str,
        request: &ScriptRequest,
        environment: &HashMap<String, String>,
    ) -> ScriptResult {
        if script.trim().is_empty() {
            return ScriptResult::noop(Some(request.clone()));
        }

        let bindings = ScriptBindings {
            phase: ScriptPhase::PreRequest,
            request: request.clone(),
            response: None,
            environment: environment.clone(),
        };
        let outcome = self.run(&bindings, script);

        let modified_request = match (&outcome.failure, &outcome.request) {
            (None, Some(modified)) => modified.clone(),
            _ => request.clone(),
        };
        let mut result = into_result(outcome);
        result.modified_request = Some(modified_request);
        result
    }

    /// 运行 test 脚本
    pub fn execute_test(
        &self,
        script: &str,
        request: &ScriptRequest,
        response: &ScriptResponse,
        environment: &HashMap<String, String>,
    ) -> ScriptResult {
        if script.trim().is_empty() {
            return ScriptResult::noop(None);
        }

        let bindings = ScriptBindings {
            phase: ScriptPhase::Test,
            request: request.clone(),
            response: Some(response.clone()),
            environment: environment.clone(),
        };
        let mut result = into_result(self.run(&bindings, script));
        result.modified_request = None;
        result
    }

    fn run(&self, bindings: &ScriptBindings, script: &str) -> HostOutcome {
        debug!(
            "执行 {} 脚本 ({} 字节, 预算 {} ms)",
            bindings.phase.as_str(),
            script.len(),
            self.timeout.as_millis()
        );

        let host = &self.host;
        match catch_unwind(AssertUnwindSafe(|| {
            host.execute(bindings, script, self.timeout)
        })) {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("脚本宿主发生 panic");
                HostOutcome {
                    failure: Some(HostFailure::Error(
                        "InternalError: script host panicked".to_string(),
                    )),
                    ..HostOutcome::default()
                }
            }
        }
    }
}

fn into_result(outcome: HostOutcome) -> ScriptResult {
    let (errors, timed_out) = match &outcome.failure {
        None => (Vec::new(), false),
        Some(failure) => {
            debug!("脚本失败: {}", failure.message());
            (
                vec![failure.message()],
                matches!(failure, HostFailure::Timeout(_)),
            )
        }
    };

    ScriptResult {
        success: outcome.failure.is_none(),
        logs: outcome.logs,
        errors,
        test_results: outcome.test_results,
        modified_request: None,
        modified_environment: outcome.environment_diff,
        timed_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::types::TestResult;
    use crate::variable::EnvChange;

    fn request() -> ScriptRequest {
        ScriptRequest {
            url: "http://api/items".to_string(),
            method: "GET".to_string(),
            ..Default::default()
        }
    }

    /// 不运行 JS 的宿主，返回预设结果
    struct FixedHost(HostOutcome);

    impl ScriptHost for FixedHost {
        fn execute(&self, _: &ScriptBindings, _: &str, _: Duration) -> HostOutcome {
            self.0.clone()
        }
    }

    struct PanickingHost;

    impl ScriptHost for PanickingHost {
        fn execute(&self, _: &ScriptBindings, _: &str, _: Duration) -> HostOutcome {
            panic!("host bug");
        }
    }

    #[test]
    fn test_empty_script_is_noop() {
        let executor = ScriptExecutor::new(Arc::new(PanickingHost), DEFAULT_SCRIPT_TIMEOUT);
        let result = executor.execute_pre_request("  \n\t", &request(), &HashMap::new());
        assert!(result.success);
        assert_eq!(result.modified_request, Some(request()));
        assert!(result.modified_environment.is_empty());
    }

    #[test]
    fn test_failure_returns_original_request_and_partial_diff() {
        let mut outcome = HostOutcome::default();
        outcome
            .environment_diff
            .insert("partial".to_string(), EnvChange::Set("1".to_string()));
        outcome.request = Some(ScriptRequest {
            url: "http://elsewhere".to_string(),
            ..request()
        });
        outcome.failure = Some(HostFailure::Error("ReferenceError: x is not defined".to_string()));

        let executor = ScriptExecutor::new(Arc::new(FixedHost(outcome)), DEFAULT_SCRIPT_TIMEOUT);
        let result = executor.execute_pre_request("x.y", &request(), &HashMap::new());

        assert!(!result.success);
        assert_eq!(result.modified_request, Some(request()));
        assert_eq!(result.errors, vec!["ReferenceError: x is not defined".to_string()]);
        assert!(result.modified_environment.contains_key("partial"));
        assert!(!result.timed_out);
    }

    #[test]
    fn test_timeout_is_flagged() {
        let outcome = HostOutcome {
            failure: Some(HostFailure::Timeout(Duration::from_millis(50))),
            test_results: vec![TestResult {
                passed: true,
                message: "early".to_string(),
            }],
            ..HostOutcome::default()
        };
        let executor = ScriptExecutor::new(Arc::new(FixedHost(outcome)), DEFAULT_SCRIPT_TIMEOUT);
        let result = executor.execute_test(
            "while(true){}",
            &request(),
            &ScriptResponse::default(),
            &HashMap::new(),
        );
        assert!(!result.success);
        assert!(result.timed_out);
        assert_eq!(result.test_results.len(), 1);
        assert!(result.errors[0].contains("timed out"));
        assert!(result.modified_request.is_none());
    }

    #[test]
    fn test_host_panic_is_contained() {
        let executor = ScriptExecutor::new(Arc::new(PanickingHost), DEFAULT_SCRIPT_TIMEOUT);
        let result = executor.execute_test(
            "expect(1).toBe(1)",
            &request(),
            &ScriptResponse::default(),
            &HashMap::new(),
        );
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_quickjs_end_to_end() {
        let executor = ScriptExecutor::default().with_timeout(Duration::from_secs(5));
        let mut environment = HashMap::new();
        environment.insert("token".to_string(), "abc".to_string());

        let result = executor.execute_pre_request(
            r#"request.headers["Authorization"] = "Bearer " + environment.get("token");"#,
            &request(),
            &environment,
        );
        assert!(result.success, "{:?}", result.errors);
        let modified = result.modified_request.unwrap();
        assert_eq!(modified.headers["Authorization"], "Bearer abc");
    }
}
