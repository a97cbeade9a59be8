use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rquickjs::{Context, Ctx, Function, Object, Runtime, Value};

use crate::script::host::{HostFailure, HostOutcome, ScriptHost};
use crate::script::types::{LogEntry, ScriptBindings, ScriptPhase, ScriptRequest, TestResult};
use crate::variable::{EnvChange, EnvDiff};

/// 注入沙箱的 JS 运行时：console、environment、request/response、断言 API
const PRELUDE: &str = include_str!("prelude.js");

const DEFAULT_MEMORY_LIMIT: usize = 64 * 1024 * 1024;
const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

/// 基于 QuickJS 的脚本宿主
///
/// 每次执行都创建独立的 Runtime，脚本之间不共享任何状态。
/// 沙箱内没有 require/fetch/文件系统，只能通过注入的全局对象与外界交互。
#[derive(Debug, Clone)]
pub struct QuickJsHost {
    memory_limit: usize,
    max_stack_size: usize,
}

impl Default for QuickJsHost {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            max_stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl QuickJsHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn run(
        &self,
        bindings: &ScriptBindings,
        source: &str,
        timeout: Duration,
        state: &Rc<RefCell<SandboxState>>,
    ) -> Result<Option<ScriptRequest>, HostFailure> {
        let setup = |e: &dyn std::fmt::Display| HostFailure::Error(format!("Sandbox setup failed: {}", e));

        let request_json = serde_json::to_string(&bindings.request).map_err(|e| setup(&e))?;
        let response_json = bindings
            .response
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| setup(&e))?;

        let runtime = Runtime::new().map_err(|e| setup(&e))?;
        runtime.set_memory_limit(self.memory_limit);
        runtime.set_max_stack_size(self.max_stack_size);

        let timed_out = Arc::new(AtomicBool::new(false));
        let flag = timed_out.clone();
        let started = Instant::now();
        runtime.set_interrupt_handler(Some(Box::new(move || {
            if started.elapsed() >= timeout {
                flag.store(true, Ordering::SeqCst);
                true
            } else {
                false
            }
        })));

        let context = Context::full(&runtime).map_err(|e| setup(&e))?;

        context.with(|ctx| {
            install(
                &ctx,
                bindings.phase,
                &request_json,
                response_json.as_deref(),
                state,
            )
            .map_err(|e| setup(&describe_error(&ctx, e)))?;

            if let Err(e) = ctx.eval::<Value, _>(source) {
                // 中断抛出的异常无法被脚本捕获，这里以标志位区分超时
                let message = describe_error(&ctx, e);
                if timed_out.load(Ordering::SeqCst) {
                    return Err(HostFailure::Timeout(timeout));
                }
                return Err(HostFailure::Error(message));
            }

            match bindings.phase {
                ScriptPhase::PreRequest => read_request(&ctx).map(Some).map_err(HostFailure::Error),
                ScriptPhase::Test => Ok(None),
            }
        })
    }
}

impl ScriptHost for QuickJsHost {
    fn execute(&self, bindings: &ScriptBindings, source: &str, timeout: Duration) -> HostOutcome {
        let state = Rc::new(RefCell::new(SandboxState::new(bindings.environment.clone())));

        let (request, failure) = match self.run(bindings, source, timeout, &state) {
            Ok(request) => (request, None),
            Err(failure) => (None, Some(failure)),
        };

        // Runtime 已在 run 中释放，闭包持有的引用随之归还
        let state = state.take();
        HostOutcome {
            logs: state.logs,
            test_results: state.test_results,
            environment_diff: state.diff,
            request,
            failure,
        }
    }
}

/// 脚本执行期间由原生函数写入的状态
#[derive(Debug, Default)]
struct SandboxState {
    environment: HashMap<String, String>,
    diff: EnvDiff,
    logs: Vec<LogEntry>,
    test_results: Vec<TestResult>,
}

impl SandboxState {
    fn new(environment: HashMap<String, String>) -> Self {
        Self {
            environment,
            ..Self::default()
        }
    }

    fn get(&self, name: &str) -> Option<String> {
        match self.diff.get(name) {
            Some(change) => change.value().map(str::to_string),
            None => self.environment.get(name).cloned(),
        }
    }

    fn log(&mut self, level: String, message: String) {
        tracing::debug!("[script:{}] {}", level, message);
        self.logs.push(LogEntry {
            level,
            message,
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
    }
}

/// 注册原生函数并执行 prelude
fn install<'js>(
    ctx: &Ctx<'js>,
    phase: ScriptPhase,
    request_json: &str,
    response_json: Option<&str>,
    state: &Rc<RefCell<SandboxState>>,
) -> rquickjs::Result<()> {
    let native = Object::new(ctx.clone())?;

    let s = state.clone();
    native.set(
        "log",
        Function::new(ctx.clone(), move |level: String, message: String| {
            s.borrow_mut().log(level, message);
        })?,
    )?;

    let s = state.clone();
    native.set(
        "envGet",
        Function::new(ctx.clone(), move |name: String| s.borrow().get(&name))?,
    )?;

    let s = state.clone();
    native.set(
        "envSet",
        Function::new(ctx.clone(), move |name: String, value: String| {
            s.borrow_mut().diff.insert(name, EnvChange::Set(value));
        })?,
    )?;

    let s = state.clone();
    native.set(
        "envUnset",
        Function::new(ctx.clone(), move |name: String| {
            s.borrow_mut().diff.insert(name, EnvChange::Unset);
        })?,
    )?;

    let s = state.clone();
    native.set(
        "record",
        Function::new(ctx.clone(), move |passed: bool, message: String| {
            s.borrow_mut()
                .test_results
                .push(TestResult { passed, message });
        })?,
    )?;

    native.set(
        "btoa",
        Function::new(ctx.clone(), |input: String| STANDARD.encode(input.as_bytes()))?,
    )?;
    native.set(
        "atob",
        Function::new(ctx.clone(), |input: String| -> Option<String> {
            STANDARD
                .decode(input.trim())
                .ok()
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        })?,
    )?;

    let request = ctx.json_parse(request_json)?;
    let response = match response_json {
        Some(json) => ctx.json_parse(json)?,
        None => Value::new_undefined(ctx.clone()),
    };

    let prelude: Function = ctx.eval(PRELUDE)?;
    prelude.call::<_, ()>((native, phase.as_str(), request, response))?;
    Ok(())
}

/// pre-request 成功后读回（可能被修改的）request 全局对象
fn read_request(ctx: &Ctx<'_>) -> Result<ScriptRequest, String> {
    let invalid = |e: &dyn std::fmt::Display| format!("Invalid request after pre-request script: {}", e);

    let value: Value = ctx.globals().get("request").map_err(|e| invalid(&e))?;
    let json = ctx
        .json_stringify(value)
        .map_err(|e| invalid(&e))?
        .ok_or_else(|| invalid(&"not serializable"))?
        .to_string()
        .map_err(|e| invalid(&e))?;

    let parsed: serde_json::Value = serde_json::from_str(&json).map_err(|e| invalid(&e))?;
    ScriptRequest::from_script_value(parsed).map_err(|e| invalid(&e))
}

/// 把 JS 异常格式化为 "Name: message"
fn describe_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> String {
    if !matches!(err, rquickjs::Error::Exception) {
        return err.to_string();
    }

    let thrown = ctx.catch();
    if let Some(object) = thrown.as_object() {
        let name = object
            .get::<_, Option<String>>("name")
            .ok()
            .flatten()
            .unwrap_or_else(|| "Error".to_string());
        let message = object
            .get::<_, Option<String>>("message")
            .ok()
            .flatten()
            .unwrap_or_default();
        return format!("{}: {}", name, message);
    }

    let text = ctx
        .json_stringify(thrown)
        .ok()
        .flatten()
        .and_then(|s| s.to_string().ok())
        .unwrap_or_else(|| "undefined".to_string());
    format!("Error: {}", text.trim_matches('"'))
}
