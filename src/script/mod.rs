/// 脚本沙箱 - pre-request / test 脚本
pub mod executor;
pub mod host;
pub mod quickjs;
pub mod types;

pub use executor::{DEFAULT_SCRIPT_TIMEOUT, ScriptExecutor};
pub use host::{HostFailure, HostOutcome, ScriptHost};
pub use quickjs::QuickJsHost;
pub use types::{
    LogEntry, ResponseTimings, ScriptBindings, ScriptPhase, ScriptRequest, ScriptResponse,
    ScriptResult, TestResult,
};
