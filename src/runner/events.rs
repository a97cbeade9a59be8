use std::sync::Arc;

use serde::Serialize;

use crate::runner::types::{RequestResult, RunRecord};

/// 运行过程中广播给监听器的事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        runner_id: String,
        total: usize,
    },
    RequestCompleted {
        run_id: String,
        index: usize,
        total: usize,
        result: Box<RequestResult>,
    },
    RunCompleted {
        record: Box<RunRecord>,
    },
}

impl RunEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. } => "run-started",
            RunEvent::RequestCompleted { .. } => "request-completed",
            RunEvent::RunCompleted { .. } => "run-completed",
        }
    }
}

/// 监听器；panic 会被捕获并记录，不影响运行
pub type RunListener = Arc<dyn Fn(&RunEvent) + Send + Sync>;

/// 每个请求结束后的进度回调 `(index, total, result)`
///
/// 跳过的请求同样回调；运行开始与结束只通知监听器（[`RunEvent`]）。
pub type ProgressCallback = Box<dyn FnMut(usize, usize, &RequestResult) + Send>;

/// `add_listener` 返回的句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);
