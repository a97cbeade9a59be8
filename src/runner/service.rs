use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::handle_digest_auth;
use crate::http::Transport;
use crate::model::{Collection, Endpoint, EndpointScripts, join_url};
use crate::runner::events::{ListenerId, ProgressCallback, RunEvent, RunListener};
use crate::runner::prepare::{apply_auth, into_dispatch, resolve_endpoint};
use crate::runner::types::{
    RequestLabel, RequestResult, RunRecord, RunStatus, RunnerDefinition, RunnerItem,
    SKIP_DISABLED, SKIP_PREVIOUS_ERROR, SKIP_STOPPED,
};
use crate::script::{ScriptExecutor, ScriptResponse, ScriptResult};
use crate::store::Stores;
use crate::variable::{ProxyConfig, Settings, VariableContext, VariableProcessor};
use crate::{ResonanceError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 按顺序执行 runner 的编排服务
///
/// 同一实例同一时间只允许一次运行；第二次启动立即返回
/// [`ResonanceError::AlreadyRunning`]。停止是协作式的，只在请求之间生效。
pub struct RunnerService {
    stores: Stores,
    transport: Arc<dyn Transport>,
    scripts: Arc<ScriptExecutor>,
    request_timeout: Option<Duration>,
    proxy: Option<ProxyConfig>,
    running: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
    listeners: Mutex<Vec<(ListenerId, RunListener)>>,
    next_listener: AtomicU64,
}

/// 运行结束（包括出错和 panic）时清除运行标志
struct RunGuard<'a> {
    service: &'a RunnerService,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *lock(&self.service.cancel) = None;
        self.service.running.store(false, Ordering::SeqCst);
    }
}

/// 一次运行中跨请求共享的状态
struct RunState {
    /// environment 层变量
    environment: HashMap<String, String>,
    /// run 层累积变量（优先级最高）
    accumulated: VariableContext,
    processor: VariableProcessor,
}

impl RunState {
    /// collection < environment < run，每个请求重新合并一次
    fn layered(&self, collection: &Collection) -> VariableContext {
        VariableContext::layered([
            &collection.variables,
            &self.environment,
            self.accumulated.as_map(),
        ])
    }
}

impl RunnerService {
    pub fn new(stores: Stores, transport: Arc<dyn Transport>) -> Self {
        Self {
            stores,
            transport,
            scripts: Arc::new(ScriptExecutor::default()),
            request_timeout: Some(Duration::from_millis(30_000)),
            proxy: None,
            running: AtomicBool::new(false),
            cancel: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// 应用配置文件中的超时与代理设置
    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.request_timeout = settings.request_timeout();
        self.proxy = settings.proxy.clone();
        self.scripts = Arc::new(ScriptExecutor::default().with_timeout(settings.script_timeout()));
        self
    }

    pub fn with_script_executor(mut self, executor: ScriptExecutor) -> Self {
        self.scripts = Arc::new(executor);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn is_executing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 请求停止当前运行；没有运行时返回 false
    pub fn stop_execution(&self) -> bool {
        match lock(&self.cancel).as_ref() {
            Some(token) => {
                info!("收到停止请求，将在当前请求结束后停止");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&RunEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        lock(&self.listeners).push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// 按 id 加载 runner 定义并执行
    pub async fn execute_runner(
        &self,
        runner_id: &str,
        on_progress: Option<ProgressCallback>,
    ) -> Result<RunRecord> {
        let (guard, token) = self.acquire()?;
        let definition = self
            .stores
            .runners
            .get(runner_id)
            .await?
            .ok_or_else(|| ResonanceError::not_found("runner", runner_id))?;
        self.run(definition, token, on_progress, guard).await
    }

    /// 直接执行给定的 runner 定义
    pub async fn execute_runner_data(
        &self,
        definition: RunnerDefinition,
        on_progress: Option<ProgressCallback>,
    ) -> Result<RunRecord> {
        let (guard, token) = self.acquire()?;
        self.run(definition, token, on_progress, guard).await
    }

    fn acquire(&self) -> Result<(RunGuard<'_>, CancellationToken)> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ResonanceError::AlreadyRunning);
        }
        let guard = RunGuard { service: self };
        let token = CancellationToken::new();
        *lock(&self.cancel) = Some(token.clone());
        Ok((guard, token))
    }

    async fn run(
        &self,
        definition: RunnerDefinition,
        token: CancellationToken,
        mut on_progress: Option<ProgressCallback>,
        _guard: RunGuard<'_>,
    ) -> Result<RunRecord> {
        if definition.requests.is_empty() {
            return Err(ResonanceError::EmptyRunner);
        }

        let environment = match &definition.environment_id {
            Some(id) => {
                self.stores
                    .environments
                    .get(id)
                    .await?
                    .ok_or_else(|| ResonanceError::not_found("environment", id.clone()))?
                    .variables
            }
            None => HashMap::new(),
        };

        let mut state = RunState {
            environment,
            accumulated: VariableContext::from(definition.options.variables.clone()),
            processor: VariableProcessor::new(),
        };

        let run_id = Uuid::new_v4().to_string();
        let total = definition.requests.len();
        let delay = definition.options.delay();
        let mut record = RunRecord::new(run_id.clone(), &definition);

        info!(
            "开始运行 runner '{}' ({} 个请求, run_id={})",
            definition.name, total, run_id
        );
        self.emit(&RunEvent::RunStarted {
            run_id: run_id.clone(),
            runner_id: definition.id.clone(),
            total,
        });

        let mut status = RunStatus::Completed;
        let mut halt: Option<&'static str> = None;
        let mut first_dispatch: Option<Instant> = None;
        let mut last_completion: Option<Instant> = None;

        for (index, item) in definition.requests.iter().enumerate() {
            let result = 'request: {
                if let Some(reason) = halt {
                    break 'request RequestResult::skipped(index, self.label(item).await, reason);
                }
                if token.is_cancelled() {
                    status = RunStatus::Stopped;
                    halt = Some(SKIP_STOPPED);
                    break 'request RequestResult::skipped(index, self.label(item).await, SKIP_STOPPED);
                }
                if !item.enabled {
                    break 'request RequestResult::skipped(index, self.label(item).await, SKIP_DISABLED);
                }

                // 间隔只出现在两个请求之间，停止时提前醒来
                if first_dispatch.is_some() && !delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = token.cancelled() => {}
                    }
                    if token.is_cancelled() {
                        status = RunStatus::Stopped;
                        halt = Some(SKIP_STOPPED);
                        break 'request RequestResult::skipped(index, self.label(item).await, SKIP_STOPPED);
                    }
                }

                first_dispatch.get_or_insert_with(Instant::now);
                let result = self.execute_item(index, item, &mut state).await;
                last_completion = Some(Instant::now());

                if result.is_error() && definition.options.stop_on_error {
                    warn!("请求 [{}] 失败，stopOnError 已开启，跳过剩余请求", index + 1);
                    status = RunStatus::FailedFast;
                    halt = Some(SKIP_PREVIOUS_ERROR);
                }
                result
            };

            if let Some(callback) = on_progress.as_mut() {
                callback(index, total, &result);
            }
            self.emit(&RunEvent::RequestCompleted {
                run_id: run_id.clone(),
                index,
                total,
                result: Box::new(result.clone()),
            });
            record.push(result);
        }

        let total_time = match (first_dispatch, last_completion) {
            (Some(first), Some(last)) => last.duration_since(first),
            _ => Duration::ZERO,
        };
        record.seal(status, total_time, state.accumulated.into_map());

        info!(
            "runner '{}' 结束: {} ({} 成功, {} 失败, {} 跳过, {} ms)",
            definition.name,
            status.as_str(),
            record.summary.passed,
            record.summary.failed,
            record.summary.skipped,
            record.total_time_ms
        );
        self.emit(&RunEvent::RunCompleted {
            record: Box::new(record.clone()),
        });

        Ok(record)
    }

    /// 执行单个请求：解析 → pre-request 脚本 → 认证 → 发送 → test 脚本
    async fn execute_item(&self, index: usize, item: &RunnerItem, state: &mut RunState) -> RequestResult {
        let started = Instant::now();
        let (collection, endpoint) = match self.lookup(item).await {
            Ok(found) => found,
            Err(e) => {
                warn!("请求 [{}] 无法加载: {}", index + 1, e);
                return RequestResult::error(index, RequestLabel::from_item(item), e.to_string(), started.elapsed());
            }
        };
        let mut label = label_for(item, &collection, &endpoint);
        let scripts = self.scripts_for(&collection, &endpoint).await;

        // 每个请求独立的动态值
        state.processor.clear_dynamic_cache();
        let variables = state.layered(&collection);
        let mut request = resolve_endpoint(&mut state.processor, &collection, &endpoint, &variables);

        let pre_request = if scripts.pre_request_script.trim().is_empty() {
            None
        } else {
            let result = self
                .run_script({
                    let script = scripts.pre_request_script.clone();
                    let request = request.clone();
                    let environment = variables.as_map().clone();
                    move |executor: &ScriptExecutor| {
                        executor.execute_pre_request(&script, &request, &environment)
                    }
                })
                .await;
            if !result.success {
                warn!("请求 [{}] pre-request 脚本失败: {}", index + 1, result.errors.join("; "));
            }
            if let Some(modified) = &result.modified_request {
                request = modified.clone();
            }
            state.accumulated.absorb(&result.modified_environment);
            Some(result)
        };

        // 认证字段可以引用 pre-request 脚本刚写入的值
        let auth_variables = match &pre_request {
            Some(result) => {
                let mut vars = variables.clone();
                vars.absorb(&result.modified_environment);
                vars
            }
            None => variables,
        };
        let auth = endpoint.auth.resolve(&mut state.processor, &auth_variables);
        let contribution = auth.contribution();
        apply_auth(&mut request, &contribution);

        let dispatch = match into_dispatch(&request) {
            Ok(dispatch) => dispatch
                .with_timeout(self.request_timeout)
                .with_proxy(self.proxy.clone()),
            Err(e) => {
                return RequestResult::error(index, label, e.to_string(), started.elapsed())
                    .with_scripts(pre_request, None);
            }
        };
        label.method = dispatch.method.to_string();
        label.url = dispatch.url.clone();

        debug!("[{}] {} {}", index + 1, dispatch.method, dispatch.url);
        let sent = Instant::now();
        let outcome = match &contribution.digest {
            Some(credentials) => handle_digest_auth(self.transport.as_ref(), &dispatch, credentials).await,
            None => self.transport.dispatch(&dispatch).await,
        };
        let elapsed = sent.elapsed();

        let response = match outcome {
            Ok(response) => response,
            Err(failure) => {
                warn!("[{}] {} {} 失败: {}", index + 1, dispatch.method, dispatch.url, failure);
                return RequestResult::transport_failure(index, label, failure, elapsed)
                    .with_scripts(pre_request, None);
            }
        };
        debug!("[{}] {} ({} ms)", index + 1, response.status, elapsed.as_millis());

        let test = if scripts.test_script.trim().is_empty() {
            None
        } else {
            let result = self
                .run_script({
                    let script = scripts.test_script.clone();
                    // test 脚本看到的是实际发送的 URL（路径参数已替换、已带查询串）
                    let mut request = request.clone();
                    request.url = dispatch.url.clone();
                    let mut snapshot = ScriptResponse::from_dispatch(&response);
                    snapshot.timings.total = elapsed.as_millis() as u64;
                    let environment = state.layered(&collection).into_map();
                    move |executor: &ScriptExecutor| {
                        executor.execute_test(&script, &request, &snapshot, &environment)
                    }
                })
                .await;
            if !result.success {
                warn!("请求 [{}] test 脚本失败: {}", index + 1, result.errors.join("; "));
            }
            // 失败前写入的部分变更同样生效，Unset 条目被丢弃
            state.accumulated.absorb(&result.modified_environment);
            Some(result)
        };

        RequestResult::success(index, label, response, elapsed).with_scripts(pre_request, test)
    }

    /// 脚本在阻塞线程池中执行，不占用异步工作线程
    async fn run_script<F>(&self, job: F) -> ScriptResult
    where
        F: FnOnce(&ScriptExecutor) -> ScriptResult + Send + 'static,
    {
        let executor = self.scripts.clone();
        match tokio::task::spawn_blocking(move || job(&executor)).await {
            Ok(result) => result,
            Err(e) => ScriptResult {
                success: false,
                errors: vec![format!("InternalError: script task failed: {}", e)],
                ..ScriptResult::default()
            },
        }
    }

    async fn lookup(&self, item: &RunnerItem) -> Result<(Collection, Endpoint)> {
        let collection = self
            .stores
            .collections
            .get(&item.collection_id)
            .await?
            .ok_or_else(|| ResonanceError::not_found("collection", item.collection_id.clone()))?;
        let endpoint = collection
            .endpoint(&item.endpoint_id)
            .cloned()
            .ok_or_else(|| ResonanceError::not_found("endpoint", item.endpoint_id.clone()))?;
        Ok((collection, endpoint))
    }

    async fn scripts_for(&self, collection: &Collection, endpoint: &Endpoint) -> EndpointScripts {
        let key = EndpointScripts::key(&collection.id, &endpoint.id);
        let overrides = match self.stores.scripts.get(&key).await {
            Ok(overrides) => overrides,
            Err(e) => {
                warn!("读取端点脚本 {} 失败: {}", key, e);
                None
            }
        };
        EndpointScripts::effective(endpoint, overrides.as_ref())
    }

    /// 跳过的请求尽量带上端点名称，查找失败时退回 id
    async fn label(&self, item: &RunnerItem) -> RequestLabel {
        match self.lookup(item).await {
            Ok((collection, endpoint)) => label_for(item, &collection, &endpoint),
            Err(_) => RequestLabel::from_item(item),
        }
    }

    fn emit(&self, event: &RunEvent) {
        let listeners: Vec<RunListener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!("监听器处理 {} 事件时 panic，已忽略", event.name());
            }
        }
    }
}

fn label_for(item: &RunnerItem, collection: &Collection, endpoint: &Endpoint) -> RequestLabel {
    RequestLabel {
        collection_id: item.collection_id.clone(),
        endpoint_id: item.endpoint_id.clone(),
        name: endpoint.display_name().to_string(),
        method: endpoint.method.to_string(),
        url: join_url(&collection.base_url, &endpoint.path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{DispatchRequest, DispatchResponse, TransportError};
    use crate::model::Environment;
    use crate::runner::RequestStatus;
    use crate::store::StoreFile;
    use async_trait::async_trait;
    use serde_json::json;

    /// 按 URL 路径返回预设结果并记录请求的传输层
    #[derive(Default)]
    struct FakeTransport {
        failing_paths: Vec<&'static str>,
        sent: Mutex<Vec<DispatchRequest>>,
    }

    impl FakeTransport {
        fn failing(paths: Vec<&'static str>) -> Self {
            Self {
                failing_paths: paths,
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<DispatchRequest> {
            lock(&self.sent).clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn dispatch(
            &self,
            request: &DispatchRequest,
        ) -> std::result::Result<DispatchResponse, TransportError> {
            lock(&self.sent).push(request.clone());
            if self.failing_paths.iter().any(|p| request.url.ends_with(p)) {
                return Err(TransportError::status(500, Default::default(), json!("boom")));
            }
            Ok(DispatchResponse::new(200, json!({"token": "tok-1", "url": request.url})))
        }
    }

    fn endpoint(id: &str, path: &str) -> Endpoint {
        Endpoint {
            id: id.to_string(),
            name: id.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    fn stores(endpoints: Vec<Endpoint>) -> Stores {
        let mut collection = Collection {
            id: "c1".to_string(),
            base_url: "{{baseUrl}}".to_string(),
            endpoints,
            ..Default::default()
        };
        collection
            .variables
            .insert("baseUrl".to_string(), "http://collection".to_string());
        collection
            .variables
            .insert("who".to_string(), "collection".to_string());

        StoreFile {
            collections: vec![collection],
            environments: vec![
                Environment::new("dev", "Dev")
                    .with_variable("baseUrl", "http://api.test")
                    .with_variable("who", "environment"),
            ],
            ..Default::default()
        }
        .into_stores()
    }

    fn definition(ids: &[&str]) -> RunnerDefinition {
        RunnerDefinition {
            id: "r1".to_string(),
            name: "unit".to_string(),
            environment_id: Some("dev".to_string()),
            requests: ids.iter().map(|id| RunnerItem::new("c1", *id)).collect(),
            ..Default::default()
        }
    }

    fn service(stores: Stores, transport: Arc<FakeTransport>) -> RunnerService {
        RunnerService::new(stores, transport)
    }

    #[tokio::test]
    async fn test_stop_on_error_skips_remaining() {
        let transport = Arc::new(FakeTransport::failing(vec!["/two"]));
        let service = service(
            stores(vec![endpoint("e1", "/one"), endpoint("e2", "/two"), endpoint("e3", "/three")]),
            transport.clone(),
        );

        let mut definition = definition(&["e1", "e2", "e3"]);
        definition.options.stop_on_error = true;
        let record = service.execute_runner_data(definition, None).await.unwrap();

        let statuses: Vec<RequestStatus> = record.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![RequestStatus::Success, RequestStatus::Error, RequestStatus::Skipped]
        );
        assert_eq!(record.results[2].skip_reason.as_deref(), Some(SKIP_PREVIOUS_ERROR));
        assert_eq!(record.status, RunStatus::FailedFast);
        assert_eq!(transport.sent().len(), 2);
        assert!(!service.is_executing());
    }

    #[tokio::test]
    async fn test_errors_do_not_stop_by_default() {
        let transport = Arc::new(FakeTransport::failing(vec!["/one"]));
        let service = service(
            stores(vec![endpoint("e1", "/one"), endpoint("e2", "/two")]),
            transport.clone(),
        );

        let record = service
            .execute_runner_data(definition(&["e1", "e2"]), None)
            .await
            .unwrap();
        assert_eq!(record.summary.failed, 1);
        assert_eq!(record.summary.passed, 1);
        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.results[0].response_status, Some(500));
    }

    #[tokio::test]
    async fn test_script_values_chain_to_next_request() {
        let mut first = endpoint("e1", "/login");
        first.test_script = r#"environment.set("token", response.body.token);"#.to_string();
        let mut second = endpoint("e2", "/items");
        second
            .headers
            .insert("Authorization".to_string(), "Bearer {{token}}".to_string());

        let transport = Arc::new(FakeTransport::default());
        let service = service(stores(vec![first, second]), transport.clone());
        let record = service
            .execute_runner_data(definition(&["e1", "e2"]), None)
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].url, "http://api.test/login");
        assert_eq!(
            crate::http::header_value(&sent[1].headers, "Authorization"),
            Some("Bearer tok-1")
        );
        assert_eq!(record.variables.get("token").map(String::as_str), Some("tok-1"));
    }

    #[tokio::test]
    async fn test_test_script_sees_sent_url() {
        let mut item = endpoint("e1", "/users/:id");
        item.path_params.insert("id".to_string(), "7".to_string());
        item.query_params.insert("page".to_string(), "2".to_string());
        item.test_script = r#"environment.set("seen", request.url);"#.to_string();

        let transport = Arc::new(FakeTransport::default());
        let service = service(stores(vec![item]), transport.clone());
        let record = service
            .execute_runner_data(definition(&["e1"]), None)
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].url, "http://api.test/users/7?page=2");
        assert_eq!(
            record.variables.get("seen").map(String::as_str),
            Some("http://api.test/users/7?page=2")
        );
    }

    #[tokio::test]
    async fn test_variable_precedence() {
        let mut first = endpoint("e1", "/who/{{who}}");
        first.test_script = r#"environment.set("who", "run");"#.to_string();
        let again = endpoint("e2", "/who/{{who}}");

        let transport = Arc::new(FakeTransport::default());
        let service = service(stores(vec![first, again]), transport.clone());
        service
            .execute_runner_data(definition(&["e1", "e2"]), None)
            .await
            .unwrap();

        let sent = transport.sent();
        // environment 覆盖 collection，run 层覆盖 environment
        assert_eq!(sent[0].url, "http://api.test/who/environment");
        assert_eq!(sent[1].url, "http://api.test/who/run");
    }

    #[tokio::test]
    async fn test_failing_test_script_keeps_request_success() {
        let mut first = endpoint("e1", "/one");
        first.test_script = r#"
            environment.set("kept", "yes");
            expect(response.status).toBe(201);
        "#
        .to_string();

        let transport = Arc::new(FakeTransport::default());
        let service = service(stores(vec![first]), transport);
        let record = service
            .execute_runner_data(definition(&["e1"]), None)
            .await
            .unwrap();

        let result = &record.results[0];
        assert!(result.is_success());
        let test = result.test_script.as_ref().unwrap();
        assert!(!test.success);
        assert_eq!(record.summary.failed_assertions, 1);
        assert_eq!(record.variables.get("kept").map(String::as_str), Some("yes"));
    }

    #[tokio::test]
    async fn test_unset_is_not_propagated() {
        let mut first = endpoint("e1", "/one");
        first.test_script = r#"environment.set("a", "1"); environment.delete("b");"#.to_string();

        let transport = Arc::new(FakeTransport::default());
        let service = service(stores(vec![first]), transport);
        let mut definition = definition(&["e1"]);
        definition
            .options
            .variables
            .insert("b".to_string(), "seed".to_string());

        let record = service.execute_runner_data(definition, None).await.unwrap();
        assert_eq!(record.variables.get("a").map(String::as_str), Some("1"));
        assert_eq!(record.variables.get("b").map(String::as_str), Some("seed"));
    }

    #[tokio::test]
    async fn test_pre_request_script_mutates_request() {
        let mut first = endpoint("e1", "/one");
        first.pre_request_script = r#"
            request.headers["X-Signed"] = "sig";
            request.queryParams["page"] = "2";
            environment.set("stamp", "s1");
        "#
        .to_string();
        let second = endpoint("e2", "/two/{{stamp}}");

        let transport = Arc::new(FakeTransport::default());
        let service = service(stores(vec![first, second]), transport.clone());
        service
            .execute_runner_data(definition(&["e1", "e2"]), None)
            .await
            .unwrap();

        let sent = transport.sent();
        assert_eq!(sent[0].url, "http://api.test/one?page=2");
        assert_eq!(crate::http::header_value(&sent[0].headers, "X-Signed"), Some("sig"));
        assert_eq!(sent[1].url, "http://api.test/two/s1");
    }

    #[tokio::test]
    async fn test_disabled_and_missing_items() {
        let transport = Arc::new(FakeTransport::default());
        let service = service(stores(vec![endpoint("e1", "/one")]), transport.clone());

        let mut definition = definition(&["e1"]);
        definition.requests.push(RunnerItem::new("c1", "e1").disabled());
        definition.requests.push(RunnerItem::new("c1", "ghost"));
        definition.requests.push(RunnerItem::new("nope", "e1"));

        let record = service.execute_runner_data(definition, None).await.unwrap();
        let statuses: Vec<RequestStatus> = record.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                RequestStatus::Success,
                RequestStatus::Skipped,
                RequestStatus::Error,
                RequestStatus::Error
            ]
        );
        assert_eq!(record.results[1].skip_reason.as_deref(), Some(SKIP_DISABLED));
        assert!(record.results[2].error.as_ref().unwrap().contains("ghost"));
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_runner_is_rejected_and_flag_cleared() {
        let service = service(stores(vec![]), Arc::new(FakeTransport::default()));
        let err = service
            .execute_runner_data(definition(&[]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ResonanceError::EmptyRunner));
        assert!(!service.is_executing());

        let err = service.execute_runner("missing", None).await.unwrap_err();
        assert!(matches!(err, ResonanceError::NotFound { kind: "runner", .. }));
        assert!(!service.is_executing());
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let service = service(stores(vec![endpoint("e1", "/one")]), Arc::new(FakeTransport::default()));
        let (_guard, _token) = service.acquire().unwrap();

        assert!(service.is_executing());
        let err = service
            .execute_runner_data(definition(&["e1"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ResonanceError::AlreadyRunning));
    }

    #[tokio::test]
    async fn test_stop_skips_remaining_after_in_flight_request() {
        let service = Arc::new(service(
            stores(vec![endpoint("e1", "/one"), endpoint("e2", "/two"), endpoint("e3", "/three")]),
            Arc::new(FakeTransport::default()),
        ));

        let stopper = service.clone();
        let progress: ProgressCallback = Box::new(move |index: usize, _: usize, _: &RequestResult| {
            if index == 0 {
                stopper.stop_execution();
            }
        });

        let record = service
            .execute_runner_data(definition(&["e1", "e2", "e3"]), Some(progress))
            .await
            .unwrap();

        assert_eq!(record.status, RunStatus::Stopped);
        assert!(record.results[0].is_success());
        assert!(record.results[1..]
            .iter()
            .all(|r| r.skip_reason.as_deref() == Some(SKIP_STOPPED)));
        assert!(!service.stop_execution());
    }

    #[tokio::test]
    async fn test_listeners_receive_events_and_panics_are_contained() {
        let service = service(stores(vec![endpoint("e1", "/one")]), Arc::new(FakeTransport::default()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let id = service.add_listener(move |event| lock(&sink).push(event.name()));
        service.add_listener(|_| panic!("listener bug"));

        let record = service
            .execute_runner_data(definition(&["e1"]), None)
            .await
            .unwrap();
        assert_eq!(record.summary.passed, 1);
        assert_eq!(
            *lock(&seen),
            vec!["run-started", "request-completed", "run-completed"]
        );

        assert!(service.remove_listener(id));
        assert!(!service.remove_listener(id));
    }

    #[tokio::test]
    async fn test_progress_is_per_request_and_listeners_bracket_the_run() {
        let service = service(
            stores(vec![endpoint("e1", "/one"), endpoint("e2", "/two")]),
            Arc::new(FakeTransport::default()),
        );
        let events = Arc::new(Mutex::new(Vec::new()));

        let sink = events.clone();
        service.add_listener(move |event| lock(&sink).push(event.name().to_string()));
        let sink = events.clone();
        let progress: ProgressCallback = Box::new(move |index: usize, total: usize, _: &RequestResult| {
            lock(&sink).push(format!("progress {}/{}", index + 1, total));
        });

        let mut definition = definition(&["e1", "e2"]);
        definition.requests[1].enabled = false;
        service
            .execute_runner_data(definition, Some(progress))
            .await
            .unwrap();

        assert_eq!(
            *lock(&events),
            vec![
                "run-started",
                "progress 1/2",
                "request-completed",
                "progress 2/2",
                "request-completed",
                "run-completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_endpoint_script_override_wins() {
        let mut first = endpoint("e1", "/one");
        first.test_script = r#"environment.set("source", "endpoint");"#.to_string();
        let stores = stores(vec![first]);
        stores
            .scripts
            .set(
                &EndpointScripts::key("c1", "e1"),
                EndpointScripts {
                    test_script: r#"environment.set("source", "override");"#.to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let service = service(stores, Arc::new(FakeTransport::default()));
        let record = service
            .execute_runner_data(definition(&["e1"]), None)
            .await
            .unwrap();
        assert_eq!(record.variables.get("source").map(String::as_str), Some("override"));
    }
}
