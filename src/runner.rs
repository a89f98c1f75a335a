//! Test manager: the top-level per-request pipeline.
//!
//! For each request: expand templates against the current scope chain and
//! named responses, consult the response cache, dispatch over HTTP with the
//! retry policy, parse the response body, evaluate assertions, apply
//! variable updates, and record results. Requests run sequentially or in
//! dependency-ordered parallel waves.

use crate::assertions::{self, AssertionContext};
use crate::config::Config;
use crate::diagnostics::DiagnosticLog;
use crate::error::Error;
use crate::executor::{CancelToken, Completion, ExecutorConfig, ParallelExecutor, TaskOutcome};
use crate::model::{
    Headers, Method, NamedResponseStore, Request, RequestBody, Response, ResponseData, TestResult,
};
use crate::parser::body::{self, BodyKind};
use crate::report::{Report, RunStatus};
use crate::response_cache::{CacheConfig, Fingerprint, ResponseCache};
use crate::retry::{execute_with_retry, RetryConfig};
use crate::scope::{ScopeArena, ScopeChain, Value};
use crate::template::{dynamic::DynamicResolver, TemplateEngine};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Installs the process-wide rustls crypto provider the first time a
/// [`TestRunner`] is built. Required because `reqwest` is configured with
/// `rustls-no-provider` and otherwise panics before any TLS-capable client
/// can be constructed.
fn ensure_rustls_crypto_provider() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        #[cfg(not(windows))]
        let _ = rustls::crypto::ring::default_provider().install_default();
        #[cfg(windows)]
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

/// Per-run options layered over the configuration file by the CLI.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub parallel: bool,
    pub max_concurrency: usize,
    pub bail: bool,
    pub no_cache: bool,
    /// `--timeout <ms>` override applied to every request.
    pub timeout_override_ms: Option<u64>,
    /// Directory searched for the `.env` file.
    pub env_dir: PathBuf,
    /// Variables from `--var <file>`, loaded into the Environment scope.
    pub external_variables: HashMap<String, String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            max_concurrency: crate::constants::DEFAULT_MAX_CONCURRENCY,
            bail: false,
            no_cache: false,
            timeout_override_ms: None,
            env_dir: PathBuf::from("."),
            external_variables: HashMap::new(),
        }
    }
}

/// Outcome of one request: its assertion results plus transport state.
#[derive(Debug)]
pub struct RequestOutcome {
    pub request_name: String,
    pub results: Vec<TestResult>,
    pub error: Option<String>,
    pub passed: bool,
    pub duration: Duration,
    pub status: Option<u16>,
    pub from_cache: bool,
}

impl TaskOutcome for RequestOutcome {
    fn is_failure(&self) -> bool {
        !self.passed
    }
}

/// Full result of a run.
#[derive(Debug)]
pub struct RunReport {
    /// Per-request outcomes in parse order (`None` = never dispatched).
    pub outcomes: Vec<Option<RequestOutcome>>,
    pub report: Report,
}

/// Scope chain, arena, and named responses shared across concurrent tasks.
/// Mutations commit under this lock, serializing dependent dispatches.
struct SharedState {
    arena: ScopeArena,
    chain: ScopeChain,
    store: NamedResponseStore,
}

/// The test manager. Cheap to clone; tasks hold clones across await points.
#[derive(Clone)]
pub struct TestRunner {
    config: Arc<Config>,
    options: Arc<RunOptions>,
    client: reqwest::Client,
    cache: Arc<ResponseCache>,
    diagnostics: Arc<DiagnosticLog>,
    dynamic: Arc<DynamicResolver>,
    state: Arc<Mutex<SharedState>>,
    cancel: CancelToken,
    /// Directory body-file references resolve against.
    base_dir: Arc<Mutex<PathBuf>>,
}

impl TestRunner {
    /// Builds a runner from the merged configuration and CLI options.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be constructed.
    pub fn new(config: Config, options: RunOptions) -> Result<Self, Error> {
        ensure_rustls_crypto_provider();

        let tls_disabled_by_env = std::env::var(crate::constants::ENV_TLS_REJECT_UNAUTHORIZED)
            .is_ok_and(|v| v == "0");
        let accept_invalid = !config.security.reject_unauthorized || tls_disabled_by_env;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.timeouts.request_ms))
            .timeout(Duration::from_millis(config.timeouts.response_ms))
            .danger_accept_invalid_certs(accept_invalid)
            .build()?;

        let cache = ResponseCache::new(CacheConfig {
            ttl: Duration::from_secs(config.performance.cache_ttl_secs),
            max_size: config.performance.cache_max_size,
            enabled: !options.no_cache,
            cacheable_methods: config.performance.cacheable_methods.clone(),
            significant_headers: config.performance.significant_headers.clone(),
        });

        let diagnostics = DiagnosticLog::new(config.logging.max_diagnostics);

        let mut arena = ScopeArena::new();
        let chain = ScopeChain::standard(&mut arena);
        for (key, value) in &options.external_variables {
            arena.set(chain.environment, key.clone(), value.as_str());
        }

        let dynamic = DynamicResolver::new(&options.env_dir);

        Ok(Self {
            config: Arc::new(config),
            options: Arc::new(options),
            client,
            cache: Arc::new(cache),
            diagnostics: Arc::new(diagnostics),
            dynamic: Arc::new(dynamic),
            state: Arc::new(Mutex::new(SharedState {
                arena,
                chain,
                store: NamedResponseStore::new(),
            })),
            cancel: CancelToken::new(),
            base_dir: Arc::new(Mutex::new(PathBuf::from("."))),
        })
    }

    /// Token that cancels the run when triggered (wired to Ctrl-C).
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diagnostics
    }

    #[must_use]
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Parses and executes one `.http` file.
    ///
    /// # Errors
    ///
    /// I/O errors reading the file (exit 3) and parse errors (exit 2) abort
    /// the run; request and assertion failures are recorded per-request.
    pub async fn run_file(&self, path: &Path) -> Result<RunReport, Error> {
        let content = tokio::fs::read_to_string(path).await?;
        let file_name = path.display().to_string();
        let parsed = crate::parser::parse(&content, &file_name)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            *self.base_dir.lock().expect("runner lock poisoned") = parent.to_path_buf();
        }
        for warning in &parsed.warnings {
            self.diagnostics.log_with(
                crate::diagnostics::DiagnosticLevel::Warn,
                warning.clone(),
                Some("parser"),
                None,
            );
        }

        {
            let mut state = self.state.lock().expect("runner lock poisoned");
            let file_scope = state.chain.file;
            for (key, value) in &parsed.file_variables {
                state.arena.set(file_scope, key.clone(), value.as_str());
            }
        }

        self.preflight_check(&parsed.requests).await;
        self.run_requests(parsed.requests).await
    }

    /// Executes already-parsed requests (the entry point tests use).
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible to match `run_file`.
    pub async fn run_requests(&self, requests: Vec<Request>) -> Result<RunReport, Error> {
        let run_started = Instant::now();
        let started_at = chrono::Utc::now();
        self.diagnostics.start_timing("run");

        let total = requests.len();
        let waves = if self.options.parallel {
            dependency_waves(&requests, &self.known_variables())
        } else {
            vec![(0..total).collect()]
        };

        let mut outcomes: Vec<Option<RequestOutcome>> = (0..total).map(|_| None).collect();
        let mut requests: Vec<Option<Request>> = requests.into_iter().map(Some).collect();
        let mut bailed = false;

        let executor = ParallelExecutor::new(ExecutorConfig {
            max_concurrency: self.options.max_concurrency.max(1),
            bail: self.options.bail,
            parallel: self.options.parallel,
        });

        for wave in waves {
            if bailed || self.cancel.is_cancelled() {
                break;
            }
            let tasks: Vec<_> = wave
                .iter()
                .map(|&index| {
                    let runner = self.clone();
                    let request = requests[index]
                        .take()
                        .expect("each request is scheduled exactly once");
                    move || async move { runner.execute_one(request).await }
                })
                .collect();

            let completions = executor
                .execute_all(tasks, &self.cancel, |completed, wave_total| {
                    info!(completed, total = wave_total, "request finished");
                })
                .await;

            for (&index, completion) in wave.iter().zip(completions) {
                if let Completion::Finished(outcome) = completion {
                    if self.options.bail && outcome.is_failure() {
                        bailed = true;
                    }
                    outcomes[index] = Some(outcome);
                }
            }
        }

        self.diagnostics.end_timing("run");
        let status = if self.cancel.is_cancelled() {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };

        let results: Vec<TestResult> = outcomes
            .iter()
            .flatten()
            .flat_map(|o| o.results.iter().cloned())
            .collect();
        let report = Report::from_results(results, run_started.elapsed(), started_at, status);
        Ok(RunReport { outcomes, report })
    }

    /// Names resolvable before any request runs: file/environment variables.
    fn known_variables(&self) -> HashSet<String> {
        let state = self.state.lock().expect("runner lock poisoned");
        state
            .arena
            .resolve_all(state.chain.file)
            .into_keys()
            .collect()
    }

    /// Reachability probe against the first request's origin, bounded by the
    /// `serverCheck` timeout. Failure degrades to a warning.
    async fn preflight_check(&self, requests: &[Request]) {
        let Some(first) = requests.first() else {
            return;
        };
        let url = {
            let state = self.state.lock().expect("runner lock poisoned");
            let engine = TemplateEngine::new(
                &state.arena,
                state.chain.file,
                &state.store,
                &self.dynamic,
            );
            engine.expand(&first.url)
        };
        let Some(origin) = origin_of(&url) else {
            return;
        };
        let timeout = Duration::from_millis(self.config.timeouts.server_check_ms);
        let probe = self.client.head(&origin).timeout(timeout).send().await;
        if let Err(e) = probe {
            warn!(%origin, "server preflight check failed: {e}");
            self.diagnostics.log_with(
                crate::diagnostics::DiagnosticLevel::Warn,
                format!("server check failed for {origin}: {e}"),
                Some("preflight"),
                None,
            );
        }
    }

    /// The per-request pipeline.
    async fn execute_one(&self, request: Request) -> RequestOutcome {
        let started = Instant::now();
        let prepared = self.prepare(&request).await;
        let (url, headers, body_text, multipart, variables, scope) = match prepared {
            Ok(p) => p,
            Err(e) => {
                self.diagnostics.log_with(
                    crate::diagnostics::DiagnosticLevel::Error,
                    format!("{}: {e}", request.name),
                    Some("runner"),
                    None,
                );
                return RequestOutcome {
                    request_name: request.name.clone(),
                    results: vec![failed_result(&request.name, &e.to_string())],
                    error: Some(e.to_string()),
                    passed: false,
                    duration: started.elapsed(),
                    status: None,
                    from_cache: false,
                };
            }
        };

        let method = request.method();
        let fingerprint = Fingerprint::from_request(
            method,
            &url,
            body_text.as_deref(),
            &headers,
            &self.cache.config().significant_headers,
        );

        let (response, from_cache) = if self.cache.is_cacheable(method) {
            let lookup = Instant::now();
            match self.cache.get(&fingerprint) {
                Some(mut cached) => {
                    debug!(%url, "cache hit");
                    cached.execution_time = lookup.elapsed();
                    (Ok(cached), true)
                }
                None => {
                    debug!(%url, "cache miss");
                    let dispatched = self
                        .dispatch(&request, method, &url, &headers, body_text.as_deref(), multipart)
                        .await;
                    if let Ok(response) = &dispatched {
                        self.cache.set(fingerprint, response.clone());
                    }
                    (dispatched, false)
                }
            }
        } else {
            (
                self.dispatch(&request, method, &url, &headers, body_text.as_deref(), multipart)
                    .await,
                false,
            )
        };

        let outcome = match response {
            Ok(response) => {
                self.diagnostics.record_metric(
                    "request_ms",
                    response.execution_time.as_secs_f64() * 1000.0,
                );
                let ctx = AssertionContext {
                    request: &request,
                    variables,
                };
                let results = assertions::evaluate_tests(&request.tests, &response, &ctx).await;
                let passed = results.iter().all(|r| r.passed);
                let status = response.status;
                self.commit(&request, response);
                RequestOutcome {
                    request_name: request.name.clone(),
                    results,
                    error: None,
                    passed,
                    duration: started.elapsed(),
                    status: Some(status),
                    from_cache,
                }
            }
            Err(e) if request.expect_error => {
                // Transport failures on expected-error requests pass through.
                debug!(request = %request.name, "expected error: {e}");
                RequestOutcome {
                    request_name: request.name.clone(),
                    results: vec![TestResult {
                        name: format!("{}: expected error", request.name),
                        passed: true,
                        error: None,
                        duration: started.elapsed(),
                    }],
                    error: None,
                    passed: true,
                    duration: started.elapsed(),
                    status: None,
                    from_cache: false,
                }
            }
            Err(e) => {
                self.diagnostics.log_with(
                    crate::diagnostics::DiagnosticLevel::Error,
                    format!("{}: {e}", request.name),
                    Some("runner"),
                    None,
                );
                RequestOutcome {
                    request_name: request.name.clone(),
                    results: vec![failed_result(&request.name, &e.to_string())],
                    error: Some(e.to_string()),
                    passed: false,
                    duration: started.elapsed(),
                    status: None,
                    from_cache: false,
                }
            }
        };

        let mut state = self.state.lock().expect("runner lock poisoned");
        state.arena.clear(scope);
        outcome
    }

    /// Template expansion and body loading, under the state lock.
    #[allow(clippy::type_complexity)]
    async fn prepare(
        &self,
        request: &Request,
    ) -> Result<
        (
            String,
            Headers,
            Option<String>,
            Option<Vec<crate::model::MultipartField>>,
            HashMap<String, String>,
            crate::scope::ScopeId,
        ),
        Error,
    > {
        // Body files load outside the lock.
        let file_body = match &request.body {
            Some(RequestBody::FromFile(path)) => {
                let resolved = {
                    let base = self.base_dir.lock().expect("runner lock poisoned");
                    if path.is_absolute() {
                        path.clone()
                    } else {
                        base.join(path)
                    }
                };
                Some(tokio::fs::read_to_string(&resolved).await?)
            }
            _ => None,
        };

        let mut guard = self.state.lock().expect("runner lock poisoned");
        let state = &mut *guard;
        let scope = state.chain.fresh_request_scope(&mut state.arena);

        // Literal in-request bindings land in the Request scope before
        // anything expands.
        for update in &request.variable_updates {
            if !update.is_jsonpath() {
                state
                    .arena
                    .set(scope, update.key.clone(), update.source.as_str());
            }
        }

        let engine = TemplateEngine::new(&state.arena, scope, &state.store, &self.dynamic);
        let url = engine.expand(&request.url);
        let headers: Headers = request
            .headers
            .iter()
            .map(|(k, v)| (engine.expand(k), engine.expand(v)))
            .collect();

        let mut body_text = None;
        let mut multipart = None;
        match &request.body {
            Some(RequestBody::Text(text)) => body_text = Some(engine.expand(text)),
            Some(RequestBody::FromFile(_)) => {
                body_text = file_body.map(|content| engine.expand(&content));
            }
            Some(RequestBody::Multipart(fields)) => {
                multipart = Some(
                    fields
                        .iter()
                        .map(|f| crate::model::MultipartField {
                            name: f.name.clone(),
                            filename: f.filename.clone(),
                            content_type: f.content_type.clone(),
                            data: engine.expand(&f.data),
                        })
                        .collect(),
                );
            }
            None => {}
        }

        let variables = state
            .arena
            .resolve_all(scope)
            .into_iter()
            .map(|(k, v)| (k, v.render()))
            .collect();

        Ok((url, headers, body_text, multipart, variables, scope))
    }

    /// HTTP dispatch with retry and cancellation.
    async fn dispatch(
        &self,
        request: &Request,
        method: Method,
        url: &str,
        headers: &Headers,
        body_text: Option<&str>,
        multipart: Option<Vec<crate::model::MultipartField>>,
    ) -> Result<Response, Error> {
        let retry_config = RetryConfig {
            max_attempts: self.config.retries.max_attempts,
            initial_delay_ms: self.config.retries.initial_delay_ms,
            max_delay_ms: self.config.retries.max_delay_ms,
            backoff_multiplier: self.config.retries.backoff_multiplier,
            jitter: true,
        };
        let timeout_ms = request
            .timeout_ms
            .or(self.options.timeout_override_ms);

        let operation = || {
            let client = self.client.clone();
            let multipart = multipart.clone();
            let headers = headers.clone();
            let url = url.to_string();
            let body_text = body_text.map(String::from);
            async move {
                let mut builder = client.request(
                    reqwest::Method::from_bytes(method.as_str().as_bytes())
                        .expect("model methods are valid HTTP tokens"),
                    &url,
                );
                for (name, value) in headers.iter() {
                    builder = builder.header(name, value);
                }
                if let Some(ms) = timeout_ms {
                    builder = builder.timeout(Duration::from_millis(ms));
                }
                if let Some(fields) = multipart {
                    let mut form = reqwest::multipart::Form::new();
                    for field in fields {
                        let mut part = match field.content_type.as_deref() {
                            Some(content_type) => {
                                reqwest::multipart::Part::text(field.data.clone())
                                    .mime_str(content_type)
                                    .unwrap_or_else(|_| {
                                        reqwest::multipart::Part::text(field.data)
                                    })
                            }
                            None => reqwest::multipart::Part::text(field.data),
                        };
                        if let Some(filename) = field.filename {
                            part = part.file_name(filename);
                        }
                        form = form.part(field.name, part);
                    }
                    builder = builder.multipart(form);
                } else if let Some(text) = body_text {
                    builder = builder.body(text);
                }

                let started = Instant::now();
                let response = builder.send().await?;
                let status = response.status();
                let mut response_headers = Headers::new();
                for (name, value) in response.headers() {
                    response_headers
                        .insert(name.as_str(), value.to_str().unwrap_or_default());
                }
                let bytes = response.bytes().await?;
                Ok(Response {
                    status: status.as_u16(),
                    status_text: status.canonical_reason().unwrap_or_default().to_string(),
                    data: parse_response_data(
                        response_headers.get(crate::constants::HEADER_CONTENT_TYPE),
                        &bytes,
                    ),
                    headers: response_headers,
                    execution_time: started.elapsed(),
                })
            }
        };

        tokio::select! {
            result = execute_with_retry(&retry_config, &request.name, operation) => result,
            () = self.cancel.cancelled() => {
                Err(Error::transient_network_error("run cancelled", false))
            }
        }
    }

    /// Commits a completed request's variable updates and named response
    /// under the shared lock.
    fn commit(&self, request: &Request, response: Response) {
        let mut state = self.state.lock().expect("runner lock poisoned");

        for update in &request.variable_updates {
            if !update.is_jsonpath() {
                continue;
            }
            let Some(json) = response.data.as_json() else {
                warn!(
                    variable = %update.key,
                    "response body is not JSON; skipping variable update"
                );
                self.diagnostics.log_with(
                    crate::diagnostics::DiagnosticLevel::Warn,
                    format!(
                        "variable update '{}' skipped: response body is not JSON",
                        update.key
                    ),
                    Some("runner"),
                    None,
                );
                continue;
            };
            match crate::jsonpath::select(json, &update.source) {
                Ok(value) => {
                    let file_scope = state.chain.file;
                    state
                        .arena
                        .set(file_scope, update.key.clone(), json_to_scope_value(&value));
                }
                Err(e) => {
                    self.diagnostics.log_with(
                        crate::diagnostics::DiagnosticLevel::Warn,
                        format!("variable update '{}' failed: {e}", update.key),
                        Some("runner"),
                        None,
                    );
                }
            }
        }

        if let Some(id) = &request.request_id {
            state.store.insert(id.clone(), response);
        }
    }
}

fn failed_result(request_name: &str, message: &str) -> TestResult {
    TestResult {
        name: format!("{request_name}: request"),
        passed: false,
        error: Some(message.to_string()),
        duration: Duration::ZERO,
    }
}

/// Parses a response payload by content type: JSON into a structured value,
/// URL-encoded into a JSON object, text kinds into a string, anything
/// undecodable stays raw bytes.
fn parse_response_data(content_type: Option<&str>, bytes: &[u8]) -> ResponseData {
    let kind = BodyKind::from_content_type(content_type);
    match kind {
        BodyKind::Json => serde_json::from_slice(bytes).map_or_else(
            |_| text_or_bytes(bytes),
            ResponseData::Json,
        ),
        BodyKind::UrlEncoded => match std::str::from_utf8(bytes) {
            Ok(text) => body::parse_urlencoded(text).map_or_else(
                |_| ResponseData::Text(text.to_string()),
                |map| {
                    ResponseData::Json(serde_json::Value::Object(
                        map.into_iter()
                            .map(|(k, v)| (k, serde_json::Value::String(v)))
                            .collect(),
                    ))
                },
            ),
            Err(_) => ResponseData::Bytes(bytes.to_vec()),
        },
        BodyKind::Xml | BodyKind::Text | BodyKind::Multipart => text_or_bytes(bytes),
    }
}

fn text_or_bytes(bytes: &[u8]) -> ResponseData {
    std::str::from_utf8(bytes).map_or_else(
        |_| ResponseData::Bytes(bytes.to_vec()),
        |text| ResponseData::Text(text.to_string()),
    )
}

fn json_to_scope_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or_default()),
        serde_json::Value::Bool(b) => Value::Bool(*b),
        other => Value::String(other.to_string()),
    }
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let origin = match parsed.port() {
        Some(port) => format!("{}://{host}:{port}", parsed.scheme()),
        None => format!("{}://{host}", parsed.scheme()),
    };
    Some(origin)
}

// ── Dependency inference ────────────────────────────────────────────

/// Groups requests into dependency-ordered waves for parallel execution.
///
/// Edges come from `{{id.response.*}}` references to named requests and
/// from free variables captured by an earlier request's JSONPath updates.
/// Requests in one wave are mutually independent; a wave only starts after
/// the previous one committed its updates.
#[must_use]
pub fn dependency_waves(requests: &[Request], known_variables: &HashSet<String>) -> Vec<Vec<usize>> {
    let n = requests.len();

    let id_to_index: HashMap<&str, usize> = requests
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.request_id.as_deref().map(|id| (id, i)))
        .collect();

    let capture_to_index: HashMap<&str, usize> = requests
        .iter()
        .enumerate()
        .flat_map(|(i, r)| {
            r.variable_updates
                .iter()
                .filter(|u| u.is_jsonpath())
                .map(move |u| (u.key.as_str(), i))
        })
        .collect();

    let mut in_degree = vec![0usize; n];
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, request) in requests.iter().enumerate() {
        let mut deps: HashSet<usize> = HashSet::new();
        for name in template_names(request) {
            if let Some(id) = name.split('.').next().filter(|_| name.contains('.')) {
                if let Some(&j) = id_to_index.get(id) {
                    if j != i {
                        deps.insert(j);
                    }
                }
            } else if !known_variables.contains(&name) && !name.starts_with('$') {
                if let Some(&j) = capture_to_index.get(name.as_str()) {
                    if j != i {
                        deps.insert(j);
                    }
                }
            }
        }
        for j in deps {
            adjacency[j].push(i);
            in_degree[i] += 1;
        }
    }

    // Kahn's algorithm, grouped into waves so each level dispatches together.
    let mut waves = Vec::new();
    let mut ready: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut seen = ready.len();

    while !ready.is_empty() {
        let wave: Vec<usize> = ready.drain(..).collect();
        for &node in &wave {
            for &succ in &adjacency[node] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.push_back(succ);
                    seen += 1;
                }
            }
        }
        waves.push(wave);
    }

    if seen < n {
        // Reference cycle; fall back to strict parse order.
        return (0..n).map(|i| vec![i]).collect();
    }
    waves
}

/// All `{{name}}` tokens in a request's url, headers, body, and update
/// sources.
fn template_names(request: &Request) -> Vec<String> {
    let mut names = Vec::new();
    let mut scan = |text: &str| {
        let mut remaining = text;
        while let Some(start) = remaining.find(crate::constants::TEMPLATE_OPEN) {
            let after = &remaining[start + 2..];
            let Some(end) = after.find(crate::constants::TEMPLATE_CLOSE) else {
                break;
            };
            let name = after[..end].trim();
            if !name.is_empty() {
                names.push(name.to_string());
            }
            remaining = &after[end + 2..];
        }
    };

    scan(&request.url);
    for (name, value) in request.headers.iter() {
        scan(name);
        scan(value);
    }
    if let Some(RequestBody::Text(text)) = &request.body {
        scan(text);
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VariableUpdate;

    fn request(url: &str) -> Request {
        Request {
            url: url.to_string(),
            method: Some(Method::Get),
            ..Request::default()
        }
    }

    fn named(url: &str, id: &str) -> Request {
        Request {
            request_id: Some(id.to_string()),
            ..request(url)
        }
    }

    fn capturing(url: &str, var: &str) -> Request {
        Request {
            variable_updates: vec![VariableUpdate {
                key: var.to_string(),
                source: "$.id".to_string(),
            }],
            ..request(url)
        }
    }

    #[test]
    fn independent_requests_share_one_wave() {
        let requests = vec![request("http://x/1"), request("http://x/2")];
        let waves = dependency_waves(&requests, &HashSet::new());
        assert_eq!(waves, vec![vec![0, 1]]);
    }

    #[test]
    fn named_response_reference_creates_an_edge() {
        let requests = vec![
            named("http://x/login", "login"),
            request("http://x/users/{{login.response.body.id}}"),
        ];
        let waves = dependency_waves(&requests, &HashSet::new());
        assert_eq!(waves, vec![vec![0], vec![1]]);
    }

    #[test]
    fn free_variable_capture_creates_an_edge() {
        let requests = vec![
            capturing("http://x/create", "uid"),
            request("http://x/users/{{uid}}"),
        ];
        let waves = dependency_waves(&requests, &HashSet::new());
        assert_eq!(waves, vec![vec![0], vec![1]]);
    }

    #[test]
    fn file_scope_variables_do_not_create_edges() {
        let known: HashSet<String> = ["host".to_string()].into();
        let requests = vec![
            capturing("http://x/one", "host"),
            request("{{host}}/two"),
        ];
        let waves = dependency_waves(&requests, &known);
        assert_eq!(waves, vec![vec![0, 1]]);
    }

    #[test]
    fn dynamic_tokens_do_not_create_edges() {
        let requests = vec![
            capturing("http://x/one", "x"),
            request("http://x/{{$guid}}"),
        ];
        let waves = dependency_waves(&requests, &HashSet::new());
        assert_eq!(waves, vec![vec![0, 1]]);
    }

    #[test]
    fn diamond_dependencies_layer_into_three_waves() {
        let requests = vec![
            named("http://x/root", "root"),
            request("http://x/{{root.response.body.a}}/left"),
            request("http://x/{{root.response.body.b}}/right"),
            named("http://x/{{root.response.body.c}}", "join"),
        ];
        let waves = dependency_waves(&requests, &HashSet::new());
        assert_eq!(waves, vec![vec![0], vec![1, 2, 3]]);
    }

    #[test]
    fn origin_extraction() {
        assert_eq!(
            origin_of("http://localhost:8080/api/users?q=1"),
            Some("http://localhost:8080".to_string())
        );
        assert_eq!(
            origin_of("https://example.com/path"),
            Some("https://example.com".to_string())
        );
        assert_eq!(origin_of("{{unresolved}}/path"), None);
    }

    #[test]
    fn response_data_parsing_by_content_type() {
        let json = parse_response_data(Some("application/json"), br#"{"a": 1}"#);
        assert_eq!(json.as_json().unwrap()["a"], 1);

        let text = parse_response_data(Some("text/plain"), b"hello");
        assert_eq!(text, ResponseData::Text("hello".into()));

        let form = parse_response_data(
            Some("application/x-www-form-urlencoded"),
            b"a=1&b=two",
        );
        assert_eq!(form.as_json().unwrap()["b"], "two");

        let invalid_json = parse_response_data(Some("application/json"), b"not json");
        assert_eq!(invalid_json, ResponseData::Text("not json".into()));

        let binary = parse_response_data(Some("application/octet-stream"), &[0xff, 0xfe]);
        assert_eq!(binary, ResponseData::Bytes(vec![0xff, 0xfe]));
    }

    #[test]
    fn json_scope_value_conversion() {
        assert_eq!(
            json_to_scope_value(&serde_json::json!("x")),
            Value::String("x".into())
        );
        assert_eq!(
            json_to_scope_value(&serde_json::json!(99)),
            Value::Number(99.0)
        );
        assert_eq!(
            json_to_scope_value(&serde_json::json!(true)),
            Value::Bool(true)
        );
        assert_eq!(
            json_to_scope_value(&serde_json::json!({"a": 1})),
            Value::String("{\"a\":1}".into())
        );
    }
}
