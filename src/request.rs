//! The fluent request builder and its execute loop: the piece that ties
//! rate limiting, circuit breaking, backoff, auth, and hooks into one
//! retrying call.

use std::{collections::HashSet, sync::Arc, time::Duration, time::Instant};

use reqwest::{
    Method,
    header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue},
};
use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::{
    Result,
    auth::{AuthScheme, OAuth2Config, OAuth2State, run_oauth2_flow},
    backoff::{BackoffMode, BackoffPolicy, RetryAfter, parse_retry_after},
    breaker::CircuitBreaker,
    downloader::{self, DownloadOutcome},
    error::RuntimeError,
    files::{FileInput, FileBody, normalize as normalize_files},
    hooks::{HookBus, HookCallback, HookEvent, HookPayload},
    metrics::RuntimeMetrics,
    rate_limiter::RateLimiter,
    response::{ResponseEnvelope, is_unauthenticated},
    sse::SseHandle,
    validation::{validate_method, validate_url},
};

/// Transport-level failures (connection refused, timed out, reset) only
/// retry for methods whose repetition can't double-apply a side effect.
fn is_idempotent_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS
    )
}

/// A synchronous pre-flight check run before each attempt. An `Err` becomes
/// code 597 ("dependency raised"); `Ok(false)` becomes code 596 ("dependency
/// returned falsy").
pub type Dependency = Arc<dyn Fn() -> Result<bool> + Send + Sync>;

/// The fluent, cloneable request object. One instance is consumed by one
/// `execute()` call at a time; `clone()` shares no live rate-limiter/breaker
/// state with the original (see their own `Clone` impls) but does share the
/// underlying `reqwest::Client` connection pool.
#[derive(Clone)]
pub struct RequestCore {
    http: reqwest::Client,
    base_url: String,
    endpoint: String,
    method: Option<Method>,
    params: Map<String, Value>,
    data: Map<String, Value>,
    headers: HeaderMap,
    files: Vec<FileInput>,
    chunked_files: bool,
    dependencies: Vec<Dependency>,
    retry_codes: HashSet<u16>,
    max_retries: u32,
    backoff: BackoffPolicy,
    rate_limiter: Option<RateLimiter>,
    breaker: Option<CircuitBreaker>,
    auth: AuthScheme,
    oauth: Option<OAuth2State>,
    hooks: HookBus,
    handle_errors: bool,
    graphql: Option<GraphQl>,
    metrics: Arc<RuntimeMetrics>,
}

#[derive(Clone)]
struct GraphQl {
    query: String,
    variables: Value,
}

impl RequestCore {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let mut retry_codes = HashSet::new();
        for code in [408, 425, 429, 500, 502, 503, 504] {
            retry_codes.insert(code);
        }
        Self {
            http,
            base_url: base_url.into(),
            endpoint: String::new(),
            method: None,
            params: Map::new(),
            data: Map::new(),
            headers: HeaderMap::new(),
            files: Vec::new(),
            chunked_files: false,
            dependencies: Vec::new(),
            retry_codes,
            max_retries: 3,
            backoff: BackoffPolicy::new(Duration::from_millis(250), Duration::from_secs(30), BackoffMode::Exponential),
            rate_limiter: None,
            breaker: None,
            auth: AuthScheme::None,
            oauth: None,
            hooks: HookBus::new(),
            handle_errors: false,
            graphql: None,
            metrics: Arc::new(RuntimeMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<RuntimeMetrics> {
        self.metrics.clone()
    }

    #[cfg(test)]
    pub(crate) fn param_snapshot(&self) -> &Map<String, Value> {
        &self.params
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| RuntimeError::other(format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| RuntimeError::other(format!("invalid header value: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn files(mut self, files: impl IntoIterator<Item = FileInput>, chunked: bool) -> Self {
        self.files.extend(files);
        self.chunked_files = chunked;
        self
    }

    pub fn dependency(mut self, check: Dependency) -> Self {
        self.dependencies.push(check);
        self
    }

    pub fn retry_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retry_codes = codes.into_iter().collect();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = policy;
        self
    }

    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn auth(mut self, scheme: AuthScheme) -> Self {
        self.auth = scheme;
        self
    }

    pub fn oauth2(mut self, config: OAuth2Config) -> Self {
        self.oauth = Some(OAuth2State::new(config));
        self
    }

    pub fn handle_errors(mut self, handle: bool) -> Self {
        self.handle_errors = handle;
        self
    }

    pub fn graphql(mut self, query: impl Into<String>, variables: Value) -> Self {
        self.graphql = Some(GraphQl {
            query: query.into(),
            variables,
        });
        self
    }

    pub fn on(mut self, event: HookEvent, callback: HookCallback) -> Self {
        self.hooks.on(event, callback);
        self
    }

    fn resolve_method_url(&self) -> Result<(Method, String)> {
        let method = self.method.clone().unwrap_or_else(|| {
            if self.files.is_empty() {
                Method::GET
            } else {
                Method::POST
            }
        });
        let url = if self.endpoint.starts_with("http") {
            self.endpoint.clone()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                self.endpoint.trim_start_matches('/')
            )
        };
        validate_method(&method)?;
        validate_url(&url)?;
        Ok((method, url))
    }

    async fn ensure_fresh_oauth(&mut self) -> Result<()> {
        let Some(state) = self.oauth.clone() else {
            return Ok(());
        };
        if !state.is_expired() {
            return Ok(());
        }
        let token = run_oauth2_flow(&self.http, &self.base_url, &state.config).await?;
        self.auth = AuthScheme::bearer(token.authorization.trim_start_matches("Bearer ").to_string());
        if let Some(oauth) = self.oauth.as_mut() {
            oauth.expiry = token
                .expires_in
                .map(|d| std::time::SystemTime::now() + d);
        }
        Ok(())
    }

    fn assemble_headers(&self) -> Result<HeaderMap> {
        let mut headers = self.headers.clone();
        self.auth.apply(&mut headers)?;
        Ok(headers)
    }

    fn log_redacted(headers: &HeaderMap) {
        if !tracing::enabled!(tracing::Level::TRACE) {
            return;
        }
        for (name, value) in headers {
            if name == AUTHORIZATION {
                trace!(header = %name, value = "<redacted>", "request header");
            } else {
                trace!(header = %name, value = ?value, "request header");
            }
        }
    }

    /// Runs the execute loop described in the component design for
    /// `RequestCore`: circuit breaker, rate limiter, dependencies, transport,
    /// classification, retry/backoff, and hooks, in that order each attempt.
    pub async fn execute(&mut self) -> Result<ResponseEnvelope> {
        self.ensure_fresh_oauth().await?;
        let (method, url) = self.resolve_method_url()?;

        self.hooks.dispatch(
            HookEvent::Before,
            HookPayload::Request {
                method: method.to_string(),
                url: url.clone(),
            },
        );
        self.metrics.inc_total_requests();
        self.backoff.reset();

        let mut attempt: u32 = 0;
        loop {
            if let Some(breaker) = &self.breaker {
                if !breaker.allowed() {
                    let envelope = ResponseEnvelope::synthetic(
                        598,
                        method.clone(),
                        url.clone(),
                        "circuit breaker open",
                        self.handle_errors,
                    );
                    return self.finish(envelope, true);
                }
            }

            if attempt > 0 {
                self.hooks.dispatch(
                    HookEvent::Retry,
                    HookPayload::Request {
                        method: method.to_string(),
                        url: url.clone(),
                    },
                );
                self.metrics.inc_retries();
            }

            if let Some(limiter) = &self.rate_limiter {
                if !limiter.allow(&self.endpoint, &method) {
                    self.metrics.inc_rate_limit_waits();
                    let envelope = ResponseEnvelope::synthetic(
                        429,
                        method.clone(),
                        url.clone(),
                        "rate limit exceeded",
                        self.handle_errors,
                    );
                    return self.finish(envelope, false);
                }
            }

            for dependency in &self.dependencies {
                match dependency() {
                    Ok(true) => {}
                    Ok(false) => {
                        let envelope = ResponseEnvelope::synthetic(
                            596,
                            method.clone(),
                            url.clone(),
                            "dependency check returned false",
                            self.handle_errors,
                        );
                        return self.finish(envelope, false);
                    }
                    Err(e) => {
                        let envelope = ResponseEnvelope::synthetic(
                            597,
                            method.clone(),
                            url.clone(),
                            format!("dependency check raised: {e}"),
                            self.handle_errors,
                        );
                        return self.finish(envelope, false);
                    }
                }
            }

            let headers = self.assemble_headers()?;
            Self::log_redacted(&headers);

            let started = Instant::now();
            let outcome = self.dispatch_once(&method, &url, headers).await;
            let elapsed = started.elapsed();

            match outcome {
                Ok((envelope, retry_after_header)) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.update(true);
                    }
                    self.metrics.inc_successful_responses();

                    let retry_after = envelope
                        .json
                        .get("retry_after")
                        .and_then(Value::as_str)
                        .and_then(parse_retry_after)
                        .or_else(|| retry_after_header.as_deref().and_then(parse_retry_after));

                    let prefix: String = envelope.text.chars().take(200).collect();
                    if is_unauthenticated(envelope.status, &prefix)
                        && self.oauth.is_some()
                        && attempt < self.max_retries
                    {
                        attempt += 1;
                        self.ensure_force_oauth_refresh();
                        self.ensure_fresh_oauth().await?;
                        continue;
                    }

                    if self.retry_codes.contains(&envelope.status) && attempt < self.max_retries {
                        let wait = self.backoff.delay(attempt, retry_after);
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                        continue;
                    }

                    return self.finish(envelope, false).map(|mut e| {
                        e.request_time = elapsed;
                        e.total_time = elapsed;
                        e
                    });
                }
                Err(_transport_err) => {
                    if let Some(breaker) = &self.breaker {
                        breaker.update(false);
                    }
                    self.metrics.inc_errors();

                    if attempt < self.max_retries && is_idempotent_method(&method) {
                        let wait = self.backoff.delay(attempt, None);
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                        continue;
                    }

                    let envelope = ResponseEnvelope::synthetic(
                        599,
                        method.clone(),
                        url.clone(),
                        "transport exception",
                        self.handle_errors,
                    );
                    return self.finish(envelope, true);
                }
            }
        }
    }

    /// Forces the next `ensure_fresh_oauth` call to refresh, bounding the
    /// unauth-triggered refresh to once per attempt (the original call is
    /// never retried more than `max_retries` times regardless).
    fn ensure_force_oauth_refresh(&mut self) {
        if let Some(oauth) = self.oauth.as_mut() {
            oauth.expiry = None;
        }
    }

    async fn dispatch_once(
        &self,
        method: &Method,
        url: &str,
        headers: HeaderMap,
    ) -> Result<(ResponseEnvelope, Option<String>)> {
        let mut builder = self.http.request(method.clone(), url).headers(headers);

        if let Some(graphql) = &self.graphql {
            let mut body = Map::new();
            body.insert("query".to_string(), Value::String(graphql.query.clone()));
            body.insert("variables".to_string(), graphql.variables.clone());
            builder = builder.json(&Value::Object(body));
        } else if !self.files.is_empty() {
            let parts = normalize_files(self.files.clone(), self.chunked_files)?;
            let mut form = reqwest::multipart::Form::new();
            for (key, value) in &self.data {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                form = form.text(key.clone(), text);
            }
            for part in parts {
                let reqwest_part = match part.body {
                    FileBody::Bytes(bytes) => reqwest::multipart::Part::bytes(bytes.to_vec())
                        .file_name(part.filename.clone())
                        .mime_str(&part.content_type)
                        .map_err(|e| RuntimeError::other(format!("invalid mime: {e}")))?,
                    FileBody::Path(path) => {
                        let data = std::fs::read(&path).map_err(|source| RuntimeError::Io {
                            path: path.clone(),
                            source,
                        })?;
                        reqwest::multipart::Part::bytes(data)
                            .file_name(part.filename.clone())
                            .mime_str(&part.content_type)
                            .map_err(|e| RuntimeError::other(format!("invalid mime: {e}")))?
                    }
                };
                form = form.part(part.name.clone(), reqwest_part);
            }
            builder = builder.multipart(form);
        } else if matches!(*method, Method::GET | Method::DELETE) {
            if !self.params.is_empty() {
                builder = builder.query(&self.params);
            }
        } else if !self.data.is_empty() {
            builder = builder.json(&self.data);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| RuntimeError::Transport {
                method: method.to_string(),
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let retry_after = headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|source| RuntimeError::Transport {
                method: method.to_string(),
                url: url.to_string(),
                source,
            })?;

        self.metrics.add_bytes_received(bytes.len() as u64);

        let envelope = ResponseEnvelope::from_parts(
            status,
            url.to_string(),
            method.clone(),
            &headers,
            bytes,
            Duration::ZERO,
            Duration::ZERO,
            self.handle_errors,
        );
        Ok((envelope, retry_after))
    }

    fn finish(&self, envelope: ResponseEnvelope, breaker_denied: bool) -> Result<ResponseEnvelope> {
        if envelope.ok {
            self.hooks.dispatch(HookEvent::After, HookPayload::Response(Box::new(envelope.clone())));
            self.hooks.dispatch(HookEvent::Success, HookPayload::Response(Box::new(envelope.clone())));
            return Ok(envelope);
        }

        if envelope.handled {
            self.hooks.dispatch(HookEvent::Error, HookPayload::Response(Box::new(envelope.clone())));
            self.hooks.dispatch(HookEvent::After, HookPayload::Response(Box::new(envelope.clone())));
            return Ok(envelope);
        }

        self.hooks.dispatch(HookEvent::Error, HookPayload::Response(Box::new(envelope.clone())));
        if !breaker_denied {
            self.hooks.dispatch(HookEvent::After, HookPayload::Response(Box::new(envelope.clone())));
        }

        let kind = envelope.kind.unwrap_or(crate::error::ErrorKind::Unexpected);
        Err(RuntimeError::Response {
            kind,
            status: envelope.status,
            method: envelope.method.to_string(),
            url: envelope.url,
            message: envelope.message,
        })
    }

    /// Resumable, ranged download to `dest`. Bypasses the retry loop: a
    /// download attempt either completes or fails outright, since partial
    /// progress is already on disk and the next call (with `resume: true`)
    /// picks up where it left off.
    pub async fn download(&mut self, dest: impl AsRef<std::path::Path>, resume: bool) -> Result<DownloadOutcome> {
        self.ensure_fresh_oauth().await?;
        let (method, url) = self.resolve_method_url()?;
        let headers = self.assemble_headers()?;
        Self::log_redacted(&headers);

        self.hooks.dispatch(
            HookEvent::Before,
            HookPayload::Request {
                method: method.to_string(),
                url: url.clone(),
            },
        );

        let outcome = downloader::download(&self.http, method, &url, headers, dest.as_ref(), resume, &self.hooks).await?;
        Ok(outcome)
    }

    /// Opens a server-sent-event stream against the resolved endpoint.
    /// Bypasses the retry loop: a dropped connection mid-stream surfaces as
    /// `None` from [`SseHandle::next_events`] rather than a silent retry.
    pub async fn stream(&mut self) -> Result<SseHandle> {
        self.ensure_fresh_oauth().await?;
        let (method, url) = self.resolve_method_url()?;
        let headers = self.assemble_headers()?;
        Self::log_redacted(&headers);

        self.hooks.dispatch(
            HookEvent::Before,
            HookPayload::Request {
                method: method.to_string(),
                url: url.clone(),
            },
        );

        let mut builder = self.http.request(method.clone(), &url).headers(headers);
        if !self.params.is_empty() {
            builder = builder.query(&self.params);
        }
        let response = builder.send().await.map_err(|source| RuntimeError::Transport {
            method: method.to_string(),
            url: url.clone(),
            source,
        })?;

        Ok(SseHandle::new(response, self.hooks.clone()))
    }
}

/// An immutable path-prefix surface: attribute access via [`Resource::path`]
/// appends a segment; verb helpers invoke the underlying [`RequestCore`].
#[derive(Clone)]
pub struct Resource {
    core: RequestCore,
    segments: Vec<String>,
}

impl Resource {
    pub fn new(core: RequestCore) -> Self {
        Self {
            core,
            segments: Vec::new(),
        }
    }

    pub fn path(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self {
            core: self.core.clone(),
            segments,
        }
    }

    fn joined(&self) -> String {
        self.segments.join("/")
    }

    fn core_for(&self, method: Method) -> RequestCore {
        self.core.clone().endpoint(self.joined()).method(method)
    }

    /// Escape hatch for verbs this surface doesn't tag directly: a
    /// `RequestCore` pre-bound to this resource's joined path and `method`.
    pub fn call(&self, method: Method) -> RequestCore {
        self.core_for(method)
    }

    pub async fn list(&self) -> Result<ResponseEnvelope> {
        self.core_for(Method::GET).execute().await
    }

    /// Like `list`, but with query parameters narrowing the result set.
    pub async fn find(&self, params: Map<String, Value>) -> Result<ResponseEnvelope> {
        let mut core = self.core_for(Method::GET);
        for (k, v) in params {
            core = core.param(k, v);
        }
        core.execute().await
    }

    pub async fn get(&self, id: impl std::fmt::Display) -> Result<ResponseEnvelope> {
        self.path(id.to_string()).core_for(Method::GET).execute().await
    }

    pub async fn create(&self, body: Map<String, Value>) -> Result<ResponseEnvelope> {
        let mut core = self.core_for(Method::POST);
        for (k, v) in body {
            core = core.data(k, v);
        }
        core.execute().await
    }

    /// Alias for `create`, for APIs that distinguish the two verbs in name
    /// only.
    pub async fn add(&self, body: Map<String, Value>) -> Result<ResponseEnvelope> {
        self.create(body).await
    }

    pub async fn update(&self, id: impl std::fmt::Display, body: Map<String, Value>) -> Result<ResponseEnvelope> {
        let mut core = self.path(id.to_string()).core_for(Method::PATCH);
        for (k, v) in body {
            core = core.data(k, v);
        }
        core.execute().await
    }

    /// Alias for `update`.
    pub async fn patch(&self, id: impl std::fmt::Display, body: Map<String, Value>) -> Result<ResponseEnvelope> {
        self.update(id, body).await
    }

    pub async fn delete(&self, id: impl std::fmt::Display) -> Result<ResponseEnvelope> {
        self.path(id.to_string()).core_for(Method::DELETE).execute().await
    }

    /// Alias for `delete`.
    pub async fn destroy(&self, id: impl std::fmt::Display) -> Result<ResponseEnvelope> {
        self.delete(id).await
    }

    /// Alias for `delete`.
    pub async fn remove(&self, id: impl std::fmt::Display) -> Result<ResponseEnvelope> {
        self.delete(id).await
    }

    /// Resumable ranged download of `id` to `dest`.
    pub async fn download(
        &self,
        id: impl std::fmt::Display,
        dest: impl AsRef<std::path::Path>,
        resume: bool,
    ) -> Result<DownloadOutcome> {
        self.path(id.to_string())
            .core_for(Method::GET)
            .download(dest, resume)
            .await
    }

    /// Multipart upload of `files` to this resource's joined path.
    pub async fn upload(
        &self,
        files: impl IntoIterator<Item = FileInput>,
        chunked: bool,
    ) -> Result<ResponseEnvelope> {
        self.core_for(Method::POST).files(files, chunked).execute().await
    }
}

/// A blocking-mode wrapper sharing the same async `execute()` logic via
/// `Handle::block_on`, so retry/classification behavior is never duplicated
/// between blocking and cooperative callers.
pub struct BlockingRequestCore {
    handle: tokio::runtime::Handle,
    core: RequestCore,
}

impl BlockingRequestCore {
    pub fn new(handle: tokio::runtime::Handle, core: RequestCore) -> Self {
        Self { handle, core }
    }

    pub fn execute(&mut self) -> Result<ResponseEnvelope> {
        self.handle.block_on(self.core.execute())
    }
}
