//! etcd v2 keys API client
//!
//! Encapsulates all HTTP interactions with the cluster, with retry logic,
//! endpoint failover and error mapping.

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};
use url::Url;

use crate::core::config::ClientConfig;
use crate::core::models::{ClusterIndex, EtcdResponse, HealthStatus, Member, MemberList, VersionInfo};
use crate::core::options::{DeleteOptions, GetOptions, Params, SetOptions, WatchOptions};
use crate::errors::{ApiError, EtcdError};
use crate::utils::keys::{endpoint_url, join_key, key_url, normalize_key};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

enum Target {
    Key(String),
    Resource(&'static str),
}

struct KeysRequest {
    method: Method,
    target: Target,
    query: Params,
    form: Params,
    long_poll: bool,
}

impl KeysRequest {
    fn key(method: Method, key: &str) -> Result<Self, EtcdError> {
        Ok(Self {
            method,
            target: Target::Key(normalize_key(key)?),
            query: Params::new(),
            form: Params::new(),
            long_poll: false,
        })
    }

    fn resource(path: &'static str) -> Self {
        Self {
            method: Method::GET,
            target: Target::Resource(path),
            query: Params::new(),
            form: Params::new(),
            long_poll: false,
        }
    }

    fn query(mut self, query: Params) -> Self {
        self.query = query;
        self
    }

    fn form(mut self, form: Params) -> Self {
        self.form = form;
        self
    }

    fn long_poll(mut self) -> Self {
        self.long_poll = true;
        self
    }

    fn describe(&self) -> String {
        match &self.target {
            Target::Key(key) => format!("{} {}", self.method, key),
            Target::Resource(path) => format!("{} {}", self.method, path),
        }
    }
}

struct RawResponse {
    status: StatusCode,
    index: ClusterIndex,
    body: String,
}

/// Client for the v2 keys API of an etcd cluster.
///
/// Requests go to the active endpoint; connection failures rotate to the next
/// configured endpoint before retrying.
pub struct EtcdClient {
    endpoints: Vec<Url>,
    active: AtomicUsize,
    http: Client,
    // Long polls must outlive the ordinary request timeout.
    watch_http: Client,
    username: Option<String>,
    password: Option<String>,
    max_retries: usize,
    retry_base_ms: u64,
}

impl EtcdClient {
    /// Client for a single endpoint with default settings.
    pub fn connect(endpoint: &str) -> Result<Self, EtcdError> {
        Self::from_config(&ClientConfig::new(endpoint))
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, EtcdError> {
        let endpoints = config.parsed_endpoints()?;

        let http = Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(10)
            .build()?;
        let watch_http = Client::builder()
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .build()?;

        info!(
            "etcd client configured with {} endpoint(s): {}",
            endpoints.len(),
            config.endpoints.join(", ")
        );

        Ok(Self {
            endpoints,
            active: AtomicUsize::new(0),
            http,
            watch_http,
            username: config.username.clone(),
            password: config.password.clone(),
            max_retries: config.max_retries,
            retry_base_ms: config.retry_base_ms,
        })
    }

    #[must_use]
    pub fn endpoints(&self) -> &[Url] {
        &self.endpoints
    }

    /// Endpoint the next request will be sent to.
    #[must_use]
    pub fn active_endpoint(&self) -> &Url {
        &self.endpoints[self.active.load(Ordering::Relaxed) % self.endpoints.len()]
    }

    pub async fn get(&self, key: &str) -> Result<EtcdResponse, EtcdError> {
        self.get_with(key, &GetOptions::default()).await
    }

    pub async fn get_with(
        &self,
        key: &str,
        options: &GetOptions,
    ) -> Result<EtcdResponse, EtcdError> {
        let request = KeysRequest::key(Method::GET, key)?.query(options.query());
        self.keys_call(&request).await
    }

    /// Sorted listing of a directory.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when `dir` names a plain key.
    pub async fn list_dir(&self, dir: &str, recursive: bool) -> Result<EtcdResponse, EtcdError> {
        let options = GetOptions {
            recursive,
            sorted: true,
            quorum: false,
        };
        let response = self.get_with(dir, &options).await?;
        if !response.node.dir {
            return Err(EtcdError::InvalidRequest(format!(
                "{} is not a directory",
                response.node.key
            )));
        }
        Ok(response)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<EtcdResponse, EtcdError> {
        self.set_with(key, Some(value), &SetOptions::default()).await
    }

    pub async fn set_with(
        &self,
        key: &str,
        value: Option<&str>,
        options: &SetOptions,
    ) -> Result<EtcdResponse, EtcdError> {
        options.validate(value)?;
        let request = KeysRequest::key(Method::PUT, key)?
            .query(options.query())
            .form(options.form(value));
        self.keys_call(&request).await
    }

    /// Sets a key that expires after `ttl`, rounded up to whole seconds.
    pub async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<EtcdResponse, EtcdError> {
        self.set_with(key, Some(value), &SetOptions::with_ttl(ttl_secs(ttl)))
            .await
    }

    /// Creates a key, failing with `NodeExist` if it is already present.
    pub async fn create(&self, key: &str, value: &str) -> Result<EtcdResponse, EtcdError> {
        let options = SetOptions {
            prev_exist: Some(false),
            ..SetOptions::default()
        };
        self.set_with(key, Some(value), &options).await
    }

    /// Replaces an existing key, failing with `KeyNotFound` otherwise.
    pub async fn update(&self, key: &str, value: &str) -> Result<EtcdResponse, EtcdError> {
        let options = SetOptions {
            prev_exist: Some(true),
            ..SetOptions::default()
        };
        self.set_with(key, Some(value), &options).await
    }

    pub async fn compare_and_swap(
        &self,
        key: &str,
        value: &str,
        prev_value: Option<&str>,
        prev_index: Option<u64>,
    ) -> Result<EtcdResponse, EtcdError> {
        if prev_value.is_none() && prev_index.is_none() {
            return Err(EtcdError::InvalidRequest(
                "compare_and_swap needs a previous value or index".to_string(),
            ));
        }
        let options = SetOptions {
            prev_value: prev_value.map(ToString::to_string),
            prev_index,
            ..SetOptions::default()
        };
        self.set_with(key, Some(value), &options).await
    }

    /// Extends the TTL of an existing key without waking watchers.
    pub async fn refresh_ttl(&self, key: &str, ttl: Duration) -> Result<EtcdResponse, EtcdError> {
        let options = SetOptions {
            ttl: Some(ttl_secs(ttl)),
            prev_exist: Some(true),
            refresh: true,
            ..SetOptions::default()
        };
        self.set_with(key, None, &options).await
    }

    /// Appends `value` under `dir` with a server-assigned, increasing key.
    pub async fn create_in_order(&self, dir: &str, value: &str) -> Result<EtcdResponse, EtcdError> {
        let request = KeysRequest::key(Method::POST, dir)?
            .form(vec![("value", value.to_string())]);
        self.keys_call(&request).await
    }

    pub async fn create_dir(
        &self,
        dir: &str,
        ttl: Option<Duration>,
    ) -> Result<EtcdResponse, EtcdError> {
        let options = SetOptions {
            dir: true,
            ttl: ttl.map(ttl_secs),
            ..SetOptions::default()
        };
        self.set_with(dir, None, &options).await
    }

    pub async fn delete(&self, key: &str) -> Result<EtcdResponse, EtcdError> {
        self.delete_with(key, &DeleteOptions::default()).await
    }

    pub async fn delete_with(
        &self,
        key: &str,
        options: &DeleteOptions,
    ) -> Result<EtcdResponse, EtcdError> {
        let request = KeysRequest::key(Method::DELETE, key)?.query(options.query());
        self.keys_call(&request).await
    }

    pub async fn compare_and_delete(
        &self,
        key: &str,
        prev_value: Option<&str>,
        prev_index: Option<u64>,
    ) -> Result<EtcdResponse, EtcdError> {
        if prev_value.is_none() && prev_index.is_none() {
            return Err(EtcdError::InvalidRequest(
                "compare_and_delete needs a previous value or index".to_string(),
            ));
        }
        let options = DeleteOptions {
            prev_value: prev_value.map(ToString::to_string),
            prev_index,
            ..DeleteOptions::default()
        };
        self.delete_with(key, &options).await
    }

    pub async fn delete_dir(&self, dir: &str, recursive: bool) -> Result<EtcdResponse, EtcdError> {
        let options = DeleteOptions {
            dir: true,
            recursive,
            ..DeleteOptions::default()
        };
        self.delete_with(dir, &options).await
    }

    /// Waits for the next change of `key` (or its subtree when recursive).
    ///
    /// The long poll has no client-side timeout; wrap it with
    /// [`crate::utils::wait::with_timeout`] to bound it.
    pub async fn watch(
        &self,
        key: &str,
        options: &WatchOptions,
    ) -> Result<EtcdResponse, EtcdError> {
        let request = KeysRequest::key(Method::GET, key)?
            .query(options.query())
            .long_poll();

        loop {
            let raw = self.execute(&request).await?;
            if raw.body.trim().is_empty() {
                debug!("{} closed without an event, polling again", request.describe());
                continue;
            }
            return decode_event(raw);
        }
    }

    pub async fn version(&self) -> Result<VersionInfo, EtcdError> {
        self.resource_call("/version").await
    }

    pub async fn members(&self) -> Result<Vec<Member>, EtcdError> {
        let list: MemberList = self.resource_call("/v2/members").await?;
        Ok(list.members)
    }

    pub async fn health(&self) -> Result<HealthStatus, EtcdError> {
        self.resource_call("/health").await
    }

    /// Full key of a child entry, normalized.
    pub fn child_key(dir: &str, name: &str) -> Result<String, EtcdError> {
        join_key(dir, name)
    }

    async fn keys_call(&self, request: &KeysRequest) -> Result<EtcdResponse, EtcdError> {
        let raw = self.execute(request).await?;
        decode_event(raw)
    }

    async fn resource_call<T: DeserializeOwned>(&self, path: &'static str) -> Result<T, EtcdError> {
        let raw = self.execute(&KeysRequest::resource(path)).await?;
        Ok(serde_json::from_str(&raw.body)?)
    }

    async fn execute(&self, request: &KeysRequest) -> Result<RawResponse, EtcdError> {
        // A POST that reached the server may have been applied; only resend
        // it when the connection was never made.
        let idempotent = request.method != Method::POST;

        let strategy = ExponentialBackoff::from_millis(2)
            .factor((self.retry_base_ms / 2).max(1))
            .max_delay(MAX_RETRY_DELAY)
            .map(jitter)
            .take(self.max_retries);

        RetryIf::start(
            strategy,
            || self.attempt(request),
            |e: &EtcdError| e.is_retryable() && (idempotent || e.is_connect()),
        )
        .await
    }

    async fn attempt(&self, request: &KeysRequest) -> Result<RawResponse, EtcdError> {
        let slot = self.active.load(Ordering::Relaxed) % self.endpoints.len();
        let endpoint = &self.endpoints[slot];

        let url = match &request.target {
            Target::Key(key) => key_url(endpoint, key)?,
            Target::Resource(path) => endpoint_url(endpoint, path)?,
        };
        let client = if request.long_poll {
            &self.watch_http
        } else {
            &self.http
        };

        let mut builder = client.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }
        builder = self.authorize(builder);

        debug!("etcd request {} via {}", request.describe(), endpoint);

        let result = match builder.send().await {
            Ok(response) => read_raw(response).await.and_then(check_status),
            Err(e) => Err(EtcdError::from(e)),
        };

        if let Err(err) = &result
            && err.is_retryable()
        {
            warn!(
                "etcd request {} failed on {}: {}",
                request.describe(),
                endpoint,
                err
            );
            if err.is_connect() {
                self.rotate_from(slot);
            }
        }
        result
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    fn rotate_from(&self, slot: usize) {
        if self.endpoints.len() < 2 {
            return;
        }
        let next = (slot + 1) % self.endpoints.len();
        // Another task may have rotated already; keep its choice.
        if self
            .active
            .compare_exchange(slot, next, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            info!("Switching etcd endpoint to {}", self.endpoints[next]);
        }
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

async fn read_raw(response: Response) -> Result<RawResponse, EtcdError> {
    let status = response.status();
    let index = ClusterIndex::from_headers(response.headers());
    let body = response.text().await?;

    #[cfg(feature = "debug-logs")]
    debug!("etcd response {}: {}", status, body);

    Ok(RawResponse {
        status,
        index,
        body,
    })
}

fn check_status(raw: RawResponse) -> Result<RawResponse, EtcdError> {
    if raw.status.is_success() {
        return Ok(raw);
    }
    if let Ok(api) = serde_json::from_str::<ApiError>(&raw.body) {
        return Err(EtcdError::Api(api));
    }
    Err(EtcdError::UnexpectedStatus {
        status: raw.status.as_u16(),
        body: raw.body,
    })
}

fn decode_event(raw: RawResponse) -> Result<EtcdResponse, EtcdError> {
    let mut response: EtcdResponse = serde_json::from_str(&raw.body)?;
    response.index = raw.index;
    Ok(response)
}
