//! Call executor
//!
//! Drives one logical generation call: endpoint selection, per-attempt
//! request building, HTTP execution, response parsing, async-task polling and
//! artifact download. Retryable failures advance through the selection plan
//! with backoff; fatal failures surface immediately. Backoff and polling
//! sleep on the tokio timer, so sibling tasks keep running.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::account::AccountService;
use crate::config::{ConfigResolver, ConfigSnapshot, ResolvedConfig};
use crate::error::{Error, classify_http_status};
use crate::request::{self, AuthContext, AuthMaterial, BuiltRequest, RequestBody};
use crate::response::{self, ParsedResponse};
use crate::retry::RetryPolicy;
use crate::selection::{EndpointSelector, SelectionMode};
use crate::types::{Artifact, ArtifactData, GenerationTask, ItemSuccess};

/// Minimal HTTP response view the executor needs.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Transport seam between the executor and the network.
///
/// The default implementation wraps `reqwest`; tests drive the executor with
/// scripted responses instead of sockets.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Execute a built generation request (always POST).
    async fn execute(&self, request: &BuiltRequest) -> Result<HttpResponse, Error>;

    /// Plain GET used for task polling.
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpResponse, Error>;

    /// Fetch raw bytes, used for downloading URL-referenced artifacts.
    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, Error>;
}

/// `reqwest`-backed transport.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn map_error(e: reqwest::Error, timeout: Duration) -> Error {
        if e.is_timeout() {
            Error::Timeout(timeout)
        } else {
            Error::Transport(e.to_string())
        }
    }

    async fn read_response(
        response: reqwest::Response,
        timeout: Duration,
    ) -> Result<HttpResponse, Error> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Self::map_error(e, timeout))?;
        Ok(HttpResponse { status, body })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &BuiltRequest) -> Result<HttpResponse, Error> {
        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        builder = match &request.body {
            RequestBody::Json(payload) => builder.json(payload),
            RequestBody::Multipart { fields, files } => {
                let mut form = reqwest::multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                for file in files {
                    let part = reqwest::multipart::Part::bytes(file.bytes.clone())
                        .file_name(file.filename.clone())
                        .mime_str(&file.mime)
                        .map_err(|e| Error::Build(format!("invalid asset MIME type: {e}")))?;
                    form = form.part(file.field.clone(), part);
                }
                builder.multipart(form)
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_error(e, request.timeout))?;
        Self::read_response(response, request.timeout).await
    }

    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpResponse, Error> {
        let mut builder = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| Self::map_error(e, timeout))?;
        Self::read_response(response, timeout).await
    }

    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, Error> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::map_error(e, timeout))?;
        if !response.status().is_success() {
            return Err(Error::api_error(
                response.status().as_u16(),
                format!("artifact download failed for {url}"),
            ));
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| Self::map_error(e, timeout))
    }
}

/// Executes one logical call across the selected endpoint(s).
pub struct CallExecutor {
    transport: Arc<dyn HttpTransport>,
    selector: Arc<EndpointSelector>,
    policy: RetryPolicy,
    account: Option<Arc<dyn AccountService>>,
    /// Replace URL artifacts with their downloaded bytes when possible.
    download_artifacts: bool,
    poll_interval: Duration,
    download_timeout: Duration,
}

impl CallExecutor {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        selector: Arc<EndpointSelector>,
        policy: RetryPolicy,
        account: Option<Arc<dyn AccountService>>,
    ) -> Self {
        Self {
            transport,
            selector,
            policy,
            account,
            download_artifacts: true,
            poll_interval: Duration::from_secs(2),
            download_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_download_artifacts(mut self, download: bool) -> Self {
        self.download_artifacts = download;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Execute one task to completion or a final (fatal) failure.
    pub async fn execute(
        &self,
        snapshot: &ConfigSnapshot,
        task: &GenerationTask,
        selection: &SelectionMode,
    ) -> Result<ItemSuccess, Error> {
        let plan = self.selector.plan(snapshot, &task.model, selection)?;
        let cap = if plan.advance_on_failure {
            plan.endpoints.len().min(self.policy.max_attempts.max(1) as usize)
        } else {
            1
        };

        let mut attempts: u32 = 0;
        let mut last_error: Option<Error> = None;

        for (i, endpoint) in plan.endpoints.iter().take(cap).enumerate() {
            let resolved =
                match ConfigResolver::resolve(snapshot, &task.model, task.mode, endpoint) {
                    Ok(resolved) => resolved,
                    Err(e) if plan.advance_on_failure && i + 1 < cap => {
                        // A misconfigured backup endpoint must not sink the
                        // call while alternatives remain.
                        tracing::warn!(
                            model = %task.model,
                            endpoint = endpoint.name(),
                            error = %e,
                            "skipping unresolvable endpoint"
                        );
                        last_error = Some(e);
                        continue;
                    }
                    Err(e) => return Err(e),
                };

            attempts += 1;
            tracing::debug!(
                model = %task.model,
                batch_index = task.batch_index,
                endpoint = %resolved.endpoint_name,
                attempt = attempts,
                "dispatching generation attempt"
            );

            match self
                .attempt(snapshot, &resolved, task)
                .await
            {
                Ok(artifacts) => {
                    return Ok(ItemSuccess {
                        artifacts,
                        provider: resolved.provider,
                        attempts,
                    });
                }
                Err(e) if self.policy.should_retry(&e) && plan.advance_on_failure => {
                    tracing::warn!(
                        model = %task.model,
                        endpoint = %resolved.endpoint_name,
                        attempt = attempts,
                        error = %e,
                        "attempt failed, advancing selection"
                    );
                    last_error = Some(e);
                    if i + 1 < cap {
                        tokio::time::sleep(self.policy.calculate_delay(i as u32)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        if let Some(e) = &last_error {
            tracing::error!(model = %task.model, error = %e, "endpoint list exhausted");
        }
        Err(Error::ExhaustedEndpoints {
            model: task.model.clone(),
            attempts,
        })
    }

    /// One attempt against one resolved endpoint.
    async fn attempt(
        &self,
        snapshot: &ConfigSnapshot,
        resolved: &ResolvedConfig,
        task: &GenerationTask,
    ) -> Result<Vec<Artifact>, Error> {
        let auth = self.auth_context(snapshot, resolved, task).await?;
        let request = request::build(resolved, task, &auth)?;
        let response = self.transport.execute(&request).await?;

        if !(200..300).contains(&response.status) {
            return Err(classify_http_status(
                &resolved.provider,
                response.status,
                &response.body,
            ));
        }

        let artifacts = match response::parse(resolved, &response.body)? {
            ParsedResponse::Artifacts(artifacts) => artifacts,
            ParsedResponse::PendingTask { task_id } => {
                tracing::debug!(task_id = %task_id, "generation accepted, polling for result");
                self.poll(resolved, &auth, &task_id).await?
            }
        };

        if self.download_artifacts {
            Ok(self.materialize(artifacts).await)
        } else {
            Ok(artifacts)
        }
    }

    async fn auth_context(
        &self,
        snapshot: &ConfigSnapshot,
        resolved: &ResolvedConfig,
        task: &GenerationTask,
    ) -> Result<AuthContext, Error> {
        use crate::types::AuthType;
        match resolved.auth_type {
            AuthType::Bearer => Ok(AuthContext::bearer(resolved.api_key.clone())),
            AuthType::QueryKey => Ok(AuthContext {
                material: AuthMaterial::Query(resolved.api_key.clone()),
                model_override: None,
            }),
            AuthType::Account => {
                let account = self.account.as_ref().ok_or_else(|| {
                    Error::Config(
                        "endpoint requires account auth but no account service is installed"
                            .to_string(),
                    )
                })?;
                let token = account.session_token().await?;
                let model_id = account
                    .resolve_model_id(&task.model, &snapshot.settings().pricing_strategy)
                    .await?;
                Ok(AuthContext {
                    material: AuthMaterial::Session(token),
                    model_override: Some(model_id),
                })
            }
        }
    }

    /// Poll an async task until success, upstream failure, or deadline.
    async fn poll(
        &self,
        resolved: &ResolvedConfig,
        auth: &AuthContext,
        task_id: &str,
    ) -> Result<Vec<Artifact>, Error> {
        let path = resolved.polling_endpoint.replace("{task_id}", task_id);
        let mut url = format!("{}{}", resolved.base_url, path);
        let mut headers = Vec::new();
        auth.apply(&mut url, &mut headers);

        let deadline = Instant::now() + resolved.timeout;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            if Instant::now() >= deadline {
                return Err(Error::Timeout(resolved.timeout));
            }

            let response = match self
                .transport
                .get(&url, &headers, Duration::from_secs(30))
                .await
            {
                Ok(response) => response,
                Err(e) if e.is_retryable() => {
                    tracing::warn!(task_id, error = %e, "polling request failed, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if response.status != 200 {
                continue;
            }
            let Ok(data) = serde_json::from_str::<serde_json::Value>(&response.body) else {
                continue;
            };

            let status = response::nested_value(&data, &resolved.status_path)
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default();
            tracing::debug!(task_id, status = %status, "poll status");

            if status == resolved.success_value {
                return response::parse_polled(resolved, &data);
            }
            if matches!(status.as_str(), "FAILURE" | "FAILED" | "ERROR") {
                return Err(Error::UpstreamRejected(format!(
                    "async task {task_id} failed with status {status}"
                )));
            }
        }
    }

    /// Download URL artifacts into inline bytes. Failed downloads keep the
    /// URL form rather than dropping the artifact.
    async fn materialize(&self, artifacts: Vec<Artifact>) -> Vec<Artifact> {
        let mut out = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            match &artifact.data {
                ArtifactData::Url(url) => match self.download(url).await {
                    Ok(bytes) => out.push(Artifact {
                        data: ArtifactData::Inline(bytes),
                        mime: artifact.mime.clone(),
                    }),
                    Err(e) => {
                        tracing::warn!(url = %url, error = %e, "artifact download failed, keeping URL");
                        out.push(artifact);
                    }
                },
                ArtifactData::Inline(_) => out.push(artifact),
            }
        }
        out
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, Error> {
        const DOWNLOAD_RETRIES: u32 = 3;
        let mut last = None;
        for attempt in 0..DOWNLOAD_RETRIES {
            match self.transport.fetch_bytes(url, self.download_timeout).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    tracing::warn!(url, attempt, error = %e, "download attempt failed");
                    last = Some(e);
                    if attempt + 1 < DOWNLOAD_RETRIES {
                        tokio::time::sleep(Duration::from_secs(2 * (attempt as u64 + 1))).await;
                    }
                }
            }
        }
        Err(last.unwrap_or_else(|| Error::Internal("download failed without error".to_string())))
    }
}
