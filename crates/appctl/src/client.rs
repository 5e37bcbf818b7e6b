//! Control plane API client
//!
//! HTTP adapter between the v3-style control plane API and the platform
//! traits of `appctl-core`. Request warnings arrive in the
//! `X-Cf-Warnings` response header as comma-separated, percent-encoded
//! strings and are handed back alongside every result.

use std::time::Duration;

use appctl_core::{
    AppLifecycle, AppRef, AppState, CoreError, Deployment, DeploymentRequest, DropletRef,
    InstanceSource, InstanceState, JobError, JobFetcher, JobRef, JobSnapshot, JobStatus,
    PackageRef, Process, ProcessInstance, Result, RolloutStep, Stager, Warnings,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, trace};
use url::Url;

/// User agent string for appctl HTTP requests
const APPCTL_USER_AGENT: &str = concat!("appctl/", env!("CARGO_PKG_VERSION"));

const WARNINGS_HEADER: &str = "X-Cf-Warnings";

#[derive(Debug, Clone)]
pub struct ControlPlaneClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
    polling_interval: Duration,
}

impl ControlPlaneClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| CoreError::Transport(format!(
            "invalid API endpoint '{}': {}",
            base_url, e
        )))?;
        let http = Client::builder()
            .user_agent(APPCTL_USER_AGENT)
            .build()
            .map_err(|e| CoreError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            token,
            polling_interval: appctl_core::timeouts::DEFAULT_POLLING_INTERVAL,
        })
    }

    /// Interval between two staging polls
    #[must_use]
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    fn url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path).map_err(|e| CoreError::UnexpectedResponse(e.to_string()));
        }
        self.base_url
            .join(path)
            .map_err(|e| CoreError::UnexpectedResponse(e.to_string()))
    }

    /// A job reference is either a full URL, a path, or a bare GUID
    fn job_url(&self, job: &JobRef) -> Result<Url> {
        let reference = job.as_str();
        if reference.contains('/') {
            self.url(reference)
        } else {
            self.url(&format!("/v3/jobs/{}", reference))
        }
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.http.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<(Response, Warnings)> {
        let response = request
            .send()
            .await
            .map_err(|e| CoreError::Transport(e.to_string()))?;
        let warnings = warnings_from(&response);
        let status = response.status();
        trace!(url = %response.url(), %status, "Response received");

        if status.is_success() {
            return Ok((response, warnings));
        }

        let body = response.text().await.unwrap_or_default();
        Err(api_error(status, &body))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<(T, Warnings)> {
        let url = self.url(path)?;
        debug!(%url, "GET");
        let (response, warnings) = self.send(self.request(Method::GET, url)).await?;
        Ok((decode(response).await?, warnings))
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<(T, Warnings)> {
        let url = self.url(path)?;
        debug!(%url, "POST");
        let (response, warnings) = self
            .send(self.request(Method::POST, url).json(body))
            .await?;
        Ok((decode(response).await?, warnings))
    }

    async fn post_action(&self, path: &str) -> Result<Warnings> {
        let url = self.url(path)?;
        debug!(%url, "POST");
        let (_, warnings) = self.send(self.request(Method::POST, url)).await?;
        Ok(warnings)
    }

    pub async fn get_app(&self, guid: &str) -> Result<(AppRef, Warnings)> {
        let (app, warnings): (AppResource, _) = self.get_json(&format!("/v3/apps/{}", guid)).await?;
        let state = if app.state.eq_ignore_ascii_case("STARTED") {
            AppState::Started
        } else {
            AppState::Stopped
        };
        Ok((AppRef::new(app.guid, app.name, state), warnings))
    }

    /// Issue a DELETE that may be accepted as an asynchronous job
    ///
    /// `202 Accepted` carries the job in its `Location` header; any other
    /// success means the deletion already happened.
    pub async fn delete_async(&self, path: &str) -> Result<(Option<JobRef>, Warnings)> {
        let url = self.url(path)?;
        debug!(%url, "DELETE");
        let (response, warnings) = self.send(self.request(Method::DELETE, url)).await?;

        if response.status() != StatusCode::ACCEPTED {
            return Ok((None, warnings));
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                CoreError::UnexpectedResponse("202 Accepted without a Location header".to_string())
            })?;
        Ok((Some(JobRef::new(location)), warnings))
    }

    async fn current_droplet(&self, app: &AppRef) -> Result<(Option<DropletResource>, Warnings)> {
        match self
            .get_json::<DropletResource>(&format!("/v3/apps/{}/droplets/current", app.guid))
            .await
        {
            Ok((droplet, warnings)) => Ok((Some(droplet), warnings)),
            Err(CoreError::Api { status: 404, .. }) => Ok((None, Warnings::new())),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl JobFetcher for ControlPlaneClient {
    async fn fetch_job(&self, job: &JobRef) -> Result<JobSnapshot> {
        let url = self.job_url(job)?;
        debug!(%url, "GET");
        let (response, _) = self.send(self.request(Method::GET, url)).await?;
        let resource: JobResource = decode(response).await?;

        Ok(JobSnapshot {
            status: resource.state.parse::<JobStatus>()?,
            warnings: resource.warnings.into_iter().map(|w| w.detail).collect(),
            errors: resource.errors,
        })
    }
}

#[async_trait]
impl Stager for ControlPlaneClient {
    async fn unstaged_package(&self, app: &AppRef) -> Result<(Option<PackageRef>, Warnings)> {
        let (packages, mut warnings): (ListResponse<PackageResource>, _) = self
            .get_json(&format!(
                "/v3/packages?app_guids={}&order_by=-created_at&per_page=1",
                urlencoding::encode(&app.guid)
            ))
            .await?;

        let Some(newest) = packages.resources.into_iter().next() else {
            return Ok((None, warnings));
        };
        if !newest.state.eq_ignore_ascii_case("READY") {
            debug!(package = %newest.guid, state = %newest.state, "Newest package is not ready");
            return Ok((None, warnings));
        }

        let (droplet, droplet_warnings) = self.current_droplet(app).await?;
        warnings.extend(droplet_warnings);

        let unstaged = match droplet {
            Some(droplet) => newest.created_at > droplet.created_at,
            None => true,
        };
        let package = unstaged.then(|| PackageRef { guid: newest.guid });
        Ok((package, warnings))
    }

    async fn stage(&self, app: &AppRef, package: &PackageRef) -> Result<(DropletRef, Warnings)> {
        let body = json!({ "package": { "guid": package.guid } });
        let (mut build, mut warnings): (BuildResource, _) =
            self.post_json("/v3/builds", &body).await?;

        loop {
            match build.state.to_ascii_uppercase().as_str() {
                "STAGED" => {
                    let droplet = build.droplet.ok_or_else(|| {
                        CoreError::UnexpectedResponse(format!(
                            "build {} is staged without a droplet",
                            build.guid
                        ))
                    })?;
                    return Ok((DropletRef { guid: droplet.guid }, warnings));
                }
                "FAILED" => {
                    return Err(CoreError::StagingFailed {
                        app: app.name.clone(),
                        reason: build.error.unwrap_or_else(|| "unknown error".to_string()),
                    });
                }
                _ => {
                    trace!(build = %build.guid, state = %build.state, "Build in progress");
                    tokio::time::sleep(self.polling_interval).await;
                    let (next, next_warnings) =
                        self.get_json(&format!("/v3/builds/{}", build.guid)).await?;
                    build = next;
                    warnings.extend(next_warnings);
                }
            }
        }
    }
}

#[async_trait]
impl AppLifecycle for ControlPlaneClient {
    async fn stop_app(&self, app: &AppRef) -> Result<Warnings> {
        self.post_action(&format!("/v3/apps/{}/actions/stop", app.guid))
            .await
    }

    async fn start_app(&self, app: &AppRef, droplet: Option<&DropletRef>) -> Result<Warnings> {
        let mut warnings = Warnings::new();
        if let Some(droplet) = droplet {
            let url = self.url(&format!(
                "/v3/apps/{}/relationships/current_droplet",
                app.guid
            ))?;
            debug!(%url, droplet = %droplet.guid, "PATCH");
            let body = json!({ "data": { "guid": droplet.guid } });
            let (_, patch_warnings) = self
                .send(self.request(Method::PATCH, url).json(&body))
                .await?;
            warnings.extend(patch_warnings);
        }
        warnings.extend(
            self.post_action(&format!("/v3/apps/{}/actions/start", app.guid))
                .await?,
        );
        Ok(warnings)
    }

    async fn create_deployment(
        &self,
        app: &AppRef,
        request: &DeploymentRequest,
    ) -> Result<(Deployment, Warnings)> {
        let body = deployment_body(app, request);
        let (deployment, mut warnings): (DeploymentResource, _) =
            self.post_json("/v3/deployments", &body).await?;

        let web = deployment
            .new_processes
            .iter()
            .find(|p| p.process_type == appctl_core::WEB_PROCESS_TYPE)
            .ok_or_else(|| {
                CoreError::UnexpectedResponse(format!(
                    "deployment {} has no new web process",
                    deployment.guid
                ))
            })?;
        let (process, process_warnings): (ProcessResource, _) =
            self.get_json(&format!("/v3/processes/{}", web.guid)).await?;
        warnings.extend(process_warnings);

        Ok((
            Deployment {
                guid: deployment.guid,
                web_process: process.into(),
            },
            warnings,
        ))
    }

    async fn apply_step(&self, deployment: &Deployment, step: &RolloutStep) -> Result<Warnings> {
        let (current, mut warnings): (DeploymentResource, _) = self
            .get_json(&format!("/v3/deployments/{}", deployment.guid))
            .await?;

        if current.is_paused() {
            debug!(deployment = %deployment.guid, target = step.target_instances, "Continuing paused deployment");
            warnings.extend(
                self.post_action(&format!("/v3/deployments/{}/actions/continue", deployment.guid))
                    .await?,
            );
        }
        Ok(warnings)
    }

    async fn cancel_deployment(&self, deployment: &Deployment) -> Result<Warnings> {
        self.post_action(&format!("/v3/deployments/{}/actions/cancel", deployment.guid))
            .await
    }
}

#[async_trait]
impl InstanceSource for ControlPlaneClient {
    async fn processes(&self, app: &AppRef) -> Result<(Vec<Process>, Warnings)> {
        let (list, warnings): (ListResponse<ProcessResource>, _) = self
            .get_json(&format!("/v3/apps/{}/processes", app.guid))
            .await?;
        Ok((list.resources.into_iter().map(Process::from).collect(), warnings))
    }

    async fn instances(&self, process: &Process) -> Result<(Vec<ProcessInstance>, Warnings)> {
        let (stats, warnings): (ListResponse<StatsResource>, _) = self
            .get_json(&format!("/v3/processes/{}/stats", process.guid))
            .await?;

        let instances = stats
            .resources
            .into_iter()
            .map(|stat| {
                Ok(ProcessInstance {
                    index: stat.index,
                    state: stat.state.parse::<InstanceState>()?,
                    details: stat.details,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((instances, warnings))
    }
}

fn deployment_body(app: &AppRef, request: &DeploymentRequest) -> Value {
    let mut body = json!({
        "strategy": request.strategy.to_string(),
        "relationships": { "app": { "data": { "guid": app.guid } } },
    });

    let mut options = serde_json::Map::new();
    if let Some(max_in_flight) = request.max_in_flight {
        options.insert("max_in_flight".to_string(), json!(max_in_flight));
    }
    if !request.canary_steps.is_empty() {
        let steps: Vec<Value> = request
            .canary_steps
            .iter()
            .map(|weight| json!({ "instance_weight": weight }))
            .collect();
        options.insert("canary".to_string(), json!({ "steps": steps }));
    }
    if !options.is_empty() {
        body["options"] = Value::Object(options);
    }
    if let Some(droplet) = &request.droplet {
        body["droplet"] = json!({ "guid": droplet.guid });
    }
    body
}

fn warnings_from(response: &Response) -> Warnings {
    response
        .headers()
        .get_all(WARNINGS_HEADER)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            urlencoding::decode(part)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| part.to_string())
        })
        .collect()
}

fn api_error(status: StatusCode, body: &str) -> CoreError {
    let message = serde_json::from_str::<ErrorList>(body)
        .ok()
        .and_then(|list| list.errors.into_iter().next())
        .map(|err| err.detail)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        });
    CoreError::Api {
        status: status.as_u16(),
        message,
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| CoreError::UnexpectedResponse(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    resources: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ErrorList {
    #[serde(default)]
    errors: Vec<JobError>,
}

#[derive(Debug, Deserialize)]
struct Detail {
    detail: String,
}

#[derive(Debug, Deserialize)]
struct JobResource {
    state: String,
    #[serde(default)]
    warnings: Vec<Detail>,
    #[serde(default)]
    errors: Vec<JobError>,
}

#[derive(Debug, Deserialize)]
struct AppResource {
    guid: String,
    name: String,
    state: String,
}

#[derive(Debug, Deserialize)]
struct ProcessResource {
    guid: String,
    #[serde(rename = "type")]
    process_type: String,
    #[serde(default)]
    instances: u32,
}

impl From<ProcessResource> for Process {
    fn from(resource: ProcessResource) -> Self {
        Process::new(resource.guid, resource.process_type, resource.instances)
    }
}

#[derive(Debug, Deserialize)]
struct StatsResource {
    index: u32,
    state: String,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PackageResource {
    guid: String,
    state: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct DropletResource {
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GuidRef {
    guid: String,
}

#[derive(Debug, Deserialize)]
struct BuildResource {
    guid: String,
    state: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    droplet: Option<GuidRef>,
}

#[derive(Debug, Deserialize)]
struct DeploymentStatus {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewProcess {
    guid: String,
    #[serde(rename = "type")]
    process_type: String,
}

#[derive(Debug, Deserialize)]
struct DeploymentResource {
    guid: String,
    status: DeploymentStatus,
    #[serde(default)]
    new_processes: Vec<NewProcess>,
}

impl DeploymentResource {
    fn is_paused(&self) -> bool {
        self.status
            .reason
            .as_deref()
            .is_some_and(|reason| reason.eq_ignore_ascii_case("PAUSED"))
    }
}
