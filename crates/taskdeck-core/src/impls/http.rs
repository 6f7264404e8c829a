//! HttpTaskApi - REST バックエンドへの TaskApi 実装
//!
//! Paths follow the backend's `/tasks/...` JSON routes. Every call logs one
//! `debug` line with the method, path and outcome.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::domain::{
    ActionResponse, ApiError, ListQuery, LogEntry, LogQuery, RetryResponse, SearchFilter,
    SubmitRequest, SubmitResponse, Task, TaskId, TaskStats,
};
use crate::ports::TaskApi;

/// Typed client for the task backend.
#[derive(Debug, Clone)]
pub struct HttpTaskApi {
    client: Client,
    base: Url,
}

impl HttpTaskApi {
    /// `base` must be an `http`/`https` URL; a path prefix such as
    /// `http://host/api` is kept. Without `timeout` the transport default
    /// applies.
    pub fn new(base: Url, timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder =
            Client::builder().user_agent(concat!("taskdeck/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn call(
        &self,
        method: Method,
        url: Url,
        build: impl FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
    ) -> Result<Response, ApiError> {
        let path = url.path().to_string();
        let request = build(self.client.request(method.clone(), url));
        match request.send().await {
            Ok(response) => {
                tracing::debug!(%method, %path, status = response.status().as_u16(), "task api call");
                Ok(response)
            }
            Err(err) => {
                tracing::debug!(%method, %path, error = %err, "task api call failed");
                Err(ApiError::network_unreachable(self.base.as_str(), err))
            }
        }
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response, what: &str) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_response(status.as_u16(), &body));
        }
        response.json::<T>().await.map_err(|err| {
            if err.is_decode() {
                ApiError::malformed_response(what, err)
            } else {
                ApiError::network_unreachable(self.base.as_str(), err)
            }
        })
    }

    /// Lists where a 404 means "nothing there".
    async fn decode_list<T: DeserializeOwned>(
        &self,
        response: Response,
        what: &str,
    ) -> Result<Vec<T>, ApiError> {
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        self.decode(response, what).await
    }
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn list_tasks(&self, query: ListQuery) -> Result<Vec<Task>, ApiError> {
        query.validate()?;
        let url = self.endpoint(&["tasks", "list", "json"]);
        let response = self
            .call(Method::GET, url, |req| {
                req.query(&[("limit", query.limit), ("offset", query.offset)])
            })
            .await?;
        self.decode_list(response, "task list").await
    }

    async fn search_tasks(&self, filter: &SearchFilter) -> Result<Vec<Task>, ApiError> {
        let filter = filter.normalized()?;
        let url = self.endpoint(&["tasks", "search", "json"]);
        let response = self
            .call(Method::GET, url, |req| req.query(&filter))
            .await?;
        match self.decode_list(response, "search results").await {
            Err(err) if err.is_feature_unavailable() => Err(ApiError::feature_unavailable("task search")),
            other => other,
        }
    }

    async fn get_task_details(&self, id: &TaskId) -> Result<Task, ApiError> {
        let url = self.endpoint(&["tasks", id.as_str(), "json"]);
        let response = self.call(Method::GET, url, |req| req).await?;
        let task: Task = self.decode(response, "task details").await?;
        if let Err(violation) = task.check_invariants() {
            tracing::warn!(task_id = %task.id, ?violation, "task record breaks lifecycle invariant");
        }
        Ok(task)
    }

    async fn get_task_logs(&self, id: &TaskId, query: LogQuery) -> Result<Vec<LogEntry>, ApiError> {
        query.validate()?;
        let url = self.endpoint(&["tasks", id.as_str(), "logs", "json"]);
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(level) = query.level {
            params.push(("level", level.as_str().to_string()));
        }
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        let response = self
            .call(Method::GET, url, |req| req.query(&params))
            .await?;
        self.decode(response, "task logs").await
    }

    async fn get_task_stats(&self) -> Result<TaskStats, ApiError> {
        let url = self.endpoint(&["tasks", "stats", "json"]);
        let response = self.call(Method::GET, url, |req| req).await?;
        match self.decode(response, "task stats").await {
            Err(err) if err.is_feature_unavailable() => {
                tracing::debug!("stats unsupported by backend, reporting zeros");
                Ok(TaskStats::zero())
            }
            other => other,
        }
    }

    async fn submit_task(&self, request: &SubmitRequest) -> Result<SubmitResponse, ApiError> {
        request.validate()?;
        let url = self.endpoint(&["tasks", "submit"]);
        let response = self
            .call(Method::POST, url, |req| req.json(request))
            .await?;
        self.decode(response, "submit response").await
    }

    async fn cancel_task(&self, id: &TaskId) -> Result<ActionResponse, ApiError> {
        let url = self.endpoint(&["tasks", id.as_str(), "cancel"]);
        let response = self.call(Method::POST, url, |req| req).await?;
        self.decode(response, "cancel response").await
    }

    async fn retry_task(&self, id: &TaskId) -> Result<RetryResponse, ApiError> {
        let url = self.endpoint(&["tasks", id.as_str(), "retry"]);
        let response = self.call(Method::POST, url, |req| req).await?;
        self.decode(response, "retry response").await
    }

    async fn delete_task(&self, id: &TaskId) -> Result<ActionResponse, ApiError> {
        let url = self.endpoint(&["tasks", id.as_str()]);
        let response = self.call(Method::DELETE, url, |req| req).await?;
        match self.decode(response, "delete response").await {
            Err(err) if err.is_feature_unavailable() => Err(ApiError::feature_unavailable("task deletion")),
            other => other,
        }
    }
}
