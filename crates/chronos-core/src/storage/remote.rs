//! HTTP client for a remote cycle service.
//!
//! Mirrors the store contract one request per operation; JSON bodies use the
//! record's camelCase field names.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::cycle::{Checkpoint, CycleRecord, CycleStore, PhaseReport};
use crate::error::CycleError;
use crate::planner::SessionPlan;

#[derive(Debug, Deserialize)]
struct CleanupResponse {
    #[serde(default)]
    removed: u64,
}

/// Client for the remote record of truth.
pub struct HttpCycleStore {
    base: Url,
    http_client: Client,
}

impl HttpCycleStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CycleError> {
        let base = Url::parse(base_url).map_err(|e| CycleError::network("configure", e))?;
        if base.cannot_be_a_base() {
            return Err(CycleError::network("configure", format!("not a base URL: {base_url}")));
        }
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CycleError::network("configure", e))?;
        Ok(Self { base, http_client })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response, CycleError> {
        let response = request
            .send()
            .await
            .map_err(|e| CycleError::network(operation, e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(operation, %status, "cycle service rejected request");
        Err(match status {
            StatusCode::NOT_FOUND => CycleError::CycleNotFound(operation.to_string()),
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                CycleError::InvalidTransition(body)
            }
            _ => CycleError::network(operation, format!("HTTP {status}: {body}")),
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<T, CycleError> {
        self.send(operation, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| CycleError::network(operation, e))
    }
}

#[async_trait]
impl CycleStore for HttpCycleStore {
    async fn create(&self, activity_id: &str, plan: &SessionPlan) -> Result<CycleRecord, CycleError> {
        plan.seedable(activity_id)?;
        let url = self.url(&["activities", activity_id, "cycle"]);
        self.send_json("create", self.http_client.post(url).json(plan)).await
    }

    async fn get_active(&self, activity_id: &str) -> Result<Option<CycleRecord>, CycleError> {
        let url = self.url(&["activities", activity_id, "cycle"]);
        match self.send_json("get_active", self.http_client.get(url)).await {
            Ok(record) => Ok(Some(record)),
            Err(CycleError::CycleNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn start(&self, cycle_id: &str) -> Result<CycleRecord, CycleError> {
        let url = self.url(&["cycles", cycle_id, "start"]);
        self.send_json("start", self.http_client.post(url)).await
    }

    async fn pause(&self, cycle_id: &str) -> Result<CycleRecord, CycleError> {
        let url = self.url(&["cycles", cycle_id, "pause"]);
        self.send_json("pause", self.http_client.post(url)).await
    }

    async fn complete(&self, cycle_id: &str, report: &PhaseReport) -> Result<CycleRecord, CycleError> {
        let url = self.url(&["cycles", cycle_id, "complete"]);
        self.send_json("complete", self.http_client.post(url).json(report))
            .await
    }

    async fn checkpoint(&self, cycle_id: &str, checkpoint: &Checkpoint) -> Result<(), CycleError> {
        let url = self.url(&["cycles", cycle_id, "checkpoint"]);
        self.send("checkpoint", self.http_client.post(url).json(checkpoint))
            .await?;
        Ok(())
    }

    async fn cancel(&self, activity_id: &str) -> Result<(), CycleError> {
        let url = self.url(&["activities", activity_id, "cycle"]);
        match self.send("cancel", self.http_client.delete(url)).await {
            Ok(_) | Err(CycleError::CycleNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn cleanup(&self) -> Result<u64, CycleError> {
        let url = self.url(&["cycles", "cleanup"]);
        let response: CleanupResponse = self
            .send_json("cleanup", self.http_client.post(url))
            .await?;
        Ok(response.removed)
    }
}
