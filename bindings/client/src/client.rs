use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use pass_load_instruments::prelude::{CheckRecord, MetricTags, OperationRecord, Reporter};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;

use crate::endpoint;
use crate::error::ClientError;
use crate::model::{Coordinate, ElevationRange, Pass};
use crate::targets::ServiceTargets;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A fully read response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: u16,
    content_type: Option<String>,
    body: Bytes,
}

impl HttpResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn has_image_content_type(&self) -> bool {
        self.content_type()
            .is_some_and(|content_type| content_type.contains("image/"))
    }
}

/// One request and its outcome, tagged with the endpoint it was made against.
#[derive(Debug)]
pub struct Exchange {
    endpoint: String,
    tags: MetricTags,
    outcome: Result<HttpResponse, ClientError>,
    latency: Option<Duration>,
}

impl Exchange {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn tags(&self) -> &MetricTags {
        &self.tags
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ClientError> {
        self.outcome.as_ref().err()
    }

    /// `None` if no response was received.
    pub fn status(&self) -> Option<u16> {
        self.response().map(HttpResponse::status)
    }

    pub fn is_status(&self, status: u16) -> bool {
        self.status() == Some(status)
    }

    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    /// Decode the body of a successful response, `None` for any other outcome.
    pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
        let response = self.response().filter(|r| r.status() == 200)?;
        match response.json() {
            Ok(value) => Some(value),
            Err(e) => {
                log::debug!("Could not decode response from {}: {e}", self.endpoint);
                None
            }
        }
    }

    /// Decode a pass list one element at a time, leaving out elements that do not decode.
    ///
    /// `None` unless the response is a successful JSON array.
    pub fn passes(&self) -> Option<Vec<Pass>> {
        let items = self.json::<Vec<serde_json::Value>>()?;
        let total = items.len();
        let passes = items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<Pass>(item).ok())
            .collect::<Vec<_>>();

        if passes.len() < total {
            log::debug!(
                "Skipped {} of {total} passes from {} that did not decode",
                total - passes.len(),
                self.endpoint
            );
        }
        Some(passes)
    }
}

/// HTTP client for the pass services that records every request with the [Reporter].
#[derive(Debug, Clone)]
pub struct PassServicesClient {
    http: reqwest::Client,
    reporter: Arc<Reporter>,
    targets: ServiceTargets,
}

impl PassServicesClient {
    pub fn new(targets: ServiceTargets, reporter: Arc<Reporter>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            http,
            reporter,
            targets,
        })
    }

    pub fn targets(&self) -> &ServiceTargets {
        &self.targets
    }

    pub async fn list_passes(&self, tags: &MetricTags, endpoint: &str) -> Exchange {
        self.get(tags, endpoint, self.targets.passes_url()).await
    }

    pub async fn passes_by_elevation(&self, tags: &MetricTags, range: ElevationRange) -> Exchange {
        self.get(
            tags,
            endpoint::GET_PASSES_BY_ELEVATION,
            self.targets.passes_by_elevation_url(range),
        )
        .await
    }

    pub async fn pass_detail(&self, tags: &MetricTags, endpoint: &str, id: i64) -> Exchange {
        self.get(tags, endpoint, self.targets.pass_url(id)).await
    }

    pub async fn pass_image(&self, tags: &MetricTags, endpoint: &str, id: i64) -> Exchange {
        self.get(tags, endpoint, self.targets.pass_image_url(id))
            .await
    }

    pub async fn direct_image(&self, tags: &MetricTags, coordinate: &Coordinate) -> Exchange {
        self.get(
            tags,
            endpoint::GET_DIRECT_IMAGE,
            self.targets.direct_image_url(coordinate),
        )
        .await
    }

    pub async fn pass_summary(&self, tags: &MetricTags, endpoint: &str) -> Exchange {
        self.get(tags, endpoint, self.targets.pass_summary_url())
            .await
    }

    pub async fn pass_summary_slow(&self, tags: &MetricTags) -> Exchange {
        self.get(
            tags,
            endpoint::GET_PASS_SUMMARY_SLOW,
            self.targets.pass_summary_slow_url(),
        )
        .await
    }

    /// Make a GET request and record it against `endpoint`.
    ///
    /// The recorded latency covers reading the whole body. A transport failure is recorded as an
    /// error without a status, and a status of 400 or more is recorded as an error.
    pub async fn get(&self, tags: &MetricTags, endpoint: &str, url: String) -> Exchange {
        let mut record = OperationRecord::new(tags.clone(), endpoint);
        let outcome = self.send(&url).await;

        match &outcome {
            Ok(response) => record.finish(Some(response.status), response.status >= 400),
            Err(e) => {
                log::debug!("Request to {url} failed: {e}");
                record.finish(None, true);
            }
        }
        self.reporter.add_operation(&record);

        Exchange {
            endpoint: endpoint.to_string(),
            tags: tags.clone(),
            latency: outcome.is_ok().then(|| record.elapsed()).flatten(),
            outcome,
        }
    }

    /// Record a named check against an exchange. The check fails if no response was received,
    /// otherwise `predicate` decides. Returns whether the check passed.
    pub fn check(
        &self,
        exchange: &Exchange,
        name: &str,
        predicate: impl FnOnce(&HttpResponse) -> bool,
    ) -> bool {
        let passed = exchange.response().is_some_and(predicate);
        self.reporter.add_check(&CheckRecord::new(
            exchange.tags.clone(),
            exchange.endpoint.as_str(),
            name,
            passed,
            exchange.latency,
        ));
        passed
    }

    async fn send(&self, url: &str) -> Result<HttpResponse, ClientError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(ClientError::Transport)?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(ClientError::Transport)?;

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}
