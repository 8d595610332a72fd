//! Stateless HTTP request builder and response parser for the TestMonitor
//! results API.
//!
//! # Design
//! `TestMonitorClient` holds only immutable configuration (service URL, API
//! key, default workspace) and carries no state between calls. Each
//! operation is split into a `build_*` method that produces an `HttpRequest`
//! and a `parse_*` method that consumes an `HttpResponse`. The caller (or a
//! `Session`) executes the actual HTTP round-trip, keeping the core
//! deterministic and free of I/O dependencies.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{encode_component, query_string, HttpMethod, HttpRequest, HttpResponse};
use crate::partial::{DeleteOutcome, PartialSuccess};
use crate::query::{ResultValuesQuery, ResultsAdvancedQuery, ResultsPage};
use crate::types::{
    ApiInfo, CreateTestResultsRequest, DeleteResultsPartialSuccess, DeleteResultsRequest,
    ResultValues, ServiceError, TestResultRequest, TestResultResponse, TestResultUpdateFailure,
    TestResultUpdateRequest, UpdateTestResultsRequest,
};

pub const API_KEY_HEADER: &str = "x-ni-api-key";

pub type CreateResultsResponse = PartialSuccess<TestResultResponse, TestResultRequest>;
pub type UpdateResultsResponse = PartialSuccess<TestResultResponse, TestResultUpdateFailure>;

/// Synchronous, stateless client for the TestMonitor results API.
#[derive(Debug, Clone)]
pub struct TestMonitorClient {
    base_url: String,
    api_key: Option<String>,
    default_workspace: Option<String>,
}

impl TestMonitorClient {
    /// Client for a service root such as `http://host/nitestmonitor/v2`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            default_workspace: None,
        }
    }

    /// Client for the server described by `config`; the service base path is
    /// appended to its URI.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        config.validate()?;
        Ok(Self {
            base_url: config.service_url(),
            api_key: config.api_key.clone(),
            default_workspace: config.default_workspace.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_workspace(&self) -> Option<&str> {
        self.default_workspace.as_deref()
    }

    // -----------------------------------------------------------------------
    // Build
    // -----------------------------------------------------------------------

    pub fn build_api_info(&self) -> HttpRequest {
        self.request(HttpMethod::Get, format!("{}/", self.base_url))
    }

    /// Bulk create. Items without a workspace get the default workspace.
    pub fn build_create_results(&self, results: &[TestResultRequest]) -> Result<HttpRequest, ApiError> {
        let body = CreateTestResultsRequest {
            results: results
                .iter()
                .cloned()
                .map(|mut result| {
                    if result.workspace.is_none() {
                        result.workspace = self.default_workspace.clone();
                    }
                    result
                })
                .collect(),
        };
        self.json_request(HttpMethod::Post, format!("{}/results", self.base_url), &body)
    }

    pub fn build_get_result(&self, id: &str) -> HttpRequest {
        self.request(
            HttpMethod::Get,
            format!("{}/results/{}", self.base_url, encode_component(id)),
        )
    }

    pub fn build_get_results(
        &self,
        continuation_token: Option<&str>,
        take: Option<u32>,
        return_count: bool,
    ) -> HttpRequest {
        let mut params = Vec::new();
        if let Some(token) = continuation_token {
            params.push(("continuationToken", token.to_string()));
        }
        if let Some(take) = take {
            params.push(("take", take.to_string()));
        }
        params.push(("returnCount", return_count.to_string()));
        self.request(
            HttpMethod::Get,
            format!("{}/results{}", self.base_url, query_string(&params)),
        )
    }

    pub fn build_query_results(&self, query: &ResultsAdvancedQuery) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, format!("{}/query-results", self.base_url), query)
    }

    pub fn build_query_result_values(&self, query: &ResultValuesQuery) -> Result<HttpRequest, ApiError> {
        self.json_request(
            HttpMethod::Post,
            format!("{}/query-result-values", self.base_url),
            query,
        )
    }

    pub fn build_update_results(
        &self,
        results: &[TestResultUpdateRequest],
        replace: bool,
    ) -> Result<HttpRequest, ApiError> {
        self.build_update_results_request(&UpdateTestResultsRequest {
            results: results.to_vec(),
            replace,
            determine_status_from_steps: None,
        })
    }

    pub fn build_update_results_request(
        &self,
        request: &UpdateTestResultsRequest,
    ) -> Result<HttpRequest, ApiError> {
        self.json_request(HttpMethod::Post, format!("{}/update-results", self.base_url), request)
    }

    pub fn build_delete_result(&self, id: &str, delete_steps: bool) -> HttpRequest {
        let params = [("deleteSteps", delete_steps.to_string())];
        self.request(
            HttpMethod::Delete,
            format!(
                "{}/results/{}{}",
                self.base_url,
                encode_component(id),
                query_string(&params)
            ),
        )
    }

    pub fn build_delete_results(&self, ids: &[String], delete_steps: bool) -> Result<HttpRequest, ApiError> {
        let body = DeleteResultsRequest {
            ids: ids.to_vec(),
            delete_steps,
        };
        self.json_request(HttpMethod::Post, format!("{}/delete-results", self.base_url), &body)
    }

    // -----------------------------------------------------------------------
    // Parse
    // -----------------------------------------------------------------------

    pub fn parse_api_info(&self, response: HttpResponse) -> Result<ApiInfo, ApiError> {
        check_status(&response, &[200])?;
        decode(&response)
    }

    pub fn parse_create_results(&self, response: HttpResponse) -> Result<CreateResultsResponse, ApiError> {
        check_status(&response, &[200, 201])?;
        let outcome: CreateResultsResponse = decode(&response)?;
        Ok(outcome.normalize())
    }

    pub fn parse_get_result(&self, response: HttpResponse) -> Result<TestResultResponse, ApiError> {
        check_status(&response, &[200])?;
        decode(&response)
    }

    pub fn parse_get_results(&self, response: HttpResponse) -> Result<ResultsPage, ApiError> {
        check_status(&response, &[200])?;
        decode(&response)
    }

    pub fn parse_query_results(&self, response: HttpResponse) -> Result<ResultsPage, ApiError> {
        check_status(&response, &[200])?;
        decode(&response)
    }

    pub fn parse_query_result_values(&self, response: HttpResponse) -> Result<ResultValues, ApiError> {
        check_status(&response, &[200])?;
        decode(&response)
    }

    pub fn parse_update_results(&self, response: HttpResponse) -> Result<UpdateResultsResponse, ApiError> {
        check_status(&response, &[200])?;
        let outcome: UpdateResultsResponse = decode(&response)?;
        Ok(outcome.normalize())
    }

    pub fn parse_delete_result(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response, &[200, 204])?;
        Ok(())
    }

    /// 204 means every id was deleted; 200 carries the per-id partition.
    pub fn parse_delete_results(&self, response: HttpResponse) -> Result<DeleteOutcome, ApiError> {
        check_status(&response, &[200, 204])?;
        if response.status == 204 || response.body.trim().is_empty() {
            return Ok(DeleteOutcome::AllDeleted);
        }
        let partial: DeleteResultsPartialSuccess = decode(&response)?;
        Ok(DeleteOutcome::Partial(PartialSuccess::from(partial).normalize()))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn request(&self, method: HttpMethod, path: String) -> HttpRequest {
        debug!(%method, %path, "built request");
        HttpRequest {
            method,
            path,
            headers: self.auth_headers(),
            body: None,
        }
    }

    fn json_request<T: Serialize>(
        &self,
        method: HttpMethod,
        path: String,
        payload: &T,
    ) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(payload).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        let mut request = self.request(method, path);
        request
            .headers
            .push(("content-type".to_string(), "application/json".to_string()));
        request.body = Some(body);
        Ok(request)
    }

    fn auth_headers(&self) -> Vec<(String, String)> {
        match &self.api_key {
            Some(key) => vec![(API_KEY_HEADER.to_string(), key.clone())],
            None => Vec::new(),
        }
    }
}

fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ApiError> {
    serde_json::from_str(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse, expected: &[u16]) -> Result<(), ApiError> {
    debug!(status = response.status, "parsing response");
    if expected.contains(&response.status) {
        return Ok(());
    }
    match response.status {
        404 => Err(ApiError::NotFound {
            error: service_error(response),
        }),
        400 => Err(ApiError::Validation {
            status: response.status,
            error: service_error(response),
        }),
        status => Err(ApiError::HttpError {
            status,
            body: response.body.clone(),
        }),
    }
}

/// Error bodies come either bare or wrapped as `{"error": {...}}`. A bare
/// body only counts when it names the error or carries a message.
fn service_error(response: &HttpResponse) -> Option<ServiceError> {
    #[derive(serde::Deserialize)]
    struct Wrapped {
        error: ServiceError,
    }

    if response.body.trim().is_empty() {
        return None;
    }
    serde_json::from_str::<Wrapped>(&response.body)
        .map(|w| w.error)
        .ok()
        .or_else(|| {
            serde_json::from_str::<ServiceError>(&response.body)
                .ok()
                .filter(|e| e.name.is_some() || e.message.is_some())
        })
}
