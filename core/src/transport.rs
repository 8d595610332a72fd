//! Executes client requests through a caller-supplied transport.
//!
//! # Design
//! `Transport` is the seam where the host plugs in its HTTP stack. It must
//! return every HTTP status as data (including 4xx/5xx) and reserve `Err` for
//! failures where no response arrived. `Session` pairs a transport with a
//! `TestMonitorClient` and runs build -> execute -> parse for each
//! operation. It holds no mutable state, so one session can serve many
//! threads when the transport can.

use tracing::debug;

use crate::client::{CreateResultsResponse, TestMonitorClient, UpdateResultsResponse};
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use crate::partial::DeleteOutcome;
use crate::query::{Pages, Pagination, ResultValuesQuery, ResultsAdvancedQuery, ResultsPage};
use crate::types::{
    ApiInfo, ResultValues, TestResultRequest, TestResultResponse, TestResultUpdateRequest,
    UpdateTestResultsRequest,
};

/// Performs one HTTP round trip.
pub trait Transport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        (**self).execute(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        (**self).execute(request)
    }
}

/// A client bound to a transport.
#[derive(Debug, Clone)]
pub struct Session<T> {
    client: TestMonitorClient,
    transport: T,
}

impl<T: Transport> Session<T> {
    pub fn new(client: TestMonitorClient, transport: T) -> Self {
        Self { client, transport }
    }

    pub fn client(&self) -> &TestMonitorClient {
        &self.client
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let method = request.method;
        let path = request.path.clone();
        let response = self.transport.execute(request)?;
        debug!(%method, %path, status = response.status, "round trip complete");
        Ok(response)
    }

    pub fn api_info(&self) -> Result<ApiInfo, ApiError> {
        let response = self.send(self.client.build_api_info())?;
        self.client.parse_api_info(response)
    }

    pub fn create_results(&self, results: &[TestResultRequest]) -> Result<CreateResultsResponse, ApiError> {
        let response = self.send(self.client.build_create_results(results)?)?;
        let outcome = self.client.parse_create_results(response)?;
        let accounted = outcome.reconcile(results.len());
        debug!(accounted, complete = outcome.is_complete(), "create results");
        Ok(outcome)
    }

    pub fn get_result(&self, id: &str) -> Result<TestResultResponse, ApiError> {
        let response = self.send(self.client.build_get_result(id))?;
        self.client.parse_get_result(response)
    }

    pub fn get_results(
        &self,
        continuation_token: Option<&str>,
        take: Option<u32>,
        return_count: bool,
    ) -> Result<ResultsPage, ApiError> {
        let response = self.send(self.client.build_get_results(continuation_token, take, return_count))?;
        self.client.parse_get_results(response)
    }

    pub fn query_results(&self, query: &ResultsAdvancedQuery) -> Result<ResultsPage, ApiError> {
        let response = self.send(self.client.build_query_results(query)?)?;
        self.client.parse_query_results(response)
    }

    pub fn query_result_values(&self, query: &ResultValuesQuery) -> Result<ResultValues, ApiError> {
        let response = self.send(self.client.build_query_result_values(query)?)?;
        self.client.parse_query_result_values(response)
    }

    pub fn update_results(
        &self,
        results: &[TestResultUpdateRequest],
        replace: bool,
    ) -> Result<UpdateResultsResponse, ApiError> {
        let response = self.send(self.client.build_update_results(results, replace)?)?;
        let outcome = self.client.parse_update_results(response)?;
        let accounted = outcome.reconcile(results.len());
        debug!(accounted, complete = outcome.is_complete(), replace, "update results");
        Ok(outcome)
    }

    pub fn update_results_request(
        &self,
        request: &UpdateTestResultsRequest,
    ) -> Result<UpdateResultsResponse, ApiError> {
        let response = self.send(self.client.build_update_results_request(request)?)?;
        let outcome = self.client.parse_update_results(response)?;
        let accounted = outcome.reconcile(request.results.len());
        debug!(accounted, complete = outcome.is_complete(), replace = request.replace, "update results");
        Ok(outcome)
    }

    pub fn delete_result(&self, id: &str, delete_steps: bool) -> Result<(), ApiError> {
        let response = self.send(self.client.build_delete_result(id, delete_steps))?;
        self.client.parse_delete_result(response)
    }

    pub fn delete_results(&self, ids: &[String], delete_steps: bool) -> Result<DeleteOutcome, ApiError> {
        let response = self.send(self.client.build_delete_results(ids, delete_steps)?)?;
        let outcome = self.client.parse_delete_results(response)?;
        let accounted = match &outcome {
            DeleteOutcome::AllDeleted => true,
            DeleteOutcome::Partial(partial) => partial.reconcile(ids.len()),
        };
        debug!(accounted, complete = outcome.is_complete(), "delete results");
        Ok(outcome)
    }

    /// Pages of `query`, following continuation tokens from the token the
    /// query already carries (if any).
    pub fn query_results_pages<'a>(
        &'a self,
        query: &ResultsAdvancedQuery,
    ) -> Pages<impl FnMut(Option<String>) -> Result<ResultsPage, ApiError> + 'a> {
        let pagination = match &query.continuation_token {
            Some(token) => Pagination::resume(token.clone()),
            None => Pagination::new(),
        };
        let mut query = query.clone();
        Pages::with_pagination(pagination, move |token| {
            query.continuation_token = token;
            self.query_results(&query)
        })
    }

    pub fn get_results_pages(
        &self,
        take: Option<u32>,
    ) -> Pages<impl FnMut(Option<String>) -> Result<ResultsPage, ApiError> + '_> {
        Pages::new(move |token: Option<String>| self.get_results(token.as_deref(), take, false))
    }

    /// Every result matching `query`, across all pages.
    pub fn query_all_results(&self, query: &ResultsAdvancedQuery) -> Result<Vec<TestResultResponse>, ApiError> {
        self.query_results_pages(query).collect_results()
    }

    pub fn get_all_results(&self, take: Option<u32>) -> Result<Vec<TestResultResponse>, ApiError> {
        self.get_results_pages(take).collect_results()
    }
}
