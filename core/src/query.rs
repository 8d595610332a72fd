//! Query DTOs and continuation-token pagination.
//!
//! # Pagination
//! The service returns at most one page per call together with an opaque
//! `continuationToken`. Sending that token back yields the next page; a
//! `null` or absent token is the only end-of-results signal.
//!
//! ```text
//! Start --(first page, token)--> Fetching(token) --(token)--> Fetching(token')
//!   |                                  |
//!   +--------(no token)--> Done <------+
//! ```
//!
//! Pages are not a snapshot. Results created, updated or deleted while a
//! caller is paginating can be skipped or seen twice; callers that need a
//! consistent view must avoid concurrent mutation of the queried set.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::types::TestResultResponse;

/// Fields that can be requested through `projection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultField {
    Id,
    Status,
    StartedAt,
    UpdatedAt,
    ProgramName,
    SystemId,
    HostName,
    Operator,
    SerialNumber,
    PartNumber,
    TotalTimeInSeconds,
    Keywords,
    Properties,
    FileIds,
    StatusTypeSummary,
    Workspace,
    DataTableIds,
}

/// Fields a query can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultQueryOrderByField {
    Id,
    StartedAt,
    UpdatedAt,
    ProgramName,
    SystemId,
    HostName,
    Operator,
    SerialNumber,
    PartNumber,
    TotalTimeInSeconds,
}

/// Fields whose distinct values can be listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultValuesQueryField {
    Id,
    ProgramName,
    SystemId,
    HostName,
    Operator,
    SerialNumber,
    PartNumber,
}

/// Filtered, ordered, paginated query over results.
///
/// `filter` uses positional placeholders (`@0`, `@1`, ...) that the service
/// resolves against `substitutions`. Filter syntax is validated by the
/// service, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsAdvancedQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub substitutions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<ResultQueryOrderByField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descending: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projection: Vec<ResultField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_count: Option<bool>,
}

impl ResultsAdvancedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter<I, S>(mut self, filter: impl Into<String>, substitutions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter = Some(filter.into());
        self.substitutions = substitutions.into_iter().map(Into::into).collect();
        self
    }

    pub fn order_by(mut self, field: ResultQueryOrderByField, descending: bool) -> Self {
        self.order_by = Some(field);
        self.descending = Some(descending);
        self
    }

    pub fn with_projection(mut self, fields: impl IntoIterator<Item = ResultField>) -> Self {
        self.projection = fields.into_iter().collect();
        self
    }

    pub fn with_take(mut self, take: u32) -> Self {
        self.take = Some(take);
        self
    }

    pub fn with_return_count(mut self, return_count: bool) -> Self {
        self.return_count = Some(return_count);
        self
    }

    pub fn with_continuation_token(mut self, token: Option<String>) -> Self {
        self.continuation_token = token;
        self
    }
}

/// Distinct values of one field across the results matching a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultValuesQuery {
    pub field: ResultValuesQueryField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub substitutions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_with: Option<String>,
}

impl ResultValuesQuery {
    pub fn new(field: ResultValuesQueryField) -> Self {
        Self {
            field,
            filter: None,
            substitutions: Vec::new(),
            starts_with: None,
        }
    }

    pub fn with_filter<I, S>(mut self, filter: impl Into<String>, substitutions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter = Some(filter.into());
        self.substitutions = substitutions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_starts_with(mut self, prefix: impl Into<String>) -> Self {
        self.starts_with = Some(prefix.into());
        self
    }
}

/// One page of results from list or query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsPage {
    #[serde(default)]
    pub results: Vec<TestResultResponse>,
    /// `None` (explicit `null` or absent) once the last page was returned.
    #[serde(default)]
    pub continuation_token: Option<String>,
    /// Only present when the request asked for `returnCount`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

impl ResultsPage {
    pub fn is_last(&self) -> bool {
        self.continuation_token.is_none()
    }
}

/// Where a paginated read stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    Start,
    Fetching(String),
    Done,
}

#[derive(Debug, Clone)]
pub struct Pagination {
    state: PageState,
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new()
    }
}

impl Pagination {
    pub fn new() -> Self {
        Self {
            state: PageState::Start,
        }
    }

    /// Resume from a token obtained earlier.
    pub fn resume(token: String) -> Self {
        Self {
            state: PageState::Fetching(token),
        }
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == PageState::Done
    }

    /// The token to send with the next request: `Some(None)` for the first
    /// page, `Some(Some(token))` afterwards, `None` when finished.
    pub fn next_token(&self) -> Option<Option<&str>> {
        match &self.state {
            PageState::Start => Some(None),
            PageState::Fetching(token) => Some(Some(token.as_str())),
            PageState::Done => None,
        }
    }

    /// Record the token returned with the page just fetched.
    pub fn advance(&mut self, token: Option<String>) {
        if self.is_done() {
            return;
        }
        self.state = match token {
            Some(token) => PageState::Fetching(token),
            None => PageState::Done,
        };
    }
}

/// Iterator over pages produced by `fetch`, which receives the token to send.
///
/// Iteration ends after the last page or after the first error.
pub struct Pages<F> {
    pagination: Pagination,
    fetch: F,
}

impl<F> Pages<F>
where
    F: FnMut(Option<String>) -> Result<ResultsPage, ApiError>,
{
    pub fn new(fetch: F) -> Self {
        Self::with_pagination(Pagination::new(), fetch)
    }

    pub fn with_pagination(pagination: Pagination, fetch: F) -> Self {
        Self { pagination, fetch }
    }

    /// Drain every remaining page into one list of results.
    pub fn collect_results(self) -> Result<Vec<TestResultResponse>, ApiError> {
        let mut all = Vec::new();
        for page in self {
            all.extend(page?.results);
        }
        Ok(all)
    }
}

impl<F> Iterator for Pages<F>
where
    F: FnMut(Option<String>) -> Result<ResultsPage, ApiError>,
{
    type Item = Result<ResultsPage, ApiError>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.pagination.next_token()?.map(str::to_string);
        match (self.fetch)(token) {
            Ok(page) => {
                self.pagination.advance(page.continuation_token.clone());
                Some(Ok(page))
            }
            Err(e) => {
                self.pagination.advance(None);
                Some(Err(e))
            }
        }
    }
}
