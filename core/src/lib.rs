//! Synchronous API client core for the TestMonitor results service.
//!
//! # Overview
//! Builds `HttpRequest` values and parses `HttpResponse` values without
//! touching the network (host-does-IO pattern). The caller executes the
//! actual HTTP round-trip, either by hand or through a `Transport` wrapped in
//! a `Session`.
//!
//! # Design
//! - `TestMonitorClient` is stateless; it holds only immutable configuration.
//! - Each operation is split into `build_*` (produces request) and `parse_*`
//!   (consumes response), so the I/O boundary is explicit.
//! - Bulk create/update/delete report per-item failures as data through
//!   `PartialSuccess`; only whole-request failures become `ApiError`.
//! - List and query responses are paginated with continuation tokens; `Pages`
//!   follows them until the service stops returning one.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod partial;
pub mod query;
pub mod transport;
pub mod types;

pub use client::{CreateResultsResponse, TestMonitorClient, UpdateResultsResponse};
pub use config::{ClientConfig, ConfigError};
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use partial::{DeleteOutcome, PartialSuccess};
pub use query::{
    PageState, Pages, Pagination, ResultField, ResultQueryOrderByField, ResultValuesQuery,
    ResultValuesQueryField, ResultsAdvancedQuery, ResultsPage,
};
pub use transport::{Session, Transport};
pub use types::{
    ApiInfo, DeleteResultsRequest, OperationInfo, ResultValues, ServiceError, StatusObject,
    StatusType, TestResultRequest, TestResultResponse, TestResultUpdateFailure,
    TestResultUpdateRequest, UpdateTestResultsRequest,
};
