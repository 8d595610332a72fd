//! In-memory TestMonitor results service.
//!
//! Serves the results routes under `/nitestmonitor/v2` with the same
//! observable behavior as the real service: per-item partial success on bulk
//! create, update and delete; 404 on unknown single-result ids; replace or
//! merge updates; continuation-token pagination; a small filter language.

pub mod filter;
pub mod store;

use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};

use crate::filter::{Field, Filter};
pub use crate::store::{Store, DEFAULT_WORKSPACE};

pub const BASE_PATH: &str = "/nitestmonitor/v2";
pub const DEFAULT_TAKE: usize = 100;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub status_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: String,
    pub program_name: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time_in_seconds: Option<f64>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub data_table_ids: Vec<String>,
    pub workspace: String,
}

/// A result as submitted for creation; echoed back unchanged when it fails.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewResult {
    pub program_name: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time_in_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_table_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

/// Changes to one result; echoed back unchanged when it fails.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultUpdate {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_time_in_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_table_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inner_errors: Vec<ErrorDetail>,
}

impl ErrorDetail {
    pub fn result_not_found(id: &str) -> Self {
        Self {
            name: "Skyline.TestMonitor.ResultNotFound".to_string(),
            message: format!("The result with ID {id} does not exist."),
            resource_type: Some("testresult".to_string()),
            resource_id: Some(id.to_string()),
            inner_errors: Vec::new(),
        }
    }

    pub fn workspace_not_found(workspace: &str) -> Self {
        Self {
            name: "Skyline.WorkspaceNotFoundOrNoAccess".to_string(),
            message: format!("Workspace {workspace} does not exist or you do not have access to it."),
            resource_type: Some("workspace".to_string()),
            resource_id: Some(workspace.to_string()),
            inner_errors: Vec::new(),
        }
    }

    pub fn one_or_more(inner_errors: Vec<ErrorDetail>) -> Self {
        Self {
            name: "Skyline.OneOrMoreErrorsOccurred".to_string(),
            message: "One or more errors occurred. See the contained list for details of each error."
                .to_string(),
            resource_type: None,
            resource_id: None,
            inner_errors,
        }
    }

    pub fn bad_request(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            message: message.into(),
            ..Self::default()
        }
    }
}

/// An error response: status plus `{"error": ...}` body.
#[derive(Debug)]
pub struct Failure {
    pub status: StatusCode,
    pub error: ErrorDetail,
}

impl Failure {
    fn bad_request(name: &str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ErrorDetail::bad_request(name, message),
        }
    }

    fn not_found(id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: ErrorDetail::result_not_found(id),
        }
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.error }))).into_response()
    }
}

#[derive(Deserialize)]
pub struct CreateResults {
    pub results: Vec<NewResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResults {
    pub results: Vec<ResultUpdate>,
    #[serde(default)]
    pub replace: bool,
    #[serde(default)]
    pub determine_status_from_steps: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResults {
    pub ids: Vec<String>,
    #[serde(default)]
    pub delete_steps: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub continuation_token: Option<String>,
    pub take: Option<usize>,
    pub return_count: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteParams {
    pub delete_steps: Option<bool>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub substitutions: Vec<String>,
    #[serde(default)]
    pub order_by: Option<String>,
    #[serde(default)]
    pub descending: Option<bool>,
    #[serde(default)]
    pub projection: Vec<String>,
    #[serde(default)]
    pub continuation_token: Option<String>,
    #[serde(default)]
    pub take: Option<usize>,
    #[serde(default)]
    pub return_count: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryValues {
    pub field: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub substitutions: Vec<String>,
    #[serde(default)]
    pub starts_with: Option<String>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    app_with_store(Store::default())
}

pub fn app_with_store(store: Store) -> Router {
    let db: Db = Arc::new(RwLock::new(store));
    Router::new()
        .route(BASE_PATH, get(api_info))
        .route(&format!("{BASE_PATH}/"), get(api_info))
        .route(&format!("{BASE_PATH}/results"), get(list_results).post(create_results))
        .route(
            &format!("{BASE_PATH}/results/{{id}}"),
            get(get_result).delete(delete_result),
        )
        .route(&format!("{BASE_PATH}/query-results"), post(query_results))
        .route(&format!("{BASE_PATH}/query-result-values"), post(query_result_values))
        .route(&format!("{BASE_PATH}/update-results"), post(update_results))
        .route(&format!("{BASE_PATH}/delete-results"), post(delete_results))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn api_info() -> Json<Value> {
    let operations: BTreeMap<&str, Value> = [
        "createResults",
        "getResults",
        "queryResults",
        "getResult",
        "updateResults",
        "deleteResult",
        "deleteResults",
        "queryResultValues",
    ]
    .into_iter()
    .map(|name| (name, json!({ "available": true, "version": 1 })))
    .collect();
    Json(json!({ "operations": operations }))
}

async fn create_results(State(db): State<Db>, Json(input): Json<CreateResults>) -> Response {
    let mut store = db.write().await;
    let mut results = Vec::new();
    let mut failed = Vec::new();
    let mut errors = Vec::new();
    for item in input.results {
        match store.create(item.clone()) {
            Ok(created) => results.push(created),
            Err(error) => {
                failed.push(item);
                errors.push(error);
            }
        }
    }
    info!(created = results.len(), failed = failed.len(), "create results");
    if failed.is_empty() {
        return (StatusCode::CREATED, Json(json!({ "results": results }))).into_response();
    }
    let body = json!({
        "results": results,
        "failed": failed,
        "error": ErrorDetail::one_or_more(errors),
    });
    (StatusCode::OK, Json(body)).into_response()
}

async fn list_results(
    State(db): State<Db>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, Failure> {
    let store = db.read().await;
    let all: Vec<TestResult> = store.results().to_vec();
    let total = all.len();
    let (page, token) = paginate(all, params.continuation_token.as_deref(), params.take)?;
    Ok(Json(page_body(
        serde_json::to_value(page).unwrap_or_default(),
        token,
        params.return_count.unwrap_or(false).then_some(total),
    )))
}

async fn get_result(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<TestResult>, Failure> {
    let store = db.read().await;
    store.get(&id).cloned().map(Json).ok_or_else(|| Failure::not_found(&id))
}

async fn delete_result(
    State(db): State<Db>,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<StatusCode, Failure> {
    let mut store = db.write().await;
    if store.remove(&id) {
        debug!(%id, delete_steps = ?params.delete_steps, "deleted result");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Failure::not_found(&id))
    }
}

async fn query_results(
    State(db): State<Db>,
    Json(query): Json<QueryResults>,
) -> Result<Json<Value>, Failure> {
    let filter = Filter::parse(query.filter.as_deref(), &query.substitutions)
        .map_err(|e| Failure::bad_request("Skyline.QueryParse", e.to_string()))?;
    let fields = query
        .projection
        .iter()
        .map(|f| projection_key(f).ok_or_else(|| unknown_field(f)))
        .collect::<Result<Vec<_>, _>>()?;

    let store = db.read().await;
    let mut matching: Vec<TestResult> = store
        .results()
        .iter()
        .filter(|r| filter.matches(r))
        .cloned()
        .collect();
    drop(store);

    if let Some(order_by) = &query.order_by {
        if !is_order_field(order_by) {
            return Err(unknown_field(order_by));
        }
        matching.sort_by(|a, b| compare_by(a, b, order_by));
        if query.descending.unwrap_or(false) {
            matching.reverse();
        }
    }

    let total = matching.len();
    let (page, token) = paginate(matching, query.continuation_token.as_deref(), query.take)?;
    let projected = page
        .iter()
        .map(|r| project(r, &fields))
        .collect::<Vec<_>>();
    Ok(Json(page_body(
        Value::Array(projected),
        token,
        query.return_count.unwrap_or(false).then_some(total),
    )))
}

async fn query_result_values(
    State(db): State<Db>,
    Json(query): Json<QueryValues>,
) -> Result<Json<Vec<String>>, Failure> {
    let field = values_field(&query.field).ok_or_else(|| unknown_field(&query.field))?;
    let filter = Filter::parse(query.filter.as_deref(), &query.substitutions)
        .map_err(|e| Failure::bad_request("Skyline.QueryParse", e.to_string()))?;
    let store = db.read().await;
    let mut values: Vec<String> = store
        .results()
        .iter()
        .filter(|r| filter.matches(r))
        .filter_map(|r| field.value(r))
        .filter(|v| query.starts_with.as_deref().map_or(true, |prefix| v.starts_with(prefix)))
        .map(str::to_string)
        .collect();
    values.sort();
    values.dedup();
    Ok(Json(values))
}

async fn update_results(State(db): State<Db>, Json(input): Json<UpdateResults>) -> Json<Value> {
    let mut store = db.write().await;
    let mut results = Vec::new();
    let mut failed = Vec::new();
    let mut errors = Vec::new();
    for item in &input.results {
        match store.update(item, input.replace) {
            Ok(updated) => results.push(updated),
            Err(error) => {
                failed.push(item.clone());
                errors.push(error);
            }
        }
    }
    info!(
        updated = results.len(),
        failed = failed.len(),
        replace = input.replace,
        determine_status_from_steps = ?input.determine_status_from_steps,
        "update results"
    );
    if failed.is_empty() {
        return Json(json!({ "results": results }));
    }
    Json(json!({
        "results": results,
        "failed": failed,
        "error": ErrorDetail::one_or_more(errors),
    }))
}

async fn delete_results(State(db): State<Db>, Json(input): Json<DeleteResults>) -> Response {
    let mut store = db.write().await;
    let mut deleted = Vec::new();
    let mut failed = Vec::new();
    let mut errors = Vec::new();
    for id in input.ids {
        if store.remove(&id) {
            deleted.push(id);
        } else {
            errors.push(ErrorDetail::result_not_found(&id));
            failed.push(id);
        }
    }
    info!(
        deleted = deleted.len(),
        failed = failed.len(),
        delete_steps = ?input.delete_steps,
        "delete results"
    );
    if failed.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    let body = json!({
        "ids": deleted,
        "failed": failed,
        "error": ErrorDetail::one_or_more(errors),
    });
    (StatusCode::OK, Json(body)).into_response()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Continuation tokens are the offset of the next item in the ordered set.
fn paginate<T>(
    items: Vec<T>,
    token: Option<&str>,
    take: Option<usize>,
) -> Result<(Vec<T>, Option<String>), Failure> {
    let take = take.unwrap_or(DEFAULT_TAKE);
    if take == 0 {
        return Err(Failure::bad_request("Skyline.InvalidTake", "take must be greater than 0"));
    }
    let offset = match token {
        None => 0,
        Some(raw) => raw
            .parse::<usize>()
            .ok()
            .filter(|offset| *offset <= items.len())
            .ok_or_else(|| Failure::bad_request("Skyline.InvalidContinuationToken", "invalid continuation token"))?,
    };
    let end = offset.saturating_add(take).min(items.len());
    let next = (end < items.len()).then(|| end.to_string());
    let page = items.into_iter().skip(offset).take(end - offset).collect();
    Ok((page, next))
}

fn page_body(results: Value, token: Option<String>, total: Option<usize>) -> Value {
    let mut body = json!({ "results": results, "continuationToken": token });
    if let Some(total) = total {
        body["totalCount"] = json!(total);
    }
    body
}

fn unknown_field(field: &str) -> Failure {
    Failure::bad_request("Skyline.UnknownField", format!("unknown field {field}"))
}

/// JSON key of a `projection` entry.
fn projection_key(field: &str) -> Option<&'static str> {
    Some(match field {
        "ID" => "id",
        "STATUS" => "status",
        "STARTED_AT" => "startedAt",
        "UPDATED_AT" => "updatedAt",
        "PROGRAM_NAME" => "programName",
        "SYSTEM_ID" => "systemId",
        "HOST_NAME" => "hostName",
        "OPERATOR" => "operator",
        "SERIAL_NUMBER" => "serialNumber",
        "PART_NUMBER" => "partNumber",
        "TOTAL_TIME_IN_SECONDS" => "totalTimeInSeconds",
        "KEYWORDS" => "keywords",
        "PROPERTIES" => "properties",
        "FILE_IDS" => "fileIds",
        "STATUS_TYPE_SUMMARY" => "statusTypeSummary",
        "WORKSPACE" => "workspace",
        "DATA_TABLE_IDS" => "dataTableIds",
        _ => return None,
    })
}

fn project(result: &TestResult, fields: &[&str]) -> Value {
    let mut value = serde_json::to_value(result).unwrap_or_default();
    if fields.is_empty() {
        return value;
    }
    if let Value::Object(map) = &mut value {
        map.retain(|key, _| fields.contains(&key.as_str()));
    }
    value
}

fn values_field(field: &str) -> Option<Field> {
    Some(match field {
        "ID" => Field::Id,
        "PROGRAM_NAME" => Field::ProgramName,
        "SYSTEM_ID" => Field::SystemId,
        "HOST_NAME" => Field::HostName,
        "OPERATOR" => Field::Operator,
        "SERIAL_NUMBER" => Field::SerialNumber,
        "PART_NUMBER" => Field::PartNumber,
        _ => return None,
    })
}

fn is_order_field(field: &str) -> bool {
    matches!(
        field,
        "ID" | "STARTED_AT"
            | "UPDATED_AT"
            | "PROGRAM_NAME"
            | "SYSTEM_ID"
            | "HOST_NAME"
            | "OPERATOR"
            | "SERIAL_NUMBER"
            | "PART_NUMBER"
            | "TOTAL_TIME_IN_SECONDS"
    )
}

/// Missing values sort first.
fn compare_by(a: &TestResult, b: &TestResult, field: &str) -> Ordering {
    match field {
        "STARTED_AT" => a.started_at.cmp(&b.started_at),
        "UPDATED_AT" => a.updated_at.cmp(&b.updated_at),
        "TOTAL_TIME_IN_SECONDS" => a
            .total_time_in_seconds
            .partial_cmp(&b.total_time_in_seconds)
            .unwrap_or(Ordering::Equal),
        other => {
            let field = match other {
                "ID" => Field::Id,
                "PROGRAM_NAME" => Field::ProgramName,
                "SYSTEM_ID" => Field::SystemId,
                "HOST_NAME" => Field::HostName,
                "OPERATOR" => Field::Operator,
                "SERIAL_NUMBER" => Field::SerialNumber,
                _ => Field::PartNumber,
            };
            field.value(a).cmp(&field.value(b))
        }
    }
}

#[cfg(test)]
impl TestResult {
    pub(crate) fn sample(program_name: &str) -> Self {
        Self {
            id: "00000000-0000-0000-0000-000000000001".to_string(),
            program_name: program_name.to_string(),
            status: Status {
                status_type: "PASSED".to_string(),
                status_name: Some("passed".to_string()),
            },
            started_at: None,
            updated_at: DateTime::from_timestamp(0, 0).unwrap(),
            system_id: None,
            host_name: None,
            operator: None,
            part_number: None,
            serial_number: None,
            total_time_in_seconds: None,
            keywords: Vec::new(),
            properties: BTreeMap::new(),
            file_ids: Vec::new(),
            data_table_ids: Vec::new(),
            workspace: DEFAULT_WORKSPACE.to_string(),
        }
    }
}
