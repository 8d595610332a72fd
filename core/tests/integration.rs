//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts its own mock server on a random port, then drives the
//! core client over real HTTP through a ureq-backed `Transport`. This checks
//! that request building and response parsing agree with the server's wire
//! format.

use std::collections::HashSet;

use mock_server::DEFAULT_WORKSPACE;
use testmonitor_core::{
    ApiError, DeleteOutcome, HttpMethod, HttpRequest, HttpResponse, ResultField,
    ResultQueryOrderByField, ResultValuesQuery, ResultValuesQueryField, ResultsAdvancedQuery,
    Session, StatusObject, StatusType, TestMonitorClient, TestResultRequest,
    TestResultUpdateRequest, Transport,
};

const INVALID_ID: &str = "invalid_id12323";

/// Executes requests with ureq.
///
/// Disables ureq's automatic status-code-as-error behavior so 4xx/5xx
/// responses are returned as data rather than `Err`, letting the core
/// client handle status interpretation.
struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn execute(&self, req: HttpRequest) -> Result<HttpResponse, ApiError> {
        let result = match (req.method, req.body) {
            (HttpMethod::Get, _) => with_headers(self.agent.get(&req.path), &req.headers).call(),
            (HttpMethod::Delete, _) => with_headers(self.agent.delete(&req.path), &req.headers).call(),
            (HttpMethod::Post, Some(body)) => {
                with_headers(self.agent.post(&req.path), &req.headers).send(body.as_bytes())
            }
            (HttpMethod::Post, None) => with_headers(self.agent.post(&req.path), &req.headers).send_empty(),
            (HttpMethod::Put, Some(body)) => {
                with_headers(self.agent.put(&req.path), &req.headers).send(body.as_bytes())
            }
            (HttpMethod::Put, None) => with_headers(self.agent.put(&req.path), &req.headers).send_empty(),
        };
        let mut response = result.map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(HttpResponse::new(status, body))
    }
}

/// Start a mock server on a random port and return a session bound to it.
fn start_server() -> Session<UreqTransport> {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    let client = TestMonitorClient::new(&format!("http://{addr}{}", mock_server::BASE_PATH));
    Session::new(client, UreqTransport::new())
}

fn sample(program: &str, part: &str) -> TestResultRequest {
    TestResultRequest::new(program, StatusObject::new(StatusType::Passed, "passed"))
        .with_part_number(part)
        .with_keywords(["TestKeyword"])
        .with_property("TestKey", "TestValue")
}

fn create_one(session: &Session<UreqTransport>, request: TestResultRequest) -> String {
    let outcome = session.create_results(&[request]).unwrap();
    assert!(outcome.is_complete());
    outcome.results[0].id.clone().unwrap()
}

#[test]
fn api_info_lists_operations() {
    let session = start_server();
    let info = session.api_info().unwrap();
    assert!(info.is_available("createResults"));
    assert!(info.is_available("queryResultValues"));
    assert!(!info.is_available("noSuchOperation"));
}

#[test]
fn create_round_trips_fields() {
    let session = start_server();
    let request = sample("_TEST_RESULT", "Test_1")
        .with_serial_number("SN-1")
        .with_host_name("My-Host")
        .with_total_time(2.5)
        .with_property("Line", "3")
        .with_workspace(DEFAULT_WORKSPACE);

    let outcome = session.create_results(&[request.clone()]).unwrap();
    assert!(outcome.is_complete());
    assert_eq!(outcome.results.len(), 1);
    let created = &outcome.results[0];
    assert_eq!(created.program_name.as_deref(), Some("_TEST_RESULT"));
    assert_eq!(created.part_number.as_deref(), Some("Test_1"));
    assert_eq!(created.serial_number.as_deref(), Some("SN-1"));
    assert_eq!(created.host_name.as_deref(), Some("My-Host"));
    assert_eq!(created.total_time_in_seconds, Some(2.5));
    assert_eq!(created.status.as_ref(), Some(&request.status));
    assert_eq!(
        created.status.as_ref().and_then(|s| s.status_name.as_deref()),
        Some("passed")
    );
    assert_eq!(created.keywords, request.keywords);
    assert_eq!(created.keywords.as_deref(), Some(&["TestKeyword".to_string()][..]));
    assert_eq!(created.properties, request.properties);
    assert_eq!(created.properties.as_ref().map(|p| p.len()), Some(2));
    assert_eq!(created.workspace.as_deref(), Some(DEFAULT_WORKSPACE));
    assert!(created.updated_at.is_some());

    let fetched = session.get_result(created.id.as_deref().unwrap()).unwrap();
    assert_eq!(&fetched, created);
}

#[test]
fn create_reports_partial_failure() {
    let session = start_server();
    let good = sample("_TEST_RESULT", "Test_1");
    let bad = sample("_TEST_RESULT", "Test_2").with_workspace(INVALID_ID);

    let outcome = session.create_results(&[good, bad]).unwrap();
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.failed_count(), 1);
    assert_eq!(outcome.failed()[0].workspace.as_deref(), Some(INVALID_ID));
    assert!(outcome.error.is_some());
    assert!(!outcome.is_complete());
}

#[test]
fn get_unknown_id_is_not_found() {
    let session = start_server();
    let err = session.get_result(INVALID_ID).unwrap_err();
    assert!(err.is_not_found(), "expected NotFound, got {err:?}");
    assert!(err.service_error().is_some());
}

#[test]
fn list_follows_continuation_tokens() {
    let session = start_server();
    for i in 0..5 {
        create_one(&session, sample("_TEST_RESULT", &format!("Test_{i}")));
    }

    let first = session.get_results(None, Some(2), true).unwrap();
    assert_eq!(first.results.len(), 2);
    assert_eq!(first.total_count, Some(5));
    assert!(!first.is_last());

    let pages: Vec<_> = session
        .get_results_pages(Some(2))
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(pages.len(), 3);
    assert!(pages.last().unwrap().is_last());

    let ids: HashSet<String> = pages
        .iter()
        .flat_map(|page| page.results.iter().filter_map(|r| r.id.clone()))
        .collect();
    assert_eq!(ids.len(), 5);
}

#[test]
fn query_filters_orders_and_pages() {
    let session = start_server();
    for part in ["c", "a", "b"] {
        create_one(&session, sample("_TEST_RESULT", part));
    }
    create_one(&session, sample("Other", "z"));

    let query = ResultsAdvancedQuery::new()
        .with_filter("programName == @0", ["_TEST_RESULT"])
        .order_by(ResultQueryOrderByField::PartNumber, false)
        .with_take(2)
        .with_return_count(true);

    let all = session.query_all_results(&query).unwrap();
    let parts: Vec<_> = all.iter().filter_map(|r| r.part_number.as_deref()).collect();
    assert_eq!(parts, vec!["a", "b", "c"]);

    let ids: HashSet<_> = all.iter().filter_map(|r| r.id.clone()).collect();
    assert_eq!(ids.len(), 3);
}

#[test]
fn query_projection_limits_fields() {
    let session = start_server();
    create_one(&session, sample("_TEST_RESULT", "Test_1"));

    let query = ResultsAdvancedQuery::new()
        .with_filter("programName == @0", ["_TEST_RESULT"])
        .with_projection([ResultField::ProgramName]);
    let page = session.query_results(&query).unwrap();
    assert_eq!(page.results.len(), 1);
    let result = &page.results[0];
    assert_eq!(result.program_name.as_deref(), Some("_TEST_RESULT"));
    assert!(result.id.is_none());
    assert!(result.part_number.is_none());
}

#[test]
fn query_with_malformed_filter_is_validation_error() {
    let session = start_server();
    let query = ResultsAdvancedQuery::new().with_filter("programName === @0", ["x"]);
    let err = session.query_results(&query).unwrap_err();
    assert!(matches!(err, ApiError::Validation { status: 400, .. }), "got {err:?}");
}

#[test]
fn query_result_values_with_prefix() {
    let session = start_server();
    create_one(&session, sample("_TEST_RESULT", "Test_1"));
    create_one(&session, sample("_TEST_RESULT", "Test_2"));
    create_one(&session, sample("Other", "Test_3"));

    let query = ResultValuesQuery::new(ResultValuesQueryField::ProgramName).with_starts_with("_T");
    let values = session.query_result_values(&query).unwrap();
    assert_eq!(values.0, vec!["_TEST_RESULT".to_string()]);

    let query = ResultValuesQuery::new(ResultValuesQueryField::PartNumber)
        .with_filter("programName == @0", ["_TEST_RESULT"]);
    let values = session.query_result_values(&query).unwrap();
    assert_eq!(values.len(), 2);
}

#[test]
fn update_merges_or_replaces() {
    let session = start_server();
    let id = create_one(&session, sample("_TEST_RESULT", "Test_1"));

    let update = TestResultUpdateRequest::new(id.clone())
        .with_program_name("NewResult")
        .with_keywords(["NewKeyword"])
        .with_property("NewKey", "NewValue");

    let merged = session.update_results(&[update.clone()], false).unwrap();
    assert!(merged.is_complete());
    let result = &merged.results[0];
    assert_eq!(result.program_name.as_deref(), Some("NewResult"));
    assert_eq!(result.keywords.as_ref().map(Vec::len), Some(2));
    assert_eq!(result.properties.as_ref().map(|p| p.len()), Some(2));

    let replaced = session.update_results(&[update], true).unwrap();
    let result = &replaced.results[0];
    assert_eq!(result.keywords.as_deref(), Some(&["NewKeyword".to_string()][..]));
    assert_eq!(result.properties.as_ref().map(|p| p.len()), Some(1));
    assert!(result.updated_at > merged.results[0].updated_at);
}

#[test]
fn update_reports_unknown_ids() {
    let session = start_server();
    let id = create_one(&session, sample("_TEST_RESULT", "Test_1"));

    let updates = [
        TestResultUpdateRequest::new(id).with_property("NewKey", "NewValue"),
        TestResultUpdateRequest::new(INVALID_ID).with_property("NewKey", "NewValue"),
    ];
    let outcome = session.update_results(&updates, true).unwrap();
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.failed_count(), 1);
    assert_eq!(outcome.failed()[0].id, INVALID_ID);
    assert!(outcome.error.is_some());
}

#[test]
fn delete_single_then_get_is_not_found() {
    let session = start_server();
    let id = create_one(&session, sample("_TEST_RESULT", "Test_1"));

    session.delete_result(&id, true).unwrap();
    assert!(session.get_result(&id).unwrap_err().is_not_found());
    assert!(session.delete_result(&id, true).unwrap_err().is_not_found());
}

#[test]
fn delete_results_reports_partition() {
    let session = start_server();
    let first = create_one(&session, sample("_TEST_RESULT", "Test_1"));
    let second = create_one(&session, sample("_TEST_RESULT", "Test_2"));

    let outcome = session
        .delete_results(&[first.clone(), INVALID_ID.to_string()], false)
        .unwrap();
    assert_eq!(outcome.failed_ids(), [INVALID_ID.to_string()]);
    match &outcome {
        DeleteOutcome::Partial(partial) => assert_eq!(partial.results, vec![first]),
        DeleteOutcome::AllDeleted => panic!("expected a partial outcome"),
    }

    let outcome = session.delete_results(&[second.clone()], true).unwrap();
    assert_eq!(outcome, DeleteOutcome::AllDeleted);
    assert!(session.get_all_results(None).unwrap().is_empty());
}
