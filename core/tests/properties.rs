//! Property tests for bulk partial success and continuation-token paging.
//!
//! Wire bodies are generated from a per-item pass/fail mask so every
//! partition of N submitted items into N-k successes and k failures is
//! reachable.

use std::collections::HashSet;

use proptest::prelude::*;
use serde_json::{json, Value};
use testmonitor_core::{
    ApiError, HttpResponse, Pages, ResultsPage, TestMonitorClient, TestResultResponse,
};

fn client() -> TestMonitorClient {
    TestMonitorClient::new("http://localhost:3000/nitestmonitor/v2")
}

/// Bulk response for `mask`, where `true` marks an item the service rejected.
/// Failed entries carry an `id` so they also decode as update failures.
fn create_body(mask: &[bool]) -> (u16, String) {
    let results: Vec<Value> = mask
        .iter()
        .enumerate()
        .filter(|(_, failed)| !**failed)
        .map(|(i, _)| json!({ "id": format!("r{i}"), "programName": format!("p{i}") }))
        .collect();
    let failed: Vec<Value> = mask
        .iter()
        .enumerate()
        .filter(|(_, failed)| **failed)
        .map(|(i, _)| {
            json!({
                "id": format!("x{i}"),
                "programName": format!("p{i}"),
                "status": { "statusType": "PASSED" },
                "workspace": "invalid_id12323"
            })
        })
        .collect();
    if failed.is_empty() {
        return (201, json!({ "results": results }).to_string());
    }
    let body = json!({
        "results": results,
        "failed": failed,
        "error": { "name": "Skyline.OneOrMoreErrorsOccurred" }
    });
    (200, body.to_string())
}

/// Serve `ids` in pages of `take` with offset tokens, counting requests.
fn paged(ids: Vec<String>, take: usize, calls: &mut usize) -> impl FnMut(Option<String>) -> Result<ResultsPage, ApiError> + '_ {
    move |token| {
        *calls += 1;
        let offset: usize = token.as_deref().map_or(0, |t| t.parse().unwrap());
        let end = (offset + take).min(ids.len());
        Ok(ResultsPage {
            results: ids[offset..end]
                .iter()
                .map(|id| TestResultResponse {
                    id: Some(id.clone()),
                    ..TestResultResponse::default()
                })
                .collect(),
            continuation_token: (end < ids.len()).then(|| end.to_string()),
            total_count: None,
        })
    }
}

proptest! {
    #[test]
    fn create_partition_accounts_for_every_item(mask in proptest::collection::vec(any::<bool>(), 0..40)) {
        let submitted = mask.len();
        let rejected = mask.iter().filter(|f| **f).count();
        let (status, body) = create_body(&mask);

        let outcome = client().parse_create_results(HttpResponse::new(status, body)).unwrap();

        prop_assert_eq!(outcome.results.len(), submitted - rejected);
        prop_assert_eq!(outcome.failed_count(), rejected);
        prop_assert_eq!(outcome.error.is_some(), rejected > 0);
        prop_assert_eq!(outcome.is_complete(), rejected == 0);
        prop_assert!(outcome.reconcile(submitted));

        let expected_failed: Vec<String> = mask
            .iter()
            .enumerate()
            .filter(|(_, failed)| **failed)
            .map(|(i, _)| format!("p{i}"))
            .collect();
        let failed: Vec<String> = outcome.failed().iter().map(|f| f.program_name.clone()).collect();
        prop_assert_eq!(failed, expected_failed);
    }

    #[test]
    fn failures_without_error_are_discarded(mask in proptest::collection::vec(any::<bool>(), 1..40)) {
        let (_, body) = create_body(&mask);
        let mut wire: Value = serde_json::from_str(&body).unwrap();
        if let Value::Object(map) = &mut wire {
            map.remove("error");
        }
        let rejected = mask.iter().filter(|f| **f).count();

        let outcome = client()
            .parse_update_results(HttpResponse::new(200, wire.to_string()))
            .unwrap();

        prop_assert_eq!(outcome.failed_count(), 0);
        prop_assert!(outcome.error.is_none());
        prop_assert_eq!(outcome.reconcile(mask.len()), rejected == 0);
    }

    #[test]
    fn following_tokens_yields_every_result_once(count in 0usize..60, take in 1usize..12) {
        let ids: Vec<String> = (0..count).map(|i| format!("id-{i}")).collect();
        let mut calls = 0;

        let all = Pages::new(paged(ids, take, &mut calls)).collect_results().unwrap();

        let unique: HashSet<_> = all.iter().filter_map(|r| r.id.clone()).collect();
        prop_assert_eq!(all.len(), count);
        prop_assert_eq!(unique.len(), count);
        prop_assert_eq!(calls, count.div_ceil(take).max(1));
    }
}
