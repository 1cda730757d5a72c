//! Query rewriting against the in-memory datastore.

use std::sync::Arc;

use cirrus_core::{InterceptorChain, Projection, ReadConsistency, ReadOptions};
use cirrus_test_utils::fixtures::{self, ctx, tasks};
use cirrus_test_utils::*;
use cirrus_transform::QueryRewriter;

fn rewriting(fake: &Arc<FakeDatastore>) -> InterceptorChain {
    InterceptorChain::new(fake.clone()).with(QueryRewriter::new())
}

async fn run_query(invoker: &dyn Invoker, request: &RunQueryRequest) -> CirrusResult<RunQueryResponse> {
    let method = Method::RunQuery.full_name();
    invoker
        .invoke(&ctx(), method, &Request::RunQuery(request.clone()))
        .await?
        .into_run_query(method)
}

fn queries() -> Vec<Query> {
    vec![
        Query::kind("Task"),
        Query::kind("Task").limit(4),
        Query::kind("Task").offset(7),
        Query::kind("Task").filter(Filter::property(
            "priority",
            PropertyOperator::GreaterThanOrEqual,
            3i64,
        )),
        Query::kind("Task").order_by("priority", Direction::Descending),
        Query::kind("Task").filter(Filter::Composite {
            op: CompositeOperator::And,
            filters: vec![
                Filter::property("done", PropertyOperator::Equal, false),
                Filter::property("priority", PropertyOperator::LessThan, 3i64),
            ],
        }),
    ]
}

#[tokio::test]
async fn test_rewritten_reply_matches_a_direct_query() {
    let fake = Arc::new(FakeDatastore::with_entities(tasks(12)));
    let chain = rewriting(&fake);

    for query in queries() {
        let request = RunQueryRequest::new(fixtures::PROJECT_ID, query.clone());
        let direct = run_query(fake.as_ref(), &request).await.unwrap();
        let rewritten = run_query(&chain, &request).await.unwrap();

        assert_eq!(rewritten, direct, "query {query:?}");
        assert_eq!(
            rewritten.batch.as_ref().map(|b| b.entity_result_type),
            Some(ResultType::Full)
        );
    }
}

#[tokio::test]
async fn test_issues_keys_only_query_then_one_lookup() {
    let fake = Arc::new(FakeDatastore::with_entities(tasks(5)));
    let mut request = RunQueryRequest::new(fixtures::PROJECT_ID, Query::kind("Task").limit(3));
    request.read_options = Some(ReadOptions::consistency(ReadConsistency::Eventual));

    run_query(&rewriting(&fake), &request).await.unwrap();

    let queries = fake.run_query_requests();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].query().unwrap().is_keys_only());
    assert_eq!(queries[0].query().unwrap().limit, Some(3));

    let lookups = fake.lookup_requests();
    assert_eq!(lookups.len(), 1);
    assert_eq!(lookups[0].keys, fixtures::keys_of(&tasks(3)));
    assert_eq!(lookups[0].project_id, request.project_id);
    assert_eq!(lookups[0].read_options, request.read_options);
}

#[tokio::test]
async fn test_callers_request_keeps_its_shape() {
    let fake = Arc::new(FakeDatastore::with_entities(tasks(2)));
    let request = RunQueryRequest::new(fixtures::PROJECT_ID, Query::kind("Task"));
    let before = request.clone();

    run_query(&rewriting(&fake), &request).await.unwrap();
    assert_eq!(request, before);

    fake.fail_method(Method::Lookup, RemoteCode::Internal);
    let _ = run_query(&rewriting(&fake), &request).await;
    assert_eq!(request, before);
}

#[tokio::test]
async fn test_empty_keys_only_reply_is_returned_unchanged() {
    let fake = Arc::new(FakeDatastore::with_entities(tasks(2)));
    let request = RunQueryRequest::new(fixtures::PROJECT_ID, Query::kind("Nothing"));

    let response = run_query(&rewriting(&fake), &request).await.unwrap();

    let batch = response.batch.unwrap();
    assert!(batch.entity_results.is_empty());
    assert_eq!(batch.entity_result_type, ResultType::KeyOnly);
    assert_eq!(fake.call_count(Method::Lookup), 0);
}

#[tokio::test]
async fn test_projection_queries_pass_through() {
    let fake = Arc::new(FakeDatastore::with_entities(tasks(3)));
    let chain = rewriting(&fake);

    let projected = RunQueryRequest::new(fixtures::PROJECT_ID, Query::kind("Task").project("title"));
    let response = run_query(&chain, &projected).await.unwrap();
    assert_eq!(response.batch.unwrap().entity_result_type, ResultType::Projection);

    let mut keys_only = Query::kind("Task");
    keys_only.projection = vec![Projection::key()];
    let keys_only = RunQueryRequest::new(fixtures::PROJECT_ID, keys_only);
    let response = run_query(&chain, &keys_only).await.unwrap();
    assert_eq!(response.batch.unwrap().entity_result_type, ResultType::KeyOnly);

    assert_eq!(fake.run_query_requests(), vec![projected, keys_only]);
    assert_eq!(fake.call_count(Method::Lookup), 0);
}

#[tokio::test]
async fn test_gql_queries_pass_through() {
    let fake = Arc::new(FakeDatastore::with_entities(tasks(3)));
    let request = RunQueryRequest::gql(fixtures::PROJECT_ID, "SELECT * FROM Task");

    run_query(&rewriting(&fake), &request).await.unwrap();

    assert_eq!(fake.run_query_requests(), vec![request]);
    assert_eq!(fake.call_count(Method::Lookup), 0);
}

#[tokio::test]
async fn test_keys_only_failure_is_propagated() {
    let fake = Arc::new(FakeDatastore::with_entities(tasks(3)));
    fake.fail_method(Method::RunQuery, RemoteCode::PermissionDenied);
    let request = RunQueryRequest::new(fixtures::PROJECT_ID, Query::kind("Task"));

    let result = run_query(&rewriting(&fake), &request).await;

    assertions::assert_remote_code(&result, RemoteCode::PermissionDenied);
    assert_eq!(fake.call_count(Method::Lookup), 0);
}

#[tokio::test]
async fn test_lookup_failure_is_propagated() {
    let fake = Arc::new(FakeDatastore::with_entities(tasks(3)));
    fake.fail_method(Method::Lookup, RemoteCode::Unavailable);
    let request = RunQueryRequest::new(fixtures::PROJECT_ID, Query::kind("Task"));

    let result = run_query(&rewriting(&fake), &request).await;

    assertions::assert_remote_code(&result, RemoteCode::Unavailable);
}

#[tokio::test]
async fn test_lookup_count_mismatch_fails_the_call() {
    let fake = Arc::new(FakeDatastore::with_entities(tasks(3)));
    fake.hide_from_lookup(Key::id("Task", 2));
    let request = RunQueryRequest::new(fixtures::PROJECT_ID, Query::kind("Task"));

    let result = run_query(&rewriting(&fake), &request).await;

    assertions::assert_consistency_error(&result);
    assert!(matches!(
        result,
        Err(CirrusError::Consistency(ConsistencyError::LookupCountMismatch {
            requested: 3,
            found: 2
        }))
    ));
}

#[tokio::test]
async fn test_other_methods_pass_through() {
    let fake = Arc::new(FakeDatastore::with_entities(tasks(1)));
    let method = Method::Lookup.full_name();

    let response = rewriting(&fake)
        .invoke(&ctx(), method, &fixtures::lookup(vec![Key::id("Task", 1)]))
        .await
        .unwrap()
        .into_lookup(method)
        .unwrap();

    assert_eq!(response.found.len(), 1);
    assert_eq!(fake.call_count(Method::RunQuery), 0);
}
