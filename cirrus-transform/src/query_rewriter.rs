//! Query-to-lookup rewriting.
//!
//! A structured query without a projection is run as a keys-only query, then
//! the returned keys are fetched with a single `Lookup`. Interceptors placed
//! after the rewriter (the cache interceptor in particular) see that lookup,
//! so full-entity queries are served through the point-lookup cache.

use std::collections::HashMap;

use async_trait::async_trait;
use cirrus_core::{
    CallContext, CirrusResult, ConsistencyError, EntityResult, Interceptor, Invoker, Key,
    LookupRequest, Method, Projection, Query, QueryType, Request, Response, ResultType,
    RunQueryRequest, RunQueryResponse,
};
use tracing::debug;

/// Interceptor that turns eligible `RunQuery` calls into keys-only query + `Lookup`.
///
/// Eligible means a structured query with an empty projection. GQL queries
/// and queries that already project are passed through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryRewriter;

impl QueryRewriter {
    pub fn new() -> Self {
        Self
    }

    async fn rewrite(
        &self,
        ctx: &CallContext,
        method: &str,
        request: &RunQueryRequest,
        query: &Query,
        next: &dyn Invoker,
    ) -> CirrusResult<RunQueryResponse> {
        let keys_only = Request::RunQuery(keys_only_request(request, query));
        let mut response = ctx
            .run(next.invoke(ctx, method, &keys_only))
            .await?
            .into_run_query(method)?;

        let Some(mut batch) = response.batch.take() else {
            return Ok(response);
        };
        if batch.entity_results.is_empty() {
            response.batch = Some(batch);
            return Ok(response);
        }

        let keys = batch
            .entity_results
            .iter()
            .map(|r| r.key().cloned().ok_or(ConsistencyError::MissingKey))
            .collect::<Result<Vec<Key>, _>>()?;
        debug!(keys = keys.len(), "fetching query results by key");

        let lookup_method = Method::Lookup.full_name();
        let lookup = Request::Lookup(LookupRequest {
            project_id: request.project_id.clone(),
            read_options: request.read_options.clone(),
            keys,
        });
        let found = ctx
            .run(next.invoke(ctx, lookup_method, &lookup))
            .await?
            .into_lookup(lookup_method)?
            .found;

        if found.len() != batch.entity_results.len() {
            return Err(ConsistencyError::LookupCountMismatch {
                requested: batch.entity_results.len(),
                found: found.len(),
            }
            .into());
        }

        splice(&mut batch.entity_results, found)?;
        batch.entity_result_type = ResultType::Full;
        response.batch = Some(batch);
        response.query = Some(query.clone());
        Ok(response)
    }
}

/// The caller's request with its query narrowed to keys only.
fn keys_only_request(request: &RunQueryRequest, query: &Query) -> RunQueryRequest {
    RunQueryRequest {
        query_type: Some(QueryType::Query(Query {
            projection: vec![Projection::key()],
            ..query.clone()
        })),
        ..request.clone()
    }
}

/// Replace each keys-only slot with the looked-up entity for the same key.
fn splice(slots: &mut [EntityResult], found: Vec<EntityResult>) -> CirrusResult<()> {
    let by_key: HashMap<Key, EntityResult> = found
        .into_iter()
        .filter_map(|r| r.key().cloned().map(|k| (k, r)))
        .collect();

    for slot in slots.iter_mut() {
        let key = slot.key().ok_or(ConsistencyError::MissingKey)?;
        let full = by_key
            .get(key)
            .ok_or_else(|| ConsistencyError::MissingEntity {
                key: key.to_string(),
            })?;
        slot.entity = full.entity.clone();
        slot.version = full.version;
    }
    Ok(())
}

#[async_trait]
impl Interceptor for QueryRewriter {
    async fn intercept(
        &self,
        ctx: &CallContext,
        method: &str,
        request: &Request,
        next: &dyn Invoker,
    ) -> CirrusResult<Response> {
        if Method::from_full_name(method) != Some(Method::RunQuery) {
            return next.invoke(ctx, method, request).await;
        }

        let run_query = request.as_run_query(method)?;
        match run_query.query() {
            Some(query) if query.projection.is_empty() => self
                .rewrite(ctx, method, run_query, query, next)
                .await
                .map(Response::RunQuery),
            _ => next.invoke(ctx, method, request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_core::{Entity, Value};

    #[test]
    fn test_keys_only_request_leaves_original_untouched() {
        let query = Query::kind("Task").limit(5);
        let request = RunQueryRequest::new("p", query.clone());

        let derived = keys_only_request(&request, &query);

        assert!(derived.query().unwrap().is_keys_only());
        assert_eq!(derived.query().unwrap().limit, Some(5));
        assert!(request.query().unwrap().projection.is_empty());
    }

    #[test]
    fn test_splice_matches_by_key_not_position() {
        let a = Key::id("Task", 1);
        let b = Key::id("Task", 2);
        let mut slots = vec![
            EntityResult::new(Entity::new(a.clone())),
            EntityResult::new(Entity::new(b.clone())),
        ];
        let found = vec![
            EntityResult::new(Entity::new(b).with("n", 2i64)).with_version(7),
            EntityResult::new(Entity::new(a).with("n", 1i64)).with_version(3),
        ];

        splice(&mut slots, found).unwrap();

        assert_eq!(slots[0].entity.get("n"), Some(&Value::Integer(1)));
        assert_eq!(slots[0].version, 3);
        assert_eq!(slots[1].entity.get("n"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_splice_reports_missing_entity() {
        let mut slots = vec![EntityResult::new(Entity::new(Key::id("Task", 1)))];
        let found = vec![EntityResult::new(Entity::new(Key::id("Task", 2)))];

        let err = splice(&mut slots, found).unwrap_err();
        assert!(matches!(
            err,
            cirrus_core::CirrusError::Consistency(ConsistencyError::MissingEntity { .. })
        ));
    }
}
