//! Typed client over any [`Invoker`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::CallContext;
use crate::entity::{Entity, EntityResult};
use crate::error::CirrusResult;
use crate::invoker::Invoker;
use crate::key::Key;
use crate::message::{
    CommitRequest, CommitResponse, LookupRequest, LookupResponse, Mutation, Query, Request,
    RunQueryRequest, RunQueryResponse,
};
use crate::method::Method;

/// Issues typed datastore calls through an invoker, usually an
/// [`InterceptorChain`](crate::InterceptorChain). Callers never see whether
/// a cache sits in the chain.
#[derive(Clone)]
pub struct DatastoreClient {
    project_id: String,
    invoker: Arc<dyn Invoker>,
}

impl DatastoreClient {
    pub fn new(project_id: impl Into<String>, invoker: Arc<dyn Invoker>) -> Self {
        Self {
            project_id: project_id.into(),
            invoker,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub async fn lookup(
        &self,
        ctx: &CallContext,
        request: &LookupRequest,
    ) -> CirrusResult<LookupResponse> {
        let method = Method::Lookup.full_name();
        self.invoker
            .invoke(ctx, method, &Request::Lookup(request.clone()))
            .await?
            .into_lookup(method)
    }

    pub async fn commit(
        &self,
        ctx: &CallContext,
        request: &CommitRequest,
    ) -> CirrusResult<CommitResponse> {
        let method = Method::Commit.full_name();
        self.invoker
            .invoke(ctx, method, &Request::Commit(request.clone()))
            .await?
            .into_commit(method)
    }

    pub async fn run_query(
        &self,
        ctx: &CallContext,
        request: &RunQueryRequest,
    ) -> CirrusResult<RunQueryResponse> {
        let method = Method::RunQuery.full_name();
        self.invoker
            .invoke(ctx, method, &Request::RunQuery(request.clone()))
            .await?
            .into_run_query(method)
    }

    /// Look up a single key. `Ok(None)` when the entity does not exist.
    pub async fn get(&self, ctx: &CallContext, key: &Key) -> CirrusResult<Option<Entity>> {
        let request = LookupRequest::new(self.project_id.clone(), vec![key.clone()]);
        let response = self.lookup(ctx, &request).await?;
        Ok(response
            .found
            .into_iter()
            .find(|r| r.key() == Some(key))
            .map(|r| r.entity))
    }

    /// Look up many keys, returning one slot per key in key order.
    pub async fn get_many(
        &self,
        ctx: &CallContext,
        keys: &[Key],
    ) -> CirrusResult<Vec<Option<Entity>>> {
        let request = LookupRequest::new(self.project_id.clone(), keys.to_vec());
        let response = self.lookup(ctx, &request).await?;
        Ok(order_by_keys(keys, response.found))
    }

    /// Commit a batch of mutations outside a transaction.
    pub async fn mutate(
        &self,
        ctx: &CallContext,
        mutations: Vec<Mutation>,
    ) -> CirrusResult<CommitResponse> {
        let request = CommitRequest::new(self.project_id.clone(), mutations);
        self.commit(ctx, &request).await
    }

    /// Run a structured query and return its entities.
    pub async fn query(&self, ctx: &CallContext, query: Query) -> CirrusResult<Vec<Entity>> {
        let request = RunQueryRequest::new(self.project_id.clone(), query);
        let response = self.run_query(ctx, &request).await?;
        Ok(response
            .batch
            .map(|b| b.entity_results.into_iter().map(|r| r.entity).collect())
            .unwrap_or_default())
    }
}

/// Lookup replies are unordered; re-align them with the requested keys.
fn order_by_keys(keys: &[Key], found: Vec<EntityResult>) -> Vec<Option<Entity>> {
    let by_key: HashMap<Key, Entity> = found
        .into_iter()
        .filter_map(|r| r.entity.key.clone().map(|k| (k, r.entity)))
        .collect();
    keys.iter().map(|k| by_key.get(k).cloned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_by_keys_realigns_and_marks_missing() {
        let a = Key::id("Task", 1);
        let b = Key::id("Task", 2);
        let c = Key::id("Task", 3);
        let found = vec![
            EntityResult::new(Entity::new(c.clone()).with("n", 3i64)),
            EntityResult::new(Entity::new(a.clone()).with("n", 1i64)),
        ];

        let ordered = order_by_keys(&[a.clone(), b, c.clone(), a.clone()], found);
        assert_eq!(ordered.len(), 4);
        assert_eq!(ordered[0].as_ref().and_then(|e| e.key.clone()), Some(a.clone()));
        assert!(ordered[1].is_none());
        assert_eq!(ordered[2].as_ref().and_then(|e| e.key.clone()), Some(c));
        assert_eq!(ordered[3].as_ref().and_then(|e| e.key.clone()), Some(a));
    }
}
