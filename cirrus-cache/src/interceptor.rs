//! Read-through cache interceptor for point lookups.
//!
//! Non-transactional `Lookup` calls are served from the [`Cacher`] where
//! possible; only the keys the cache could not answer go to the remote
//! service, and what comes back is written to the cache. A successful
//! `Commit` removes the cache entries of every updated, upserted or deleted
//! key. Every other method passes through untouched.
//!
//! # Reply order
//!
//! A merged lookup reply lists cache hits first, in request order, followed
//! by the remote finds in the order the service returned them. Lookup replies
//! are unordered by contract; callers match results to keys by key.

use std::sync::Arc;

use async_trait::async_trait;
use cirrus_core::{
    decode_entity_result, encode_entity_result, CallContext, Cacher, CirrusError, CirrusResult,
    CommitRequest, EntityResult, Interceptor, Invoker, Key, LookupRequest, LookupResponse, Method,
    Mutation, Request, Response,
};
use tracing::{debug, warn};

/// Interceptor that caches lookups and invalidates on commit.
#[derive(Clone)]
pub struct CacheInterceptor {
    cacher: Arc<dyn Cacher>,
}

impl CacheInterceptor {
    pub fn new(cacher: Arc<dyn Cacher>) -> Self {
        Self { cacher }
    }

    /// Get a reference to the cache backend.
    pub fn cacher(&self) -> &dyn Cacher {
        self.cacher.as_ref()
    }

    async fn lookup(
        &self,
        ctx: &CallContext,
        method: &str,
        request: &LookupRequest,
        next: &dyn Invoker,
    ) -> CirrusResult<LookupResponse> {
        let keys = &request.keys;
        let cached = ctx.scope(self.cacher.get_many(ctx, keys)).await?;

        let mut found: Vec<EntityResult> = Vec::with_capacity(keys.len());
        let mut missing: Vec<Key> = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            match cached
                .get(i)
                .and_then(|slot| slot.as_deref())
                .and_then(decode_entity_result)
            {
                Some(result) => found.push(result),
                None => missing.push(key.clone()),
            }
        }

        if found.len() == keys.len() {
            debug!(
                backend = self.cacher.backend_name(),
                keys = keys.len(),
                "lookup served from cache"
            );
            return Ok(LookupResponse {
                found,
                ..Default::default()
            });
        }

        // A cache with no hits at all is cold or down; ask for the caller's
        // key list as-is rather than a per-key filtered copy.
        let fetch_keys = if found.is_empty() {
            keys.clone()
        } else {
            missing
        };
        debug!(
            backend = self.cacher.backend_name(),
            hits = found.len(),
            fetch = fetch_keys.len(),
            "lookup partially served from cache"
        );

        let remote_request = Request::Lookup(LookupRequest {
            keys: fetch_keys,
            ..request.clone()
        });
        let remote = ctx
            .run(next.invoke(ctx, method, &remote_request))
            .await?
            .into_lookup(method)?;

        let LookupResponse {
            found: fetched,
            missing,
            deferred,
        } = remote;

        if fetched.is_empty() {
            return Ok(LookupResponse {
                found,
                missing,
                deferred,
            });
        }

        let mut cache_keys = Vec::with_capacity(fetched.len());
        let mut values = Vec::with_capacity(fetched.len());
        for result in &fetched {
            let Some(key) = result.key() else {
                continue;
            };
            match encode_entity_result(result) {
                Ok(bytes) => {
                    cache_keys.push(key.clone());
                    values.push(bytes);
                }
                Err(e) => debug!(key = %key, error = %e, "skipping cache write"),
            }
        }

        found.extend(fetched);

        if !cache_keys.is_empty() {
            ctx.scope(self.cacher.set_many(ctx, &cache_keys, values))
                .await?;
        }

        Ok(LookupResponse {
            found,
            missing,
            deferred,
        })
    }

    async fn commit(
        &self,
        ctx: &CallContext,
        method: &str,
        request: &Request,
        commit: &CommitRequest,
        next: &dyn Invoker,
    ) -> CirrusResult<Response> {
        let response = ctx.run(next.invoke(ctx, method, request)).await?;

        let keys = invalidation_keys(commit);
        if keys.is_empty() {
            return Ok(response);
        }

        // The write is applied: invalidate even if the caller has since
        // cancelled or run out of time.
        self.cacher
            .delete_many(ctx, &keys)
            .await
            .map_err(CirrusError::CacheInvalidation)
            .inspect_err(|e| {
                warn!(
                    backend = self.cacher.backend_name(),
                    keys = keys.len(),
                    error = %e,
                    "cache invalidation failed after commit"
                )
            })?;

        Ok(response)
    }
}

/// Keys whose cache entries a commit makes stale.
///
/// Inserts are skipped: an inserted entity cannot have been cached before it
/// existed, and its key is often assigned by the service.
pub fn invalidation_keys(commit: &CommitRequest) -> Vec<Key> {
    commit
        .mutations
        .iter()
        .filter_map(|m| match m {
            Mutation::Update(e) | Mutation::Upsert(e) => e.key.clone(),
            Mutation::Delete(k) => Some(k.clone()),
            Mutation::Insert(_) => None,
        })
        .collect()
}

#[async_trait]
impl Interceptor for CacheInterceptor {
    async fn intercept(
        &self,
        ctx: &CallContext,
        method: &str,
        request: &Request,
        next: &dyn Invoker,
    ) -> CirrusResult<Response> {
        match Method::from_full_name(method) {
            Some(Method::Lookup) => {
                let lookup = request.as_lookup(method)?;
                if lookup.in_transaction() {
                    return next.invoke(ctx, method, request).await;
                }
                self.lookup(ctx, method, lookup, next)
                    .await
                    .map(Response::Lookup)
            }
            Some(Method::Commit) => {
                let commit = request.as_commit(method)?;
                self.commit(ctx, method, request, commit, next).await
            }
            _ => next.invoke(ctx, method, request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_core::{CommitRequest, Entity};

    #[test]
    fn test_invalidation_keys_skip_inserts() {
        let commit = CommitRequest::new(
            "p",
            vec![
                Mutation::Update(Entity::new(Key::id("Task", 1))),
                Mutation::Upsert(Entity::new(Key::id("Task", 2))),
                Mutation::Delete(Key::id("Task", 3)),
                Mutation::Insert(Entity::new(Key::incomplete("Task"))),
                Mutation::Insert(Entity::new(Key::id("Task", 5))),
            ],
        );

        assert_eq!(
            invalidation_keys(&commit),
            vec![Key::id("Task", 1), Key::id("Task", 2), Key::id("Task", 3)]
        );
    }

    #[test]
    fn test_invalidation_keys_empty_for_insert_only() {
        let commit = CommitRequest::new(
            "p",
            vec![Mutation::Insert(Entity::new(Key::incomplete("Task")))],
        );
        assert!(invalidation_keys(&commit).is_empty());
    }

    #[test]
    fn test_invalidation_keys_ignore_keyless_entities() {
        let commit = CommitRequest::new("p", vec![Mutation::Update(Entity::default())]);
        assert!(invalidation_keys(&commit).is_empty());
    }
}
