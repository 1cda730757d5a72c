//! Cirrus Test Utilities
//!
//! Shared test infrastructure for the cirrus workspace:
//! - An in-memory fake of the remote datastore service
//! - A recording cache backend with scripted contents
//! - Proptest generators for keys and entities
//! - Fixtures and custom assertions

pub use cirrus_core::{
    decode_entity_result, encode_entity_result, CacheError, Cacher, CallContext, CirrusError,
    CirrusResult, CommitRequest, CommitResponse, CompositeOperator, ConsistencyError, Direction,
    Entity, EntityResult, Filter, IdType, Invoker, Key, LookupRequest, LookupResponse, Method,
    MoreResultsType, Mutation, MutationResult, PropertyFilter, PropertyOperator, Query,
    QueryResultBatch, QueryType, RemoteCode, RemoteError, Request, Response, ResultType,
    RunQueryRequest, RunQueryResponse, Value, KEY_PROPERTY,
};

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering as AtomicOrdering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;

// ============================================================================
// FAKE DATASTORE
// ============================================================================

/// A call received by [`FakeDatastore`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub request: Request,
}

#[derive(Debug, Clone)]
struct Stored {
    entity: Entity,
    version: i64,
}

/// In-memory stand-in for the remote datastore service.
///
/// Implements [`Invoker`] so it can sit at the end of an interceptor chain.
/// Every call is recorded. Failures and latency can be injected per method,
/// and keys can be hidden from lookups to mimic an index that is ahead of
/// entity storage.
#[derive(Debug)]
pub struct FakeDatastore {
    entities: RwLock<BTreeMap<String, Stored>>,
    next_id: AtomicI64,
    version: AtomicI64,
    calls: Mutex<Vec<RecordedCall>>,
    failures: Mutex<HashMap<Method, RemoteCode>>,
    hidden: RwLock<HashSet<Key>>,
    latency: Mutex<Option<Duration>>,
}

impl Default for FakeDatastore {
    fn default() -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1000),
            version: AtomicI64::new(1),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            hidden: RwLock::new(HashSet::new()),
            latency: Mutex::new(None),
        }
    }
}

impl FakeDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fake pre-populated with `entities`.
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let fake = Self::new();
        for entity in entities {
            fake.put(entity);
        }
        fake
    }

    /// Store an entity directly, bypassing the call path. Returns its version.
    ///
    /// # Panics
    ///
    /// If the entity has no complete key.
    pub fn put(&self, entity: Entity) -> i64 {
        let key = entity
            .key
            .clone()
            .filter(Key::is_complete)
            .expect("seeded entities need a complete key");
        let version = self.version.fetch_add(1, AtomicOrdering::SeqCst);
        self.entities
            .write()
            .unwrap()
            .insert(key.cache_key(), Stored { entity, version });
        version
    }

    pub fn get(&self, key: &Key) -> Option<Entity> {
        self.entities
            .read()
            .unwrap()
            .get(&key.cache_key())
            .map(|s| s.entity.clone())
    }

    pub fn len(&self) -> usize {
        self.entities.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every call to `method` fail with `code` until cleared.
    pub fn fail_method(&self, method: Method, code: RemoteCode) {
        self.failures.lock().unwrap().insert(method, code);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Report `key` as missing from lookups while still returning it from queries.
    pub fn hide_from_lookup(&self, key: Key) {
        self.hidden.write().unwrap().insert(key);
    }

    /// Delay every call by `latency` before it is handled.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn call_count(&self, method: Method) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method.full_name())
            .count()
    }

    /// Every lookup request received, in order.
    pub fn lookup_requests(&self) -> Vec<LookupRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match &c.request {
                Request::Lookup(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every query request received, in order.
    pub fn run_query_requests(&self) -> Vec<RunQueryRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match &c.request {
                Request::RunQuery(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    fn lookup(&self, request: &LookupRequest) -> LookupResponse {
        let entities = self.entities.read().unwrap();
        let hidden = self.hidden.read().unwrap();

        let mut response = LookupResponse::default();
        for key in &request.keys {
            match entities.get(&key.cache_key()) {
                Some(stored) if !hidden.contains(key) => response
                    .found
                    .push(EntityResult::new(stored.entity.clone()).with_version(stored.version)),
                _ => response
                    .missing
                    .push(EntityResult::new(Entity::new(key.clone()))),
            }
        }
        response
    }

    fn commit(&self, method: &str, request: &CommitRequest) -> CirrusResult<CommitResponse> {
        let mut entities = self.entities.write().unwrap();
        // Apply to a copy so a failing mutation leaves nothing behind.
        let mut staged = entities.clone();
        let mut results = Vec::with_capacity(request.mutations.len());

        for mutation in &request.mutations {
            let version = self.version.fetch_add(1, AtomicOrdering::SeqCst);
            let result = match mutation {
                Mutation::Insert(entity) => {
                    let (key, allocated) = self.complete_key(method, entity.key.as_ref())?;
                    if staged.contains_key(&key.cache_key()) {
                        return Err(remote(method, RemoteCode::AlreadyExists, "entity already exists"));
                    }
                    let entity = Entity {
                        key: Some(key.clone()),
                        ..entity.clone()
                    };
                    staged.insert(key.cache_key(), Stored { entity, version });
                    MutationResult {
                        key: allocated.then_some(key),
                        version,
                    }
                }
                Mutation::Update(entity) => {
                    let key = require_complete(method, entity.key.as_ref())?;
                    if !staged.contains_key(&key.cache_key()) {
                        return Err(remote(method, RemoteCode::NotFound, "no entity to update"));
                    }
                    staged.insert(
                        key.cache_key(),
                        Stored {
                            entity: entity.clone(),
                            version,
                        },
                    );
                    MutationResult { key: None, version }
                }
                Mutation::Upsert(entity) => {
                    let (key, allocated) = self.complete_key(method, entity.key.as_ref())?;
                    let entity = Entity {
                        key: Some(key.clone()),
                        ..entity.clone()
                    };
                    staged.insert(key.cache_key(), Stored { entity, version });
                    MutationResult {
                        key: allocated.then_some(key),
                        version,
                    }
                }
                Mutation::Delete(key) => {
                    let key = require_complete(method, Some(key))?;
                    staged.remove(&key.cache_key());
                    MutationResult { key: None, version }
                }
            };
            results.push(result);
        }

        *entities = staged;
        Ok(CommitResponse {
            mutation_results: results,
            index_updates: request.mutations.len() as i32,
        })
    }

    /// The key to store under, allocating an id for an incomplete key.
    fn complete_key(&self, method: &str, key: Option<&Key>) -> CirrusResult<(Key, bool)> {
        let key = key.ok_or_else(|| remote(method, RemoteCode::InvalidArgument, "entity has no key"))?;
        if key.is_complete() {
            return Ok((key.clone(), false));
        }
        let mut key = key.clone();
        let id = self.next_id.fetch_add(1, AtomicOrdering::SeqCst);
        match key.path.last_mut() {
            Some(last) => last.id_type = Some(IdType::Id(id)),
            None => return Err(remote(method, RemoteCode::InvalidArgument, "key has an empty path")),
        }
        Ok((key, true))
    }

    fn run_query(&self, method: &str, request: &RunQueryRequest) -> CirrusResult<RunQueryResponse> {
        let query = match &request.query_type {
            Some(QueryType::Query(q)) => q,
            Some(QueryType::Gql(_)) => {
                return Ok(RunQueryResponse {
                    batch: Some(QueryResultBatch {
                        more_results: MoreResultsType::NoMoreResults,
                        ..Default::default()
                    }),
                    query: None,
                })
            }
            None => return Err(remote(method, RemoteCode::InvalidArgument, "missing query")),
        };
        let namespace = request
            .partition_id
            .as_ref()
            .map(|p| p.namespace_id.as_str())
            .unwrap_or("");

        let entities = self.entities.read().unwrap();
        let mut matched: Vec<&Stored> = entities
            .values()
            .filter(|s| query_matches(query, namespace, &s.entity))
            .collect();

        matched.sort_by(|a, b| order_entities(query, &a.entity, &b.entity));

        let start = decode_cursor(&query.start_cursor).max(0) as usize;
        let matched = matched.get(start..).unwrap_or_default();

        let offset = query.offset.max(0) as usize;
        let skipped = offset.min(matched.len());
        let remaining = &matched[skipped..];

        let take = query
            .limit
            .map(|l| (l.max(0) as usize).min(remaining.len()))
            .unwrap_or(remaining.len());
        let page = &remaining[..take];
        let more_results = if take < remaining.len() {
            MoreResultsType::MoreResultsAfterLimit
        } else {
            MoreResultsType::NoMoreResults
        };

        let result_type = if query.projection.is_empty() {
            ResultType::Full
        } else if query.is_keys_only() {
            ResultType::KeyOnly
        } else {
            ResultType::Projection
        };

        let entity_results: Vec<EntityResult> = page
            .iter()
            .enumerate()
            .map(|(i, stored)| {
                let entity = project(query, result_type, &stored.entity);
                EntityResult {
                    entity,
                    version: stored.version,
                    cursor: encode_cursor(start + skipped + i + 1),
                }
            })
            .collect();

        Ok(RunQueryResponse {
            batch: Some(QueryResultBatch {
                skipped_results: skipped as i32,
                entity_result_type: result_type,
                entity_results,
                end_cursor: encode_cursor(start + skipped + take),
                more_results,
            }),
            query: Some(query.clone()),
        })
    }
}

#[async_trait]
impl Invoker for FakeDatastore {
    async fn invoke(
        &self,
        ctx: &CallContext,
        method: &str,
        request: &Request,
    ) -> CirrusResult<Response> {
        self.calls.lock().unwrap().push(RecordedCall {
            method: method.to_string(),
            request: request.clone(),
        });

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            ctx.scope(tokio::time::sleep(latency)).await?;
        }

        let parsed = Method::from_full_name(method);
        if let Some(code) = parsed.and_then(|m| self.failures.lock().unwrap().get(&m).copied()) {
            return Err(remote(method, code, "injected failure"));
        }

        match parsed {
            Some(Method::Lookup) => Ok(Response::Lookup(self.lookup(request.as_lookup(method)?))),
            Some(Method::Commit) => Ok(Response::Commit(
                self.commit(method, request.as_commit(method)?)?,
            )),
            Some(Method::RunQuery) => Ok(Response::RunQuery(
                self.run_query(method, request.as_run_query(method)?)?,
            )),
            Some(_) => match request {
                Request::Other(payload) => Ok(Response::Other(payload.clone())),
                _ => Ok(Response::Other(Vec::new())),
            },
            None => Err(remote(method, RemoteCode::Unknown, "unknown method")),
        }
    }
}

fn remote(method: &str, code: RemoteCode, message: &str) -> CirrusError {
    RemoteError::new(method, code, message).into()
}

fn require_complete<'a>(method: &str, key: Option<&'a Key>) -> CirrusResult<&'a Key> {
    key.filter(|k| k.is_complete())
        .ok_or_else(|| remote(method, RemoteCode::InvalidArgument, "incomplete key"))
}

fn encode_cursor(position: usize) -> Vec<u8> {
    position.to_string().into_bytes()
}

fn decode_cursor(cursor: &[u8]) -> i64 {
    std::str::from_utf8(cursor)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

fn query_matches(query: &Query, namespace: &str, entity: &Entity) -> bool {
    let Some(key) = &entity.key else {
        return false;
    };
    if key.namespace() != namespace {
        return false;
    }
    if let Some(kind) = query.kind.first() {
        if key.kind() != Some(kind.name.as_str()) {
            return false;
        }
    }
    query
        .filter
        .as_ref()
        .map_or(true, |f| filter_matches(f, entity))
}

fn property_value(entity: &Entity, name: &str) -> Option<Value> {
    if name == KEY_PROPERTY {
        return entity.key.clone().map(Value::Key);
    }
    entity.get(name).cloned()
}

fn filter_matches(filter: &Filter, entity: &Entity) -> bool {
    match filter {
        Filter::Composite {
            op: CompositeOperator::And,
            filters,
        } => filters.iter().all(|f| filter_matches(f, entity)),
        Filter::Composite {
            op: CompositeOperator::Or,
            filters,
        } => filters.iter().any(|f| filter_matches(f, entity)),
        Filter::Property(pf) => property_matches(pf, entity),
    }
}

fn property_matches(filter: &PropertyFilter, entity: &Entity) -> bool {
    if filter.op == PropertyOperator::HasAncestor {
        return match (&entity.key, &filter.value) {
            (Some(key), Value::Key(ancestor)) => {
                key.namespace() == ancestor.namespace() && key.path.starts_with(&ancestor.path)
            }
            _ => false,
        };
    }

    let Some(actual) = property_value(entity, &filter.property.name) else {
        return false;
    };
    // A multi-valued property matches if any of its values does.
    match actual {
        Value::Array(values) => values.iter().any(|v| compare_op(v, filter.op, &filter.value)),
        value => compare_op(&value, filter.op, &filter.value),
    }
}

fn compare_op(actual: &Value, op: PropertyOperator, expected: &Value) -> bool {
    let ordering = compare_values(actual, expected);
    match op {
        PropertyOperator::Equal => ordering == Some(Ordering::Equal),
        PropertyOperator::NotEqual => ordering.is_some_and(|o| o != Ordering::Equal),
        PropertyOperator::LessThan => ordering == Some(Ordering::Less),
        PropertyOperator::LessThanOrEqual => {
            matches!(ordering, Some(Ordering::Less | Ordering::Equal))
        }
        PropertyOperator::GreaterThan => ordering == Some(Ordering::Greater),
        PropertyOperator::GreaterThanOrEqual => {
            matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
        }
        PropertyOperator::HasAncestor => false,
    }
}

/// Order two values of comparable types; `None` across incompatible types.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Integer(x), Value::Double(y)) => (*x as f64).partial_cmp(y),
        (Value::Double(x), Value::Integer(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Double(x), Value::Double(y)) => x.partial_cmp(y),
        (Value::Timestamp(x), Value::Timestamp(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Blob(x), Value::Blob(y)) => Some(x.cmp(y)),
        (Value::Key(x), Value::Key(y)) => Some(x.cache_key().cmp(&y.cache_key())),
        _ => None,
    }
}

fn order_entities(query: &Query, a: &Entity, b: &Entity) -> Ordering {
    for order in &query.order {
        let av = property_value(a, &order.property.name).unwrap_or(Value::Null);
        let bv = property_value(b, &order.property.name).unwrap_or(Value::Null);
        let ordering = match (&av, &bv) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            _ => compare_values(&av, &bv).unwrap_or(Ordering::Equal),
        };
        let ordering = match order.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    let ak = a.key.as_ref().map(Key::cache_key);
    let bk = b.key.as_ref().map(Key::cache_key);
    ak.cmp(&bk)
}

fn project(query: &Query, result_type: ResultType, entity: &Entity) -> Entity {
    match result_type {
        ResultType::KeyOnly => entity.key_only(),
        ResultType::Projection => {
            let mut projected = entity.key_only();
            for p in &query.projection {
                if let Some(value) = entity.get(&p.property.name) {
                    projected
                        .properties
                        .insert(p.property.name.clone(), value.clone());
                }
            }
            projected
        }
        _ => entity.clone(),
    }
}

// ============================================================================
// SCRIPTED CACHER
// ============================================================================

/// Recording [`Cacher`] with contents set up by the test.
///
/// Every `get_many` / `set_many` / `delete_many` call is recorded with its
/// keys. Deletes can be made to fail.
#[derive(Debug, Default)]
pub struct ScriptedCacher {
    slots: RwLock<HashMap<String, Vec<u8>>>,
    get_calls: Mutex<Vec<Vec<Key>>>,
    set_calls: Mutex<Vec<Vec<Key>>>,
    delete_calls: Mutex<Vec<Vec<Key>>>,
    fail_deletes: AtomicBool,
}

impl ScriptedCacher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache `entity` under its own key, as the interceptor would.
    pub fn seed(&self, entity: &Entity) {
        let key = entity.key.clone().expect("seeded entities need a key");
        let bytes = encode_entity_result(&EntityResult::new(entity.clone()))
            .expect("entity should encode");
        self.seed_raw(&key, bytes);
    }

    pub fn seed_raw(&self, key: &Key, bytes: Vec<u8>) {
        self.slots.write().unwrap().insert(key.cache_key(), bytes);
    }

    /// Store bytes under `key` that do not decode as a cached entity.
    pub fn seed_corrupt(&self, key: &Key) {
        self.seed_raw(key, b"\xffnot an entity".to_vec());
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, AtomicOrdering::SeqCst);
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.slots.read().unwrap().contains_key(&key.cache_key())
    }

    /// Decoded cache entry for `key`.
    pub fn cached(&self, key: &Key) -> Option<EntityResult> {
        self.slots
            .read()
            .unwrap()
            .get(&key.cache_key())
            .and_then(|bytes| decode_entity_result(bytes))
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_calls(&self) -> Vec<Vec<Key>> {
        self.get_calls.lock().unwrap().clone()
    }

    pub fn set_calls(&self) -> Vec<Vec<Key>> {
        self.set_calls.lock().unwrap().clone()
    }

    pub fn delete_calls(&self) -> Vec<Vec<Key>> {
        self.delete_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Cacher for ScriptedCacher {
    async fn get_many(&self, _ctx: &CallContext, keys: &[Key]) -> Vec<Option<Vec<u8>>> {
        self.get_calls.lock().unwrap().push(keys.to_vec());
        let slots = self.slots.read().unwrap();
        keys.iter().map(|k| slots.get(&k.cache_key()).cloned()).collect()
    }

    async fn set_many(&self, _ctx: &CallContext, keys: &[Key], values: Vec<Vec<u8>>) {
        self.set_calls.lock().unwrap().push(keys.to_vec());
        let mut slots = self.slots.write().unwrap();
        for (key, value) in keys.iter().zip(values) {
            slots.insert(key.cache_key(), value);
        }
    }

    async fn delete_many(&self, _ctx: &CallContext, keys: &[Key]) -> Result<(), CacheError> {
        self.delete_calls.lock().unwrap().push(keys.to_vec());
        if self.fail_deletes.load(AtomicOrdering::SeqCst) {
            return Err(CacheError::backend("scripted", "injected delete failure"));
        }
        let mut slots = self.slots.write().unwrap();
        for key in keys {
            slots.remove(&key.cache_key());
        }
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for keys and entities.

    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    pub fn arb_kind() -> impl Strategy<Value = String> {
        prop_oneof![Just("Task".to_string()), Just("User".to_string()), "[A-Z][a-z]{1,8}"]
    }

    pub fn arb_namespace() -> impl Strategy<Value = String> {
        prop_oneof![3 => Just(String::new()), 1 => "[a-z]{1,6}"]
    }

    /// A complete single-element key with an id or a name.
    pub fn arb_key() -> impl Strategy<Value = Key> {
        let id = prop_oneof![
            (1i64..1_000_000).prop_map(IdType::Id),
            "[a-zA-Z0-9 /\"-]{1,12}".prop_map(IdType::Name),
        ];
        (arb_kind(), id, arb_namespace()).prop_map(|(kind, id, ns)| {
            let key = match id {
                IdType::Id(id) => Key::id(kind, id),
                IdType::Name(name) => Key::name(kind, name),
            };
            if ns.is_empty() {
                key
            } else {
                key.with_namespace(ns)
            }
        })
    }

    /// Between 1 and `max` pairwise distinct keys.
    pub fn arb_unique_keys(max: usize) -> impl Strategy<Value = Vec<Key>> {
        prop::collection::hash_set(arb_key(), 1..=max.max(1))
            .prop_map(|keys| keys.into_iter().collect())
    }

    pub fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Boolean),
            any::<i64>().prop_map(Value::Integer),
            (-4000i32..4000).prop_map(|q| Value::Double(f64::from(q) / 4.0)),
            "[a-z ]{0,16}".prop_map(Value::String),
            prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Blob),
            (0i64..4_000_000_000).prop_map(|s| Value::Timestamp(
                Utc.timestamp_opt(s, 0).single().unwrap_or_default()
            )),
        ]
    }

    /// An entity with `key` and a few properties.
    pub fn arb_entity(key: Key) -> impl Strategy<Value = Entity> {
        prop::collection::btree_map("[a-z]{1,8}", arb_value(), 0..5).prop_map(move |properties| {
            Entity {
                key: Some(key.clone()),
                properties,
            }
        })
    }

    /// Distinct-key entities.
    pub fn arb_entities(max: usize) -> impl Strategy<Value = Vec<Entity>> {
        arb_unique_keys(max).prop_flat_map(|keys| {
            keys.into_iter().map(arb_entity).collect::<Vec<_>>()
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    pub const PROJECT_ID: &str = "test-project";

    pub fn ctx() -> CallContext {
        CallContext::new()
    }

    /// A `Task` entity with a title and a priority.
    pub fn task(id: i64) -> Entity {
        Entity::new(Key::id("Task", id))
            .with("title", format!("task {id}"))
            .with("priority", id % 5)
            .with("done", id % 2 == 0)
    }

    /// Tasks `1..=n`.
    pub fn tasks(n: i64) -> Vec<Entity> {
        (1..=n).map(task).collect()
    }

    pub fn keys_of(entities: &[Entity]) -> Vec<Key> {
        entities.iter().filter_map(|e| e.key.clone()).collect()
    }

    pub fn lookup(keys: Vec<Key>) -> Request {
        Request::Lookup(LookupRequest::new(PROJECT_ID, keys))
    }

    pub fn commit(mutations: Vec<Mutation>) -> Request {
        Request::Commit(CommitRequest::new(PROJECT_ID, mutations))
    }

    pub fn run_query(query: Query) -> Request {
        Request::RunQuery(RunQueryRequest::new(PROJECT_ID, query))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for cirrus results.

    use super::*;

    #[track_caller]
    pub fn assert_remote_code<T: std::fmt::Debug>(result: &CirrusResult<T>, code: RemoteCode) {
        match result {
            Err(CirrusError::Remote(e)) => assert_eq!(e.code, code, "Wrong remote code"),
            other => panic!("Expected Remote error with {code}, got: {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_cancelled<T: std::fmt::Debug>(result: &CirrusResult<T>) {
        match result {
            Err(CirrusError::Cancelled) => {}
            other => panic!("Expected Cancelled, got: {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_deadline_exceeded<T: std::fmt::Debug>(result: &CirrusResult<T>) {
        match result {
            Err(CirrusError::DeadlineExceeded) => {}
            other => panic!("Expected DeadlineExceeded, got: {other:?}"),
        }
    }

    #[track_caller]
    pub fn assert_consistency_error<T: std::fmt::Debug>(result: &CirrusResult<T>) {
        match result {
            Err(CirrusError::Consistency(_)) => {}
            other => panic!("Expected Consistency error, got: {other:?}"),
        }
    }

    /// Assert the keys of `found` are exactly `expected`, ignoring order.
    #[track_caller]
    pub fn assert_found_keys(found: &[EntityResult], expected: &[Key]) {
        let mut actual: Vec<String> = found
            .iter()
            .filter_map(|r| r.key().map(Key::cache_key))
            .collect();
        let mut expected: Vec<String> = expected.iter().map(Key::cache_key).collect();
        actual.sort();
        expected.sort();
        assert_eq!(actual, expected, "found keys differ");
    }
}

// ============================================================================
// TESTS
// ============================================================================
