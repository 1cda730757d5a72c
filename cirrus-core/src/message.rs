//! Request and response messages of the remote datastore service.
//!
//! Only the three methods the interceptors act on are modelled in detail.
//! Every other method travels as an opaque [`Request::Other`] /
//! [`Response::Other`] payload.

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityResult, ResultType, Value};
use crate::error::{CirrusResult, ProtocolError};
use crate::key::{Key, PartitionId};

/// Name of the pseudo-property that projects an entity's key.
pub const KEY_PROPERTY: &str = "__key__";

// ============================================================================
// READ OPTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadConsistency {
    Strong,
    Eventual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyType {
    ReadConsistency(ReadConsistency),
    /// Opaque transaction handle returned by BeginTransaction.
    Transaction(Vec<u8>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    pub consistency_type: Option<ConsistencyType>,
}

impl ReadOptions {
    pub fn transaction(handle: impl Into<Vec<u8>>) -> Self {
        Self {
            consistency_type: Some(ConsistencyType::Transaction(handle.into())),
        }
    }

    pub fn consistency(consistency: ReadConsistency) -> Self {
        Self {
            consistency_type: Some(ConsistencyType::ReadConsistency(consistency)),
        }
    }

    pub fn in_transaction(&self) -> bool {
        matches!(self.consistency_type, Some(ConsistencyType::Transaction(_)))
    }
}

// ============================================================================
// LOOKUP
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupRequest {
    pub project_id: String,
    pub read_options: Option<ReadOptions>,
    pub keys: Vec<Key>,
}

impl LookupRequest {
    pub fn new(project_id: impl Into<String>, keys: Vec<Key>) -> Self {
        Self {
            project_id: project_id.into(),
            read_options: None,
            keys,
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.read_options
            .as_ref()
            .is_some_and(ReadOptions::in_transaction)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupResponse {
    /// Entities found. Order is not tied to the request's key order.
    pub found: Vec<EntityResult>,
    /// Key-only results for entities that do not exist.
    pub missing: Vec<EntityResult>,
    /// Keys the service did not get to; the caller may look them up again.
    pub deferred: Vec<Key>,
}

// ============================================================================
// COMMIT
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitMode {
    #[default]
    NonTransactional,
    Transactional,
}

/// A single write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    Insert(Entity),
    Update(Entity),
    Upsert(Entity),
    Delete(Key),
}

impl Mutation {
    /// The key this mutation targets, if it has one.
    pub fn key(&self) -> Option<&Key> {
        match self {
            Mutation::Insert(e) | Mutation::Update(e) | Mutation::Upsert(e) => e.key.as_ref(),
            Mutation::Delete(k) => Some(k),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitRequest {
    pub project_id: String,
    pub mode: CommitMode,
    pub transaction: Option<Vec<u8>>,
    pub mutations: Vec<Mutation>,
}

impl CommitRequest {
    pub fn new(project_id: impl Into<String>, mutations: Vec<Mutation>) -> Self {
        Self {
            project_id: project_id.into(),
            mode: CommitMode::NonTransactional,
            transaction: None,
            mutations,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationResult {
    /// Allocated key for inserts of incomplete keys.
    pub key: Option<Key>,
    pub version: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitResponse {
    pub mutation_results: Vec<MutationResult>,
    pub index_updates: i32,
}

// ============================================================================
// RUN QUERY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyReference {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub property: PropertyReference,
}

impl Projection {
    pub fn property(name: impl Into<String>) -> Self {
        Self {
            property: PropertyReference { name: name.into() },
        }
    }

    /// The keys-only projection.
    pub fn key() -> Self {
        Self::property(KEY_PROPERTY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindExpression {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyOperator {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Equal,
    NotEqual,
    HasAncestor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub property: PropertyReference,
    pub op: PropertyOperator,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompositeOperator {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Property(PropertyFilter),
    Composite {
        op: CompositeOperator,
        filters: Vec<Filter>,
    },
}

impl Filter {
    pub fn property(name: impl Into<String>, op: PropertyOperator, value: impl Into<Value>) -> Self {
        Filter::Property(PropertyFilter {
            property: PropertyReference { name: name.into() },
            op,
            value: value.into(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyOrder {
    pub property: PropertyReference,
    pub direction: Direction,
}

/// A structured query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Empty means full entities.
    pub projection: Vec<Projection>,
    pub kind: Vec<KindExpression>,
    pub filter: Option<Filter>,
    pub order: Vec<PropertyOrder>,
    pub distinct_on: Vec<PropertyReference>,
    pub start_cursor: Vec<u8>,
    pub end_cursor: Vec<u8>,
    pub offset: i32,
    pub limit: Option<i32>,
}

impl Query {
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: vec![KindExpression { name: kind.into() }],
            ..Default::default()
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, name: impl Into<String>, direction: Direction) -> Self {
        self.order.push(PropertyOrder {
            property: PropertyReference { name: name.into() },
            direction,
        });
        self
    }

    pub fn project(mut self, name: impl Into<String>) -> Self {
        self.projection.push(Projection::property(name));
        self
    }

    pub fn offset(mut self, offset: i32) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether the projection is exactly the key pseudo-property.
    pub fn is_keys_only(&self) -> bool {
        matches!(self.projection.as_slice(), [p] if p.property.name == KEY_PROPERTY)
    }
}

/// A query written in GQL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GqlQuery {
    pub query_string: String,
    pub allow_literals: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryType {
    Query(Query),
    Gql(GqlQuery),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunQueryRequest {
    pub project_id: String,
    pub partition_id: Option<PartitionId>,
    pub read_options: Option<ReadOptions>,
    pub query_type: Option<QueryType>,
}

impl RunQueryRequest {
    pub fn new(project_id: impl Into<String>, query: Query) -> Self {
        Self {
            project_id: project_id.into(),
            partition_id: None,
            read_options: None,
            query_type: Some(QueryType::Query(query)),
        }
    }

    pub fn gql(project_id: impl Into<String>, query_string: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            partition_id: None,
            read_options: None,
            query_type: Some(QueryType::Gql(GqlQuery {
                query_string: query_string.into(),
                allow_literals: true,
            })),
        }
    }

    /// The structured query, if this is not a GQL request.
    pub fn query(&self) -> Option<&Query> {
        match &self.query_type {
            Some(QueryType::Query(q)) => Some(q),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoreResultsType {
    #[default]
    Unspecified,
    NotFinished,
    MoreResultsAfterLimit,
    MoreResultsAfterCursor,
    NoMoreResults,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResultBatch {
    pub skipped_results: i32,
    pub entity_result_type: ResultType,
    pub entity_results: Vec<EntityResult>,
    pub end_cursor: Vec<u8>,
    pub more_results: MoreResultsType,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunQueryResponse {
    pub batch: Option<QueryResultBatch>,
    /// The query as the service executed it.
    pub query: Option<Query>,
}

// ============================================================================
// ENVELOPES
// ============================================================================

/// Any request the call chain can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Lookup(LookupRequest),
    Commit(CommitRequest),
    RunQuery(RunQueryRequest),
    /// Encoded payload of a method the interceptors do not inspect.
    Other(Vec<u8>),
}

/// Any response the call chain can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Lookup(LookupResponse),
    Commit(CommitResponse),
    RunQuery(RunQueryResponse),
    Other(Vec<u8>),
}

impl Request {
    pub fn as_lookup(&self, method: &str) -> CirrusResult<&LookupRequest> {
        match self {
            Request::Lookup(r) => Ok(r),
            _ => Err(unexpected_request(method, "Lookup")),
        }
    }

    pub fn as_commit(&self, method: &str) -> CirrusResult<&CommitRequest> {
        match self {
            Request::Commit(r) => Ok(r),
            _ => Err(unexpected_request(method, "Commit")),
        }
    }

    pub fn as_run_query(&self, method: &str) -> CirrusResult<&RunQueryRequest> {
        match self {
            Request::RunQuery(r) => Ok(r),
            _ => Err(unexpected_request(method, "RunQuery")),
        }
    }
}

impl Response {
    pub fn into_lookup(self, method: &str) -> CirrusResult<LookupResponse> {
        match self {
            Response::Lookup(r) => Ok(r),
            _ => Err(unexpected_response(method, "Lookup")),
        }
    }

    pub fn into_commit(self, method: &str) -> CirrusResult<CommitResponse> {
        match self {
            Response::Commit(r) => Ok(r),
            _ => Err(unexpected_response(method, "Commit")),
        }
    }

    pub fn into_run_query(self, method: &str) -> CirrusResult<RunQueryResponse> {
        match self {
            Response::RunQuery(r) => Ok(r),
            _ => Err(unexpected_response(method, "RunQuery")),
        }
    }
}

fn unexpected_request(method: &str, expected: &'static str) -> crate::CirrusError {
    ProtocolError::UnexpectedRequest {
        method: method.to_string(),
        expected,
    }
    .into()
}

fn unexpected_response(method: &str, expected: &'static str) -> crate::CirrusError {
    ProtocolError::UnexpectedResponse {
        method: method.to_string(),
        expected,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CirrusError;

    #[test]
    fn test_in_transaction() {
        let mut req = LookupRequest::new("p", vec![Key::id("Task", 1)]);
        assert!(!req.in_transaction());

        req.read_options = Some(ReadOptions::consistency(ReadConsistency::Eventual));
        assert!(!req.in_transaction());

        req.read_options = Some(ReadOptions::transaction(b"tx-1".to_vec()));
        assert!(req.in_transaction());
    }

    #[test]
    fn test_mutation_key() {
        let key = Key::id("Task", 1);
        assert_eq!(Mutation::Delete(key.clone()).key(), Some(&key));
        assert_eq!(Mutation::Upsert(Entity::new(key.clone())).key(), Some(&key));
        assert_eq!(Mutation::Insert(Entity::default()).key(), None);
    }

    #[test]
    fn test_keys_only_detection() {
        let mut query = Query::kind("Task");
        assert!(!query.is_keys_only());

        query.projection.push(Projection::key());
        assert!(query.is_keys_only());

        query.projection.push(Projection::property("title"));
        assert!(!query.is_keys_only());
    }

    #[test]
    fn test_mismatched_request_is_protocol_error() {
        let req = Request::Other(vec![1, 2, 3]);
        let err = req.as_lookup("/google.datastore.v1.Datastore/Lookup").unwrap_err();
        assert!(matches!(
            err,
            CirrusError::Protocol(ProtocolError::UnexpectedRequest { expected: "Lookup", .. })
        ));
    }

    #[test]
    fn test_mismatched_response_is_protocol_error() {
        let resp = Response::Commit(CommitResponse::default());
        let err = resp.into_run_query("m").unwrap_err();
        assert!(matches!(
            err,
            CirrusError::Protocol(ProtocolError::UnexpectedResponse { expected: "RunQuery", .. })
        ));
    }

    #[test]
    fn test_gql_request_has_no_structured_query() {
        let req = RunQueryRequest::gql("p", "SELECT * FROM Task");
        assert!(req.query().is_none());
        let req = RunQueryRequest::new("p", Query::kind("Task"));
        assert_eq!(req.query().map(|q| q.kind[0].name.as_str()), Some("Task"));
    }
}
