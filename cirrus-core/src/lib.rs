//! Cirrus Core - Data Model and Call Chain
//!
//! Types shared by the cirrus interceptors: the datastore data model, the
//! remote call capability ([`Invoker`]), the [`Interceptor`] chain, per-call
//! [`CallContext`], the [`Cacher`] capability and the error taxonomy.
//! Interceptor behaviour lives in `cirrus-cache` and `cirrus-transform`.

pub mod cacher;
pub mod client;
pub mod codec;
pub mod context;
pub mod entity;
pub mod error;
pub mod invoker;
pub mod key;
pub mod message;
pub mod method;

pub use cacher::{CacheStats, Cacher};
pub use client::DatastoreClient;
pub use codec::{decode_entity_result, encode_entity_result};
pub use context::CallContext;
pub use entity::{Entity, EntityResult, ResultType, Value};
pub use error::{
    CacheError, CirrusError, CirrusResult, ConfigError, ConsistencyError, ProtocolError,
    RemoteCode, RemoteError,
};
pub use invoker::{Interceptor, InterceptorChain, Invoker};
pub use key::{IdType, Key, PartitionId, PathElement, DEFAULT_NAMESPACE};
pub use message::{
    CommitMode, CommitRequest, CommitResponse, CompositeOperator, ConsistencyType, Direction,
    Filter, GqlQuery, KindExpression, LookupRequest, LookupResponse, MoreResultsType, Mutation,
    MutationResult, Projection, PropertyFilter, PropertyOperator, PropertyOrder,
    PropertyReference, Query, QueryResultBatch, QueryType, ReadConsistency, ReadOptions, Request,
    Response, RunQueryRequest, RunQueryResponse, KEY_PROPERTY,
};
pub use method::{Method, SERVICE_NAME};
