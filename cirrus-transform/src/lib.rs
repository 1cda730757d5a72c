//! Cirrus Transform - Request-Rewriting Interceptors
//!
//! [`QueryRewriter`] turns full-entity queries into a keys-only query plus a
//! batched lookup. Place it outside the cache interceptor so the lookup it
//! issues is served from the cache.

pub mod query_rewriter;

pub use query_rewriter::QueryRewriter;
