//! The remote call capability and the interceptor chain around it.
//!
//! The remote service is reduced to [`Invoker`]: one method name, one request
//! in, one response out. An [`Interceptor`] sees every call before the
//! service does and may answer it, rewrite it, or forward it to `next`.
//!
//! # Example
//!
//! ```ignore
//! let client = InterceptorChain::new(transport)
//!     .with(QueryRewriter::new())
//!     .with(CacheInterceptor::new(cacher));
//!
//! // RunQuery -> QueryRewriter -> Lookup -> CacheInterceptor -> transport
//! let reply = client.invoke(&ctx, Method::RunQuery.full_name(), &request).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::CallContext;
use crate::error::CirrusResult;
use crate::message::{Request, Response};

/// Issues a unary call and returns its response.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Invoke `method` (a fully qualified name) with `request`.
    ///
    /// The request is borrowed: implementations that need a different
    /// request build a new one instead of editing the caller's.
    async fn invoke(
        &self,
        ctx: &CallContext,
        method: &str,
        request: &Request,
    ) -> CirrusResult<Response>;
}

/// Observes and possibly transforms calls on their way to an [`Invoker`].
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(
        &self,
        ctx: &CallContext,
        method: &str,
        request: &Request,
        next: &dyn Invoker,
    ) -> CirrusResult<Response>;
}

#[async_trait]
impl<T: Invoker + ?Sized> Invoker for Arc<T> {
    async fn invoke(
        &self,
        ctx: &CallContext,
        method: &str,
        request: &Request,
    ) -> CirrusResult<Response> {
        (**self).invoke(ctx, method, request).await
    }
}

/// Interceptors composed around a transport.
///
/// The first interceptor added is the outermost: it sees the caller's request
/// first and its own follow-up calls pass through every interceptor after it.
#[derive(Clone)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
    transport: Arc<dyn Invoker>,
}

impl InterceptorChain {
    pub fn new(transport: Arc<dyn Invoker>) -> Self {
        Self {
            interceptors: Vec::new(),
            transport,
        }
    }

    /// Append an interceptor inside the ones already added.
    pub fn with<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn with_shared(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

#[async_trait]
impl Invoker for InterceptorChain {
    async fn invoke(
        &self,
        ctx: &CallContext,
        method: &str,
        request: &Request,
    ) -> CirrusResult<Response> {
        Next {
            interceptors: &self.interceptors,
            transport: self.transport.as_ref(),
        }
        .invoke(ctx, method, request)
        .await
    }
}

/// The remainder of a chain, as seen by the interceptor in front of it.
struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    transport: &'a dyn Invoker,
}

#[async_trait]
impl Invoker for Next<'_> {
    async fn invoke(
        &self,
        ctx: &CallContext,
        method: &str,
        request: &Request,
    ) -> CirrusResult<Response> {
        match self.interceptors.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    interceptors: rest,
                    transport: self.transport,
                };
                head.intercept(ctx, method, request, &next).await
            }
            None => self.transport.invoke(ctx, method, request).await,
        }
    }
}
