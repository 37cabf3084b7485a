// src/exec/operation.rs

//! The capability interface every task invokes.
//!
//! An operation takes one optional input value and produces one output value
//! or an error. It receives everything through `input`; implementations must
//! not reach into pipeline state.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Context;

use crate::types::Value;

/// Boxed future returned by [`Operation::invoke`].
pub type OperationFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send + 'a>>;

/// Something a task can run.
///
/// Dropping the returned future cancels the invocation; that is how timeouts
/// are enforced.
pub trait Operation: Send + Sync {
    fn invoke(&self, input: Option<Value>) -> OperationFuture<'_>;

    /// Short human-readable description for logs.
    fn describe(&self) -> String {
        "<closure>".to_string()
    }
}

/// Operation backed by a synchronous closure.
///
/// The closure runs on tokio's blocking pool. When a timeout fires the
/// thread cannot be interrupted; its eventual result is discarded.
pub struct FnOperation<F> {
    f: Arc<F>,
}

impl<F> Operation for FnOperation<F>
where
    F: Fn(Option<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    fn invoke(&self, input: Option<Value>) -> OperationFuture<'_> {
        let f = Arc::clone(&self.f);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || f(input))
                .await
                .context("operation panicked or was aborted")?
        })
    }
}

/// Wrap a synchronous closure as an [`Operation`].
pub fn operation_fn<F>(f: F) -> Arc<dyn Operation>
where
    F: Fn(Option<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(FnOperation { f: Arc::new(f) })
}

/// Operation backed by an async closure.
pub struct AsyncFnOperation<F> {
    f: F,
}

impl<F, Fut> Operation for AsyncFnOperation<F>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    fn invoke(&self, input: Option<Value>) -> OperationFuture<'_> {
        Box::pin((self.f)(input))
    }
}

/// Wrap an async closure as an [`Operation`].
pub fn async_operation<F, Fut>(f: F) -> Arc<dyn Operation>
where
    F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(AsyncFnOperation { f })
}
