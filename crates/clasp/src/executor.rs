//! Executor shapes and their type-erased storage on the command tree.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::binder::BoundParameters;
use crate::command::Command;
use crate::error::CliError;

/// Synchronous executor for the parameter type `P`.
pub trait Execute<P>: Send + Sync + 'static {
    fn execute(&self, params: P) -> i32;
}

/// Asynchronous executor for the parameter type `P`.
#[async_trait]
pub trait ExecuteAsync<P: Send + 'static>: Send + Sync + 'static {
    async fn execute(&self, params: P) -> i32;
}

type SyncFn = dyn Fn(Box<dyn Any + Send>) -> i32 + Send + Sync;
type AsyncFn = dyn Fn(Box<dyn Any + Send>) -> BoxFuture<'static, i32> + Send + Sync;
type HandlerFn = dyn Fn(Vec<CliError>, &BoundParameters) -> Vec<CliError> + Send + Sync;

/// Executor bound to a command node, resolved once at registration.
#[derive(Clone)]
pub enum Executor {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Executor::Sync"),
            Self::Async(_) => f.write_str("Executor::Async"),
        }
    }
}

// Factories only ever produce `P` for the node `P` was registered on.
fn downcast<P: Command>(params: Box<dyn Any + Send>) -> P {
    match params.downcast::<P>() {
        Ok(p) => *p,
        Err(_) => P::default(),
    }
}

impl Executor {
    pub fn sync<P: Command>(executor: impl Execute<P>) -> Self {
        Self::Sync(Arc::new(move |params: Box<dyn Any + Send>| {
            executor.execute(downcast::<P>(params))
        }))
    }

    pub fn from_fn<P, F>(f: F) -> Self
    where
        P: Command,
        F: Fn(P) -> i32 + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(move |params: Box<dyn Any + Send>| {
            f(downcast::<P>(params))
        }))
    }

    pub fn from_async<P: Command>(executor: impl ExecuteAsync<P>) -> Self {
        let executor = Arc::new(executor);
        Self::Async(Arc::new(move |params: Box<dyn Any + Send>| {
            let executor = Arc::clone(&executor);
            let params = downcast::<P>(params);
            let fut: BoxFuture<'static, i32> =
                Box::pin(async move { executor.execute(params).await });
            fut
        }))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }
}

/// Error-handling hook run before the framework decides between execution
/// and the help page. Whatever it returns replaces the error list.
#[derive(Clone)]
pub struct ErrorHandler(Arc<HandlerFn>);

impl ErrorHandler {
    pub fn new<P, F>(f: F) -> Self
    where
        P: Command,
        F: Fn(Vec<CliError>, Option<&P>) -> Vec<CliError> + Send + Sync + 'static,
    {
        Self(Arc::new(move |errors: Vec<CliError>, bound: &BoundParameters| {
            f(errors, bound.downcast_ref::<P>())
        }))
    }

    pub fn handle(&self, errors: Vec<CliError>, bound: &BoundParameters) -> Vec<CliError> {
        (self.0)(errors, bound)
    }
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ErrorHandler")
    }
}
