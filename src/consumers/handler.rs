//! The `Handler` trait is heavily inspired by `tide`'s approach to endpoint handlers.
use crate::consumers::{HandlerError, InvocationContext};
use std::future::Future;

/// Implementers of the `Handler` trait can be registered in a [`MessageHandler`]
/// to process messages retrieved from a queue.
///
/// # Scope
///
/// `handle` sees exactly one decoded message per invocation and nothing of the delivery
/// bookkeeping: it cannot ack, requeue or dead-letter the message.
/// The framework settles the message according to the outcome of processing (check out
/// [`HandlerError`] for more details).
///
/// Handlers are invoked concurrently and must be re-entrant. Anything that has to outlive an
/// invocation belongs in the handler struct, behind an `Arc` if it is mutable.
///
/// # Implementors
///
/// While you can implement `Handler` for a struct or enum, most of the time you will be
/// relying on our implementation of `Handler` for async functions with a matching signature -
/// `async fn(&str, &InvocationContext) -> Result<(), E>`. Check out [`AsyncClosure`].
///
/// [`MessageHandler`]: crate::consumers::MessageHandler
#[async_trait::async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, message: &str, context: &InvocationContext) -> Result<(), HandlerError>;
}

/// Implement the [`Handler`] trait for all Boxed handlers.
///
/// E.g. Box<dyn Handler>.
#[async_trait::async_trait]
impl<H> Handler for Box<H>
where
    H: Handler + ?Sized,
{
    async fn handle(&self, message: &str, context: &InvocationContext) -> Result<(), HandlerError> {
        H::handle(self, message, context).await
    }
}

/// `AsyncClosure` is implemented for all functions of the form:
/// ```ignore
/// async fn(message: &str, context: &InvocationContext) -> Result<(), impl Into<HandlerError>>;
/// ```
///
/// When combined with the [`ClosureHandler`] type, you get a [`Handler`] that can be used
/// by consumer groups. `MessageHandlerBuilder::handler` performs this wrapping for you.
pub trait AsyncClosure<'a>: Send + Sync + 'static {
    type Output: Future<Output = Result<(), Self::Err>> + Send + 'a;
    type Err: Into<HandlerError> + 'static;
    fn call(&'a self, message: &'a str, context: &'a InvocationContext) -> Self::Output;
}

impl<'a, F, Fut, Err> AsyncClosure<'a> for F
where
    F: Send + Sync + 'static,
    F: Fn(&'a str, &'a InvocationContext) -> Fut,
    Fut: Future<Output = Result<(), Err>> + Send + 'a,
    Err: Into<HandlerError> + 'static,
{
    type Err = Err;
    type Output = Fut;

    fn call(&'a self, message: &'a str, context: &'a InvocationContext) -> Self::Output {
        (self)(message, context)
    }
}

/// Wrapper type to turn an [`AsyncClosure`] into a [`Handler`].
pub struct ClosureHandler<H>(pub H);

/// Handlers do not have to return a [`HandlerError`] directly - it is enough for them to
/// return an error type that can be converted into one.
#[async_trait::async_trait]
impl<F> Handler for ClosureHandler<F>
where
    F: for<'a> AsyncClosure<'a>,
{
    async fn handle(&self, message: &str, context: &InvocationContext) -> Result<(), HandlerError> {
        self.0.call(message, context).await.map_err(Into::into)
    }
}
