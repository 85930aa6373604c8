//! An extension type-map is useful to share data between different middlewares on the incoming
//! path (`Queue` -> `Middleware 1` -> ... -> `Middleware N` -> `Handler`) and the corresponding
//! outgoing path (`Handler` -> `Middleware N` -> ... -> `Middleware 1` -> settlement).
//!
//! The type-map lives in task-local storage and is scoped to a single invocation: nothing
//! stored in it survives to the next delivery, not even a redelivery of the same message.
//!
//! # Common use cases
//!
//! ## Measuring elapsed time
//!
//! Start a timer when message handling begins in a telemetry middleware, store the clock in the
//! extensions, retrieve it when processing completes and compute the elapsed time.
#![allow(clippy::declare_interior_mutable_const)] // silence tokio::task_local warning

use std::cell::RefCell;
use std::future::Future;
use task_local_extensions::Extensions;

tokio::task_local! {
    static EXTENSIONS: RefCell<Extensions>;
}

/// Run `fut` with a fresh invocation-local type-map, returning what it contained at the end.
pub(crate) async fn with_extensions<T>(
    extensions: Extensions,
    fut: impl Future<Output = T>,
) -> (Extensions, T) {
    EXTENSIONS
        .scope(RefCell::new(extensions), async move {
            let response = fut.await;
            let extensions = RefCell::new(Extensions::new());

            EXTENSIONS.with(|ext| ext.swap(&extensions));

            (extensions.into_inner(), response)
        })
        .await
}

/// Retrieve an item from invocation-local storage based on its type.
///
/// It returns `None` if there is no item of that type, or if it is called outside of an
/// invocation.
pub fn get_invocation_local_item<T: Send + Sync + Clone + 'static>() -> Option<T> {
    EXTENSIONS
        .try_with(|e| e.borrow().get::<T>().cloned())
        .ok()
        .flatten()
}

/// Insert an item in invocation-local storage, replacing any previous item of the same type.
pub fn set_invocation_local_item<T: Send + Sync + 'static>(item: T) {
    let _ = EXTENSIONS.try_with(|e| e.borrow_mut().insert(item)).map_err(|_| {
        tracing::warn!("Failed to set local item in the invocation context extensions.")
    });
}
