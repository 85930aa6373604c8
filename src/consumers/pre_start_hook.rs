use crate::transport::{QueueTopology, QueueTransport};
use std::future::Future;

#[async_trait::async_trait]
/// A hook to execute logic before a [`MessageHandler`] starts processing messages.
///
/// # Use case
///
/// [`MessageHandler`]s process messages retrieved from a queue. Who is in charge of creating the
/// queue? What about its poison queue?
///
/// Depending on your setup, this might be done by your infrastructure tooling or manually.
/// Often, though, it is preferable to have consumers in charge of creating the objects they
/// rely on.
///
/// A pre-start hook gives you access to the transport, allowing you to perform actions against
/// the queue backend before the consumer actually starts pulling messages.
/// If any hook fails, the consumer group fails to build.
///
/// # Plug and play implementations
///
/// [`DeclareQueue`] creates the queue and its poison queue.
///
/// [`MessageHandler`]: crate::consumers::MessageHandler
/// [`DeclareQueue`]: crate::consumers::hooks::pre_start::DeclareQueue
pub trait ConsumerPreStartHook: Send + Sync + 'static {
    async fn run(
        &self,
        transport: &dyn QueueTransport,
        topology: &QueueTopology,
    ) -> Result<(), anyhow::Error>;
}

#[async_trait::async_trait]
impl<F: Send + Sync + 'static, Fut> ConsumerPreStartHook for F
where
    F: Fn(&dyn QueueTransport, &QueueTopology) -> Fut,
    Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
{
    async fn run(
        &self,
        transport: &dyn QueueTransport,
        topology: &QueueTopology,
    ) -> Result<(), anyhow::Error> {
        (self)(transport, topology).await
    }
}
