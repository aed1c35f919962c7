use std::sync::Arc;

use tokio::sync::mpsc;

use common::{CommandData, CommandDispatcher, Envelope, MessageGateway, RequestScope};

/// Forwards process-manager commands into the command dispatch layer on a
/// background task.
///
/// Dispatch failures are logged and the loop continues: a command one saga
/// failed to get handled must not block the commands other sagas published.
/// This is a deliberate isolation boundary, not general error suppression.
pub struct DispatchingGateway {
    tx: mpsc::UnboundedSender<Envelope<CommandData>>,
}

impl DispatchingGateway {
    pub fn spawn<E>(dispatcher: Arc<dyn CommandDispatcher<E>>) -> Self
    where
        E: std::fmt::Display + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope<CommandData>>();
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let command_type = command.payload.command_type.clone();
                let scope = RequestScope::new();
                if let Err(error) = dispatcher.dispatch(command, &scope).await {
                    tracing::error!(%command_type, %error, "failed to dispatch forwarded command");
                }
            }
        });
        Self { tx }
    }
}

impl MessageGateway for DispatchingGateway {
    fn send(&self, command: Envelope<CommandData>) {
        if self.tx.send(command).is_err() {
            tracing::warn!("command gateway is shut down, dropping command");
        }
    }
}
