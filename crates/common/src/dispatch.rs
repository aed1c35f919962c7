//! Command and query dispatch.
//!
//! Routers map a message's type tag to exactly one registered handler. The
//! same registry serves in-process dispatch, the HTTP boundary and commands
//! forwarded by process managers, because all three carry the tag alongside
//! the serialized payload. Registration mistakes are wiring errors and
//! surface as typed failures at startup or first dispatch.

use std::collections::HashMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::envelope::Envelope;
use crate::message::{CommandData, CommandMessage, QueryMessage};
use crate::position::GlobalPosition;
use crate::scope::RequestScope;

/// The result of a committed command: where the global log ended up after the
/// command's events were appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commit {
    pub committed_position: GlobalPosition,
}

/// Errors raised by the dispatch layer itself.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no handler for {0}")]
    NoHandler(String),

    #[error("handler for {0} already registered")]
    HandlerAlreadyRegistered(&'static str),

    #[error("malformed {message_type} payload: {source}")]
    MalformedPayload {
        message_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize {message_type} response: {source}")]
    ResponseSerialization {
        message_type: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A handler for one concrete command type.
#[async_trait]
pub trait HandlesCommand<C: CommandMessage, E>: Send + Sync {
    async fn handle(&self, command: C, scope: &RequestScope) -> Result<Commit, E>;
}

/// A handler for one concrete query type.
#[async_trait]
pub trait HandlesQuery<Q: QueryMessage, E>: Send + Sync {
    type Output: Serialize + Send;

    async fn handle(&self, query: Q, scope: &RequestScope) -> Result<Self::Output, E>;
}

/// Anything that can take an enveloped command to a commit: the command
/// router, or a decorator wrapping one.
#[async_trait]
pub trait CommandDispatcher<E>: Send + Sync {
    async fn dispatch(
        &self,
        command: Envelope<CommandData>,
        scope: &RequestScope,
    ) -> Result<Commit, E>;
}

#[async_trait]
impl<E, D> CommandDispatcher<E> for std::sync::Arc<D>
where
    E: Send + 'static,
    D: CommandDispatcher<E> + ?Sized,
{
    async fn dispatch(
        &self,
        command: Envelope<CommandData>,
        scope: &RequestScope,
    ) -> Result<Commit, E> {
        (**self).dispatch(command, scope).await
    }
}

/// Sends a typed command through a dispatcher, enveloping it in the scope's
/// causality context.
pub async fn send_command<C, E, D>(
    dispatcher: &D,
    command: C,
    scope: &RequestScope,
) -> Result<Commit, E>
where
    C: CommandMessage,
    E: From<DispatchError>,
    D: CommandDispatcher<E> + ?Sized,
{
    let data = CommandData::encode(&command).map_err(|source| DispatchError::MalformedPayload {
        message_type: C::TYPE.to_string(),
        source,
    })?;
    let envelope = Envelope::new(data, &scope.context);
    dispatcher.dispatch(envelope, scope).await
}

#[async_trait]
trait ErasedCommandHandler<E>: Send + Sync {
    async fn handle(&self, command: &CommandData, scope: &RequestScope) -> Result<Commit, E>;
}

struct RegisteredCommand<C, H> {
    handler: H,
    _marker: PhantomData<fn() -> C>,
}

#[async_trait]
impl<C, H, E> ErasedCommandHandler<E> for RegisteredCommand<C, H>
where
    C: CommandMessage + 'static,
    H: HandlesCommand<C, E>,
    E: From<DispatchError> + Send + 'static,
{
    async fn handle(&self, command: &CommandData, scope: &RequestScope) -> Result<Commit, E> {
        let command: C = command
            .decode()
            .map_err(|source| DispatchError::MalformedPayload {
                message_type: C::TYPE.to_string(),
                source,
            })?;
        self.handler.handle(command, scope).await
    }
}

/// Routes commands to exactly one handler by their type tag.
pub struct CommandRouter<E> {
    handlers: HashMap<&'static str, Box<dyn ErasedCommandHandler<E>>>,
}

impl<E> Default for CommandRouter<E> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<E> CommandRouter<E>
where
    E: From<DispatchError> + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for `C`. There can be only one per command type.
    pub fn register<C, H>(&mut self, handler: H) -> Result<(), DispatchError>
    where
        C: CommandMessage + 'static,
        H: HandlesCommand<C, E> + 'static,
    {
        if self.handlers.contains_key(C::TYPE) {
            return Err(DispatchError::HandlerAlreadyRegistered(C::TYPE));
        }
        self.handlers.insert(
            C::TYPE,
            Box::new(RegisteredCommand {
                handler,
                _marker: PhantomData,
            }),
        );
        Ok(())
    }
}

#[async_trait]
impl<E> CommandDispatcher<E> for CommandRouter<E>
where
    E: From<DispatchError> + Send + 'static,
{
    async fn dispatch(
        &self,
        command: Envelope<CommandData>,
        scope: &RequestScope,
    ) -> Result<Commit, E> {
        let handler = self
            .handlers
            .get(command.payload.command_type.as_str())
            .ok_or_else(|| DispatchError::NoHandler(command.payload.command_type.clone()))?;
        tracing::debug!(
            command_type = %command.payload.command_type,
            message_id = %command.message_id,
            "dispatching command"
        );
        // events produced while handling inherit the command's identifiers
        let handling = scope.handling(&command);
        handler.handle(&command.payload, &handling).await
    }
}

#[async_trait]
trait ErasedQueryHandler<E>: Send + Sync {
    async fn handle(
        &self,
        payload: serde_json::Value,
        scope: &RequestScope,
    ) -> Result<serde_json::Value, E>;
}

struct RegisteredQuery<Q, H> {
    handler: H,
    _marker: PhantomData<fn() -> Q>,
}

#[async_trait]
impl<Q, H, E> ErasedQueryHandler<E> for RegisteredQuery<Q, H>
where
    Q: QueryMessage + 'static,
    H: HandlesQuery<Q, E>,
    E: From<DispatchError> + Send + 'static,
{
    async fn handle(
        &self,
        payload: serde_json::Value,
        scope: &RequestScope,
    ) -> Result<serde_json::Value, E> {
        let query: Q =
            serde_json::from_value(payload).map_err(|source| DispatchError::MalformedPayload {
                message_type: Q::TYPE.to_string(),
                source,
            })?;
        let output = self.handler.handle(query, scope).await?;
        let value =
            serde_json::to_value(output).map_err(|source| DispatchError::ResponseSerialization {
                message_type: Q::TYPE.to_string(),
                source,
            })?;
        Ok(value)
    }
}

/// Routes queries to exactly one handler by their type tag.
pub struct QueryRouter<E> {
    handlers: HashMap<&'static str, Box<dyn ErasedQueryHandler<E>>>,
}

impl<E> Default for QueryRouter<E> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<E> QueryRouter<E>
where
    E: From<DispatchError> + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for `Q`. There can be only one per query type.
    pub fn register<Q, H>(&mut self, handler: H) -> Result<(), DispatchError>
    where
        Q: QueryMessage + 'static,
        H: HandlesQuery<Q, E> + 'static,
    {
        if self.handlers.contains_key(Q::TYPE) {
            return Err(DispatchError::HandlerAlreadyRegistered(Q::TYPE));
        }
        self.handlers.insert(
            Q::TYPE,
            Box::new(RegisteredQuery {
                handler,
                _marker: PhantomData,
            }),
        );
        Ok(())
    }

    /// Dispatches a query from its serialized form.
    pub async fn dispatch(
        &self,
        query_type: &str,
        payload: serde_json::Value,
        scope: &RequestScope,
    ) -> Result<serde_json::Value, E> {
        let handler = self
            .handlers
            .get(query_type)
            .ok_or_else(|| DispatchError::NoHandler(query_type.to_string()))?;
        handler.handle(payload, scope).await
    }

    /// Dispatches a typed query.
    pub async fn query<Q: QueryMessage>(
        &self,
        query: Q,
        scope: &RequestScope,
    ) -> Result<serde_json::Value, E> {
        let payload =
            serde_json::to_value(&query).map_err(|source| DispatchError::MalformedPayload {
                message_type: Q::TYPE.to_string(),
                source,
            })?;
        self.dispatch(Q::TYPE, payload, scope).await
    }
}
