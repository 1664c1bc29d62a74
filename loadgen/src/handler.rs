//! Request handlers invoked by sessions while walking the request graph.
//!
//! Handlers are looked up by request name in a [`HandlerRegistry`]. The registry is validated
//! against the [`RequestGraph`] when the workload is built, so a session never encounters a
//! request it cannot dispatch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ConfigError;
use crate::graph::RequestGraph;
use crate::log::SessionLog;

/// A single request fired by a session.
#[derive(Clone, Debug)]
pub struct Request {
    /// Index of the session that fired the request.
    pub session: usize,
    /// Name of the request in the request graph.
    pub name: String,
    /// The log of the firing session.
    pub log: SessionLog,
}

/// Performs a request on behalf of a session.
///
/// Handlers run as independent tasks and may be invoked concurrently, both for the same and for
/// different sessions. A handler records its activity by appending to [`Request::log`].
#[async_trait]
pub trait RequestHandler: fmt::Debug + Send + Sync {
    /// Handles the request. Errors are logged and counted, but never retried.
    async fn handle(&self, request: &Request) -> anyhow::Result<()>;
}

/// Type-erased, shareable request handler.
pub type BoxedHandler = Arc<dyn RequestHandler>;

/// Maps request names to their handlers.
#[derive(Clone, Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, BoxedHandler>,
    fallback: Option<BoxedHandler>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for the given request name, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, handler: impl RequestHandler + 'static) {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    /// Sets a handler that serves every request without a dedicated handler.
    pub fn set_fallback(&mut self, handler: impl RequestHandler + 'static) {
        self.fallback = Some(Arc::new(handler));
    }

    /// Resolves the handler for a request name.
    pub fn get(&self, name: &str) -> Option<&BoxedHandler> {
        self.handlers.get(name).or(self.fallback.as_ref())
    }

    /// Ensures that every request a session can reach in `graph` has a handler.
    pub fn validate(&self, graph: &RequestGraph) -> Result<(), ConfigError> {
        for name in graph.reachable() {
            if self.get(name).is_none() {
                return Err(ConfigError::MissingHandler(name.to_owned()));
            }
        }

        for name in self.handlers.keys() {
            if !graph.reachable().any(|r| r == name.as_str()) {
                tracing::debug!(request = %name, "handler is never used by the request graph");
            }
        }

        Ok(())
    }
}

/// A handler that simulates a request by waiting and logging one message.
#[derive(Clone, Debug, Default)]
pub struct LogHandler {
    latency: Duration,
    message: Option<String>,
}

impl LogHandler {
    /// Creates a handler logging `session=<index> request=<name>` without delay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulated time it takes to perform the request.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Replaces the request name in the logged message with a fixed text.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[async_trait]
impl RequestHandler for LogHandler {
    async fn handle(&self, request: &Request) -> anyhow::Result<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let what = self.message.as_deref().unwrap_or(&request.name);
        request
            .log
            .append(format!("session={} request={what}", request.session));
        Ok(())
    }
}
