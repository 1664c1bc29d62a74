//! Request handlers for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use loadgen::{Request, RequestHandler};

/// Logs the bare request name and counts its invocations.
///
/// Clones share the same counter.
#[derive(Clone, Debug, Default)]
pub struct Echo {
    calls: Arc<AtomicUsize>,
}

impl Echo {
    /// Creates a handler with a fresh counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of invocations of this handler and all its clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RequestHandler for Echo {
    async fn handle(&self, request: &Request) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        request.log.append(request.name.clone());
        Ok(())
    }
}

/// Fails every request without logging anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct Failing;

#[async_trait]
impl RequestHandler for Failing {
    async fn handle(&self, request: &Request) -> anyhow::Result<()> {
        anyhow::bail!("request `{}` failed", request.name)
    }
}
