//! A single simulated user, walking the request graph during its time window.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::SmallRng;
use rand_distr::{Distribution, Poisson};
use tokio::time::Instant;
use tokio_util::task::TaskTracker;

use crate::error::GraphError;
use crate::graph::{RequestGraph, START};
use crate::handler::{HandlerRegistry, Request};
use crate::log::{LogEntry, SessionLog};
use crate::metrics::Metrics;
use crate::surge::SurgeSchedule;

/// Read-only state shared by all sessions of a workload.
#[derive(Debug)]
pub(crate) struct Plan {
    pub graph: RequestGraph,
    pub surges: SurgeSchedule,
    pub handlers: HandlerRegistry,
}

/// The time window during which a session fires requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionWindow {
    /// The session starts firing requests at this instant.
    pub start_at: Instant,
    /// The session stops scheduling new ticks at this instant.
    pub stop_at: Instant,
}

/// Outcome of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    /// Index of the session within its workload.
    pub index: usize,
    /// The scheduled window of the session.
    pub window: SessionWindow,
    /// Number of scheduling ticks, including ticks without requests.
    pub ticks: u64,
    /// Number of log entries collected from the session's handlers.
    pub logged: usize,
    /// Handlers that were still running when the grace period ended.
    pub abandoned: usize,
    /// The traversal error that stopped the session early, if any.
    pub error: Option<GraphError>,
    /// Fired requests, failures and handler latencies of this session.
    pub metrics: Metrics,
}

/// One independent user session.
///
/// Sessions are created by the [`Workload`](crate::Workload) and consumed by [`run`](Self::run).
#[derive(Debug)]
pub struct Session {
    index: usize,
    window: SessionWindow,
    arrivals: Poisson<f64>,
    rng: SmallRng,
    plan: Arc<Plan>,
    grace_period: Duration,
    log: SessionLog,
}

impl Session {
    pub(crate) fn new(
        index: usize,
        window: SessionWindow,
        arrivals: Poisson<f64>,
        rng: SmallRng,
        plan: Arc<Plan>,
        grace_period: Duration,
    ) -> Self {
        Self {
            index,
            window,
            arrivals,
            rng,
            plan,
            grace_period,
            log: SessionLog::new(),
        }
    }

    /// Runs the session to completion and returns its report along with its log.
    ///
    /// The session waits for the start of its window, and then fires requests in ticks of
    /// roughly one second until the end of its window. Every tick draws the number of requests
    /// from a Poisson distribution and spaces them evenly, compressed by the surge intensity of
    /// the current second. Each request advances the session in the request graph and launches
    /// the handler as a separate task that is not awaited by the loop.
    ///
    /// Once the window has passed, in-flight handlers get `grace_period` to finish. Entries they
    /// log after that are not included in the returned log.
    pub async fn run(mut self, global_start: Instant) -> (SessionReport, Vec<LogEntry>) {
        tokio::time::sleep_until(self.window.start_at).await;
        tracing::debug!(session = self.index, "session started");

        let metrics = Arc::new(Mutex::new(Metrics::default()));
        let tracker = TaskTracker::new();

        let mut current = START.to_owned();
        let mut ticks = 0;
        let mut error = None;

        'session: while Instant::now() < self.window.stop_at {
            ticks += 1;

            let second = Instant::now()
                .saturating_duration_since(global_start)
                .as_secs();
            let intensity = self.plan.surges.intensity_at(second);
            let count = self.arrivals.sample(&mut self.rng) as u64;

            if count == 0 {
                let Some(wake) = deadline(1.0 / intensity) else {
                    break 'session;
                };
                tokio::time::sleep_until(wake).await;
                continue;
            }

            let spacing = 1.0 / (count as f64 * intensity);
            for _ in 0..count {
                let Some(wake) = deadline(spacing) else {
                    break 'session;
                };
                tokio::time::sleep_until(wake).await;

                match self.plan.graph.next(&current, &mut self.rng) {
                    Ok(next) => current = next.to_owned(),
                    Err(err) => {
                        tracing::error!(session = self.index, error = %err, "session stopped");
                        error = Some(err);
                        break 'session;
                    }
                }

                self.fire(&current, &tracker, &metrics);
            }
        }

        tracker.close();
        let abandoned = match tokio::time::timeout(self.grace_period, tracker.wait()).await {
            Ok(()) => 0,
            Err(_) => tracker.len(),
        };
        if abandoned > 0 {
            tracing::warn!(
                session = self.index,
                abandoned,
                "request handlers did not finish within the grace period"
            );
        }

        let entries = self.log.take();
        let metrics = std::mem::take(&mut *metrics.lock().unwrap_or_else(PoisonError::into_inner));
        tracing::debug!(
            session = self.index,
            ticks,
            requests = metrics.fired(),
            logged = entries.len(),
            "session finished"
        );

        let report = SessionReport {
            index: self.index,
            window: self.window,
            ticks,
            logged: entries.len(),
            abandoned,
            error,
            metrics,
        };

        (report, entries)
    }

    /// Launches the handler for `name` without waiting for it.
    fn fire(&self, name: &str, tracker: &TaskTracker, metrics: &Arc<Mutex<Metrics>>) {
        let Some(handler) = self.plan.handlers.get(name).cloned() else {
            // Handlers are validated against the graph, so this is a bug in the caller.
            tracing::error!(session = self.index, request = %name, "no handler for request");
            return;
        };

        metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_fired(name);

        let request = Request {
            session: self.index,
            name: name.to_owned(),
            log: self.log.clone(),
        };
        let metrics = Arc::clone(metrics);

        tracker.spawn(async move {
            let start = Instant::now();
            let result = handler.handle(&request).await;
            if let Err(ref error) = result {
                tracing::warn!(
                    session = request.session,
                    request = %request.name,
                    error = %error,
                    "request handler failed"
                );
            }

            metrics
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .record_completed(&request.name, start.elapsed(), result.is_ok());
        });
    }
}

/// Returns the instant `secs` seconds from now, or `None` if it cannot be represented.
fn deadline(secs: f64) -> Option<Instant> {
    let duration = Duration::try_from_secs_f64(secs).ok()?;
    let deadline = Instant::now().checked_add(duration);
    if deadline.is_none() {
        tracing::debug!(secs, "next request is out of reach, ending session");
    }
    deadline
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use rand::SeedableRng;

    use super::*;
    use crate::handler::{LogHandler, RequestHandler};
    use crate::surge::Surge;

    #[derive(Debug)]
    struct Failing;

    #[async_trait]
    impl RequestHandler for Failing {
        async fn handle(&self, _request: &Request) -> anyhow::Result<()> {
            anyhow::bail!("unavailable")
        }
    }

    fn plan(edges: &[(&str, &str)], handlers: HandlerRegistry) -> Arc<Plan> {
        surging_plan(edges, handlers, &[])
    }

    fn surging_plan(
        edges: &[(&str, &str)],
        handlers: HandlerRegistry,
        surges: &[Surge],
    ) -> Arc<Plan> {
        let mut graph = IndexMap::<String, IndexMap<String, f64>>::new();
        for &(from, to) in edges {
            graph
                .entry(from.to_owned())
                .or_default()
                .insert(to.to_owned(), 1.0);
        }

        Arc::new(Plan {
            graph: RequestGraph::new(graph).unwrap(),
            surges: SurgeSchedule::new(10, surges).unwrap(),
            handlers,
        })
    }

    fn logging() -> HandlerRegistry {
        let mut handlers = HandlerRegistry::new();
        handlers.set_fallback(LogHandler::new());
        handlers
    }

    fn session(window: SessionWindow, mean: f64, plan: Arc<Plan>) -> Session {
        Session::new(
            0,
            window,
            Poisson::new(mean).unwrap(),
            SmallRng::seed_from_u64(1),
            plan,
            Duration::from_secs(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn stays_within_window() {
        let global_start = Instant::now();
        let window = SessionWindow {
            start_at: global_start + Duration::from_secs(2),
            stop_at: global_start + Duration::from_secs(6),
        };
        let plan = plan(&[("main", "a"), ("a", "main")], logging());

        let (report, entries) = session(window, 5.0, plan).run(global_start).await;

        assert!(report.error.is_none());
        assert_eq!(report.abandoned, 0);
        assert!(report.ticks >= 4);
        assert!(!entries.is_empty());
        assert_eq!(report.logged, entries.len());
        assert_eq!(report.metrics.fired(), entries.len() as u64);

        for entry in &entries {
            assert!(entry.timestamp > window.start_at);
            // The last tick may spill over the end of the window by up to one second.
            assert!(entry.timestamp <= window.stop_at + Duration::from_secs(1));
        }
        assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test(start_paused = true)]
    async fn alternates_along_the_graph() {
        let global_start = Instant::now();
        let window = SessionWindow {
            start_at: global_start,
            stop_at: global_start + Duration::from_secs(3),
        };
        let plan = plan(&[("main", "a"), ("a", "main")], logging());

        let (_, entries) = session(window, 4.0, plan).run(global_start).await;

        for (i, entry) in entries.iter().enumerate() {
            let expected = if i % 2 == 0 { "a" } else { "main" };
            assert_eq!(entry.message, format!("session=0 request={expected}"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn traversal_error_stops_session() {
        let global_start = Instant::now();
        let window = SessionWindow {
            start_at: global_start,
            stop_at: global_start + Duration::from_secs(5),
        };
        let plan = plan(&[("main", "missing")], logging());

        let (report, entries) = session(window, 3.0, plan).run(global_start).await;

        assert_eq!(
            report.error,
            Some(GraphError::UnknownRequest("missing".into()))
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "session=0 request=missing");
    }

    #[tokio::test(start_paused = true)]
    async fn tiny_surge_intensity_ends_session() {
        let global_start = Instant::now();
        let window = SessionWindow {
            start_at: global_start,
            stop_at: global_start + Duration::from_secs(5),
        };
        let surges = [Surge {
            start: 0,
            duration: 10,
            intensity: 1e-30,
        }];

        for mean in [0.5, 5.0] {
            let plan = surging_plan(&[("main", "a"), ("a", "main")], logging(), &surges);
            let (report, entries) = session(window, mean, plan).run(global_start).await;

            assert!(report.error.is_none());
            assert_eq!(report.ticks, 1);
            assert!(entries.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn counts_handler_failures() {
        let global_start = Instant::now();
        let window = SessionWindow {
            start_at: global_start,
            stop_at: global_start + Duration::from_secs(3),
        };
        let mut handlers = HandlerRegistry::new();
        handlers.register("a", Failing);
        handlers.register("main", LogHandler::new());
        let plan = plan(&[("main", "a"), ("a", "main")], handlers);

        let (report, entries) = session(window, 4.0, plan).run(global_start).await;

        let failed = report.metrics.get("a").unwrap();
        assert!(failed.fired > 0);
        assert_eq!(failed.failures, failed.fired);
        assert!(entries.iter().all(|e| e.message.ends_with("request=main")));
    }

    #[tokio::test(start_paused = true)]
    async fn abandons_slow_handlers_after_grace_period() {
        let global_start = Instant::now();
        let window = SessionWindow {
            start_at: global_start,
            stop_at: global_start + Duration::from_secs(2),
        };
        let mut handlers = HandlerRegistry::new();
        handlers.set_fallback(LogHandler::new().latency(Duration::from_secs(30)));
        let plan = plan(&[("main", "a"), ("a", "main")], handlers);

        let (report, entries) = session(window, 4.0, plan).run(global_start).await;

        assert!(report.metrics.fired() > 0);
        assert_eq!(report.abandoned as u64, report.metrics.fired());
        assert!(entries.is_empty());
    }
}
