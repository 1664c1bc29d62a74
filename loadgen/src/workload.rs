//! A module for defining a [`Workload`] and running its sessions.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand_distr::Poisson;
use serde::Deserialize;
use tokio::time::Instant;

use crate::error::ConfigError;
use crate::graph::{Edges, RequestGraph};
use crate::handler::{HandlerRegistry, RequestHandler};
use crate::log::{self, LogEntry};
use crate::metrics::Metrics;
use crate::session::{Plan, Session, SessionReport, SessionWindow};
use crate::surge::{Surge, SurgeSchedule};

/// Default time that in-flight handlers get to finish after their session ended.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Longest run a workload accepts, in seconds: one year.
pub const MAX_TOTAL: u64 = 365 * 24 * 60 * 60;

/// Duration phases of a run, in whole seconds.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Phases {
    /// Total length of the run.
    pub total: u64,
    /// Window over which session starts are staggered.
    #[serde(default)]
    pub ramp_up: u64,
    /// Window over which session stops are staggered.
    #[serde(default)]
    pub ramp_down: u64,
}

impl Phases {
    /// Creates phases without ramp-up or ramp-down.
    pub fn new(total: u64) -> Self {
        Self {
            total,
            ramp_up: 0,
            ramp_down: 0,
        }
    }

    /// Sets the ramp-up window.
    pub fn ramp_up(mut self, ramp_up: u64) -> Self {
        self.ramp_up = ramp_up;
        self
    }

    /// Sets the ramp-down window.
    pub fn ramp_down(mut self, ramp_down: u64) -> Self {
        self.ramp_down = ramp_down;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let fits = self
            .ramp_up
            .checked_add(self.ramp_down)
            .is_some_and(|ramps| ramps <= self.total);

        if self.total == 0 || self.total > MAX_TOTAL || !fits {
            return Err(ConfigError::InvalidDuration {
                total: self.total,
                ramp_up: self.ramp_up,
                ramp_down: self.ramp_down,
            });
        }
        Ok(())
    }
}

/// A builder for creating a [`Workload`].
#[derive(Debug)]
pub struct WorkloadBuilder {
    sessions: usize,
    throughput: f64,
    phases: Phases,
    edges: Edges,
    surges: Vec<Surge>,
    handlers: HandlerRegistry,
    seed: u64,
    grace_period: Duration,
}

impl WorkloadBuilder {
    /// The number of concurrent sessions.
    pub fn sessions(mut self, sessions: usize) -> Self {
        self.sessions = sessions;
        self
    }

    /// The mean aggregate number of requests per second, shared evenly by all sessions.
    pub fn throughput(mut self, throughput: f64) -> Self {
        self.throughput = throughput;
        self
    }

    /// The duration phases of the run.
    pub fn phases(mut self, phases: Phases) -> Self {
        self.phases = phases;
        self
    }

    /// The request graph that sessions walk.
    pub fn request_graph(mut self, edges: Edges) -> Self {
        self.edges = edges;
        self
    }

    /// Adds a surge interval. Surges declared later take precedence.
    pub fn surge(mut self, surge: Surge) -> Self {
        self.surges.push(surge);
        self
    }

    /// Replaces all surge intervals.
    pub fn surges(mut self, surges: Vec<Surge>) -> Self {
        self.surges = surges;
        self
    }

    /// Replaces the handler registry.
    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Registers a handler for a single request name.
    pub fn handler(
        mut self,
        name: impl Into<String>,
        handler: impl RequestHandler + 'static,
    ) -> Self {
        self.handlers.register(name, handler);
        self
    }

    /// Registers a handler for all requests without a dedicated handler.
    pub fn fallback_handler(mut self, handler: impl RequestHandler + 'static) -> Self {
        self.handlers.set_fallback(handler);
        self
    }

    /// The seed of the RNG that drives arrivals and graph traversal. Random by default.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// How long in-flight handlers may run after their session ended.
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Validates the configuration and creates the workload instance.
    pub fn build(self) -> Result<Workload, ConfigError> {
        if self.sessions == 0 {
            return Err(ConfigError::NoSessions);
        }
        if !self.throughput.is_finite() || self.throughput <= 0.0 {
            return Err(ConfigError::InvalidThroughput(self.throughput));
        }
        self.phases.validate()?;

        let graph = RequestGraph::new(self.edges)?;
        let surges = SurgeSchedule::new(self.phases.total, &self.surges)?;
        self.handlers.validate(&graph)?;

        let arrivals = Poisson::new(self.throughput / self.sessions as f64)
            .map_err(|_| ConfigError::InvalidThroughput(self.throughput))?;

        Ok(Workload {
            sessions: self.sessions,
            throughput: self.throughput,
            phases: self.phases,
            arrivals,
            seed: self.seed,
            grace_period: self.grace_period,
            plan: Arc::new(Plan {
                graph,
                surges,
                handlers: self.handlers,
            }),
        })
    }
}

/// A validated workload that can be run.
#[derive(Debug)]
pub struct Workload {
    sessions: usize,
    throughput: f64,
    phases: Phases,
    /// Per-session distribution of requests per tick.
    arrivals: Poisson<f64>,
    seed: u64,
    grace_period: Duration,
    plan: Arc<Plan>,
}

impl Workload {
    /// Constructs a new workload builder.
    pub fn builder() -> WorkloadBuilder {
        WorkloadBuilder {
            sessions: 1,
            throughput: 1.0,
            phases: Phases::new(60),
            edges: Edges::new(),
            surges: Vec::new(),
            handlers: HandlerRegistry::new(),
            seed: rand::random(),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    /// The seed driving this workload, to reproduce a run.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The configured duration phases.
    pub fn phases(&self) -> Phases {
        self.phases
    }

    /// Computes the time windows of all sessions for a run starting at `global_start`.
    ///
    /// Session `i` of `n` starts `ramp_up * i / n` seconds after `global_start` and stops
    /// `ramp_down * i / n` seconds before the end of the run, so load builds up and tapers off
    /// gradually.
    pub fn windows(&self, global_start: Instant) -> Vec<SessionWindow> {
        let n = self.sessions as f64;
        let end = global_start + Duration::from_secs(self.phases.total);

        (0..self.sessions)
            .map(|i| {
                let fraction = i as f64 / n;
                let start_offset = Duration::from_secs_f64(self.phases.ramp_up as f64 * fraction);
                let stop_offset = Duration::from_secs_f64(self.phases.ramp_down as f64 * fraction);
                SessionWindow {
                    start_at: global_start + start_offset,
                    stop_at: end - stop_offset,
                }
            })
            .collect()
    }

    /// Runs all sessions concurrently and merges their logs.
    ///
    /// A session that fails does not affect the others. The returned report contains the
    /// merged log of all sessions that finished.
    pub async fn run(&self) -> RunReport {
        let global_start = Instant::now();
        tracing::info!(
            sessions = self.sessions,
            throughput = self.throughput,
            total = self.phases.total,
            seed = self.seed,
            "starting workload"
        );

        let mut rng = SmallRng::seed_from_u64(self.seed);
        let tasks: Vec<_> = self
            .windows(global_start)
            .into_iter()
            .enumerate()
            .map(|(index, window)| {
                let session = Session::new(
                    index,
                    window,
                    self.arrivals.clone(),
                    SmallRng::from_rng(&mut rng),
                    Arc::clone(&self.plan),
                    self.grace_period,
                );
                tokio::spawn(session.run(global_start))
            })
            .collect();

        let finished = join_all(tasks).await;

        let mut sessions = Vec::with_capacity(finished.len());
        let mut logs = Vec::with_capacity(finished.len());
        let mut metrics = Metrics::default();
        let mut lost = 0;

        for result in finished {
            match result {
                Ok((report, entries)) => {
                    metrics.merge(&report.metrics);
                    sessions.push(report);
                    logs.push(entries);
                }
                Err(error) => {
                    tracing::error!(%error, "session task failed");
                    lost += 1;
                }
            }
        }

        let entries = log::merge(logs);
        let elapsed = global_start.elapsed();
        tracing::info!(
            requests = metrics.fired(),
            failures = metrics.failures(),
            logged = entries.len(),
            ?elapsed,
            "workload finished"
        );

        RunReport {
            elapsed,
            sessions,
            lost,
            metrics,
            entries,
        }
    }
}

/// The result of [`Workload::run`].
#[derive(Debug)]
pub struct RunReport {
    /// Wall-clock time of the run, including grace periods.
    pub elapsed: Duration,
    /// Reports of all sessions that finished, in session order.
    pub sessions: Vec<SessionReport>,
    /// Number of sessions whose task panicked.
    pub lost: usize,
    /// Metrics of all sessions combined.
    pub metrics: Metrics,
    /// The merged, chronologically ordered log of all sessions.
    pub entries: Vec<LogEntry>,
}
