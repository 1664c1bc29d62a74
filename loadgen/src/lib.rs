//! A synthetic workload generator which simulates many concurrent user sessions.
//!
//! Every session walks a weighted [`RequestGraph`], firing requests at a Poisson distributed rate
//! during its own time window. The windows of all sessions are staggered over a ramp-up and a
//! ramp-down phase, and a [`SurgeSchedule`] compresses the spacing of requests during traffic
//! spikes. Requests are performed by [`RequestHandler`]s, which run as independent tasks and
//! append to the log of their session.
//!
//! After all sessions have finished, their logs are merged into a single chronological sequence,
//! see [`log::merge`].
//!
//! ```no_run
//! use loadgen::{LogHandler, Phases, Workload};
//!
//! # async fn run(edges: loadgen::graph::Edges) -> anyhow::Result<()> {
//! let workload = Workload::builder()
//!     .sessions(10)
//!     .throughput(50.0)
//!     .phases(Phases::new(60).ramp_up(10).ramp_down(10))
//!     .request_graph(edges)
//!     .fallback_handler(LogHandler::new())
//!     .build()?;
//!
//! let report = workload.run().await;
//! loadgen::log::write_log("workload.log".as_ref(), &report.entries)?;
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod handler;
pub mod log;
pub mod metrics;
pub mod observability;
pub mod session;
pub mod surge;
pub mod workload;

pub use crate::error::{ConfigError, GraphError};
pub use crate::graph::RequestGraph;
pub use crate::handler::{HandlerRegistry, LogHandler, Request, RequestHandler};
pub use crate::log::{LogEntry, SessionLog};
pub use crate::surge::{Surge, SurgeSchedule};
pub use crate::workload::{Phases, RunReport, Workload};
