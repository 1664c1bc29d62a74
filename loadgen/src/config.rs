//! Configuration file for the `loadgen` binary.
//!
//! The configuration is a YAML file describing the sessions, the request graph and surges:
//!
//! ```yaml
//! sessions: 2
//! throughput: 2.0
//! duration:
//!   total: 4
//!   ramp_up: 0
//!   ramp_down: 0
//! request_graph:
//!   main: { a: 1 }
//!   a: { main: 1 }
//! surges:
//!   - { start: 1, duration: 2, intensity: 2.0 }
//! seed: 42
//! grace_period: 5s
//! handlers:
//!   a: { latency: 20ms, message: "GET /a" }
//! ```
//!
//! Only `sessions`, `throughput`, `duration` and `request_graph` are required. Values are checked
//! when the [`Workload`] is built from the configuration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::graph::Edges;
use crate::handler::{HandlerRegistry, LogHandler};
use crate::surge::Surge;
use crate::workload::{DEFAULT_GRACE_PERIOD, Phases, Workload, WorkloadBuilder};

/// The complete workload configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Number of concurrent sessions.
    pub sessions: usize,
    /// Mean aggregate requests per second.
    pub throughput: f64,
    /// Duration phases in seconds.
    pub duration: Phases,
    /// Adjacency list of request names to weighted successors, in declaration order.
    pub request_graph: Edges,

    /// Intensity overrides, applied in order.
    #[serde(default)]
    pub surges: Vec<Surge>,
    /// Seed for a reproducible run. Random if absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Time in-flight handlers get to finish after their session ended.
    #[serde(default = "default_grace_period", with = "humantime_serde")]
    pub grace_period: Duration,
    /// Simulated behavior of individual requests.
    #[serde(default)]
    pub handlers: BTreeMap<String, HandlerConfig>,
}

/// Simulated behavior of a single request type.
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct HandlerConfig {
    /// Time the simulated request takes before it logs.
    #[serde(default, with = "humantime_serde")]
    pub latency: Duration,
    /// Text logged instead of the request name.
    #[serde(default)]
    pub message: Option<String>,
}

fn default_grace_period() -> Duration {
    DEFAULT_GRACE_PERIOD
}

impl Config {
    /// Reads and parses the YAML configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open config file {}", path.display()))?;
        let config = serde_yaml::from_reader(file).context("failed to parse config YAML")?;
        Ok(config)
    }

    /// Creates a workload builder from this configuration.
    ///
    /// Every request is served by a [`LogHandler`], configured from [`Config::handlers`] where an
    /// entry exists.
    pub fn into_builder(self) -> WorkloadBuilder {
        let mut handlers = HandlerRegistry::new();
        handlers.set_fallback(LogHandler::new());
        for (name, handler) in self.handlers {
            let mut log_handler = LogHandler::new().latency(handler.latency);
            if let Some(message) = handler.message {
                log_handler = log_handler.message(message);
            }
            handlers.register(name, log_handler);
        }

        let mut builder = Workload::builder()
            .sessions(self.sessions)
            .throughput(self.throughput)
            .phases(self.duration)
            .request_graph(self.request_graph)
            .surges(self.surges)
            .handlers(handlers)
            .grace_period(self.grace_period);
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }

        builder
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn parse(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn minimal_config() {
        let config = parse(
            r#"
            sessions: 2
            throughput: 2
            duration: { total: 4 }
            request_graph:
              main: { a: 1 }
              a: { main: 1 }
            "#,
        );

        assert_eq!(config.sessions, 2);
        assert_eq!(config.throughput, 2.0);
        assert_eq!(config.duration, Phases::new(4));
        assert!(config.surges.is_empty());
        assert_eq!(config.seed, None);
        assert_eq!(config.grace_period, DEFAULT_GRACE_PERIOD);
        assert!(config.handlers.is_empty());
    }

    #[test]
    fn full_config() {
        let config = parse(
            r#"
            sessions: 10
            throughput: 25.5
            duration:
              total: 60
              ramp_up: 10
              ramp_down: 5
            request_graph:
              main: { search: 3, browse: 1, checkout: 0.5 }
              search: { main: 1 }
              browse: { main: 1 }
              checkout: { main: 1 }
            surges:
              - { start: 5, duration: 3, intensity: 2.0 }
              - { start: 30, duration: 10, intensity: 0.5 }
            seed: 42
            grace_period: 500ms
            handlers:
              search: { latency: 20ms, message: "GET /search" }
              checkout: { message: "POST /checkout" }
            "#,
        );

        assert_eq!(config.duration, Phases::new(60).ramp_up(10).ramp_down(5));
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.grace_period, Duration::from_millis(500));
        assert_eq!(
            config.surges[1],
            Surge {
                start: 30,
                duration: 10,
                intensity: 0.5
            }
        );

        // Successors keep their declaration order.
        let successors: Vec<_> = config.request_graph["main"]
            .iter()
            .map(|(name, weight)| (name.as_str(), *weight))
            .collect();
        assert_eq!(
            successors,
            [("search", 3.0), ("browse", 1.0), ("checkout", 0.5)]
        );

        assert_eq!(
            config.handlers["search"],
            HandlerConfig {
                latency: Duration::from_millis(20),
                message: Some("GET /search".into()),
            }
        );
        assert_eq!(config.handlers["checkout"].latency, Duration::ZERO);

        let workload = config.into_builder().build().unwrap();
        assert_eq!(workload.seed(), 42);
        assert_eq!(workload.phases().total, 60);
    }

    #[test]
    fn invalid_values_fail_on_build() {
        let config = parse(
            r#"
            sessions: 0
            throughput: 1
            duration: { total: 4 }
            request_graph:
              main: { main: 1 }
            "#,
        );

        assert!(config.into_builder().build().is_err());
    }

    #[test]
    fn load_from_file() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            sessions: 1
            throughput: 1
            duration: { total: 1 }
            request_graph: { main: { main: 1 } }
            "#,
            )
            .unwrap();

        let config = Config::load(tempfile.path()).unwrap();
        assert_eq!(config.sessions, 1);

        let error = Config::load(Path::new("/does/not/exist.yml")).unwrap_err();
        assert!(error.to_string().contains("failed to open config file"));
    }
}
