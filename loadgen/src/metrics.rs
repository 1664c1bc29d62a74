//! Per-request metrics collected during a run, and their summary printout.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use sketches_ddsketch::DDSketch;
use yansi::Paint;

use crate::workload::RunReport;

/// Counters and handler latencies for a single request name.
#[derive(Default)]
pub struct RequestMetrics {
    /// Number of handler invocations that were launched.
    pub fired: u64,
    /// Number of handler invocations that returned an error.
    pub failures: u64,
    /// Handler durations in seconds, for completed invocations.
    pub latency: DDSketch,
}

impl fmt::Debug for RequestMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestMetrics")
            .field("fired", &self.fired)
            .field("failures", &self.failures)
            .field("completed", &self.latency.count())
            .finish()
    }
}

impl RequestMetrics {
    fn merge(&mut self, other: &Self) {
        self.fired += other.fired;
        self.failures += other.failures;
        if let Err(error) = self.latency.merge(&other.latency) {
            tracing::error!(?error, "failed to merge latency sketches");
        }
    }
}

/// Metrics of a session or of a whole run, keyed by request name.
#[derive(Debug, Default)]
pub struct Metrics {
    requests: BTreeMap<String, RequestMetrics>,
}

impl Metrics {
    /// Records that a handler for `request` has been launched.
    pub fn record_fired(&mut self, request: &str) {
        self.entry(request).fired += 1;
    }

    /// Records the outcome of a finished handler.
    pub fn record_completed(&mut self, request: &str, elapsed: Duration, success: bool) {
        let metrics = self.entry(request);
        metrics.latency.add(elapsed.as_secs_f64());
        if !success {
            metrics.failures += 1;
        }
    }

    /// Adds all counters and latencies of `other` to `self`.
    pub fn merge(&mut self, other: &Metrics) {
        for (request, metrics) in &other.requests {
            self.entry(request).merge(metrics);
        }
    }

    /// Returns the metrics for one request name.
    pub fn get(&self, request: &str) -> Option<&RequestMetrics> {
        self.requests.get(request)
    }

    /// Iterates all request names with their metrics, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RequestMetrics)> {
        self.requests.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Total number of launched handlers.
    pub fn fired(&self) -> u64 {
        self.requests.values().map(|m| m.fired).sum()
    }

    /// Total number of failed handlers.
    pub fn failures(&self) -> u64 {
        self.requests.values().map(|m| m.failures).sum()
    }

    fn entry(&mut self, request: &str) -> &mut RequestMetrics {
        self.requests.entry(request.to_owned()).or_default()
    }
}

/// Prints a summary of a finished run: sessions, requests per name and totals.
pub fn print_report(report: &RunReport, seed: u64) {
    let duration = report.elapsed;
    let global_start = report.sessions.first().map(|s| s.window.start_at);

    println!();
    println!(
        "{} ({} sessions, seed: {})",
        "## SESSIONS".bold(),
        report.sessions.len().bold(),
        seed.bold()
    );
    for session in &report.sessions {
        let (start, stop) = match global_start {
            Some(global_start) => (
                session.window.start_at.saturating_duration_since(global_start),
                session.window.stop_at.saturating_duration_since(global_start),
            ),
            None => Default::default(),
        };
        print!(
            "  #{}: {:.2?}..{:.2?}, {} requests in {} ticks",
            session.index,
            start,
            stop,
            session.metrics.fired().bold(),
            session.ticks
        );
        if session.abandoned > 0 {
            print!(", {}", format!("{} ABANDONED", session.abandoned).bold().yellow());
        }
        if let Some(ref error) = session.error {
            print!(", {}", format!("STOPPED: {error}").bold().red());
        }
        println!();
    }
    if report.lost > 0 {
        println!("{}", format!("{} SESSIONS LOST", report.lost).bold().red());
    }

    println!();
    println!("{}", "## REQUESTS".bold());
    print_metrics(&report.metrics, duration);

    println!();
    println!("{}", "## TOTALS".bold());
    print!(
        "{} requests, {} logged",
        report.metrics.fired().bold(),
        report.entries.len().bold()
    );
    if report.metrics.failures() > 0 {
        print!(
            ", {}",
            format!("{} FAILURES", report.metrics.failures()).bold().red()
        );
    }
    println!(" in {:.2?}", duration);
    print_ops(report.metrics.fired(), duration);
    println!();
}

fn print_metrics(metrics: &Metrics, duration: Duration) {
    for (request, request_metrics) in metrics.iter() {
        print_request(request, request_metrics, duration);
    }
}

fn print_request(request: &str, metrics: &RequestMetrics, duration: Duration) {
    print!(
        "{} ({} ops",
        format!("{request}:").bold().green(),
        metrics.fired.bold()
    );
    if metrics.failures > 0 {
        print!(", {}", format!("{} FAILURES", metrics.failures).bold().red());
    }
    println!(")");

    print_ops(metrics.fired, duration);
    println!();
    if metrics.latency.count() > 0 {
        print_percentiles(&metrics.latency, Duration::from_secs_f64);
    }
}

fn print_ops(ops: u64, duration: Duration) {
    let ops_ps = ops as f64 / duration.as_secs_f64();
    print!("  {:.2} requests/s", ops_ps.bold());
}

fn print_percentiles<T: fmt::Debug>(sketch: &DDSketch, map: impl Fn(f64) -> T) {
    let quantile = |q| sketch.quantile(q).ok().flatten().unwrap_or_default();

    let avg = map(sketch.sum().unwrap_or_default() / sketch.count() as f64);
    let p50 = map(quantile(0.5));
    let p90 = map(quantile(0.9));
    let p99 = map(quantile(0.99));
    println!(
        "  avg: {:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}",
        avg.bold()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_merges() {
        let mut first = Metrics::default();
        first.record_fired("a");
        first.record_fired("a");
        first.record_completed("a", Duration::from_millis(10), true);
        first.record_completed("a", Duration::from_millis(30), false);

        let mut second = Metrics::default();
        second.record_fired("b");
        second.record_fired("a");
        second.record_completed("a", Duration::from_millis(20), true);

        first.merge(&second);

        let a = first.get("a").unwrap();
        assert_eq!(a.fired, 3);
        assert_eq!(a.failures, 1);
        assert_eq!(a.latency.count(), 3);
        assert_eq!(first.get("b").unwrap().fired, 1);

        assert_eq!(first.fired(), 4);
        assert_eq!(first.failures(), 1);
        assert_eq!(
            first.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            ["a", "b"]
        );
    }
}
