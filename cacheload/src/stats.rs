//! Request statistics and the final report.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use anyhow::Result;
use bytesize::ByteSize;
use sketches_ddsketch::DDSketch;
use yansi::Paint;

use crate::transport::{Outcome, RequestName};

/// Statistics for one kind of request.
#[derive(Default)]
pub struct RequestStats {
    /// Latency of all requests in seconds, including failed ones.
    pub latency: DDSketch,
    /// Number of requests sent.
    pub requests: u64,
    /// Number of requests that did not succeed.
    pub failures: u64,
    /// Failure counts by reason.
    pub failure_reasons: BTreeMap<String, u64>,
    /// Total size of request bodies.
    pub bytes_sent: u64,
    /// Total size of response bodies.
    pub bytes_received: u64,
}

impl RequestStats {
    fn record(&mut self, outcome: &Outcome) {
        self.latency.add(outcome.elapsed.as_secs_f64());
        self.requests += 1;
        self.bytes_sent += outcome.bytes_sent;
        self.bytes_received += outcome.bytes_received;

        if let Err(failure) = &outcome.result {
            self.failures += 1;
            *self.failure_reasons.entry(failure.to_string()).or_default() += 1;
        }
    }

    fn merge(&mut self, other: &RequestStats) -> Result<()> {
        self.latency
            .merge(&other.latency)
            .map_err(|err| anyhow::anyhow!("failed to merge latency sketches: {err:?}"))?;
        self.requests += other.requests;
        self.failures += other.failures;
        for (reason, count) in &other.failure_reasons {
            *self.failure_reasons.entry(reason.clone()).or_default() += count;
        }
        self.bytes_sent += other.bytes_sent;
        self.bytes_received += other.bytes_received;

        Ok(())
    }
}

impl fmt::Debug for RequestStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestStats")
            .field("requests", &self.requests)
            .field("failures", &self.failures)
            .field("failure_reasons", &self.failure_reasons)
            .field("bytes_sent", &self.bytes_sent)
            .field("bytes_received", &self.bytes_received)
            .finish_non_exhaustive()
    }
}

/// Statistics of a load test, grouped by [`RequestName`].
///
/// Every virtual user records into its own instance, they are merged once the users stop.
#[derive(Debug, Default)]
pub struct Stats {
    entries: BTreeMap<RequestName, RequestStats>,
}

impl Stats {
    /// Records the outcome of a single request.
    pub fn record(&mut self, outcome: &Outcome) {
        self.entries.entry(outcome.name).or_default().record(outcome);
    }

    /// Adds all statistics from `other`.
    pub fn merge(&mut self, other: &Stats) -> Result<()> {
        for (name, stats) in &other.entries {
            self.entries.entry(*name).or_default().merge(stats)?;
        }
        Ok(())
    }

    /// Statistics for requests of the given kind, if any were sent.
    pub fn get(&self, name: RequestName) -> Option<&RequestStats> {
        self.entries.get(&name)
    }

    /// Statistics across all kinds of requests.
    pub fn total(&self) -> Result<RequestStats> {
        let mut total = RequestStats::default();
        for stats in self.entries.values() {
            total.merge(stats)?;
        }
        Ok(total)
    }

    /// Total number of requests sent.
    pub fn requests(&self) -> u64 {
        self.entries.values().map(|stats| stats.requests).sum()
    }

    /// Total number of failed requests.
    pub fn failures(&self) -> u64 {
        self.entries.values().map(|stats| stats.failures).sum()
    }

    /// The fraction of requests that were writes, `None` if nothing was sent.
    pub fn write_fraction(&self) -> Option<f64> {
        let requests = self.requests();
        if requests == 0 {
            return None;
        }
        let writes = self.get(RequestName::Put).map_or(0, |stats| stats.requests);
        Some(writes as f64 / requests as f64)
    }
}

/// The result of a finished load test.
#[derive(Debug)]
pub struct Report {
    /// The merged statistics of all virtual users.
    pub stats: Stats,
    /// Wall-clock time the load test ran for.
    pub elapsed: Duration,
    /// The number of virtual users that were started.
    pub users: usize,
    /// The configured write ratio.
    pub write_ratio: f64,
}

impl Report {
    /// Prints the report to stdout.
    pub fn print(&self) -> Result<()> {
        println!();
        println!(
            "{} ({} users, {:.2?})",
            "## Load test".bold(),
            self.users.bold(),
            self.elapsed
        );

        for (name, stats) in &self.stats.entries {
            println!();
            print_request_stats(&name.as_str().bold().blue().to_string(), stats, self.elapsed);
        }

        let total = self.stats.total()?;
        println!();
        print_request_stats(&"TOTAL".bold().to_string(), &total, self.elapsed);

        if let Some(fraction) = self.stats.write_fraction() {
            println!(
                "  writes: {:.2}% (configured {:.2}%)",
                (fraction * 100.0).bold(),
                self.write_ratio * 100.0
            );
        }
        println!();

        Ok(())
    }
}

fn print_request_stats(title: &str, stats: &RequestStats, elapsed: Duration) {
    print!("{title} ({} requests", stats.requests.bold());
    if stats.failures > 0 {
        print!(", {}", format!("{} FAILURES", stats.failures).bold().red());
    }
    println!(")");

    if stats.requests == 0 {
        return;
    }

    print_ops(&stats.latency, elapsed);
    print_throughput(stats.bytes_sent, stats.bytes_received, elapsed);
    print_percentiles(&stats.latency, Duration::from_secs_f64);

    for (reason, count) in &stats.failure_reasons {
        println!("  {}: {count}", reason.red());
    }
}

fn print_percentiles<T: fmt::Debug>(sketch: &DDSketch, map: impl Fn(f64) -> T) {
    let quantile = |q| sketch.quantile(q).ok().flatten().map(&map);
    let ops = sketch.count();
    let Some(sum) = sketch.sum() else {
        return;
    };

    let avg = map(sum / ops as f64);
    let p50 = quantile(0.5);
    let p90 = quantile(0.9);
    let p99 = quantile(0.99);
    println!(
        "  avg: {:.2?}; p50: {}; p90: {}; p99: {}",
        avg.bold(),
        Maybe(p50),
        Maybe(p90),
        Maybe(p99)
    );
}

fn print_ops(sketch: &DDSketch, elapsed: Duration) {
    let ops = sketch.count();
    let ops_ps = ops as f64 / elapsed.as_secs_f64();
    print!("  {:.2} requests/s", ops_ps.bold());
}

fn print_throughput(sent: u64, received: u64, elapsed: Duration) {
    let per_second = |total: u64| ByteSize::b((total as f64 / elapsed.as_secs_f64()) as u64);
    println!(
        ", sent {:.2}/s, received {:.2}/s",
        per_second(sent).bold(),
        per_second(received).bold()
    );
}

/// Debug-formats a value with two decimals, or a dash when missing.
struct Maybe<T>(Option<T>);

impl<T: fmt::Debug> fmt::Display for Maybe<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(value) => write!(f, "{value:.2?}"),
            None => f.write_str("-"),
        }
    }
}
