//! Runs virtual users against a transport and collects their statistics.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::generator::TrafficGenerator;
use crate::pool::Pools;
use crate::stats::{Report, Stats};
use crate::transport::Transport;

/// A prepared load test.
///
/// Creating it generates the pools. Nothing is sent until [`run`](Self::run) is called.
#[derive(Debug)]
pub struct LoadTest {
    generator: Arc<TrafficGenerator>,
    users: usize,
    spawn_interval: Option<Duration>,
    duration: Duration,
    iterations: Option<u64>,
    seed: Option<u64>,
}

impl LoadTest {
    /// Generates the pools and prepares a load test as described by `config`.
    ///
    /// The config is expected to be [validated](Config::validate).
    pub fn new(config: &Config) -> Result<Self> {
        let spawn_interval = config.spawn_interval()?;
        let mut rng = rng_for(config.seed, 0);
        let workload = &config.workload;

        let pools = Pools::generate(workload.pool_size, workload.value_length, &mut rng)
            .context("failed to generate pools")?;
        let generator = TrafficGenerator::new(pools, workload.write_ratio)?;

        Ok(Self {
            generator: Arc::new(generator),
            users: config.users,
            spawn_interval,
            duration: config.duration,
            iterations: config.iterations,
            seed: config.seed,
        })
    }

    /// The generator shared by all virtual users.
    pub fn generator(&self) -> &TrafficGenerator {
        &self.generator
    }

    /// Runs the load test until the duration passed, the iteration limit is reached or `cancel` is
    /// triggered.
    ///
    /// Requests that are still in flight when the run stops are abandoned and not recorded.
    pub async fn run<T: Transport>(
        &self,
        transport: T,
        cancel: CancellationToken,
    ) -> Result<Report> {
        let transport = Arc::new(transport);
        let budget = self.iterations.map(|n| Arc::new(AtomicU64::new(n)));
        let stop = cancel.child_token();

        tracing::info!(
            users = self.users,
            duration = ?self.duration,
            iterations = ?self.iterations,
            write_ratio = self.generator.write_ratio(),
            "starting load test"
        );

        let bar = ProgressBar::new_spinner()
            .with_style(ProgressStyle::with_template("{spinner} {msg} {elapsed}")?)
            .with_message("Running load test:");
        bar.enable_steady_tick(Duration::from_millis(100));

        let start = Instant::now();
        let deadline = tokio::spawn({
            let stop = stop.clone();
            let duration = self.duration;
            async move {
                tokio::time::sleep(duration).await;
                stop.cancel();
            }
        });

        let mut users = self.spawn_users(&transport, budget.as_ref(), &stop).await;
        let started = users.len();

        let mut stats = Stats::default();
        while let Some(result) = users.join_next().await {
            let user_stats = result.context("virtual user failed")?;
            stats.merge(&user_stats)?;
        }

        deadline.abort();
        bar.finish_and_clear();
        let elapsed = start.elapsed();

        tracing::info!(
            requests = stats.requests(),
            failures = stats.failures(),
            ?elapsed,
            "load test finished"
        );

        Ok(Report {
            stats,
            elapsed,
            users: started,
            write_ratio: self.generator.write_ratio(),
        })
    }

    /// Starts all virtual users, pacing them by the spawn rate.
    async fn spawn_users<T: Transport>(
        &self,
        transport: &Arc<T>,
        budget: Option<&Arc<AtomicU64>>,
        stop: &CancellationToken,
    ) -> JoinSet<Stats> {
        let mut users = JoinSet::new();

        for index in 0..self.users {
            if let Some(interval) = self.spawn_interval.filter(|_| index > 0) {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop.cancelled() => break,
                }
            }
            if stop.is_cancelled() || budget.is_some_and(|b| b.load(Ordering::Relaxed) == 0) {
                break;
            }

            tracing::debug!(user = index, "spawning virtual user");
            users.spawn(virtual_user(
                index,
                Arc::clone(&self.generator),
                Arc::clone(transport),
                rng_for(self.seed, index as u64 + 1),
                budget.cloned(),
                stop.clone(),
            ));
        }

        users
    }
}

/// Sends requests back to back until told to stop or the budget runs out.
///
/// Stopping interrupts a request that is still waiting for the server.
async fn virtual_user<T: Transport>(
    index: usize,
    generator: Arc<TrafficGenerator>,
    transport: Arc<T>,
    mut rng: SmallRng,
    budget: Option<Arc<AtomicU64>>,
    stop: CancellationToken,
) -> Stats {
    let mut stats = Stats::default();

    while !stop.is_cancelled() {
        if budget.as_deref().is_some_and(|budget| !take_ticket(budget)) {
            break;
        }

        let outcome = tokio::select! {
            biased;
            outcome = generator.generate_request(&mut rng, transport.as_ref()) => outcome,
            _ = stop.cancelled() => {
                tracing::debug!(user = index, "abandoning request in flight");
                break;
            }
        };
        if let Err(failure) = &outcome.result {
            tracing::debug!(user = index, request = %outcome.name, %failure, "request failed");
        }
        stats.record(&outcome);
    }

    stats
}

/// Claims one request from the shared budget, returns `false` once it is used up.
fn take_ticket(budget: &AtomicU64) -> bool {
    budget
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| left.checked_sub(1))
        .is_ok()
}

/// Creates the RNG for stream `stream`, deterministic if a seed is configured.
fn rng_for(seed: Option<u64>, stream: u64) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(stream)),
        None => SmallRng::from_os_rng(),
    }
}
