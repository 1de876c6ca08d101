//! Command line entry point.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::http::HttpTransport;
use crate::observability;
use crate::runner::LoadTest;

/// Load generator for HTTP key-value caches.
///
/// Sends a random mix of `POST /put` and `GET /get` requests from many concurrent virtual users
/// and prints throughput and latency per request type.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// base URL of the cache under test, e.g. http://localhost:7171
    #[argh(option)]
    host: Option<String>,

    /// number of concurrent virtual users
    #[argh(option, short = 'u')]
    users: Option<usize>,

    /// virtual users started per second during ramp-up
    #[argh(option, short = 'r')]
    spawn_rate: Option<f64>,

    /// how long to run, e.g. 30s or 5m
    #[argh(option, short = 't', from_str_fn(parse_duration))]
    duration: Option<Duration>,

    /// stop after this many requests in total
    #[argh(option, short = 'n')]
    iterations: Option<u64>,

    /// share of requests that are writes, between 0 and 1
    #[argh(option)]
    write_ratio: Option<f64>,

    /// seed for reproducible pools and request sequences
    #[argh(option)]
    seed: Option<u64>,

    #[argh(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Version(VersionCommand),
}

/// run the load test (the default)
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {}

/// print the cacheload version
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

impl Args {
    /// Applies flags given on the command line on top of the loaded config.
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(users) = self.users {
            config.users = users;
        }
        if let Some(spawn_rate) = self.spawn_rate {
            config.spawn_rate = Some(spawn_rate);
        }
        if let Some(duration) = self.duration {
            config.duration = duration;
        }
        if let Some(iterations) = self.iterations {
            config.iterations = Some(iterations);
        }
        if let Some(write_ratio) = self.write_ratio {
            config.workload.write_ratio = write_ratio;
        }
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
    }
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|err| err.to_string())
}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    if let Some(Command::Version(VersionCommand {})) = args.command {
        println!("cacheload {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = Config::load(args.config.as_deref()).context("failed to load config")?;
    args.apply(&mut config);
    config.validate().context("invalid config")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("cacheload-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config);
    tracing::debug!(?config);

    runtime.block_on(async move {
        let load_test = LoadTest::new(&config)?;
        let transport = HttpTransport::new(&config.host, config.request_timeout)?;

        let cancel = CancellationToken::new();
        tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                tracing::info!("interrupted, stopping load test (press Ctrl-C again to abort)");
                cancel.cancel();

                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupted twice, aborting");
                    std::process::exit(130);
                }
            }
        });

        let report = load_test.run(transport, cancel).await?;
        report.print()
    })
}
