use std::net::TcpListener;
use std::time::Duration;

use cacheload::config::Config;
use cacheload::transport::RequestName;
use cacheload::{HttpTransport, LoadTest};
use cacheload_test::server::{RecordedRequest, TestServer};
use tokio_util::sync::CancellationToken;

fn config(host: String, write_ratio: f64, iterations: u64) -> Config {
    let mut config = Config {
        host,
        users: 4,
        duration: Duration::from_secs(30),
        iterations: Some(iterations),
        seed: Some(1234),
        ..Default::default()
    };
    config.workload.pool_size = 4;
    config.workload.write_ratio = write_ratio;
    config.validate().unwrap();
    config
}

async fn run(config: &Config) -> (LoadTest, cacheload::stats::Report) {
    let load_test = LoadTest::new(config).unwrap();
    let transport = HttpTransport::new(&config.host, Some(Duration::from_secs(5))).unwrap();
    let report = load_test.run(transport, CancellationToken::new()).await.unwrap();
    (load_test, report)
}

#[tokio::test]
async fn only_reads() {
    cacheload_test::tracing::init();
    let server = TestServer::new().await;
    let config = config(server.host(), 0.0, 100);

    let (load_test, report) = run(&config).await;
    let pools = load_test.generator().pools();

    let requests = server.requests();
    assert_eq!(requests.len(), 100);
    for request in requests {
        let RecordedRequest::Get { key } = &request else {
            panic!("unexpected write: {request:?}");
        };
        assert!(pools.keys().contains(key));
    }

    // nothing was written, so every read misses
    let get = report.stats.get(RequestName::Get).unwrap();
    assert_eq!(get.requests, 100);
    assert_eq!(get.failures, 100);
    assert_eq!(get.failure_reasons["status 404 Not Found"], 100);
    assert!(report.stats.get(RequestName::Put).is_none());
}

#[tokio::test]
async fn only_writes() {
    cacheload_test::tracing::init();
    let server = TestServer::new().await;
    let config = config(server.host(), 1.0, 100);

    let (load_test, report) = run(&config).await;
    let pools = load_test.generator().pools();

    let requests = server.requests();
    assert_eq!(requests.len(), 100);
    for request in requests {
        let RecordedRequest::Put { key, value } = &request else {
            panic!("unexpected read: {request:?}");
        };
        assert!(pools.keys().contains(key));
        assert!(pools.values().contains(value));
        assert_eq!(value.chars().count(), 256);
    }

    let put = report.stats.get(RequestName::Put).unwrap();
    assert_eq!(put.requests, 100);
    assert_eq!(put.failures, 0);
    assert!(put.bytes_sent > 100 * 256);
    assert!(report.stats.get(RequestName::Get).is_none());
    assert_eq!(report.stats.write_fraction(), Some(1.0));

    let stored = pools.keys().iter().filter(|key| server.value(key).is_some());
    assert!(stored.count() > 0);
}

#[tokio::test]
async fn mixed_traffic_hits_the_cache() {
    cacheload_test::tracing::init();
    let server = TestServer::new().await;
    let config = config(server.host(), 0.5, 1000);

    let (_load_test, report) = run(&config).await;

    assert_eq!(server.requests().len(), 1000);
    assert_eq!(report.stats.requests(), 1000);

    let put = report.stats.get(RequestName::Put).unwrap();
    let get = report.stats.get(RequestName::Get).unwrap();
    assert_eq!(put.failures, 0);
    // with only four keys, most reads find a value
    assert!(get.failures < get.requests);

    let fraction = report.stats.write_fraction().unwrap();
    assert!((0.4..0.6).contains(&fraction), "write fraction {fraction}");
}

#[tokio::test]
async fn unreachable_server_counts_failures() {
    cacheload_test::tracing::init();
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = config(format!("http://127.0.0.1:{port}"), 0.5, 20);

    let (_load_test, report) = run(&config).await;

    assert_eq!(report.stats.requests(), 20);
    assert_eq!(report.stats.failures(), 20);
    let total = report.stats.total().unwrap();
    assert_eq!(total.failure_reasons["connect"], 20);
}
