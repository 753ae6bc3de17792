//! Runs against a throwaway ClickHouse container: `cargo test -- --ignored`.

mod common;

use std::time::Duration;

use futures::{StreamExt, stream};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::clickhouse::ClickHouse;

use common::{assert_complete, fast_backoff, quick_run, run_suite, stored_rows};
use ugcbench::backend::{BackendClient, ClickHouseClient, Query, ReadValue};
use ugcbench::backoff::Backoff;
use ugcbench::conf::ClickHouseConfig;
use ugcbench::core::BenchError;
use ugcbench::workload::{Probe, Record, Workload, generate};

fn clickhouse_config(port: u16) -> ClickHouseConfig {
    ClickHouseConfig {
        name: "ClickHouse".to_string(),
        url: format!("http://127.0.0.1:{port}"),
        user: None,
        password: None,
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_clickhouse_appends_and_reads() {
    let node = ClickHouse::default().start().await.unwrap();
    let port = node.get_host_port_ipv4(8123).await.unwrap();
    let client = ClickHouseClient::new(clickhouse_config(port), Backoff::default());

    let records: Vec<Record> = generate(Workload::Views, 200, Some(6)).collect();
    let probe = Probe::from(&records[0]);
    let (_, probe_end) = records
        .iter()
        .filter(|r| r.film_id == probe.film_id && r.user_id == probe.user_id)
        .max_by_key(|r| r.event_time)
        .and_then(|r| r.timecode().ok())
        .unwrap();

    let mut conn = client.connect().await.unwrap();
    conn.prepare_schema().await.unwrap();
    let written = conn.insert(stream::iter(records).boxed()).await.unwrap();
    assert_eq!(written, 201);

    // MergeTree keeps the repeated first record as a second row.
    assert_eq!(stored_rows(&mut conn).await, 201);

    let [last, _] = Workload::Views.queries(&probe, 10);
    assert_eq!(
        conn.read(last).await.unwrap(),
        Some(ReadValue::Timecode(probe_end))
    );
    let miss = Query::LastEvent {
        film_id: "missing".to_string(),
        user_id: probe.user_id.clone(),
    };
    assert_eq!(conn.read(miss).await.unwrap(), None);

    let likes = Query::LikesCount {
        film_id: probe.film_id.clone(),
    };
    assert!(matches!(
        conn.read(likes).await,
        Err(BenchError::Unsupported { .. })
    ));

    conn.prepare_schema().await.unwrap();
    assert_eq!(stored_rows(&mut conn).await, 0);
    conn.close().await.unwrap();
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_full_run_on_clickhouse() {
    let node = ClickHouse::default().start().await.unwrap();
    let port = node.get_host_port_ipv4(8123).await.unwrap();
    let client = ClickHouseClient::new(
        clickhouse_config(port),
        fast_backoff(Duration::from_secs(30)),
    );

    let results = run_suite(quick_run(), vec![Box::new(client)]).await;

    assert_complete(&results[0], "ClickHouse");
}

#[tokio::test]
async fn test_refused_connection_is_retried_until_bound() {
    // Port 1 never serves HTTP, so every probe fails at the network layer.
    let client = ClickHouseClient::new(
        clickhouse_config(1),
        fast_backoff(Duration::from_millis(100)),
    );

    let result = client.connect().await;

    assert!(matches!(result, Err(BenchError::ConnectTimeout { .. })));
}
