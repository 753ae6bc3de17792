#![allow(dead_code)]

use std::collections::HashSet;
use std::time::Duration;

use futures::StreamExt;

use ugcbench::backend::{BackendClient, Conn, Query, ReadValue};
use ugcbench::backoff::Backoff;
use ugcbench::conf::RunConfig;
use ugcbench::suite::{BenchmarkSuite, TestResult};
use ugcbench::workload::Record;

/// A run small enough to finish in about a second per backend.
pub fn quick_run() -> RunConfig {
    RunConfig {
        rows_count: 1_000,
        wps: 100,
        readers_count: 2,
        static_batch: 100,
        repeats: 5,
        stress_duration: Duration::from_secs(1),
        settle_delay: Duration::from_millis(50),
        most_viewed_limit: 10,
        seed: Some(42),
    }
}

pub fn fast_backoff(max_time: Duration) -> Backoff {
    Backoff {
        initial_interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(20),
        max_time,
        jitter: false,
    }
}

pub async fn run_suite(run: RunConfig, clients: Vec<Box<dyn BackendClient>>) -> Vec<TestResult> {
    let mut suite = BenchmarkSuite::new(run);
    for client in clients {
        suite.register(client);
    }
    suite.run().collect().await
}

/// Checks that every measurement is present and the result belongs to `backend`.
pub fn assert_complete(result: &TestResult, backend: &str) {
    assert_eq!(result.backend, backend);
    for (label, value) in result.measurements() {
        assert!(value.is_some(), "{backend}: missing {label}");
    }
}

/// Reads every query of the client's workload once on a fresh connection.
pub async fn read_all(client: &dyn BackendClient, queries: &[Query; 2]) {
    let mut conn = client.connect().await.unwrap();
    for query in queries {
        conn.read(query.clone()).await.unwrap();
    }
    conn.close().await.unwrap();
}

/// Number of distinct (film, user) keys, optionally restricted to one film.
pub fn distinct_keys(records: &[Record], film_id: Option<&str>) -> u64 {
    records
        .iter()
        .filter(|r| film_id.is_none_or(|film| r.film_id == film))
        .map(|r| (r.film_id.as_str(), r.user_id.as_str()))
        .collect::<HashSet<_>>()
        .len() as u64
}

/// Rows stored across every film, summed from the most-viewed ranking.
pub async fn stored_rows(conn: &mut Conn) -> u64 {
    match conn.read(Query::MostViewed { limit: 10_000 }).await.unwrap() {
        Some(ReadValue::Ranking(films)) => films.iter().map(|f| f.views).sum(),
        None => 0,
        other => panic!("unexpected ranking {other:?}"),
    }
}
