//! Runs against a throwaway MongoDB container: `cargo test -- --ignored`.

mod common;

use futures::{StreamExt, stream};
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::mongo::Mongo;

use common::{
    assert_complete, distinct_keys, fast_backoff, quick_run, read_all, run_suite, stored_rows,
};
use ugcbench::backend::{BackendClient, MongoClient, ReadValue};
use ugcbench::backoff::Backoff;
use ugcbench::conf::MongoConfig;
use ugcbench::workload::{Probe, Record, Workload, generate};

fn mongo_config(port: u16) -> MongoConfig {
    MongoConfig {
        name: "MongoDB".to_string(),
        uri: format!("mongodb://127.0.0.1:{port}"),
        database: "ugcbench_test".to_string(),
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_mongodb_upserts_and_reads() {
    let node = Mongo::default().start().await.unwrap();
    let port = node.get_host_port_ipv4(27017).await.unwrap();
    let client = MongoClient::new(mongo_config(port), Backoff::default());

    let mut records: Vec<Record> = generate(Workload::Likes, 300, Some(8)).collect();
    let probe = Probe::from(&records[0]);
    // Same key twice: the second write must replace the first.
    records.push(records[0].clone());

    let distinct = distinct_keys(&records, None);
    let probe_users = distinct_keys(&records, Some(&probe.film_id));
    assert!(distinct < records.len() as u64);

    let mut conn = client.connect().await.unwrap();
    conn.prepare_schema().await.unwrap();
    assert_eq!(conn.insert(stream::iter(records).boxed()).await.unwrap(), 302);

    // Every repeated key was upserted in place.
    assert_eq!(stored_rows(&mut conn).await, distinct);
    let [count, average] = Workload::Likes.queries(&probe, 10);
    assert_eq!(conn.read(count).await.unwrap(), Some(ReadValue::Count(probe_users)));
    assert!(matches!(conn.read(average).await.unwrap(), Some(ReadValue::Average(_))));
    conn.close().await.unwrap();

    read_all(&client, &Workload::Views.queries(&probe, 5)).await;
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_full_run_on_mongodb() {
    let node = Mongo::default().start().await.unwrap();
    let port = node.get_host_port_ipv4(27017).await.unwrap();
    let client = MongoClient::new(
        mongo_config(port),
        fast_backoff(std::time::Duration::from_secs(30)),
    );

    let results = run_suite(quick_run(), vec![Box::new(client)]).await;

    assert_complete(&results[0], "MongoDB");
}
