use std::time::Duration;

use log::debug;
use tokio::task::JoinSet;

use crate::backend::{BackendClient, Query, release};
use crate::core::BenchError;
use crate::timing::measure_time;

/// Runs `query` on `workers` concurrent readers, each with its own
/// duplicated client and connection, and returns one mean latency per
/// reader. The first failed reader fails the whole measurement once every
/// reader has finished.
pub async fn run_in_parallel(
    client: &dyn BackendClient,
    query: &Query,
    workers: usize,
    repeats: u32,
) -> Result<Vec<Duration>, BenchError> {
    let mut readers = JoinSet::new();
    for _ in 0..workers {
        let client = client.duplicate();
        let query = query.clone();
        readers.spawn(async move {
            let mut conn = client.connect().await?;
            let measured = measure_time(&mut conn, repeats, |conn| conn.read(query.clone())).await;
            release(conn, client.name()).await;
            measured
        });
    }

    let mut durations = Vec::with_capacity(workers);
    let mut failure = None;
    while let Some(joined) = readers.join_next().await {
        match joined {
            Ok(Ok(duration)) => durations.push(duration),
            Ok(Err(err)) => {
                failure.get_or_insert(err);
            }
            Err(err) => {
                failure.get_or_insert(BenchError::TaskFailed {
                    role: "reader".to_string(),
                    message: err.to_string(),
                });
            }
        }
    }
    if let Some(err) = failure {
        return Err(err);
    }

    debug!("{}: {workers} readers finished {query}", client.name());
    Ok(durations)
}

pub fn mean(durations: &[Duration]) -> Option<Duration> {
    let count = u32::try_from(durations.len()).ok().filter(|n| *n > 0)?;
    Some(durations.iter().sum::<Duration>() / count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryClient, MemoryStore};
    use crate::backoff::Backoff;
    use crate::workload::Workload;

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert_eq!(
            mean(&[Duration::from_millis(10), Duration::from_millis(30)]),
            Some(Duration::from_millis(20))
        );
    }

    #[tokio::test]
    async fn test_every_reader_reports() {
        let client = MemoryClient::new("memory", Workload::Views, MemoryStore::new(false))
            .with_read_latency(Duration::from_millis(1));
        let query = Query::MostViewed { limit: 10 };

        let durations = run_in_parallel(&client, &query, 4, 3).await.unwrap();

        assert_eq!(durations.len(), 4);
        assert!(durations.iter().all(|d| *d >= Duration::from_millis(1)));
        assert!(client.store().live_connections().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_reader_fails_measurement() {
        let backoff = Backoff {
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(10),
            max_time: Duration::from_millis(50),
            jitter: false,
        };
        let client = MemoryClient::new("memory", Workload::Likes, MemoryStore::new(true))
            .with_backoff(backoff)
            .with_unreachable_attempts(u32::MAX);
        let query = Query::LikesCount {
            film_id: "film".to_string(),
        };

        let result = run_in_parallel(&client, &query, 3, 1).await;

        assert!(matches!(result, Err(BenchError::ConnectTimeout { .. })));
    }
}
