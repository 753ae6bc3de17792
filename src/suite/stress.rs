//! Sustained write pressure: a paced producer feeding one consumer through
//! a bounded FIFO queue while the orchestrator measures reads.

use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use log::{info, warn};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use super::{join_task, measure_reads};
use crate::backend::{BackendClient, Query, RecordStream, release};
use crate::conf::RunConfig;
use crate::core::BenchError;
use crate::workload::{Record, generate};

/// Seed offset so the stress stream differs from the initial load.
const STRESS_SEED: u64 = 0x5745_5053;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Record(Record),
    /// Sent once by the producer as its last message.
    Finished,
}

/// Enqueues `records` at roughly `rate` per second until they run out or
/// `cancel` fires, then always enqueues [`Message::Finished`].
pub async fn produce<I>(
    records: I,
    rate: u32,
    queue: mpsc::Sender<Message>,
    cancel: CancellationToken,
) -> Result<u64, BenchError>
where
    I: IntoIterator<Item = Record>,
{
    let period = Duration::from_secs_f64(1.0 / f64::from(rate.max(1)));
    let mut next = Instant::now();
    let mut produced = 0;

    for record in records {
        if cancel.is_cancelled() {
            break;
        }
        tokio::select! {
            sent = queue.send(Message::Record(record)) => {
                sent.map_err(|_| BenchError::QueueClosed("consumer stopped".to_string()))?;
            }
            _ = cancel.cancelled() => break,
        }
        produced += 1;

        // Past deadlines resolve immediately, so a slow send never sleeps twice.
        next += period;
        tokio::select! {
            _ = sleep_until(next) => {}
            _ = cancel.cancelled() => break,
        }
    }

    queue
        .send(Message::Finished)
        .await
        .map_err(|_| BenchError::QueueClosed("consumer stopped".to_string()))?;
    Ok(produced)
}

/// Stream of queued records that ends at [`Message::Finished`].
pub fn drain(queue: mpsc::Receiver<Message>) -> RecordStream {
    stream::unfold(queue, |mut queue| async move {
        match queue.recv().await {
            Some(Message::Record(record)) => Some((record, queue)),
            Some(Message::Finished) => None,
            None => {
                warn!("stress queue closed without a terminator");
                None
            }
        }
    })
    .boxed()
}

/// Streams the queue into one long-lived insert on its own connection.
pub async fn consume(
    client: Box<dyn BackendClient>,
    queue: mpsc::Receiver<Message>,
) -> Result<u64, BenchError> {
    let mut conn = client.connect().await?;
    let written = conn.insert(drain(queue)).await;
    release(conn, client.name()).await;
    written
}

/// Measures both reads while the producer and consumer run.
pub async fn run_stress(
    client: &dyn BackendClient,
    run: &RunConfig,
    queries: &[Query; 2],
) -> Result<[Duration; 2], BenchError> {
    let records = generate(
        client.workload(),
        run.stress_records(),
        run.seed.map(|seed| seed ^ STRESS_SEED),
    );
    let capacity = usize::try_from(run.wps).unwrap_or(usize::MAX).max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let cancel = CancellationToken::new();

    let producer = tokio::spawn(produce(records, run.wps, tx, cancel.clone()));
    let consumer = tokio::spawn(consume(client.duplicate(), rx));

    // Let the producer and consumer get going.
    tokio::time::sleep(run.settle_delay).await;
    let measured = async {
        let mut conn = client.connect().await?;
        let measured = measure_reads(&mut conn, queries, run.repeats).await;
        release(conn, client.name()).await;
        measured
    }
    .await;
    cancel.cancel();

    let produced = join_task("producer", producer).await;
    let consumed = join_task("consumer", consumer).await;
    if let (Ok(produced), Ok(consumed)) = (&produced, &consumed) {
        info!(
            "{}: stress phase produced {produced} and wrote {consumed} records",
            client.name()
        );
    }

    let measured = measured?;
    produced?;
    consumed?;
    Ok(measured)
}
