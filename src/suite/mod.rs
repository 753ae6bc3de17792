//! Runs every registered backend through the same four phases and yields
//! one [`TestResult`] per backend as soon as its run ends.

mod parallel;
mod result;
mod stress;

pub use self::parallel::{mean, run_in_parallel};
pub use self::result::{ReadTimings, TestResult};
pub use self::stress::{Message, consume, drain, produce, run_stress};

use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use log::{info, warn};
use tokio::task::JoinHandle;

use crate::backend::{BackendClient, Conn, Query, release};
use crate::conf::RunConfig;
use crate::core::BenchError;
use crate::timing::measure_time;
use crate::workload::{Probe, Record, WorkloadGenerator, generate};

/// Seed offset so the static batch differs from the initial load.
const STATIC_SEED: u64 = 0x5354_4154;

pub struct BenchmarkSuite {
    run: RunConfig,
    clients: Vec<Box<dyn BackendClient>>,
}

impl BenchmarkSuite {
    pub fn new(run: RunConfig) -> Self {
        Self {
            run,
            clients: Vec::new(),
        }
    }

    pub fn register(&mut self, client: Box<dyn BackendClient>) {
        self.clients.push(client);
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Benchmarks the registered clients sequentially, in registration order.
    /// A failing backend yields a partial result and never stops the run.
    pub fn run(&self) -> impl Stream<Item = TestResult> + '_ {
        info!(
            "benchmarking {} backends: {} initial rows, {} rows per batch, {} writes/s for {:?}, {} readers",
            self.clients.len(),
            self.run.rows_count,
            self.run.static_batch,
            self.run.wps,
            self.run.stress_duration,
            self.run.readers_count,
        );
        stream::iter(&self.clients).then(move |client| self.run_client(client.as_ref()))
    }

    async fn run_client(&self, client: &dyn BackendClient) -> TestResult {
        let mut workload = generate(client.workload(), self.run.rows_count, self.run.seed);
        let probe = workload
            .next()
            .map(|first| Probe::from(&first))
            .unwrap_or_default();
        let queries = client.workload().queries(&probe, self.run.most_viewed_limit);

        let mut result = TestResult::new(
            client.name(),
            client.workload(),
            self.run.static_batch,
            &queries,
        );
        info!("{}: benchmark started", client.name());
        match self.run_phases(client, workload, &queries, &mut result).await {
            Ok(()) => info!("{}: benchmark finished", client.name()),
            Err(err) => warn!(
                "{}: benchmark stopped, remaining measurements unavailable: {err}",
                client.name()
            ),
        }
        result
    }

    async fn run_phases(
        &self,
        client: &dyn BackendClient,
        workload: WorkloadGenerator,
        queries: &[Query; 2],
        result: &mut TestResult,
    ) -> Result<(), BenchError> {
        let loaded = self.prepare(client, workload).await?;
        info!("{}: loaded {loaded} initial records", client.name());
        tokio::time::sleep(self.run.settle_delay).await;

        let (insert, idle) = self.run_static(client, queries).await?;
        result.insert_batch = Some(insert);
        for (timings, duration) in result.reads.iter_mut().zip(idle) {
            timings.idle = Some(duration);
        }

        let under_load = run_stress(client, &self.run, queries).await?;
        for (timings, duration) in result.reads.iter_mut().zip(under_load) {
            timings.under_load = Some(duration);
        }

        for (timings, query) in result.reads.iter_mut().zip(queries) {
            let durations =
                run_in_parallel(client, query, self.run.readers_count, self.run.repeats).await?;
            timings.parallel = mean(&durations);
        }
        Ok(())
    }

    /// Recreates the schema and loads the rest of the initial workload.
    async fn prepare(
        &self,
        client: &dyn BackendClient,
        workload: WorkloadGenerator,
    ) -> Result<u64, BenchError> {
        let mut conn = client.connect().await?;
        let loaded = async {
            conn.prepare_schema().await?;
            conn.insert(stream::iter(workload).boxed()).await
        }
        .await;
        release(conn, client.name()).await;
        loaded
    }

    /// Times one batch insert, then both reads on the idle backend.
    async fn run_static(
        &self,
        client: &dyn BackendClient,
        queries: &[Query; 2],
    ) -> Result<(Duration, [Duration; 2]), BenchError> {
        // Generated up front so the timing covers the insert alone.
        let batch: Vec<Record> = generate(
            client.workload(),
            self.run.static_batch,
            self.run.seed.map(|seed| seed ^ STATIC_SEED),
        )
        .collect();

        let mut conn = client.connect().await?;
        let measured = async {
            let mut batch = Some(batch);
            let insert = measure_time(&mut conn, 1, |conn| {
                conn.insert(stream::iter(batch.take().unwrap_or_default()).boxed())
            })
            .await?;
            tokio::time::sleep(self.run.settle_delay).await;
            let reads = measure_reads(&mut conn, queries, self.run.repeats).await?;
            Ok::<_, BenchError>((insert, reads))
        }
        .await;
        release(conn, client.name()).await;
        measured
    }
}

/// Mean latency of each query over `repeats` sequential calls on `conn`.
pub(crate) async fn measure_reads(
    conn: &mut Conn,
    queries: &[Query; 2],
    repeats: u32,
) -> Result<[Duration; 2], BenchError> {
    let mut timings = [Duration::ZERO; 2];
    for (timing, query) in timings.iter_mut().zip(queries) {
        *timing = measure_time(conn, repeats, |conn| conn.read(query.clone())).await?;
    }
    Ok(timings)
}

/// Awaits a spawned phase task, turning a panic or cancellation into an error.
pub(crate) async fn join_task<T>(
    role: &str,
    handle: JoinHandle<Result<T, BenchError>>,
) -> Result<T, BenchError> {
    match handle.await {
        Ok(result) => result,
        Err(err) => Err(BenchError::TaskFailed {
            role: role.to_string(),
            message: err.to_string(),
        }),
    }
}
