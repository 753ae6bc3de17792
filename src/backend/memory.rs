//! In-process backend. Stands in for a real server in tests and dry runs.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::{BackendClient, Conn, Connection, FilmViews, Query, ReadValue, RecordStream};
use crate::backoff::Backoff;
use crate::conf::MemoryConfig;
use crate::core::BenchError;
use crate::timing::{INSERT_CHUNK_SIZE, chunk};
use crate::workload::{Measure, Record, Workload};

#[derive(Default)]
struct State {
    rows: Vec<Record>,
    keys: HashMap<(String, String), usize>,
    inserted: u64,
    chunks: u64,
    live: BTreeSet<u64>,
}

/// Server-side state shared by every client and connection of one memory backend.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    next_connection: Arc<AtomicU64>,
    upsert: bool,
}

impl MemoryStore {
    /// With `upsert`, a repeated (film, user) key overwrites the stored row.
    pub fn new(upsert: bool) -> Self {
        Self {
            upsert,
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records received by all inserts so far, including overwrites.
    pub fn inserted(&self) -> u64 {
        self.lock().inserted
    }

    /// Number of insert requests, at most [`INSERT_CHUNK_SIZE`] records each.
    pub fn chunks(&self) -> u64 {
        self.lock().chunks
    }

    /// Rows currently stored.
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of the connections that are currently open.
    pub fn live_connections(&self) -> Vec<u64> {
        self.lock().live.iter().copied().collect()
    }

    fn write(&self, records: Vec<Record>) {
        let mut state = self.lock();
        state.inserted += records.len() as u64;
        state.chunks += 1;

        for record in records {
            if !self.upsert {
                state.rows.push(record);
                continue;
            }
            let key = (record.film_id.clone(), record.user_id.clone());
            match state.keys.get(&key).copied() {
                Some(position) => state.rows[position] = record,
                None => {
                    let position = state.rows.len();
                    state.rows.push(record);
                    state.keys.insert(key, position);
                }
            }
        }
    }

    fn read(&self, query: &Query) -> Option<ReadValue> {
        let state = self.lock();
        let rows = &state.rows;

        match query {
            Query::LastEvent { film_id, user_id } => rows
                .iter()
                .filter(|r| &r.film_id == film_id && &r.user_id == user_id)
                .max_by_key(|r| r.event_time)
                .map(|r| match r.measure {
                    Measure::Timecode { end, .. } => ReadValue::Timecode(end),
                    Measure::Score(_) => ReadValue::EventTime(r.event_time),
                }),
            Query::MostViewed { limit } => {
                let mut views: HashMap<&str, u64> = HashMap::new();
                for row in rows {
                    *views.entry(row.film_id.as_str()).or_default() += 1;
                }
                let mut ranking: Vec<FilmViews> = views
                    .into_iter()
                    .map(|(film_id, views)| FilmViews {
                        film_id: film_id.to_string(),
                        views,
                    })
                    .collect();
                ranking.sort_by(|a, b| b.views.cmp(&a.views).then(a.film_id.cmp(&b.film_id)));
                ranking.truncate(*limit);
                (!ranking.is_empty()).then_some(ReadValue::Ranking(ranking))
            }
            Query::LikesCount { film_id } => {
                let count = rows.iter().filter(|r| &r.film_id == film_id).count() as u64;
                (count > 0).then_some(ReadValue::Count(count))
            }
            Query::AverageScore { film_id } => {
                let scores: Vec<f64> = rows
                    .iter()
                    .filter(|r| &r.film_id == film_id)
                    .filter_map(|r| match r.measure {
                        Measure::Score(score) => Some(f64::from(score)),
                        Measure::Timecode { .. } => None,
                    })
                    .collect();
                (!scores.is_empty())
                    .then(|| ReadValue::Average(scores.iter().sum::<f64>() / scores.len() as f64))
            }
        }
    }
}

pub struct MemoryClient {
    name: String,
    workload: Workload,
    store: MemoryStore,
    backoff: Backoff,
    read_latency: Duration,
    unreachable_attempts: Arc<AtomicU32>,
}

impl MemoryClient {
    pub fn new(name: impl Into<String>, workload: Workload, store: MemoryStore) -> Self {
        Self {
            name: name.into(),
            workload,
            store,
            backoff: Backoff::default(),
            read_latency: Duration::ZERO,
            unreachable_attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn from_config(config: &MemoryConfig, backoff: &Backoff) -> Self {
        Self::new(
            config.name.clone(),
            config.workload,
            MemoryStore::new(config.upsert),
        )
        .with_backoff(backoff.clone())
        .with_read_latency(config.read_latency)
        .with_unreachable_attempts(config.unreachable_attempts)
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Every read sleeps this long before answering.
    pub fn with_read_latency(mut self, latency: Duration) -> Self {
        self.read_latency = latency;
        self
    }

    /// The next `attempts` connection attempts fail as unreachable.
    pub fn with_unreachable_attempts(self, attempts: u32) -> Self {
        self.unreachable_attempts.store(attempts, Ordering::SeqCst);
        self
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    async fn open(&self) -> Result<MemoryConnection, BenchError> {
        let refused = self
            .unreachable_attempts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(BenchError::Unreachable(format!(
                "{} is not accepting connections",
                self.name
            )));
        }

        let id = self.store.next_connection.fetch_add(1, Ordering::SeqCst);
        self.store.lock().live.insert(id);
        Ok(MemoryConnection {
            id,
            store: self.store.clone(),
            read_latency: self.read_latency,
        })
    }
}

#[async_trait]
impl BackendClient for MemoryClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn workload(&self) -> Workload {
        self.workload
    }

    fn duplicate(&self) -> Box<dyn BackendClient> {
        Box::new(Self {
            name: self.name.clone(),
            workload: self.workload,
            store: self.store.clone(),
            backoff: self.backoff.clone(),
            read_latency: self.read_latency,
            unreachable_attempts: self.unreachable_attempts.clone(),
        })
    }

    async fn connect(&self) -> Result<Conn, BenchError> {
        let conn = self.backoff.retry(&self.name, || self.open()).await?;
        Ok(Box::new(conn))
    }
}

struct MemoryConnection {
    id: u64,
    store: MemoryStore,
    read_latency: Duration,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn prepare_schema(&mut self) -> Result<(), BenchError> {
        let mut state = self.store.lock();
        state.rows.clear();
        state.keys.clear();
        Ok(())
    }

    async fn insert(&mut self, records: RecordStream) -> Result<u64, BenchError> {
        let mut written = 0;
        let mut chunks = chunk(records, INSERT_CHUNK_SIZE);
        while let Some(records) = chunks.next().await {
            written += records.len() as u64;
            self.store.write(records);
        }
        Ok(written)
    }

    async fn read(&mut self, query: Query) -> Result<Option<ReadValue>, BenchError> {
        if !self.read_latency.is_zero() {
            tokio::time::sleep(self.read_latency).await;
        }
        Ok(self.store.read(&query))
    }

    async fn close(self: Box<Self>) -> Result<(), BenchError> {
        self.store.lock().live.remove(&self.id);
        Ok(())
    }
}
