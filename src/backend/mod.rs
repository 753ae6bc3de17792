//! Backend clients benchmarked through one interface.
//!
//! A [`BackendClient`] holds configuration only. A live handle exists only
//! inside the [`Connection`] returned by [`BackendClient::connect`], so every
//! concurrent actor duplicates the client and opens its own connection.

mod clickhouse;
mod memory;
mod mongodb;
mod mpp;
mod postgres;

pub use self::clickhouse::ClickHouseClient;
pub use self::memory::{MemoryClient, MemoryStore};
pub use self::mongodb::MongoClient;
pub use self::mpp::MppClient;
pub use self::postgres::PostgresClient;

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::stream::BoxStream;
use log::warn;

use crate::backoff::Backoff;
use crate::conf::BackendConfig;
use crate::core::BenchError;
use crate::workload::{Record, Workload};

/// Records fed to a single long-lived insert call.
pub type RecordStream = BoxStream<'static, Record>;

pub type Conn = Box<dyn Connection>;

/// Domain reads every backend is measured on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Latest event of one user on one film.
    LastEvent { film_id: String, user_id: String },
    /// Films ranked by number of events.
    MostViewed { limit: usize },
    LikesCount { film_id: String },
    AverageScore { film_id: String },
}

impl Query {
    pub fn label(&self) -> &'static str {
        match self {
            Query::LastEvent { .. } => "last timecode",
            Query::MostViewed { .. } => "most viewed films",
            Query::LikesCount { .. } => "numbers of likes per movie",
            Query::AverageScore { .. } => "average score for movie",
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadValue {
    Timecode(u16),
    EventTime(NaiveDateTime),
    Ranking(Vec<FilmViews>),
    Count(u64),
    Average(f64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilmViews {
    pub film_id: String,
    pub views: u64,
}

#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Product name used in reports.
    fn name(&self) -> &str;

    fn workload(&self) -> Workload;

    /// Copy of the configuration without any live connection.
    fn duplicate(&self) -> Box<dyn BackendClient>;

    /// Opens a connection, retrying while the backend is unreachable.
    async fn connect(&self) -> Result<Conn, BenchError>;
}

#[async_trait]
pub trait Connection: Send {
    /// Drops and recreates the benchmark table, collection or index.
    async fn prepare_schema(&mut self) -> Result<(), BenchError>;

    /// Writes every record of the stream in chunks, returns the number written.
    async fn insert(&mut self, records: RecordStream) -> Result<u64, BenchError>;

    /// Returns `Ok(None)` when no data matches.
    async fn read(&mut self, query: Query) -> Result<Option<ReadValue>, BenchError>;

    async fn close(self: Box<Self>) -> Result<(), BenchError>;
}

/// Best-effort release of a connection scope.
pub async fn release(conn: Conn, backend: &str) {
    if let Err(err) = conn.close().await {
        warn!("{backend}: failed to close connection: {err}");
    }
}

pub(crate) fn unsupported(backend: &str, query: &Query) -> BenchError {
    BenchError::Unsupported {
        backend: backend.to_string(),
        query: query.label().to_string(),
    }
}

/// Builds the client described by one `[[backends]]` entry.
pub fn from_config(config: &BackendConfig, backoff: &Backoff) -> Box<dyn BackendClient> {
    match config {
        BackendConfig::Clickhouse(settings) => {
            Box::new(ClickHouseClient::new(settings.clone(), backoff.clone()))
        }
        BackendConfig::Mpp(settings) => Box::new(MppClient::new(settings.clone(), backoff.clone())),
        BackendConfig::Postgres(settings) => {
            Box::new(PostgresClient::new(settings.clone(), backoff.clone()))
        }
        BackendConfig::Mongodb(settings) => {
            Box::new(MongoClient::new(settings.clone(), backoff.clone()))
        }
        BackendConfig::Memory(settings) => Box::new(MemoryClient::from_config(settings, backoff)),
    }
}
