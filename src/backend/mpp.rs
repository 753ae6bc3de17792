//! MPP analytic store spoken to over the PostgreSQL wire protocol.
//!
//! The table has no key, so every insert appends, exactly like the column store.

use async_trait::async_trait;
use futures::StreamExt;

use super::postgres::{PgSession, column};
use super::{BackendClient, Conn, Connection, Query, ReadValue, RecordStream, unsupported};
use crate::backoff::Backoff;
use crate::conf::SqlConfig;
use crate::core::BenchError;
use crate::timing::{INSERT_CHUNK_SIZE, chunk};
use crate::workload::Workload;

const INSERT: &str = "INSERT INTO timecodes (film_id, user_id, start_time, end_time, event_time)
    VALUES ($1, $2, $3, $4, $5)";

pub struct MppClient {
    config: SqlConfig,
    backoff: Backoff,
}

impl MppClient {
    pub fn new(config: SqlConfig, backoff: Backoff) -> Self {
        Self { config, backoff }
    }
}

#[async_trait]
impl BackendClient for MppClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn workload(&self) -> Workload {
        Workload::Views
    }

    fn duplicate(&self) -> Box<dyn BackendClient> {
        Box::new(Self::new(self.config.clone(), self.backoff.clone()))
    }

    async fn connect(&self) -> Result<Conn, BenchError> {
        let session = PgSession::open(&self.config, &self.backoff).await?;
        Ok(Box::new(MppConnection {
            session,
            name: self.config.name.clone(),
        }))
    }
}

struct MppConnection {
    session: PgSession,
    name: String,
}

#[async_trait]
impl Connection for MppConnection {
    async fn prepare_schema(&mut self) -> Result<(), BenchError> {
        self.session
            .client
            .batch_execute(
                "DROP TABLE IF EXISTS timecodes;
                 CREATE TABLE timecodes (
                     film_id VARCHAR(36),
                     user_id VARCHAR(36),
                     start_time INTEGER,
                     end_time INTEGER,
                     event_time TIMESTAMP
                 );",
            )
            .await?;
        Ok(())
    }

    async fn insert(&mut self, records: RecordStream) -> Result<u64, BenchError> {
        let statement = self.session.client.prepare(INSERT).await?;
        let mut written = 0;
        let mut chunks = chunk(records, INSERT_CHUNK_SIZE);
        while let Some(records) = chunks.next().await {
            // Autocommit per row, but nothing is sent until a chunk fills or the stream ends.
            for record in &records {
                let (start, end) = record.timecode()?;
                let (start, end) = (i32::from(start), i32::from(end));
                self.session
                    .client
                    .execute(
                        &statement,
                        &[
                            &record.film_id,
                            &record.user_id,
                            &start,
                            &end,
                            &record.event_time,
                        ],
                    )
                    .await
                    .map_err(|err| BenchError::InsertError(err.to_string()))?;
            }
            written += records.len() as u64;
        }
        Ok(written)
    }

    async fn read(&mut self, query: Query) -> Result<Option<ReadValue>, BenchError> {
        match query {
            Query::LastEvent { film_id, user_id } => {
                let row = self
                    .session
                    .client
                    .query_opt(
                        "SELECT end_time FROM timecodes
                         WHERE film_id = $1 AND user_id = $2
                         ORDER BY event_time DESC
                         LIMIT 1",
                        &[&film_id, &user_id],
                    )
                    .await?;
                let end_time = match row {
                    Some(row) => column::<Option<i32>>(&row, 0)?,
                    None => None,
                };
                Ok(end_time
                    .and_then(|end| u16::try_from(end).ok())
                    .map(ReadValue::Timecode))
            }
            Query::MostViewed { limit } => {
                self.session
                    .ranking(
                        "SELECT film_id, COUNT(*) AS views FROM timecodes
                         GROUP BY film_id
                         ORDER BY views DESC
                         LIMIT $1",
                        limit,
                    )
                    .await
            }
            other => Err(unsupported(&self.name, &other)),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), BenchError> {
        self.session.close().await
    }
}
