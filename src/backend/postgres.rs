//! Relational-store client. `(film_id, user_id)` is the primary key and
//! repeated keys are resolved with `ON CONFLICT .. DO UPDATE`.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use futures::StreamExt;
use log::{debug, warn};
use tokio::task::JoinHandle;
use tokio_postgres::types::FromSql;
use tokio_postgres::{Client, NoTls, Row};

use super::{BackendClient, Conn, Connection, FilmViews, Query, ReadValue, RecordStream};
use crate::backoff::Backoff;
use crate::conf::SqlConfig;
use crate::core::BenchError;
use crate::timing::{INSERT_CHUNK_SIZE, chunk};
use crate::workload::Workload;

const UPSERT: &str = "INSERT INTO likes (film_id, user_id, event_time, score)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (film_id, user_id) DO UPDATE SET
        event_time = excluded.event_time";

/// Typed column access; a type mismatch is a query error, never a panic.
pub(crate) fn column<'a, T: FromSql<'a>>(row: &'a Row, index: usize) -> Result<T, BenchError> {
    row.try_get(index)
        .map_err(|err| BenchError::QueryError(format!("column {index}: {err}")))
}

/// A PostgreSQL-protocol session plus the task driving its socket.
pub(crate) struct PgSession {
    pub client: Client,
    driver: JoinHandle<()>,
}

impl PgSession {
    pub async fn open(config: &SqlConfig, backoff: &Backoff) -> Result<Self, BenchError> {
        let (client, connection) = backoff
            .retry(&config.name, || async {
                Ok::<_, BenchError>(tokio_postgres::connect(&config.dsn, NoTls).await?)
            })
            .await?;

        let name = config.name.clone();
        let driver = tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!("{name}: connection error: {err}");
            }
        });
        debug!("{}: session opened", config.name);

        Ok(Self { client, driver })
    }

    pub async fn close(self) -> Result<(), BenchError> {
        drop(self.client);
        self.driver.await.map_err(|err| BenchError::TaskFailed {
            role: "connection driver".to_string(),
            message: err.to_string(),
        })
    }

    pub async fn ranking(&self, sql: &str, limit: usize) -> Result<Option<ReadValue>, BenchError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self.client.query(sql, &[&limit]).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        let ranking = rows
            .iter()
            .map(|row| -> Result<FilmViews, BenchError> {
                Ok(FilmViews {
                    film_id: column(row, 0)?,
                    views: column::<i64>(row, 1)?.max(0) as u64,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(ReadValue::Ranking(ranking)))
    }
}

pub struct PostgresClient {
    config: SqlConfig,
    backoff: Backoff,
}

impl PostgresClient {
    pub fn new(config: SqlConfig, backoff: Backoff) -> Self {
        Self { config, backoff }
    }
}

#[async_trait]
impl BackendClient for PostgresClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn workload(&self) -> Workload {
        Workload::Likes
    }

    fn duplicate(&self) -> Box<dyn BackendClient> {
        Box::new(Self::new(self.config.clone(), self.backoff.clone()))
    }

    async fn connect(&self) -> Result<Conn, BenchError> {
        let session = PgSession::open(&self.config, &self.backoff).await?;
        Ok(Box::new(PostgresConnection { session }))
    }
}

struct PostgresConnection {
    session: PgSession,
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn prepare_schema(&mut self) -> Result<(), BenchError> {
        self.session
            .client
            .batch_execute(
                "DROP TABLE IF EXISTS likes;
                 CREATE TABLE likes (
                     film_id VARCHAR(36) NOT NULL,
                     user_id VARCHAR(36) NOT NULL,
                     event_time TIMESTAMP,
                     score SMALLINT NOT NULL,
                     PRIMARY KEY (film_id, user_id)
                 );",
            )
            .await?;
        Ok(())
    }

    async fn insert(&mut self, records: RecordStream) -> Result<u64, BenchError> {
        let statement = self.session.client.prepare(UPSERT).await?;
        let mut written = 0;
        let mut chunks = chunk(records, INSERT_CHUNK_SIZE);
        while let Some(records) = chunks.next().await {
            let tx = self.session.client.transaction().await?;
            for record in &records {
                let score = i16::from(record.score()?);
                tx.execute(
                    &statement,
                    &[&record.film_id, &record.user_id, &record.event_time, &score],
                )
                .await
                .map_err(|err| BenchError::InsertError(err.to_string()))?;
            }
            tx.commit().await?;
            written += records.len() as u64;
        }
        Ok(written)
    }

    async fn read(&mut self, query: Query) -> Result<Option<ReadValue>, BenchError> {
        let client = &self.session.client;
        match query {
            Query::LastEvent { film_id, user_id } => {
                let row = client
                    .query_opt(
                        "SELECT event_time FROM likes
                         WHERE film_id = $1 AND user_id = $2
                         ORDER BY event_time DESC
                         LIMIT 1",
                        &[&film_id, &user_id],
                    )
                    .await?;
                let event_time = match row {
                    Some(row) => column::<Option<NaiveDateTime>>(&row, 0)?,
                    None => None,
                };
                Ok(event_time.map(ReadValue::EventTime))
            }
            Query::MostViewed { limit } => {
                self.session
                    .ranking(
                        "SELECT film_id, COUNT(*) AS views FROM likes
                         GROUP BY film_id
                         ORDER BY views DESC
                         LIMIT $1",
                        limit,
                    )
                    .await
            }
            Query::LikesCount { film_id } => {
                let row = client
                    .query_opt(
                        "SELECT COUNT(*) FROM likes WHERE film_id = $1 GROUP BY film_id",
                        &[&film_id],
                    )
                    .await?;
                match row {
                    Some(row) => Ok(Some(ReadValue::Count(column::<i64>(&row, 0)?.max(0) as u64))),
                    None => Ok(None),
                }
            }
            Query::AverageScore { film_id } => {
                let row = client
                    .query_one(
                        "SELECT AVG(score)::float8 FROM likes WHERE film_id = $1",
                        &[&film_id],
                    )
                    .await?;
                Ok(column::<Option<f64>>(&row, 0)?.map(ReadValue::Average))
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), BenchError> {
        self.session.close().await
    }
}
