//! Column-store client. Rows are appended to a MergeTree table, so repeated
//! (film, user) keys are stored as separate rows.

use ::clickhouse::{Client, Row};
use async_trait::async_trait;
use futures::StreamExt;
use log::debug;
use serde::{Deserialize, Serialize};

use super::{
    BackendClient, Conn, Connection, FilmViews, Query, ReadValue, RecordStream, unsupported,
};
use crate::backoff::Backoff;
use crate::conf::ClickHouseConfig;
use crate::core::BenchError;
use crate::timing::{INSERT_CHUNK_SIZE, chunk};
use crate::workload::{Record, Workload};

const TABLE: &str = "movies.timecodes";

#[derive(Row, Serialize)]
struct TimecodeRow {
    film_id: String,
    user_id: String,
    start_time: u16,
    end_time: u16,
    /// `DateTime` columns travel as seconds since the epoch.
    event_time: u32,
}

impl TryFrom<Record> for TimecodeRow {
    type Error = BenchError;

    fn try_from(record: Record) -> Result<Self, BenchError> {
        let (start_time, end_time) = record.timecode()?;
        let event_time = u32::try_from(record.event_time.and_utc().timestamp()).map_err(|_| {
            BenchError::InsertError(format!("event time {} out of range", record.event_time))
        })?;
        Ok(Self {
            film_id: record.film_id,
            user_id: record.user_id,
            start_time,
            end_time,
            event_time,
        })
    }
}

#[derive(Row, Deserialize)]
struct ViewsRow {
    film_id: String,
    views: u64,
}

pub struct ClickHouseClient {
    config: ClickHouseConfig,
    backoff: Backoff,
}

impl ClickHouseClient {
    pub fn new(config: ClickHouseConfig, backoff: Backoff) -> Self {
        Self { config, backoff }
    }

    fn client(&self) -> Client {
        let mut client = Client::default().with_url(&self.config.url);
        if let Some(user) = &self.config.user {
            client = client.with_user(user);
        }
        if let Some(password) = &self.config.password {
            client = client.with_password(password);
        }
        client
    }
}

#[async_trait]
impl BackendClient for ClickHouseClient {
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
        let client = self.client();
        // The HTTP client is lazy; probe until the server answers.
        self.backoff
            .retry(&self.config.name, || async {
                client.query("SELECT 1").execute().await?;
                Ok::<(), BenchError>(())
            })
            .await?;
        debug!("connected to {}", self.config.url);

        Ok(Box::new(ClickHouseConnection {
            client,
            name: self.config.name.clone(),
        }))
    }
}

struct ClickHouseConnection {
    client: Client,
    name: String,
}

#[async_trait]
impl Connection for ClickHouseConnection {
    async fn prepare_schema(&mut self) -> Result<(), BenchError> {
        self.client
            .query("CREATE DATABASE IF NOT EXISTS movies")
            .execute()
            .await?;
        self.client
            .query(&format!("DROP TABLE IF EXISTS {TABLE}"))
            .execute()
            .await?;
        self.client
            .query(&format!(
                "CREATE TABLE {TABLE} (
                    film_id String,
                    user_id String,
                    start_time UInt16,
                    end_time UInt16,
                    event_time DateTime
                )
                ENGINE = MergeTree()
                ORDER BY (film_id, user_id)"
            ))
            .execute()
            .await?;
        Ok(())
    }

    async fn insert(&mut self, records: RecordStream) -> Result<u64, BenchError> {
        let mut written = 0;
        let mut chunks = chunk(records, INSERT_CHUNK_SIZE);
        while let Some(records) = chunks.next().await {
            let mut insert = self.client.insert::<TimecodeRow>(TABLE)?;
            for record in records {
                insert.write(&TimecodeRow::try_from(record)?).await?;
                written += 1;
            }
            insert.end().await?;
        }
        Ok(written)
    }

    async fn read(&mut self, query: Query) -> Result<Option<ReadValue>, BenchError> {
        match query {
            Query::LastEvent { film_id, user_id } => {
                let end_time = self
                    .client
                    .query(&format!(
                        "SELECT end_time FROM {TABLE}
                         WHERE film_id = ? AND user_id = ?
                         ORDER BY event_time DESC
                         LIMIT 1"
                    ))
                    .bind(film_id)
                    .bind(user_id)
                    .fetch_optional::<u16>()
                    .await?;
                Ok(end_time.map(ReadValue::Timecode))
            }
            Query::MostViewed { limit } => {
                let rows = self
                    .client
                    .query(&format!(
                        "SELECT film_id, count(*) AS views FROM {TABLE}
                         GROUP BY film_id
                         ORDER BY views DESC
                         LIMIT ?"
                    ))
                    .bind(limit as u64)
                    .fetch_all::<ViewsRow>()
                    .await?;
                if rows.is_empty() {
                    return Ok(None);
                }
                Ok(Some(ReadValue::Ranking(
                    rows.into_iter()
                        .map(|row| FilmViews {
                            film_id: row.film_id,
                            views: row.views,
                        })
                        .collect(),
                )))
            }
            other => Err(unsupported(&self.name, &other)),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), BenchError> {
        Ok(())
    }
}
