//! Document-store client. Each record is a filtered upsert on the unique
//! `(film_id, user_id)` index, so repeated keys overwrite.

use ::mongodb::bson::{Bson, DateTime as BsonDateTime, Document, doc};
use ::mongodb::options::{IndexOptions, UpdateOptions};
use ::mongodb::{Client, Collection, IndexModel};
use async_trait::async_trait;
use chrono::DateTime;
use futures::{StreamExt, TryStreamExt};
use log::debug;

use super::{BackendClient, Conn, Connection, FilmViews, Query, ReadValue, RecordStream};
use crate::backoff::Backoff;
use crate::conf::MongoConfig;
use crate::core::BenchError;
use crate::timing::{INSERT_CHUNK_SIZE, chunk};
use crate::workload::Workload;

const COLLECTION: &str = "likes";

pub struct MongoClient {
    config: MongoConfig,
    backoff: Backoff,
}

impl MongoClient {
    pub fn new(config: MongoConfig, backoff: Backoff) -> Self {
        Self { config, backoff }
    }
}

#[async_trait]
impl BackendClient for MongoClient {
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
        let client = self
            .backoff
            .retry(&self.config.name, || async {
                let client = Client::with_uri_str(&self.config.uri).await?;
                // Server selection is lazy, the ping forces it.
                client
                    .database(&self.config.database)
                    .run_command(doc! { "ping": 1 }, None)
                    .await?;
                Ok::<_, BenchError>(client)
            })
            .await?;
        debug!("{}: connected to {}", self.config.name, self.config.uri);

        let likes = client
            .database(&self.config.database)
            .collection::<Document>(COLLECTION);
        Ok(Box::new(MongoConnection { client, likes }))
    }
}

struct MongoConnection {
    client: Client,
    likes: Collection<Document>,
}

impl MongoConnection {
    async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>, BenchError> {
        let cursor = self.likes.aggregate(pipeline, None).await?;
        Ok(cursor.try_collect().await?)
    }
}

fn as_count(value: Option<&Bson>) -> u64 {
    match value {
        Some(Bson::Int32(n)) => u64::try_from(*n).unwrap_or_default(),
        Some(Bson::Int64(n)) => u64::try_from(*n).unwrap_or_default(),
        Some(Bson::Double(n)) => *n as u64,
        _ => 0,
    }
}

#[async_trait]
impl Connection for MongoConnection {
    async fn prepare_schema(&mut self) -> Result<(), BenchError> {
        // Dropping the collection drops its indexes too.
        self.likes.drop(None).await?;
        let index = IndexModel::builder()
            .keys(doc! { "film_id": 1, "user_id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.likes.create_index(index, None).await?;
        Ok(())
    }

    async fn insert(&mut self, records: RecordStream) -> Result<u64, BenchError> {
        let upsert = UpdateOptions::builder().upsert(true).build();
        let mut written = 0;
        let mut chunks = chunk(records, INSERT_CHUNK_SIZE);
        while let Some(records) = chunks.next().await {
            for record in records {
                let score = i32::from(record.score()?);
                let event_time =
                    BsonDateTime::from_millis(record.event_time.and_utc().timestamp_millis());
                self.likes
                    .update_one(
                        doc! { "film_id": record.film_id.as_str(), "user_id": record.user_id.as_str() },
                        doc! { "$set": { "event_time": event_time, "score": score } },
                        upsert.clone(),
                    )
                    .await
                    .map_err(|err| BenchError::InsertError(err.to_string()))?;
                written += 1;
            }
        }
        Ok(written)
    }

    async fn read(&mut self, query: Query) -> Result<Option<ReadValue>, BenchError> {
        match query {
            Query::LastEvent { film_id, user_id } => {
                let found = self
                    .likes
                    .find_one(doc! { "film_id": film_id, "user_id": user_id }, None)
                    .await?;
                Ok(found
                    .and_then(|doc| doc.get_datetime("event_time").ok().copied())
                    .and_then(|time| DateTime::from_timestamp_millis(time.timestamp_millis()))
                    .map(|time| ReadValue::EventTime(time.naive_utc())))
            }
            Query::MostViewed { limit } => {
                let limit = i64::try_from(limit).unwrap_or(i64::MAX);
                let groups = self
                    .aggregate(vec![
                        doc! { "$group": { "_id": "$film_id", "views": { "$sum": 1 } } },
                        doc! { "$sort": { "views": -1 } },
                        doc! { "$limit": limit },
                    ])
                    .await?;
                if groups.is_empty() {
                    return Ok(None);
                }
                let ranking = groups
                    .iter()
                    .map(|group| FilmViews {
                        film_id: group.get_str("_id").unwrap_or_default().to_string(),
                        views: as_count(group.get("views")),
                    })
                    .collect();
                Ok(Some(ReadValue::Ranking(ranking)))
            }
            Query::LikesCount { film_id } => {
                let count = self
                    .likes
                    .count_documents(doc! { "film_id": film_id }, None)
                    .await?;
                Ok((count > 0).then_some(ReadValue::Count(count)))
            }
            Query::AverageScore { film_id } => {
                let groups = self
                    .aggregate(vec![
                        doc! { "$match": { "film_id": film_id } },
                        doc! { "$group": { "_id": "$film_id", "average_score": { "$avg": "$score" } } },
                    ])
                    .await?;
                Ok(groups
                    .first()
                    .and_then(|group| group.get_f64("average_score").ok())
                    .map(ReadValue::Average))
            }
        }
    }

    async fn close(self: Box<Self>) -> Result<(), BenchError> {
        self.client.shutdown().await;
        Ok(())
    }
}
