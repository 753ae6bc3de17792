use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::backend::Query;
use crate::core::BenchError;

/// Which event stream a backend stores and which reads it is measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Workload {
    /// Watch-progress timecodes: last timecode and most viewed films.
    #[default]
    Views,
    /// Film scores: likes count and average score per film.
    Likes,
}

impl Workload {
    /// The two reads measured in every phase, in report order.
    pub fn queries(&self, probe: &Probe, most_viewed_limit: usize) -> [Query; 2] {
        match self {
            Workload::Views => [
                Query::LastEvent {
                    film_id: probe.film_id.clone(),
                    user_id: probe.user_id.clone(),
                },
                Query::MostViewed {
                    limit: most_viewed_limit,
                },
            ],
            Workload::Likes => [
                Query::LikesCount {
                    film_id: probe.film_id.clone(),
                },
                Query::AverageScore {
                    film_id: probe.film_id.clone(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    /// Seconds from film start, `end` is always `start + 10`.
    Timecode { start: u16, end: u16 },
    Score(u8),
}

/// One immutable synthetic event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub film_id: String,
    pub user_id: String,
    pub measure: Measure,
    pub event_time: NaiveDateTime,
}

impl Record {
    pub fn timecode(&self) -> Result<(u16, u16), BenchError> {
        match self.measure {
            Measure::Timecode { start, end } => Ok((start, end)),
            Measure::Score(_) => Err(BenchError::InsertError(format!(
                "expected a timecode record for film {}",
                self.film_id
            ))),
        }
    }

    pub fn score(&self) -> Result<u8, BenchError> {
        match self.measure {
            Measure::Score(score) => Ok(score),
            Measure::Timecode { .. } => Err(BenchError::InsertError(format!(
                "expected a score record for film {}",
                self.film_id
            ))),
        }
    }
}

/// Key of the record guaranteed to exist, used by every point read.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Probe {
    pub film_id: String,
    pub user_id: String,
}

impl From<&Record> for Probe {
    fn from(record: &Record) -> Self {
        Self {
            film_id: record.film_id.clone(),
            user_id: record.user_id.clone(),
        }
    }
}
