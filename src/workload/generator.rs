use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

use super::record::{Measure, Record, Workload};

/// Film length used for timecodes, in seconds.
const FILM_LENGTH: u16 = 3 * 60 * 60;
const VIEW_SPAN: u16 = 10;

/// Lazy, finite stream of `count + 1` records: the first record is emitted twice.
pub struct WorkloadGenerator {
    workload: Workload,
    remaining: usize,
    started: bool,
    repeat: Option<Record>,
    films: Vec<String>,
    users: Vec<String>,
    event_times: (i64, i64),
    rng: StdRng,
}

/// Creates a generator; a fixed `seed` makes the stream reproducible.
pub fn generate(workload: Workload, count: usize, seed: Option<u64>) -> WorkloadGenerator {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let films = id_pool(&mut rng, (count / 1000).max(1));
    let users = id_pool(&mut rng, (count / 100).max(1));

    WorkloadGenerator {
        workload,
        remaining: count,
        started: false,
        repeat: None,
        films,
        users,
        event_times: (epoch_seconds(2020), epoch_seconds(2023)),
        rng,
    }
}

fn id_pool(rng: &mut StdRng, size: usize) -> Vec<String> {
    (0..size)
        .map(|_| Uuid::from_u128(rng.r#gen()).to_string())
        .collect()
}

fn epoch_seconds(year: i32) -> i64 {
    NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

impl WorkloadGenerator {
    fn next_record(&mut self) -> Record {
        let film_id = self.films.choose(&mut self.rng).cloned().unwrap_or_default();
        let user_id = self.users.choose(&mut self.rng).cloned().unwrap_or_default();

        let measure = match self.workload {
            Workload::Views => {
                let start = self.rng.gen_range(0..=FILM_LENGTH);
                Measure::Timecode {
                    start,
                    end: start + VIEW_SPAN,
                }
            }
            Workload::Likes => Measure::Score(self.rng.gen_range(1..=10)),
        };

        let (from, to) = self.event_times;
        let event_time = DateTime::from_timestamp(self.rng.gen_range(from..=to), 0)
            .map(|dt| dt.naive_utc())
            .unwrap_or(NaiveDateTime::MIN);

        Record {
            film_id,
            user_id,
            measure,
            event_time,
        }
    }
}

impl Iterator for WorkloadGenerator {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if let Some(record) = self.repeat.take() {
            return Some(record);
        }
        if self.remaining == 0 {
            return None;
        }

        self.remaining -= 1;
        let record = self.next_record();
        if !self.started {
            self.started = true;
            self.repeat = Some(record.clone());
        }
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.len();
        (len, Some(len))
    }
}

impl ExactSizeIterator for WorkloadGenerator {
    fn len(&self) -> usize {
        if !self.started && self.remaining > 0 {
            self.remaining + 1
        } else {
            self.remaining + usize::from(self.repeat.is_some())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(999)]
    #[case(5000)]
    fn test_first_record_is_duplicated(#[case] count: usize) {
        let records: Vec<Record> = generate(Workload::Views, count, None).collect();
        assert_eq!(records.len(), count + 1);
        assert_eq!(records[0], records[1]);
    }

    #[test]
    fn test_zero_count_is_empty() {
        let mut generator = generate(Workload::Likes, 0, None);
        assert_eq!(generator.len(), 0);
        assert!(generator.next().is_none());
    }

    #[test]
    fn test_len_tracks_consumption() {
        let mut generator = generate(Workload::Likes, 3, Some(7));
        assert_eq!(generator.len(), 4);
        generator.next();
        assert_eq!(generator.len(), 3);
        generator.next();
        assert_eq!(generator.len(), 2);
        assert_eq!(generator.by_ref().count(), 2);
        assert_eq!(generator.len(), 0);
    }

    #[test]
    fn test_seeded_streams_are_reproducible() {
        let a: Vec<Record> = generate(Workload::Views, 100, Some(42)).collect();
        let b: Vec<Record> = generate(Workload::Views, 100, Some(42)).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_id_pools_scale_with_count() {
        let records: Vec<Record> = generate(Workload::Views, 10_000, Some(1)).collect();
        let films: HashSet<&str> = records.iter().map(|r| r.film_id.as_str()).collect();
        let users: HashSet<&str> = records.iter().map(|r| r.user_id.as_str()).collect();
        assert!(films.len() <= 10);
        assert!(users.len() <= 100);
        assert!(users.len() > 10);
    }

    #[test]
    fn test_measures_stay_in_domain() {
        let lower = DateTime::from_timestamp(epoch_seconds(2020), 0).unwrap().naive_utc();
        let upper = DateTime::from_timestamp(epoch_seconds(2023), 0).unwrap().naive_utc();

        for record in generate(Workload::Views, 1000, Some(3)) {
            let (start, end) = record.timecode().unwrap();
            assert!(start <= FILM_LENGTH);
            assert_eq!(end, start + VIEW_SPAN);
            assert!(record.event_time >= lower && record.event_time <= upper);
        }
        for record in generate(Workload::Likes, 1000, Some(3)) {
            let score = record.score().unwrap();
            assert!((1..=10).contains(&score));
            assert!(record.timecode().is_err());
        }
    }
}
