//! Latency measurement and bounded-size batching.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use futures::Stream;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::Chunks;

use crate::core::BenchError;

/// Largest number of records any backend receives in a single request.
pub const INSERT_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(10_000) {
    Some(size) => size,
    None => unreachable!(),
};

/// Runs `op` `repeats` times back to back and returns the mean wall-clock
/// duration of one call. The first failing call aborts the measurement.
pub async fn measure_time<S, T, F>(
    state: &mut S,
    repeats: u32,
    mut op: F,
) -> Result<Duration, BenchError>
where
    S: ?Sized,
    F: for<'s> FnMut(&'s mut S) -> BoxFuture<'s, Result<T, BenchError>>,
{
    let repeats = repeats.max(1);
    let started = Instant::now();
    for _ in 0..repeats {
        op(state).await?;
    }
    Ok(started.elapsed() / repeats)
}

/// Lazily splits `records` into lists of exactly `size` items; the last list
/// may be shorter. Concatenating the chunks gives back the input.
pub fn chunk<S: Stream>(records: S, size: NonZeroUsize) -> Chunks<S> {
    records.chunks(size.get())
}
