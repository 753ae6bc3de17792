use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::backend::Query;
use crate::workload::Workload;

/// Latencies of one read across the three load shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadTimings {
    pub query: &'static str,
    #[serde(serialize_with = "as_seconds")]
    pub idle: Option<Duration>,
    #[serde(serialize_with = "as_seconds")]
    pub under_load: Option<Duration>,
    #[serde(serialize_with = "as_seconds")]
    pub parallel: Option<Duration>,
}

impl ReadTimings {
    fn new(query: &Query) -> Self {
        Self {
            query: query.label(),
            idle: None,
            under_load: None,
            parallel: None,
        }
    }
}

/// Aggregated measurements of one backend for one run. `None` marks a
/// measurement whose phase failed or never ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    pub backend: String,
    pub workload: Workload,
    pub static_batch: usize,
    #[serde(serialize_with = "as_seconds")]
    pub insert_batch: Option<Duration>,
    pub reads: [ReadTimings; 2],
}

impl TestResult {
    pub fn new(backend: &str, workload: Workload, static_batch: usize, queries: &[Query; 2]) -> Self {
        Self {
            backend: backend.to_string(),
            workload,
            static_batch,
            insert_batch: None,
            reads: [ReadTimings::new(&queries[0]), ReadTimings::new(&queries[1])],
        }
    }

    /// All seven measurements are present.
    pub fn is_complete(&self) -> bool {
        self.insert_batch.is_some()
            && self
                .reads
                .iter()
                .all(|r| r.idle.is_some() && r.under_load.is_some() && r.parallel.is_some())
    }

    pub fn measurements(&self) -> Vec<(String, Option<Duration>)> {
        let mut rows = vec![(
            format!("Insert {} rows", self.static_batch),
            self.insert_batch,
        )];
        for read in &self.reads {
            rows.push((format!("Retrieve {}", read.query), read.idle));
            rows.push((format!("Retrieve {} under load", read.query), read.under_load));
            rows.push((format!("Retrieve {} in parallel", read.query), read.parallel));
        }
        rows
    }
}

fn as_seconds<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<56}{}", "DBMS:", self.backend)?;
        for (label, value) in self.measurements() {
            let label = format!("- {label}:");
            match value {
                Some(duration) => writeln!(f, "{label:<56}{:.6} s", duration.as_secs_f64())?,
                None => writeln!(f, "{label:<56}N/A")?,
            }
        }
        Ok(())
    }
}
