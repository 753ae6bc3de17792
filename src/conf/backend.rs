use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::workload::Workload;

/// One `[[backends]]` entry, selected by its `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Clickhouse(ClickHouseConfig),
    Mpp(SqlConfig),
    Postgres(SqlConfig),
    Mongodb(MongoConfig),
    Memory(MemoryConfig),
}

impl BackendConfig {
    pub fn name(&self) -> &str {
        match self {
            BackendConfig::Clickhouse(c) => &c.name,
            BackendConfig::Mpp(c) | BackendConfig::Postgres(c) => &c.name,
            BackendConfig::Mongodb(c) => &c.name,
            BackendConfig::Memory(c) => &c.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ClickHouseConfig {
    #[serde(default = "ClickHouseConfig::default_name")]
    pub name: String,
    #[serde(default = "ClickHouseConfig::default_url")]
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ClickHouseConfig {
    fn default_name() -> String {
        String::from("ClickHouse")
    }

    fn default_url() -> String {
        String::from("http://localhost:8123")
    }
}

/// Any store reached through a PostgreSQL-protocol connection string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SqlConfig {
    pub name: String,
    pub dsn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MongoConfig {
    #[serde(default = "MongoConfig::default_name")]
    pub name: String,
    #[serde(default = "MongoConfig::default_uri")]
    pub uri: String,
    #[serde(default = "MongoConfig::default_database")]
    pub database: String,
}

impl MongoConfig {
    fn default_name() -> String {
        String::from("MongoDB")
    }

    fn default_uri() -> String {
        String::from("mongodb://localhost:27017")
    }

    fn default_database() -> String {
        String::from("movie_db_usg_9_test")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    #[serde(default = "MemoryConfig::default_name")]
    pub name: String,
    #[serde(default)]
    pub workload: Workload,
    #[serde(default)]
    pub upsert: bool,
    #[serde(with = "humantime_serde", default)]
    pub read_latency: Duration,
    #[serde(default)]
    pub unreachable_attempts: u32,
}

impl MemoryConfig {
    fn default_name() -> String {
        String::from("Memory")
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            workload: Workload::default(),
            upsert: false,
            read_latency: Duration::ZERO,
            unreachable_attempts: 0,
        }
    }
}
