mod backend;
mod config;
mod run;

pub use backend::{BackendConfig, ClickHouseConfig, MemoryConfig, MongoConfig, SqlConfig};
pub use config::Config;
pub use run::RunConfig;
