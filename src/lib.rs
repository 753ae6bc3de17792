pub mod backend;
pub mod backoff;
pub mod conf;
pub mod core;
pub mod suite;
pub mod timing;
pub mod workload;
