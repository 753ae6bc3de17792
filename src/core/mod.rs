mod args;
mod error;
mod logger;

pub use args::{CliArgs, OutputFormat};
pub use error::BenchError;
pub use logger::setup_logging;
