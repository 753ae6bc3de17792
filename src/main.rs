use std::pin::pin;

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use log::{info, warn};

use ugcbench::backend;
use ugcbench::conf::Config;
use ugcbench::core::{CliArgs, OutputFormat, setup_logging};
use ugcbench::suite::BenchmarkSuite;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_logging();
    let args = CliArgs::parse();
    info!(args = args; "Ugcbench started.");

    let config = Config::load(args.config.as_deref()).context("cannot load configuration")?;

    let mut suite = BenchmarkSuite::new(config.run.clone());
    for settings in &config.backends {
        if !args.only.is_empty() && !args.only.iter().any(|name| name == settings.name()) {
            continue;
        }
        suite.register(backend::from_config(settings, &config.backoff));
    }
    if suite.is_empty() {
        warn!("no backends selected, nothing to benchmark");
        return Ok(());
    }

    let mut results = pin!(suite.run());
    while let Some(result) = results.next().await {
        match args.format {
            OutputFormat::Text => println!("{result}"),
            OutputFormat::Json => println!("{}", serde_json::to_string(&result)?),
        }
    }

    info!("Ugcbench finished.");
    Ok(())
}
