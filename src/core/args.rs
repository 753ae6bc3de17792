use clap::{Parser, ValueEnum};
use log::kv::{ToValue, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug, PartialEq)]
#[command(version, about)]
pub struct CliArgs {
    #[arg(short, long)]
    pub config: Option<String>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Benchmark only the named backends (repeatable).
    #[arg(long)]
    pub only: Vec<String>,
}

impl ToValue for CliArgs {
    fn to_value(&self) -> Value<'_> {
        Value::from_debug(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = CliArgs::parse_from(["self", "--config", "foo"]);
        assert_eq!(
            args,
            CliArgs {
                config: Some("foo".to_string()),
                format: OutputFormat::Text,
                only: vec![],
            }
        );
    }

    #[test]
    fn test_args_format_and_filter() {
        let args = CliArgs::parse_from([
            "self", "--format", "json", "--only", "PostgreSQL", "--only", "MongoDB",
        ]);
        assert_eq!(args.format, OutputFormat::Json);
        assert_eq!(args.only, vec!["PostgreSQL", "MongoDB"]);
        assert_eq!(args.config, None);
    }
}
