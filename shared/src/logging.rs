use std::fmt;
use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as format, EnvFilter, Registry};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFmt {
    /// Human readable lines.
    #[default]
    Plain,
    /// One JSON object per line.
    Json,
}

impl fmt::Display for LogFmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFmt {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Install the global logger. `log` records are forwarded to the same subscriber.
///
/// The filter is read from `RUST_LOG` and defaults to `info`.
pub fn init_logger(format: LogFmt) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = Registry::default().with(filter);
    let result = match format {
        LogFmt::Plain => registry.with(format::layer()).try_init(),
        LogFmt::Json => registry.with(format::layer().json()).try_init(),
    };

    result.expect("Global logger has already been set!");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("plain".parse::<LogFmt>(), Ok(LogFmt::Plain));
        assert_eq!("json".parse::<LogFmt>(), Ok(LogFmt::Json));
        assert!("gcp".parse::<LogFmt>().is_err());
        assert_eq!(LogFmt::Json.to_string(), "json");
    }
}
