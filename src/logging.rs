//! Tracing subscriber setup

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Level directive used when `RUST_LOG` is unset
pub fn filter_directive(config: &LoggingConfig, debug: bool) -> String {
    if debug {
        "debug".to_string()
    } else {
        config.level.clone()
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over both the configured level and `--debug`. Calling this
/// more than once keeps the first subscriber.
pub fn init(config: &LoggingConfig, debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config, debug)));

    let output: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        // Span fields (environment, sweep) are attached to every record
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => fmt::layer().boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init();
}
