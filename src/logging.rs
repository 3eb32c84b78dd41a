//! Tracing subscriber setup for applications embedding the client

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_DIRECTIVE: &str = "telemetry_client=info";

/// Output format of the fmt subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// `json` (any case) selects JSON; anything else is text
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }

    /// Format selected by `LOG_FORMAT`
    pub fn from_env() -> Self {
        std::env::var("LOG_FORMAT")
            .map(|v| Self::from_name(&v))
            .unwrap_or(LogFormat::Text)
    }
}

/// Build a fmt subscriber writing to `writer`
pub fn build_subscriber<W>(
    filter: EnvFilter,
    format: LogFormat,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => Box::new(
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(writer)
                .finish(),
        ),
        LogFormat::Text => Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .finish(),
        ),
    }
}

/// Initialize a tracing subscriber with optional JSON formatting
///
/// `RUST_LOG` overrides `default_directive`; `LOG_FORMAT=json` switches to
/// JSON lines.
///
/// # Returns
/// `true` if this call installed the global subscriber, `false` if one was
/// already set
pub fn init_tracing(default_directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let subscriber = build_subscriber(filter, LogFormat::from_env(), std::io::stdout);
    tracing::subscriber::set_global_default(subscriber).is_ok()
}
