use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "assetflow=debug,tower_http=debug";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter. With `json` set, events are written as one
/// JSON object per line.
pub fn init_telemetry(json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()?;
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()?;
    }

    tracing::info!(json = json, "Tracing initialized");
    Ok(())
}
