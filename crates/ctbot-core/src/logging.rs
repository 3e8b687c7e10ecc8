use crate::Result;

/// Initialize tracing for the bot.
///
/// Defaults to `info` everywhere; `RUST_LOG` overrides the filter.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "info,ctbot_core=info,ctbot_http=info,{}=info",
            service_name.replace('-', "_")
        ))
    });

    // A second init (tests, embedding apps) keeps the first subscriber.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init();

    Ok(())
}
