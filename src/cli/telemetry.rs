//! Tracing subscriber setup for the binary.
//!
//! Output goes to stderr so command results on stdout stay clean. `RUST_LOG`
//! overrides the level picked with `-v` / `COMPENDIUM_LOG_LEVEL`.

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Initialize logging, plain text or JSON lines.
///
/// # Errors
///
/// Returns an error if a filter directive or subscriber initialization fails
pub fn init(verbosity_level: Option<Level>, json: bool) -> Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(verbosity_level.unwrap_or(Level::ERROR).into())
        .from_env_lossy()
        .add_directive("hyper=error".parse()?)
        .add_directive("reqwest=warn".parse()?);

    let (text_layer, json_layer) = if json {
        (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            ),
        )
    } else {
        (
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            ),
            None,
        )
    };

    let subscriber = Registry::default()
        .with(text_layer)
        .with(json_layer)
        .with(env_filter);

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
