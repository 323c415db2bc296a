use anyhow::Result;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    fmt::{format::FmtSpan, Layer as FmtLayer},
    layer::SubscriberExt as _,
    Layer as _, Registry,
};

/// Log to stderr; stdout is reserved for command output such as diffs and
/// version listings.
pub(crate) fn set_up(options: &super::Options) -> Result<()> {
    let span_events = if options.level >= LevelFilter::TRACE {
        // include enter/exit events for detailed tracing
        FmtSpan::FULL
    } else if options.level >= LevelFilter::DEBUG {
        // announce what we do and when we're done
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let fmt_layer = FmtLayer::new()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_span_events(span_events)
        .with_ansi(options.color)
        .with_filter(options.level);
    let subscriber = Registry::default().with(fmt_layer);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("failed to set up tracing: {}", e))?;

    Ok(())
}
