#[cfg(feature = "tracing-chrome")]
pub struct FlushGuard {
    _guard: tracing_chrome::FlushGuard,
}

#[cfg(not(feature = "tracing-chrome"))]
pub struct FlushGuard {}

/// Layered subscriber: env filter, span traces for errors, formatted output,
/// plus chrome or tracy output when those features are on.
#[cfg(feature = "tracing-core")]
pub fn start_tracing() -> FlushGuard {
    // source: https://github.com/bevyengine/bevy/blob/main/crates/bevy_log/src/lib.rs (LICENSE MIT)
    use ::tracing::warn;
    use std::panic;
    use tracing_log::LogTracer;
    use tracing_subscriber::{prelude::*, registry::Registry};

    let old_handler = panic::take_hook();
    panic::set_hook(Box::new(move |infos| {
        eprintln!("{}", tracing_error::SpanTrace::capture());
        old_handler(infos);
    }));

    let subscriber = Registry::default()
        .with(crate::log::default_filter())
        .with(tracing_error::ErrorLayer::default());

    #[cfg(feature = "tracing-chrome")]
    let (chrome_layer, chrome_guard) = {
        use tracing_subscriber::fmt::{format::DefaultFields, FormattedFields};

        let mut layer = tracing_chrome::ChromeLayerBuilder::new();
        if let Ok(path) = std::env::var("TRACE_CHROME") {
            layer = layer.file(path);
        }
        layer
            .name_fn(Box::new(|event_or_span| match event_or_span {
                tracing_chrome::EventOrSpan::Event(event) => event.metadata().name().into(),
                tracing_chrome::EventOrSpan::Span(span) => {
                    if let Some(fields) = span.extensions().get::<FormattedFields<DefaultFields>>()
                    {
                        format!("{}: {}", span.metadata().name(), fields.fields.as_str())
                    } else {
                        span.metadata().name().into()
                    }
                }
            }))
            .build()
    };

    #[cfg(feature = "tracing-tracy")]
    let tracy_layer = tracing_tracy::TracyLayer::new();

    let subscriber = subscriber.with(tracing_subscriber::fmt::Layer::default());

    #[cfg(feature = "tracing-chrome")]
    let subscriber = subscriber.with(chrome_layer);
    #[cfg(feature = "tracing-tracy")]
    let subscriber = subscriber.with(tracy_layer);

    let logger_already_set = LogTracer::init().is_err();
    let subscriber_already_set = ::tracing::subscriber::set_global_default(subscriber).is_err();

    match (logger_already_set, subscriber_already_set) {
        (true, true) => warn!("global logger and tracing subscriber were already set"),
        (true, _) => warn!("global logger was already set"),
        (_, true) => warn!("global tracing subscriber was already set"),
        _ => (),
    }

    #[cfg(feature = "tracing-chrome")]
    return FlushGuard {
        _guard: chrome_guard,
    };

    #[cfg(not(feature = "tracing-chrome"))]
    FlushGuard {}
}

#[cfg(not(feature = "tracing-core"))]
pub fn start_tracing() -> FlushGuard {
    // Dummy
    FlushGuard {}
}
