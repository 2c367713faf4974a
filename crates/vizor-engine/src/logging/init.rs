use std::sync::Once;

/// Logger configuration.
///
/// `env_filter` follows the `env_logger` filter syntax (e.g. "info",
/// "vizor_engine=debug,wgpu_core=warn").
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
    /// Enables per-frame trace output from the orchestrator (`vizor_engine::frame`).
    pub frame_trace: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
            frame_trace: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    pub fn with_frame_trace(mut self, enabled: bool) -> Self {
        self.frame_trace = enabled;
        self
    }

    /// Target and level each frame-trace line is written at.
    fn frame_directive(&self) -> Option<(&'static str, log::LevelFilter)> {
        self.frame_trace
            .then_some(("vizor_engine::frame", log::LevelFilter::Trace))
    }
}

static INIT: Once = Once::new();

/// Initializes the global logger once.
///
/// Subsequent calls are ignored, so tests and binaries may both call it.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(move || {
        let mut builder = env_logger::Builder::new();

        if let Some(filter) = config.env_filter.as_deref() {
            builder.parse_filters(filter);
        } else if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else {
            builder.filter_level(log::LevelFilter::Info);
            // wgpu is chatty at info during adapter selection.
            builder.filter_module("wgpu_core", log::LevelFilter::Warn);
            builder.filter_module("wgpu_hal", log::LevelFilter::Warn);
        }

        if let Some((target, level)) = config.frame_directive() {
            builder.filter_module(target, level);
        }

        builder.write_style(config.write_style);

        // Another logger may already be installed (test harnesses).
        if builder.try_init().is_ok() {
            log::debug!("logging initialized");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_trace_adds_a_directive() {
        assert!(LoggingConfig::default().frame_directive().is_none());
        let config = LoggingConfig::default()
            .with_filter("warn")
            .with_frame_trace(true);
        assert_eq!(config.env_filter.as_deref(), Some("warn"));
        assert_eq!(
            config.frame_directive(),
            Some(("vizor_engine::frame", log::LevelFilter::Trace))
        );
    }
}
