use std::sync::Once;

/// Filter applied when neither the config nor `RUST_LOG` names one.
///
/// wgpu is chatty at info; keep it to warnings.
pub const DEFAULT_FILTER: &str = "info,wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// Logger configuration.
///
/// `env_filter` follows the `env_logger` filter syntax (e.g. "info", "warn",
/// "tessel_engine=debug,wgpu_core=warn").
///
/// `write_style` controls ANSI coloring behavior.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub env_filter: Option<String>,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

impl LoggingConfig {
    /// Maps a `-v` count to a filter for the tessel crates.
    ///
    /// 0 defers to `RUST_LOG` / [`DEFAULT_FILTER`]; 1 enables debug and 2+
    /// enables trace for `tessel_*`, leaving wgpu at warn.
    pub fn from_verbosity(verbose: u8) -> Self {
        let level = match verbose {
            0 => return Self::default(),
            1 => "debug",
            _ => "trace",
        };
        Self {
            env_filter: Some(format!(
                "info,tessel_engine={level},tessel_studio={level},wgpu_core=warn,wgpu_hal=warn,naga=warn"
            )),
            ..Self::default()
        }
    }
}

static INIT: Once = Once::new();

/// Initializes the global logger once.
///
/// This function is idempotent; subsequent calls are ignored.
/// Intended usage is early in `main`.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();

        if let Some(filter) = config.env_filter {
            builder.parse_filters(&filter);
        } else if let Ok(filter) = std::env::var("RUST_LOG") {
            builder.parse_filters(&filter);
        } else {
            builder.parse_filters(DEFAULT_FILTER);
        }

        builder.write_style(config.write_style);
        builder.format_timestamp_millis();
        builder.init();

        log::debug!("logging initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_verbosity_defers_to_environment() {
        assert!(LoggingConfig::from_verbosity(0).env_filter.is_none());
    }

    #[test]
    fn verbosity_raises_tessel_crates_only() {
        let debug = LoggingConfig::from_verbosity(1).env_filter.unwrap();
        assert!(debug.contains("tessel_engine=debug"));
        assert!(debug.contains("wgpu_core=warn"));

        let trace = LoggingConfig::from_verbosity(5).env_filter.unwrap();
        assert!(trace.contains("tessel_studio=trace"));
    }
}
