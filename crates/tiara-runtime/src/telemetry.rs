//! Tracing initialization

use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// `TIARA_LOG_FORMAT=json` selects JSON; anything else is pretty
    pub fn from_env() -> Self {
        match std::env::var("TIARA_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (e.g. `"tiara=info"`)
/// applies. Returns false if a subscriber was already installed.
pub fn init_tracing(default_directive: &str) -> bool {
    init_tracing_with(default_directive, LogFormat::from_env())
}

pub fn init_tracing_with(default_directive: &str, format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_tracing_with("tiara=debug", LogFormat::Pretty);
        assert!(!init_tracing_with("tiara=debug", LogFormat::Json));
    }
}
