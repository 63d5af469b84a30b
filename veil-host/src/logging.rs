//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use veil_core::config::GeneralConfig;

/// Environment variable that overrides `general.log_level`.
pub const LOG_ENV: &str = "VEIL_LOG";

/// Install the global `fmt` subscriber.
///
/// `VEIL_LOG` wins over the configured level when set. Returns `false` if a
/// subscriber was already installed, which is harmless.
pub fn init_tracing(config: &GeneralConfig) -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        let config = GeneralConfig::default();
        init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
