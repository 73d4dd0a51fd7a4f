use std::env;
use std::io::IsTerminal;

use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, prelude::*};

use crate::config::{Config, LogFormat};

pub fn init_tracing(config: &Config) {
    let (level, env_filter) = parse_rust_log(config.logging.level);

    let format = match config.logging.format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        LogFormat::Auto => LogFormat::Simplified,
        format => format,
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    let layer = match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Simplified => layer.compact().with_ansi(false).boxed(),
        LogFormat::Pretty | LogFormat::Auto => layer.boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(level))
        .with(env_filter)
        .init();
}

/// Resolves the effective level and filter, letting `RUST_LOG` override the configured level.
pub fn parse_rust_log(configured: LevelFilter) -> (LevelFilter, EnvFilter) {
    // A bare level in RUST_LOG replaces the configured one. Anything else is a full filter
    // directive and is used as is.
    let level = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => match value.parse::<Level>() {
            Ok(level) => LevelFilter::from(level),
            Err(_) => return (LevelFilter::TRACE, EnvFilter::new(value)),
        },
        Err(_) => configured,
    };

    // Upper bound per target. The layer filters this down to `level`.
    let env_filter = EnvFilter::new(
        "INFO,\
        fsperf_cli=TRACE,\
        fsperf_core=TRACE,\
        ",
    );

    (level, env_filter)
}
