//! Logger setup for binaries
//!
//! The library only emits through `log`; hosts pick the backend.

use log::LevelFilter;

/// Install `env_logger` at `level`, letting `RUST_LOG` override it
///
/// Calling it twice keeps the first logger.
pub fn init(level: LevelFilter) {
    let result = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
    if result.is_err() {
        log::debug!("Logger already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init(LevelFilter::Warn);
        init(LevelFilter::Debug);
    }
}
