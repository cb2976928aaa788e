use env_logger::{Builder, Env};
use log::LevelFilter;
use std::io::Write;

/// Initialises the global logger with the `[timestamp] [LEVEL] message`
/// format. `RUST_LOG` takes precedence; `verbose` raises the default to
/// debug. Calling it twice is harmless.
pub fn init_logger(verbose: bool) {
    let level = default_level(verbose);

    let _ = Builder::from_env(Env::default().default_filter_or(level.as_str()))
        .format(|buf, record| {
            let timestamp = buf.timestamp();
            writeln!(
                buf,
                "[{}] [{}] {}",
                timestamp,
                record.level(),
                record.args()
            )
        })
        .try_init();
}

/// The level `init_logger` uses when `RUST_LOG` is unset.
pub fn default_level(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_logger(false);
        init_logger(true);
        assert_eq!(default_level(true), LevelFilter::Debug);
    }
}
