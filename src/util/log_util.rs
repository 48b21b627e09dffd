use std::sync::Once;

use log::LevelFilter;
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};

/// Config file read by [`init`], relative to the working directory.
pub const LOGGING_CONFIG_PATH: &str = "logging_config.yaml";

const FALLBACK_PATTERN: &str =
    "{h({d(%Y-%m-%d %H:%M:%S)(utc)} - {l} {t}: {m}{n})}";

static LOGGER_INIT: Once = Once::new();

/// Initializes `log4rs` from [`LOGGING_CONFIG_PATH`], once per process.
pub fn init() {
    init_from(LOGGING_CONFIG_PATH);
}

/// Initializes `log4rs` from `path`, falling back to a console logger at
/// debug level if the file is missing or invalid. Later calls do nothing.
pub fn init_from(path: &str) {
    LOGGER_INIT.call_once(|| {
        match log4rs::init_file(path, Default::default()) {
            Ok(()) => log::info!("cobaltlib logging initialized from {path}"),
            Err(e) => {
                // No logger yet, so stderr.
                eprintln!("Failed to initialize logger from {path}: {e}");
                init_fallback();
            }
        }
    });
}

fn init_fallback() {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(FALLBACK_PATTERN)))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Debug));

    match config {
        Ok(config) => match log4rs::init_config(config) {
            Ok(_) => log::warn!("cobaltlib logging using console fallback"),
            Err(e) => eprintln!("Failed to initialize fallback logger: {e}"),
        },
        Err(e) => eprintln!("Failed to build fallback logging config: {e}"),
    }
}
