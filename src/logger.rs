use ansi_term::Colour;
use env_logger::{Builder, Env};
use std::io::Write;
use std::thread;

/// Console logging for standalone runs and tests.
///
/// Every line is prefixed with the name of the thread that produced it, so
/// interleaved output from concurrently running servers stays attributable.
/// Safe to call more than once; later calls keep the first setup.
pub fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let thread = thread::current();
            let worker = thread.name().unwrap_or("worker");

            let level = match record.level() {
                log::Level::Error => Colour::Red.paint(record.level().to_string()),
                log::Level::Warn => Colour::Yellow.paint(record.level().to_string()),
                log::Level::Info => Colour::Green.paint(record.level().to_string()),
                log::Level::Debug => Colour::Blue.paint(record.level().to_string()),
                log::Level::Trace => Colour::Purple.paint(record.level().to_string()),
            };

            writeln!(
                buf,
                "[ {} ] [{} {}] {}",
                worker,
                timestamp,
                level,
                record.args()
            )
        })
        .try_init();
}
