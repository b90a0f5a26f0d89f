//! Process root logger

use slog::{o, Drain, Logger};

/// Terminal logger on stdout, drained on a background thread
pub fn root_logger() -> Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stdout());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}
