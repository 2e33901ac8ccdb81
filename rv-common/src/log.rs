// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use slog::{Drain, Logger};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Create a bunyan style logger writing to `path`.
pub fn init_file_logger<P: AsRef<Path>>(path: P) -> std::io::Result<Logger> {
    Ok(build_logger(File::create(path)?))
}

fn build_logger<W: Write + Send + 'static>(w: W) -> Logger {
    let drain = slog_bunyan::new(w).build().fuse();
    let drain = slog_async::Async::new(drain)
        .chan_size(0x8000)
        .build()
        .fuse();
    slog::Logger::root(drain, slog::o!())
}

/// Create a human readable terminal logger. Filtering follows `RUST_LOG`
/// and defaults to info.
pub fn init_term_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().stderr().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_envlogger::LogBuilder::new(drain)
        .filter(None, slog::FilterLevel::Info)
        .parse(&std::env::var("RUST_LOG").unwrap_or_default())
        .build()
        .fuse();
    let drain = slog_async::Async::new(drain)
        .chan_size(0x2000)
        .build()
        .fuse();
    slog::Logger::root(drain, slog::o!())
}

/// A logger that drops everything, for tests and library callers that do
/// not care about diagnostics.
pub fn discard() -> Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}
