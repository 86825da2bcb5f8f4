//! `log` backend: fern dispatch to stdout and an optional file.

use std::path::Path;

fn format_record(out: fern::FormatCallback<'_>, message: &std::fmt::Arguments<'_>, record: &log::Record) {
    let now = chrono::Local::now();
    out.finish(format_args!(
        "[{}][{}][{}][{:?}] {}",
        now.format("%Y-%m-%d"),
        now.format("%H:%M:%S"),
        record.target(),
        record.level(),
        message
    ))
}

pub fn init_logger(level: log::LevelFilter, file: Option<&Path>) -> Result<(), fern::InitError> {
    let mut dispatch = fern::Dispatch::new()
        .format(format_record)
        .level(level)
        // handshake chatter from the websocket stack
        .level_for("tungstenite", log::LevelFilter::Warn)
        .level_for("tokio_tungstenite", log::LevelFilter::Warn)
        .chain(std::io::stdout());
    if let Some(path) = file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }
    dispatch.apply()?;
    Ok(())
}
