//! Run logger setup
//!

use camino::Utf8Path;

use crate::globals::PROGRAM_NAME;

/// Setup the global logger
///
/// With a run log file, all Info and higher messages are appended to that file and only errors are
/// repeated to stderr. Without one, Info and higher messages go to stderr.
///
pub fn setup_logger(run_log: Option<&Utf8Path>) -> Result<(), fern::InitError> {
    let logger = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                PROGRAM_NAME,
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Info);

    let logger = if let Some(run_log) = run_log {
        logger.chain(fern::log_file(run_log)?).chain(
            fern::Dispatch::new()
                .level(log::LevelFilter::Error)
                .chain(std::io::stderr()),
        )
    } else {
        logger.chain(std::io::stderr())
    };

    logger.apply()?;
    Ok(())
}
