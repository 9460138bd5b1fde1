#![forbid(unsafe_code)]
//! Logger setup shared by the apps in this workspace.
//!
//! Interactive sessions log to stderr through `env_logger`, everything else goes to syslog.

#[cfg(feature = "tty")]
use std::{env, io::IsTerminal};

use log::{debug, SetLoggerError};

#[cfg(feature = "tty")]
fn wants_stderr() -> bool {
    // Services started over ssh have no tty, so an explicit `env_logger` configuration
    // also selects stderr.
    std::io::stdout().is_terminal()
        || env::var_os("RUST_LOG").is_some()
        || env::var_os("RUST_LOG_STYLE").is_some()
}

fn try_init_syslog() -> Result<(), SetLoggerError> {
    libsyslog::Syslog::builder()
        .level(log::LevelFilter::Debug)
        .build()
        .init()
}

/// Install the logger appropriate for the environment.
///
/// If stdout is a terminal, write to stderr.
/// Otherwise, write to the system logger.
///
/// # Errors
///
/// Fails if a global logger has already been installed.
pub fn try_init_logger() -> Result<(), SetLoggerError> {
    #[cfg(feature = "tty")]
    if wants_stderr() {
        env_logger::try_init()?;
        debug!("Logging initialized");
        return Ok(());
    }

    try_init_syslog()?;
    debug!("Logging initialized");
    Ok(())
}

/// Like [`try_init_logger`] but panics on failure.
///
/// # Panics
///
/// This function will panic if a global logger has already been initialized.
pub fn init_logger() {
    if let Err(e) = try_init_logger() {
        panic!("Could not initialize logger: {e}");
    }
}

/// Route log output through the test harness so that it is only shown for failing tests.
///
/// Safe to call from every test; only the first call installs the logger.
pub fn init_test_logger() {
    #[cfg(feature = "tty")]
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}
