//! Logging capability injected into the client.
//!
//! The client never logs through globals; it calls the [`Logger`] held by its
//! [`Configuration`](crate::Configuration). The default, [`LogFacade`],
//! forwards to the `log` crate and stays silent until the application
//! installs a logger (e.g. `env_logger`).

/// Four independent log sinks.
pub trait Logger: Send + Sync {
    /// Logs an error.
    fn error(&self, message: &str);
    /// Logs a warning.
    fn warn(&self, message: &str);
    /// Logs an informational message.
    fn info(&self, message: &str);
    /// Logs a debug message.
    fn debug(&self, message: &str);
}

/// Forwards to the `log` facade under the `ditto_rs` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFacade;

impl Logger for LogFacade {
    fn error(&self, message: &str) {
        log::error!(target: "ditto_rs", "{}", message);
    }

    fn warn(&self, message: &str) {
        log::warn!(target: "ditto_rs", "{}", message);
    }

    fn info(&self, message: &str) {
        log::info!(target: "ditto_rs", "{}", message);
    }

    fn debug(&self, message: &str) {
        log::debug!(target: "ditto_rs", "{}", message);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn error(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn debug(&self, _message: &str) {}
}
