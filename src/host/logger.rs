//! Logging sink handed to every state.

/// Fire-and-forget message sink.
pub trait Logger: Send + Sync {
    fn log(&self, message: &str);
}

/// Forwards to the `log` facade; the binary decides where records end up.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLogger;

impl Logger for LogLogger {
    fn log(&self, message: &str) {
        log::info!(target: "cryptprep", "{message}");
    }
}
