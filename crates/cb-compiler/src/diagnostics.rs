//! Diagnostics collector for conversion runs
//!
//! A [`Diagnostics`] value is passed into every conversion call. It keeps
//! the leveled messages produced while converting and forwards each of
//! them to the `log` facade, so hosts can either inspect the collected
//! messages or just install a logger.

use log::Level;

const LOG_TARGET: &str = "cb_compiler";

/// One collected message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
}

/// Collector of leveled diagnostic messages.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message and forward it to the logger.
    pub fn push(&mut self, level: Level, message: impl Into<String>) {
        let message = message.into();
        log::log!(target: LOG_TARGET, level, "{}", message);
        self.entries.push(Diagnostic { level, message });
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(Level::Info, message);
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(Level::Debug, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Level::Error, message);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Number of messages recorded at `level`.
    pub fn count(&self, level: Level) -> usize {
        self.entries.iter().filter(|entry| entry.level == level).count()
    }

    /// Take all collected messages, leaving the collector empty.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }
}
