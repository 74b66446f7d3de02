use std::sync::{Arc, Mutex, PoisonError};

/// In-memory record of one run's diagnostics.
///
/// Every message is forwarded to `tracing` and appended to a shared buffer as
/// `"<level>: <message>"`. The buffer is what ends up in an error package, so
/// it is kept independent of whatever subscriber the process installed.
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    buffer: Arc<Mutex<String>>,
    verbose: bool,
}

impl RunLog {
    pub fn new(verbose: bool) -> Self {
        Self {
            buffer: Arc::default(),
            verbose,
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!("{message}");
        self.append("info", message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::warn!("{message}");
        self.append("warning", message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::error!("{message}");
        self.append("error", message);
    }

    /// Recorded in the buffer only when the log is verbose.
    pub fn debug(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::debug!("{message}");
        if self.verbose {
            self.append("debug", message);
        }
    }

    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn append(&self, level: &str, message: &str) {
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        for line in message.lines() {
            buffer.push_str(level);
            buffer.push_str(": ");
            buffer.push_str(line);
            buffer.push('\n');
        }
        if message.is_empty() {
            buffer.push_str(level);
            buffer.push_str(":\n");
        }
    }
}
