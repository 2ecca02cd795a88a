use std::fmt::Display;
use std::io::Write;

/// Line-oriented progress log shown to whoever watches the pipeline run.
///
/// Closing flushes and drops the sink. It happens at most once, either
/// through [`RunLog::close`] or when the log is dropped.
pub struct RunLog {
    sink: Option<Box<dyn Write + Send>>,
    write_failed: bool,
}

impl RunLog {
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Some(Box::new(sink)),
            write_failed: false,
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Append one line. Write errors are traced once and otherwise ignored;
    /// a broken log never changes the outcome of a run.
    pub fn line(&mut self, message: impl Display) {
        let Some(sink) = self.sink.as_mut() else {
            tracing::warn!(%message, "run log already closed, dropping line");
            return;
        };
        if let Err(e) = writeln!(sink, "{message}") {
            if !self.write_failed {
                tracing::warn!(error = %e, "failed to write run log");
                self.write_failed = true;
            }
        }
    }

    pub fn close(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.flush() {
                tracing::warn!(error = %e, "failed to flush run log");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_none()
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RunLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLog")
            .field("closed", &self.is_closed())
            .finish()
    }
}
