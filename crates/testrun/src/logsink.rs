//! Per-run log file for orchestrator events.
//!
//! [`RunLogSink`] is installed once as a `tracing_subscriber` writer. A run
//! attaches a file to it for its duration; the returned [`RunLogGuard`]
//! flushes and detaches the file when dropped. While nothing is attached,
//! events written to the sink are discarded.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing_subscriber::fmt::MakeWriter;

type Slot = Arc<Mutex<Option<File>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<File>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Default)]
pub struct RunLogSink {
    file: Slot,
}

impl RunLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route sink output to `path` (appending) until the guard is dropped.
    pub fn attach(&self, path: &Path) -> io::Result<RunLogGuard> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        *lock(&self.file) = Some(file);
        Ok(RunLogGuard {
            file: Arc::clone(&self.file),
        })
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.file).is_some()
    }
}

/// Detaches the run log file on drop.
#[derive(Debug)]
pub struct RunLogGuard {
    file: Slot,
}

impl Drop for RunLogGuard {
    fn drop(&mut self) {
        if let Some(mut file) = lock(&self.file).take() {
            let _ = file.flush();
        }
    }
}

/// Writer handed out per event.
#[derive(Debug)]
pub struct RunLogWriter {
    file: Slot,
}

impl Write for RunLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match lock(&self.file).as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match lock(&self.file).as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for RunLogSink {
    type Writer = RunLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RunLogWriter {
            file: Arc::clone(&self.file),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn subscriber(sink: &RunLogSink) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(sink.clone())
            .finish()
    }

    #[test]
    fn events_reach_attached_file_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("suite.log");
        let sink = RunLogSink::new();

        tracing::subscriber::with_default(subscriber(&sink), || {
            tracing::info!("before attach");
            {
                let _guard = sink.attach(&path).unwrap();
                assert!(sink.is_attached());
                tracing::info!("during run");
            }
            assert!(!sink.is_attached());
            tracing::info!("after detach");
        });

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("during run"));
        assert!(!content.contains("before attach"));
        assert!(!content.contains("after detach"));
    }

    #[test]
    fn attach_appends_to_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("suite.log");
        std::fs::write(&path, "previous run\n").unwrap();
        let sink = RunLogSink::new();

        tracing::subscriber::with_default(subscriber(&sink), || {
            let _guard = sink.attach(&path).unwrap();
            tracing::info!("next run");
        });

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("previous run\n"));
        assert!(content.contains("next run"));
    }

    #[test]
    fn attach_fails_for_missing_directory() {
        let dir = TempDir::new().unwrap();
        let sink = RunLogSink::new();
        assert!(sink.attach(&dir.path().join("nope/suite.log")).is_err());
        assert!(!sink.is_attached());
    }
}
