//! Append-only JSONL file sink.
//!
//! Every write is flushed immediately so a `tail -f` on the file sees each
//! line as soon as it is logged.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Default log file: `~/.quant-dashboard/logs/realtime.jsonl`.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| {
        home.join(".quant-dashboard")
            .join("logs")
            .join("realtime.jsonl")
    })
}

/// Cloneable writer shared by every event the JSON layer emits.
#[derive(Clone)]
pub struct LineWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl LineWriter {
    /// Open `path` in append mode, creating parent directories.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let written = guard.write(buf)?;
        guard.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for LineWriter {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
