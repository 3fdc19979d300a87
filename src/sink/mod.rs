//! Append-only CSV sink with a single writer thread.
//!
//! Producers on any thread send whole rows over a channel; only the writer
//! thread touches the file, so rows can never interleave.

use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::mpsc::{channel, Sender};
use std::thread::{self, JoinHandle};

pub struct CsvSink<T> {
    sender: Option<Sender<T>>,
    writer: Option<JoinHandle<Result<usize, csv::Error>>>,
}

/// Cloneable producer side of a [`CsvSink`].
pub struct SinkHandle<T> {
    sender: Sender<T>,
}

impl<T> Clone for SinkHandle<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> SinkHandle<T> {
    /// Queues one row. Returns false if the writer has already stopped.
    pub fn append(&self, row: T) -> bool {
        self.sender.send(row).is_ok()
    }
}

impl<T: Serialize + Send + 'static> CsvSink<T> {
    /// Opens `path` for appending. The header row is written only when the
    /// file is new or empty.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let write_header = file.metadata()?.len() == 0;

        let (sender, receiver) = channel::<T>();
        let writer = thread::spawn(move || {
            let mut out = csv::WriterBuilder::new()
                .has_headers(write_header)
                .from_writer(file);
            let mut written = 0;
            for row in receiver {
                out.serialize(&row)?;
                out.flush()?;
                written += 1;
            }
            out.flush()?;
            Ok(written)
        });

        Ok(Self {
            sender: Some(sender),
            writer: Some(writer),
        })
    }

    pub fn handle(&self) -> Option<SinkHandle<T>> {
        self.sender.as_ref().map(|sender| SinkHandle {
            sender: sender.clone(),
        })
    }

    pub fn append(&self, row: T) -> bool {
        self.sender
            .as_ref()
            .map(|sender| sender.send(row).is_ok())
            .unwrap_or(false)
    }

    /// Closes the channel, waits for the writer to drain, and returns the
    /// number of rows written. Outstanding handles must be dropped first.
    pub fn finish(mut self) -> Result<usize, csv::Error> {
        self.sender.take();
        match self.writer.take() {
            Some(writer) => writer
                .join()
                .unwrap_or_else(|_| Err(csv::Error::from(std::io::Error::other("sink writer panicked")))),
            None => Ok(0),
        }
    }
}

impl<T> Drop for CsvSink<T> {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}
