//! Append-only packet stream writer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StreamError};
use crate::packet::{PacketHeader, PacketLayout};
use crate::Packet;

/// Appends packets to a stream.
///
/// Single-writer: `write` takes `&mut self` and the owning component is
/// responsible for never sharing a writer between threads. Dropping the
/// writer closes it.
pub struct StreamWriter<W: Write = BufWriter<File>> {
    inner: Option<W>,
    layout: PacketLayout,
    path: Option<PathBuf>,
    packets_written: u64,
    bytes_written: u64,
    last_timestamp: Option<f32>,
    /// Set when a write or flush failed and the sink may hold a torn packet
    poisoned: bool,
}

impl StreamWriter<BufWriter<File>> {
    /// Create (or truncate) a stream file.
    pub fn open(path: impl AsRef<Path>, layout: PacketLayout) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| StreamError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut writer = Self::new(BufWriter::new(file), layout);
        writer.path = Some(path.to_path_buf());
        Ok(writer)
    }
}

impl<W: Write> StreamWriter<W> {
    /// Wrap an arbitrary sink, e.g. a `Vec<u8>` in tests.
    pub fn new(inner: W, layout: PacketLayout) -> Self {
        Self {
            inner: Some(inner),
            layout,
            path: None,
            packets_written: 0,
            bytes_written: 0,
            last_timestamp: None,
            poisoned: false,
        }
    }

    /// Append one packet: `[timestamp][length][payload]`.
    ///
    /// Timestamps are seconds since the start of the stream: they must be
    /// finite, non-negative and never decrease. Equal timestamps are accepted.
    ///
    /// After an I/O error every further write fails with
    /// [`StreamError::Poisoned`], so the stream stays readable up to the last
    /// packet that was written in full.
    pub fn write(&mut self, timestamp: f32, payload: &[u8]) -> Result<()> {
        if !timestamp.is_finite() || timestamp < 0.0 {
            return Err(StreamError::InvalidTimestamp(timestamp));
        }
        if let Some(previous) = self.last_timestamp {
            if timestamp < previous {
                return Err(StreamError::NonMonotonic {
                    previous,
                    timestamp,
                });
            }
        }

        let writer = self.inner.as_mut().ok_or(StreamError::Closed)?;
        if self.poisoned {
            return Err(StreamError::Poisoned);
        }
        let header = PacketHeader {
            timestamp,
            length: payload.len() as u64,
        };
        let written = self
            .layout
            .write_header(writer, &header)
            .and_then(|_| writer.write_all(payload));
        if let Err(e) = written {
            self.poisoned = true;
            return Err(e.into());
        }

        self.packets_written += 1;
        self.bytes_written += (self.layout.header_size() + payload.len()) as u64;
        self.last_timestamp = Some(timestamp);
        Ok(())
    }

    /// Append a [`Packet`].
    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.write(packet.timestamp, &packet.payload)
    }

    /// Push buffered bytes to the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        let writer = self.inner.as_mut().ok_or(StreamError::Closed)?;
        writer.flush().map_err(|e| {
            self.poisoned = true;
            e.into()
        })
    }

    /// Flush and release the sink. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        match self.inner.take() {
            Some(mut writer) => Ok(writer.flush()?),
            None => Ok(()),
        }
    }

    /// Flush and hand back the sink, or `None` if already closed.
    pub fn into_inner(mut self) -> Result<Option<W>> {
        if let Some(writer) = self.inner.as_mut() {
            writer.flush()?;
        }
        Ok(self.inner.take())
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Whether an earlier write or flush failed.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn layout(&self) -> PacketLayout {
        self.layout
    }

    /// Path the writer was opened with, if it was opened from a path.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    /// Total bytes appended, headers included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn last_timestamp(&self) -> Option<f32> {
        self.last_timestamp
    }
}

impl<W: Write> Drop for StreamWriter<W> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
