//! Forward-only packet stream reader.
//!
//! The reader keeps one header of read-ahead (the *peek*) so callers can ask
//! for the timestamp of the next packet before consuming it. The format has
//! no index: the only way back is [`StreamReader::rewind`], so seeking to an
//! earlier time is a scan from the start.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use serde::Serialize;

use crate::error::{Result, StreamError};
use crate::packet::{PacketHeader, PacketLayout, MAX_HEADER_SIZE};
use crate::Packet;

/// Why a reader stopped producing packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The last packet ended exactly at end of file
    Clean,
    /// Trailing bytes too short for a full packet (torn final write, or a
    /// corrupt length field pointing past end of file)
    TruncatedTail { offset: u64, missing: u64 },
    /// An I/O error while reading; treated as end of data
    Failed(io::ErrorKind),
}

/// Sequential reader over a packet stream.
pub struct StreamReader<R: Read + Seek = BufReader<File>> {
    inner: R,
    layout: PacketLayout,
    /// Stream length in bytes, measured at open and on every rewind
    len: u64,
    /// Offset of the peeked packet (bytes consumed so far)
    offset: u64,
    peeked: Option<PacketHeader>,
    /// Timestamp of the last complete header seen
    last_timestamp: f32,
    packets_read: u64,
    end: Option<StreamEnd>,
    /// Payload is read here first so a failed read leaves the caller's buffer alone
    scratch: Vec<u8>,
}

impl StreamReader<BufReader<File>> {
    /// Open a stream file and prime the peek with its first header.
    pub fn open(path: impl AsRef<Path>, layout: PacketLayout) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| StreamError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(BufReader::new(file), layout)
    }
}

impl<R: Read + Seek> StreamReader<R> {
    /// Wrap a seekable source positioned anywhere; reading starts at offset 0.
    pub fn new(mut inner: R, layout: PacketLayout) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;

        let mut reader = Self {
            inner,
            layout,
            len,
            offset: 0,
            peeked: None,
            last_timestamp: 0.0,
            packets_read: 0,
            end: None,
            scratch: Vec::new(),
        };
        reader.peek_header();
        Ok(reader)
    }

    /// Timestamp of the next unconsumed packet.
    ///
    /// At end of data this is the timestamp of the last packet (0.0 for an
    /// empty stream), so a playhead past the end still compares as due.
    pub fn timestamp(&self) -> f32 {
        self.peeked
            .map(|h| h.timestamp)
            .unwrap_or(self.last_timestamp)
    }

    /// Timestamp of the next unconsumed packet, `None` at end of data.
    pub fn peek_timestamp(&self) -> Option<f32> {
        self.peeked.map(|h| h.timestamp)
    }

    /// Consume the next packet into `payload`.
    ///
    /// Returns `false` at end of data, on a truncated tail or on an I/O
    /// error; `payload` is left untouched at end of data.
    pub fn next_frame(&mut self, payload: &mut Vec<u8>) -> bool {
        matches!(self.consume_into(payload), Ok(Some(_)))
    }

    /// Consume the next packet, `Ok(None)` at end of data.
    pub fn read_packet(&mut self) -> Result<Option<Packet>> {
        let mut payload = Vec::new();
        Ok(self
            .consume_into(&mut payload)?
            .map(|timestamp| Packet { timestamp, payload }))
    }

    /// Skip the next packet without reading its payload.
    pub fn skip_packet(&mut self) -> Result<Option<PacketHeader>> {
        let Some(header) = self.peeked else {
            return Ok(None);
        };

        if let Err(e) = self.inner.seek(SeekFrom::Current(header.length as i64)) {
            self.fail(e.kind());
            return Err(e.into());
        }
        self.advance(&header);
        Ok(Some(header))
    }

    /// Reset to the first packet and re-prime the peek.
    ///
    /// The stream length is measured again, so packets appended since open
    /// become visible.
    pub fn rewind(&mut self) {
        self.offset = 0;
        self.packets_read = 0;
        self.last_timestamp = 0.0;
        self.peeked = None;

        let measured = self
            .inner
            .seek(SeekFrom::End(0))
            .and_then(|len| self.inner.seek(SeekFrom::Start(0)).map(|_| len));
        match measured {
            Ok(len) => {
                self.len = len;
                self.peek_header();
            }
            Err(e) => self.fail(e.kind()),
        }
    }

    /// Whether a further `next_frame` would fail.
    pub fn is_eof(&self) -> bool {
        self.peeked.is_none()
    }

    /// Why reading stopped, `None` while packets remain.
    pub fn end(&self) -> Option<StreamEnd> {
        self.end
    }

    pub fn layout(&self) -> PacketLayout {
        self.layout
    }

    /// Offset of the next unconsumed packet.
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Stream length in bytes as last measured.
    pub fn stream_len(&self) -> u64 {
        self.len
    }

    /// Packets consumed since open or the last rewind.
    pub fn packets_read(&self) -> u64 {
        self.packets_read
    }

    fn consume_into(&mut self, payload: &mut Vec<u8>) -> Result<Option<f32>> {
        let Some(header) = self.peeked else {
            return Ok(None);
        };

        // peek_header has checked the length against the remaining bytes
        self.scratch.clear();
        self.scratch.resize(header.length as usize, 0);
        if let Err(e) = self.inner.read_exact(&mut self.scratch) {
            self.fail(e.kind());
            return Err(e.into());
        }
        std::mem::swap(&mut self.scratch, payload);

        self.advance(&header);
        Ok(Some(header.timestamp))
    }

    fn advance(&mut self, header: &PacketHeader) {
        self.offset += self.layout.header_size() as u64 + header.length;
        self.packets_read += 1;
        self.peek_header();
    }

    /// Read the header at `offset` into the peek, or record why there is none.
    fn peek_header(&mut self) {
        self.peeked = None;

        let header_size = self.layout.header_size() as u64;
        let remaining = self.len.saturating_sub(self.offset);
        if remaining == 0 {
            self.end = Some(StreamEnd::Clean);
            return;
        }
        if remaining < header_size {
            self.end = Some(StreamEnd::TruncatedTail {
                offset: self.offset,
                missing: header_size - remaining,
            });
            return;
        }

        let mut buf = [0u8; MAX_HEADER_SIZE];
        let buf = &mut buf[..header_size as usize];
        if let Err(e) = self.inner.read_exact(buf) {
            self.fail(e.kind());
            return;
        }
        let Some(header) = self.layout.decode_header(buf) else {
            self.fail(io::ErrorKind::InvalidData);
            return;
        };

        // Never trust a length that points past end of file
        let available = remaining - header_size;
        if header.length > available || usize::try_from(header.length).is_err() {
            self.end = Some(StreamEnd::TruncatedTail {
                offset: self.offset,
                missing: header.length.saturating_sub(available),
            });
            return;
        }

        self.last_timestamp = header.timestamp;
        self.peeked = Some(header);
        self.end = None;
    }

    fn fail(&mut self, kind: io::ErrorKind) {
        self.peeked = None;
        self.end = Some(StreamEnd::Failed(kind));
    }
}

/// Metadata gathered by walking a stream's headers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSummary {
    pub packets: u64,
    pub first_timestamp: Option<f32>,
    pub last_timestamp: Option<f32>,
    /// Sum of payload lengths
    pub payload_bytes: u64,
    /// File length
    pub file_bytes: u64,
    /// Incomplete trailing bytes after the last full packet
    pub tail_bytes: u64,
}

impl StreamSummary {
    /// Seconds between the first and last packet.
    pub fn duration(&self) -> f32 {
        match (self.first_timestamp, self.last_timestamp) {
            (Some(first), Some(last)) => (last - first).max(0.0),
            _ => 0.0,
        }
    }

    pub fn has_truncated_tail(&self) -> bool {
        self.tail_bytes > 0
    }
}

/// Walk every header of a stream file without reading payloads.
pub fn scan(path: impl AsRef<Path>, layout: PacketLayout) -> Result<StreamSummary> {
    let mut reader = StreamReader::open(path, layout)?;
    scan_reader(&mut reader)
}

/// Walk the remaining headers of an open reader.
pub fn scan_reader<R: Read + Seek>(reader: &mut StreamReader<R>) -> Result<StreamSummary> {
    let mut summary = StreamSummary {
        packets: 0,
        first_timestamp: None,
        last_timestamp: None,
        payload_bytes: 0,
        file_bytes: reader.stream_len(),
        tail_bytes: 0,
    };

    while let Some(header) = reader.skip_packet()? {
        summary.packets += 1;
        summary.first_timestamp.get_or_insert(header.timestamp);
        summary.last_timestamp = Some(header.timestamp);
        summary.payload_bytes += header.length;
    }

    if let Some(StreamEnd::Failed(kind)) = reader.end() {
        return Err(StreamError::Io(io::Error::from(kind)));
    }
    summary.tail_bytes = reader.stream_len().saturating_sub(reader.position());
    Ok(summary)
}
