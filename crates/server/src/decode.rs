//! Line decoder with explicit-disconnect handling
//!
//! Splits a raw byte stream into newline-terminated lines, honoring
//! the disconnect control byte: once it appears, everything buffered
//! after it is discarded, including an unterminated partial line
//! before it. A trailing `\r` is stripped so CRLF producers work.

use bulk_protocol::DISCONNECT_BYTE;
use bytes::{Buf, BytesMut};

/// One decoded item from the byte stream.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodedItem {
    /// A complete line, newline stripped. Lossy UTF-8.
    Line(String),
    /// The disconnect byte was seen; the stream is finished.
    Disconnect,
}

/// Incremental splitter over accumulated socket reads.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: BytesMut,
    disconnected: bool,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes.
    ///
    /// Ignored after the disconnect byte - the wire contract discards
    /// everything past it.
    pub fn extend(&mut self, bytes: &[u8]) {
        if !self.disconnected {
            self.buf.extend_from_slice(bytes);
        }
    }

    /// Pull the next complete item, if the buffer holds one.
    ///
    /// A partial line with no terminator yet stays buffered and yields
    /// `None` until more bytes arrive.
    pub fn next_item(&mut self) -> Option<DecodedItem> {
        if self.disconnected {
            return Some(DecodedItem::Disconnect);
        }

        let boundary = self
            .buf
            .iter()
            .position(|&b| b == b'\n' || b == DISCONNECT_BYTE)?;

        if self.buf[boundary] == DISCONNECT_BYTE {
            // Discards the partial line before the byte too
            self.disconnected = true;
            self.buf.clear();
            return Some(DecodedItem::Disconnect);
        }

        let mut line = self.buf.split_to(boundary + 1);
        line.truncate(line.len() - 1);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(DecodedItem::Line(
            String::from_utf8_lossy(line.chunk()).into_owned(),
        ))
    }

    /// Bytes held back waiting for a line terminator.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}
