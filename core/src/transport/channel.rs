//! The framed JSON-RPC channel: header-framed byte stream <-> JSON.

use crate::error::ChannelError;
use crate::log::SharedLogSink;
use parking_lot::Mutex;
use serde_json::Value;
use std::io::{BufRead, BufReader, Read, Write};

/// Content-Length values above this are refused outright.
pub const MAX_MESSAGE_SIZE: usize = 1 << 30;

pub struct Channel<R, W> {
    reader: Mutex<BufReader<R>>,
    writer: Mutex<W>,
    log: SharedLogSink,
}

impl<R: Read, W: Write> Channel<R, W> {
    pub fn new(reader: R, writer: W, log: SharedLogSink) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(writer),
            log,
        }
    }

    /// Reads one message. `Ok(None)` means a recoverable framing error was
    /// encountered and logged — the caller should simply read again.
    /// `Err` is terminal (EOF or I/O failure): the caller's read loop stops.
    pub fn read(&self) -> Result<Option<Value>, ChannelError> {
        let mut reader = self.reader.lock();
        let mut content_length: Option<usize> = None;

        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                return Err(ChannelError::Eof);
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }
            if trimmed.starts_with('#') {
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix("Content-Length:") {
                let value = rest.trim();
                match value.parse::<usize>() {
                    Ok(parsed) => {
                        if content_length.is_some() {
                            self.log.warn(
                                "channel",
                                "duplicate Content-Length header, first one wins",
                            );
                        } else {
                            content_length = Some(parsed);
                        }
                    }
                    Err(_) => {
                        self.log
                            .warn("channel", &format!("malformed Content-Length value: {value}"));
                    }
                }
            }
            // Any other header is ignored.
        }

        let len = match content_length {
            Some(len) => len,
            None => {
                self.log.warn("channel", "message header missing Content-Length");
                return Ok(None);
            }
        };

        if len > MAX_MESSAGE_SIZE {
            self.log
                .warn("channel", &format!("refusing oversize message: {len} bytes"));
            return Ok(None);
        }

        if len == 0 {
            self.log.warn("channel", "zero-length message body");
            return Ok(None);
        }

        let mut body = vec![0u8; len];
        reader.read_exact(&mut body)?;
        match serde_json::from_slice(&body) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                self.log.warn("channel", &format!("invalid JSON body: {e}"));
                Ok(None)
            }
        }
    }

    /// Serializes `value`, frames it, and writes it atomically under the
    /// output mutex.
    pub fn write(&self, value: &Value) -> Result<(), ChannelError> {
        let body = serde_json::to_vec(value)?;
        let mut writer = self.writer.lock();
        write!(writer, "Content-Length: {}\r\n\r\n", body.len())?;
        writer.write_all(&body)?;
        writer.flush()?;
        Ok(())
    }
}
