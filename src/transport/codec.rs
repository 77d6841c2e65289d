// Frame Codec - back-to-back JSON objects on a byte stream
//
// There is no length prefix. The decoder tracks brace depth across reads to
// find where each object ends, so every buffered byte is scanned once. The
// complete object is then checked as JSON and decoded as a `Message`.

use crate::sync::Message;
use serde::de::IgnoredAny;
use thiserror::Error;

/// Largest single frame accepted before the connection is dropped
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Well-formed JSON that is not a known message; the frame is consumed
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// The stream is not valid JSON; nothing after this point can be framed
    #[error("Invalid JSON stream: {0}")]
    Syntax(String),

    #[error("Frame exceeds {max} bytes")]
    FrameTooLarge { max: usize },

    #[error("Encoding failed: {0}")]
    Encode(String),
}

impl CodecError {
    /// Whether the connection can keep reading after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CodecError::Malformed(_))
    }
}

/// Serialize a message as one JSON object followed by a newline
pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    let mut bytes = message
        .to_bytes()
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Position of the boundary scan inside the frame being buffered
#[derive(Debug, Default, Clone, Copy)]
struct Scan {
    /// Bytes of the current frame already examined
    offset: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl Scan {
    /// Advance over `bytes` from `offset`; returns the frame length once
    /// the opening brace is closed
    fn advance(&mut self, bytes: &[u8]) -> Option<usize> {
        while self.offset < bytes.len() {
            let byte = bytes[self.offset];
            self.offset += 1;

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return Some(self.offset);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Incremental decoder over bytes read from one connection
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    max_frame_bytes: usize,
    scan: Scan,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_bytes,
            scan: Scan::default(),
        }
    }

    /// Append bytes read from the stream
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes held that do not yet form a complete frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decode the next complete frame
    ///
    /// `Ok(None)` means more bytes are needed. A `Malformed` error consumes
    /// the offending frame and decoding may continue; any other error is
    /// fatal for the stream. Every frame must be a JSON object.
    pub fn next_frame(&mut self) -> Result<Option<Message>, CodecError> {
        if self.scan.offset == 0 {
            let Some(start) = self.buffer.iter().position(|b| !b.is_ascii_whitespace()) else {
                self.buffer.clear();
                return Ok(None);
            };
            self.buffer.drain(..start);
            if self.buffer[0] != b'{' {
                return Err(CodecError::Syntax(format!(
                    "expected '{{' at frame start, found 0x{:02x}",
                    self.buffer[0]
                )));
            }
        }

        let Some(end) = self.scan.advance(&self.buffer) else {
            if self.buffer.len() > self.max_frame_bytes {
                return Err(CodecError::FrameTooLarge {
                    max: self.max_frame_bytes,
                });
            }
            return Ok(None);
        };

        if end > self.max_frame_bytes {
            return Err(CodecError::FrameTooLarge {
                max: self.max_frame_bytes,
            });
        }
        self.scan = Scan::default();

        let frame: Vec<u8> = self.buffer.drain(..end).collect();
        if let Err(e) = serde_json::from_slice::<IgnoredAny>(&frame) {
            return Err(CodecError::Syntax(e.to_string()));
        }
        Message::from_bytes(&frame)
            .map(Some)
            .map_err(|e| CodecError::Malformed(e.to_string()))
    }
}
