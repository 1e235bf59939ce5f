/*
 * Copyright (C) 2024 Fastly, Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Response framing for a single HTTP/1.1 response.
//!
//! The end of a response is determined only from the header terminator and
//! the `Content-Length` header. There is no support for chunked encoding.
//! If the length can't be determined, the response ends when the peer closes
//! the connection.
//!
//! The header name is matched exactly as `Content-Length`. Servers that send
//! it in another casing (e.g. `content-length`, common with HTTP/2 gateways)
//! are framed by end-of-stream instead. Whether matching should be
//! case-insensitive is an open question for the maintainers.

use crate::core::buffer::LimitedBuffer;
use log::debug;
use std::str;

pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

const CRLF: &[u8] = b"\r\n";
const CONTENT_LENGTH: &[u8] = b"Content-Length";

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FeedStatus {
    NeedMore,
    Complete,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("response exceeds buffer capacity of {capacity} bytes")]
    BufferOverflow { capacity: usize },

    #[error("malformed Content-Length value: {0:?}")]
    MalformedHeader(String),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum ContentLength {
    Unknown,
    Known(usize),

    // reported once, then treated as unknown
    Invalid,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Totals {
    pub total_bytes: usize,
    pub content_bytes: usize,
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }

    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

// returns None if the header line isn't (fully) present yet
fn find_content_length(head: &[u8]) -> Option<Result<usize, String>> {
    let mut from = 0;

    while let Some(pos) = find(head, CONTENT_LENGTH, from) {
        from = pos + 1;

        // must be the name of a header line, not part of some other line
        if pos < CRLF.len() || &head[(pos - CRLF.len())..pos] != CRLF {
            continue;
        }

        let mut start = pos + CONTENT_LENGTH.len();

        match head.get(start) {
            Some(b':') => start += 1,
            Some(_) => continue,
            None => return None,
        }

        match head.get(start) {
            Some(b' ') => start += 1,
            Some(_) => {}
            None => return None,
        }

        // value is complete only once its line ending has arrived
        let end = find(head, CRLF, start)?;

        let value = &head[start..end];

        let parsed = if !value.is_empty() && value.iter().all(u8::is_ascii_digit) {
            // all digits, so only overflow can fail here
            str::from_utf8(value).ok().and_then(|s| s.parse().ok())
        } else {
            None
        };

        return Some(parsed.ok_or_else(|| String::from_utf8_lossy(value).into_owned()));
    }

    None
}

/// Collects the bytes of one response and tracks its framing.
pub struct ResponseAccumulator {
    buf: LimitedBuffer,
    header_length: Option<usize>,
    content_length: ContentLength,
}

impl ResponseAccumulator {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: LimitedBuffer::new(capacity),
            header_length: None,
            content_length: ContentLength::Unknown,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn total_received(&self) -> usize {
        self.buf.len()
    }

    pub fn header_length(&self) -> Option<usize> {
        self.header_length
    }

    pub fn content_length(&self) -> Option<usize> {
        match self.content_length {
            ContentLength::Known(x) => Some(x),
            ContentLength::Unknown | ContentLength::Invalid => None,
        }
    }

    /// The header section including its terminator, once known.
    pub fn head(&self) -> Option<&[u8]> {
        self.header_length.map(|size| &self.buf.as_slice()[..size])
    }

    pub fn is_complete(&self) -> bool {
        match (self.header_length, self.content_length) {
            (Some(header_length), ContentLength::Known(content_length)) => {
                self.buf.len() >= header_length.saturating_add(content_length)
            }
            _ => false,
        }
    }

    /// Appends the next chunk received from the transport and updates the
    /// framing state.
    ///
    /// A chunk that does not fit fails with `BufferOverflow` and nothing is
    /// appended. A bad `Content-Length` value fails with `MalformedHeader`
    /// once; the chunk is kept and the length stays unknown for the rest of
    /// the response.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<FeedStatus, FramingError> {
        if let Err(e) = self.buf.try_extend(chunk) {
            return Err(FramingError::BufferOverflow {
                capacity: e.capacity,
            });
        }

        // rescan from the start, as the terminator may straddle chunks
        if self.header_length.is_none() {
            if let Some(pos) = find(self.buf.as_slice(), HEADER_TERMINATOR, 0) {
                let size = pos + HEADER_TERMINATOR.len();

                debug!("header length: {}", size);

                self.header_length = Some(size);
            }
        }

        if self.content_length == ContentLength::Unknown {
            let head = match self.header_length {
                Some(size) => &self.buf.as_slice()[..size],
                None => self.buf.as_slice(),
            };

            match find_content_length(head) {
                Some(Ok(size)) => {
                    debug!("advertised content length: {}", size);

                    self.content_length = ContentLength::Known(size);
                }
                Some(Err(value)) => {
                    self.content_length = ContentLength::Invalid;

                    return Err(FramingError::MalformedHeader(value));
                }
                None => {}
            }
        }

        if self.is_complete() {
            Ok(FeedStatus::Complete)
        } else {
            Ok(FeedStatus::NeedMore)
        }
    }

    pub fn finalize(&self) -> Totals {
        let total_bytes = self.buf.len();

        let content_bytes = match self.header_length {
            Some(size) => total_bytes - size,
            None => 0,
        };

        Totals {
            total_bytes,
            content_bytes,
        }
    }
}
