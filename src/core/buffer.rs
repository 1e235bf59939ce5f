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

use std::cmp;
use std::io;
use std::io::Write;

#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
#[error("buffer capacity of {capacity} bytes exceeded ({needed} bytes needed)")]
pub struct CapacityError {
    pub capacity: usize,
    pub needed: usize,
}

/// Append-only byte buffer with a hard capacity.
///
/// Unlike `Vec`, the buffer never grows past the capacity given at
/// construction. Appends that don't fit are refused as a whole.
#[derive(Debug)]
pub struct LimitedBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl LimitedBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_avail(&self) -> usize {
        self.capacity - self.buf.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn try_extend(&mut self, src: &[u8]) -> Result<(), CapacityError> {
        if src.len() > self.write_avail() {
            return Err(CapacityError {
                capacity: self.capacity,
                needed: self.buf.len().saturating_add(src.len()),
            });
        }

        if self.buf.capacity() < self.buf.len() + src.len() {
            // grow geometrically, but never allocate past capacity
            let want = cmp::max(self.buf.capacity() * 2, self.buf.len() + src.len());
            self.buf.reserve_exact(cmp::min(want, self.capacity) - self.buf.len());
        }

        self.buf.extend_from_slice(src);

        Ok(())
    }
}

impl Write for LimitedBuffer {
    fn write(&mut self, buf: &[u8]) -> Result<usize, io::Error> {
        if !buf.is_empty() && self.write_avail() == 0 {
            return Err(io::Error::from(io::ErrorKind::WriteZero));
        }

        let size = cmp::min(self.write_avail(), buf.len());

        // size is bounded by write_avail
        self.buf.extend_from_slice(&buf[..size]);

        Ok(size)
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        Ok(())
    }
}
