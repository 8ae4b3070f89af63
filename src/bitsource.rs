// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bit-level input for inspecting encoded streams.

use super::error::ReadError;

/// Trait for defining an input bitstream.
pub trait BitSource {
    /// Returns the offset of the seek head in the number of bits.
    fn current_bit_offset(&self) -> usize;
    /// Skips to the next byte boundary.
    fn skip_to_next_byte(&mut self);
    /// Read bytes from the next byte boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream ends before `buf` is filled.
    fn read_bytes_aligned(&mut self, buf: &mut [u8]) -> Result<(), ReadError>;
    /// Read unsigned integer from the next `bits` bits.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream ends or `bits` exceeds 64.
    fn read_u64(&mut self, bits: usize) -> Result<u64, ReadError>;
    /// Read signed integer from the next `bits` bits.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream ends or `bits` is not in `1..=64`.
    fn read_i64(&mut self, bits: usize) -> Result<i64, ReadError> {
        if bits > 64 || bits == 0 {
            return Err(ReadError::format(
                self.current_bit_offset(),
                "unsupported bit width",
            ));
        }
        let u = self.read_u64(bits)?;
        let shift = 64 - bits;
        Ok(((u << shift) as i64) >> shift)
    }
    /// Utility function that calls `read_bytes_aligned` and returns results in `Vec`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream ends.
    fn read_bytevec_aligned(&mut self, bytes: usize) -> Result<Vec<u8>, ReadError> {
        let mut ret = vec![0; bytes];
        self.read_bytes_aligned(&mut ret)?;
        Ok(ret)
    }
    /// Utility function that read UTF-8-like encoded integer.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream ends or the head byte is invalid.
    fn read_utf8_aligned(&mut self) -> Result<u64, ReadError> {
        let mut head = [0u8; 1];
        self.read_bytes_aligned(&mut head)?;
        let head = u64::from(head[0]);

        let (tail_count, acc) = if head < 0x80 {
            (0, head & 0x7F)
        } else if head < 0xC0 {
            return Err(ReadError::format(
                self.current_bit_offset(),
                "unexpected continuation byte",
            ));
        } else if head < 0xE0 {
            (1, head & 0x1F)
        } else if head < 0xF0 {
            (2, head & 0x0F)
        } else if head < 0xF8 {
            (3, head & 0x07)
        } else if head < 0xFC {
            (4, head & 0x03)
        } else if head < 0xFE {
            (5, head & 0x01)
        } else if head == 0xFE {
            (6, 0)
        } else {
            return Err(ReadError::format(self.current_bit_offset(), "invalid UTF-8"));
        };

        let mut tails = [0u8; 6];
        self.read_bytes_aligned(&mut tails[..tail_count])?;

        let mut acc: u64 = acc;
        for b in &tails[..tail_count] {
            acc = acc << 6 | u64::from(*b & 0x3F);
        }
        Ok(acc)
    }
    /// Reads unary code (i.e. counts the number of "0"s before "1").
    ///
    /// # Errors
    ///
    /// Returns an error if the stream ends before "1" is found.
    fn read_unary_code(&mut self) -> Result<u64, ReadError> {
        let mut ret = 0;
        while self.read_u64(1)? == 0 {
            ret += 1;
        }
        Ok(ret)
    }
}

/// `BitSource` reading from a byte slice.
///
/// # Examples
///
/// ```
/// # fn main() -> Result<(), flacore::error::ReadError> {
/// use flacore::bitsource::{BitReader, BitSource};
///
/// let mut reader = BitReader::new(&[0b1011_0001, 0xFF]);
/// assert_eq!(reader.read_u64(3)?, 0b101);
/// assert_eq!(reader.read_i64(3)?, -4);
/// assert_eq!(reader.read_unary_code()?, 1);
/// assert_eq!(reader.current_bit_offset(), 8);
/// assert_eq!(reader.read_u64(8)?, 0xFF);
/// assert!(reader.read_u64(1).is_err());
/// # Ok(())}
/// ```
#[derive(Clone, Debug)]
pub struct BitReader<'a> {
    values: &'a [u8],
    head_bytes: usize,
    head_bits: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a reader positioned at the first bit of `values`.
    pub const fn new(values: &'a [u8]) -> Self {
        Self {
            values,
            head_bytes: 0,
            head_bits: 0,
        }
    }

    /// Returns the bytes after the current (aligned) head position.
    pub fn remaining_bytes(&self) -> &'a [u8] {
        let start = std::cmp::min(self.head_bytes, self.values.len());
        &self.values[start..]
    }
}

impl<'a> BitSource for BitReader<'a> {
    fn current_bit_offset(&self) -> usize {
        self.head_bytes * 8 + self.head_bits
    }

    fn skip_to_next_byte(&mut self) {
        if self.head_bits != 0 {
            self.head_bits = 0;
            self.head_bytes += 1;
        }
    }

    fn read_bytes_aligned(&mut self, buf: &mut [u8]) -> Result<(), ReadError> {
        self.skip_to_next_byte();
        let bytes = buf.len();
        if self.values.len() < self.head_bytes + bytes {
            return Err(ReadError::stream_ended(self.current_bit_offset()));
        }
        buf.copy_from_slice(&self.values[self.head_bytes..self.head_bytes + bytes]);
        self.head_bytes += bytes;
        Ok(())
    }

    fn read_u64(&mut self, bits: usize) -> Result<u64, ReadError> {
        if bits > 64 {
            return Err(ReadError::format(
                self.current_bit_offset(),
                "unsupported bit width",
            ));
        }
        let mut ret = 0u64;
        let mut remaining = bits;
        while remaining > 0 {
            let Some(byte) = self.values.get(self.head_bytes) else {
                return Err(ReadError::stream_ended(self.current_bit_offset()));
            };
            let avail = 8 - self.head_bits;
            let take = std::cmp::min(avail, remaining);
            let mask = ((1u16 << take) - 1) as u8;
            let chunk = (*byte >> (avail - take)) & mask;
            ret = (ret << take) | u64::from(chunk);
            self.head_bits += take;
            if self.head_bits == 8 {
                self.head_bits = 0;
                self.head_bytes += 1;
            }
            remaining -= take;
        }
        Ok(ret)
    }
}
