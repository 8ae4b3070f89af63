// Copyright 2022 Google LLC
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

//! Frame checksums fed through the byte callbacks of [`BitSink`].
//!
//! [`BitSink`]: crate::bitsink::BitSink

use super::bitsink::ByteAccumulator;

/// CRC-8 of FLAC frame headers: polynomial 0x07, init 0, non-reflected.
const CRC_8_FLAC: crc::Algorithm<u8> = crc::CRC_8_SMBUS;
/// CRC-16 of FLAC frames: polynomial 0x8005, init 0, non-reflected.
const CRC_16_FLAC: crc::Algorithm<u16> = crc::CRC_16_UMTS;

/// Table-driven CRC-8 engine for frame headers.
pub static HEADER_CRC: crc::Crc<u8, crc::Table<16>> =
    crc::Crc::<u8, crc::Table<16>>::new(&CRC_8_FLAC);

/// Table-driven CRC-16 engine for whole frames.
pub static FRAME_CRC: crc::Crc<u16, crc::Table<16>> =
    crc::Crc::<u16, crc::Table<16>>::new(&CRC_16_FLAC);

/// CRC-8 over the bytes of a frame header, updated one byte at a time.
///
/// Only the running register is kept, so memory use does not grow with the
/// number of bytes fed.
///
/// # Examples
///
/// ```
/// use flacore::bitsink::ByteAccumulator;
/// use flacore::crc::Crc8;
///
/// let mut crc = Crc8::new();
/// for b in [0xFF, 0xF8, 0x10, 0x10, 0x00] {
///     crc.update(b);
/// }
/// assert_eq!(crc.value(), 0x7F);
/// ```
#[derive(Clone)]
pub struct Crc8 {
    digest: crc::Digest<'static, u8, crc::Table<16>>,
}

impl Crc8 {
    /// Creates an accumulator with the initial value 0.
    pub fn new() -> Self {
        Self {
            digest: HEADER_CRC.digest(),
        }
    }

    /// Returns the checksum of the bytes fed so far.
    pub fn checksum(&self) -> u8 {
        self.digest.clone().finalize()
    }
}

impl Default for Crc8 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc8 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Crc8({:#04X})", self.checksum())
    }
}

impl ByteAccumulator for Crc8 {
    #[inline]
    fn update(&mut self, byte: u8) {
        self.digest.update(&[byte]);
    }

    fn value(&self) -> u64 {
        self.checksum().into()
    }
}

/// CRC-16 over the bytes of a frame, updated one byte at a time.
#[derive(Clone)]
pub struct Crc16 {
    digest: crc::Digest<'static, u16, crc::Table<16>>,
}

impl Crc16 {
    /// Creates an accumulator with the initial value 0.
    pub fn new() -> Self {
        Self {
            digest: FRAME_CRC.digest(),
        }
    }

    /// Returns the checksum of the bytes fed so far.
    pub fn checksum(&self) -> u16 {
        self.digest.clone().finalize()
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Crc16 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Crc16({:#06X})", self.checksum())
    }
}

impl ByteAccumulator for Crc16 {
    #[inline]
    fn update(&mut self, byte: u8) {
        self.digest.update(&[byte]);
    }

    fn value(&self) -> u64 {
        self.checksum().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::bitsink::BitSink;
    use crate::bitsink::ByteSink;

    #[test]
    fn crc8_of_empty_input_is_zero() {
        assert_eq!(Crc8::new().value(), 0);
        assert_eq!(Crc16::new().value(), 0);
    }

    #[test]
    fn accumulators_agree_with_one_shot_checksums() {
        let data: Vec<u8> = (0u32..300).map(|x| (x * 37 % 251) as u8).collect();
        let mut c8 = Crc8::new();
        let mut c16 = Crc16::new();
        for b in &data {
            c8.update(*b);
            c16.update(*b);
        }
        assert_eq!(c8.checksum(), HEADER_CRC.checksum(&data));
        assert_eq!(c16.checksum(), FRAME_CRC.checksum(&data));
    }

    #[test]
    fn value_is_not_consuming() {
        let mut c16 = Crc16::new();
        c16.update(0x12);
        let first = c16.value();
        assert_eq!(first, c16.value());
        c16.update(0x34);
        assert_eq!(c16.value(), u64::from(FRAME_CRC.checksum(&[0x12, 0x34])));
    }

    #[test]
    fn checksums_can_be_read_midway() {
        let data: Vec<u8> = (0u32..4096).map(|x| (x * 101 % 253) as u8).collect();
        let mut c8 = Crc8::new();
        let mut c16 = Crc16::new();
        for (i, b) in data.iter().enumerate() {
            c8.update(*b);
            c16.update(*b);
            if i % 1000 == 999 {
                assert_eq!(c8.checksum(), HEADER_CRC.checksum(&data[..=i]));
                assert_eq!(c16.checksum(), FRAME_CRC.checksum(&data[..=i]));
            }
        }
        let snapshot = c16.clone();
        c16.update(0x00);
        assert_eq!(snapshot.checksum(), FRAME_CRC.checksum(&data));
        assert_ne!(format!("{c8:?}"), "");
    }

    #[test]
    fn appending_checksum_yields_zero_residue() {
        let mut sink = ByteSink::new();
        sink.push_callback(Box::new(Crc16::new()));
        sink.write_bytes_aligned(&[0xFF, 0xF8, 0x69, 0x02, 0x00, 0x17])
            .unwrap_or(0);
        let crc = sink.pop_callback().map_or(0, |c| c.value());
        sink.write(crc as u16).unwrap_or(());
        assert_eq!(FRAME_CRC.checksum(sink.as_slice()), 0);
    }
}
