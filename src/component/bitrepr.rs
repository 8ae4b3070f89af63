// Copyright 2022-2024 Google LLC
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

use std::cmp::max;

use crate::bitsink::BitSink;
use crate::bitsink::ByteAccumulator;
#[cfg(test)]
use crate::bitsink::ByteSink;
use crate::constant::container::STREAM_INFO_SIZE;
use crate::constant::container::STREAM_INFO_TYPE;
use crate::constant::container::STREAM_MARKER;
use crate::constant::panic_msg;
use crate::constant::qlpc::PRECISION_BITS;
use crate::constant::qlpc::SHIFT_BITS;
use crate::crc::Crc16;
use crate::crc::Crc8;
use crate::error::OutputError;
use crate::error::RangeError;
use crate::rice::encode_signbit;

use super::datatype::Constant;
use super::datatype::FixedLpc;
use super::datatype::Frame;
use super::datatype::FrameHeader;
use super::datatype::Lpc;
use super::datatype::Residual;
use super::datatype::StreamInfo;
use super::datatype::SubFrame;
use super::datatype::Verbatim;

pub mod seal_bit_repr {
    pub trait Sealed {}
    impl Sealed for super::StreamInfo {}
    impl Sealed for super::Frame {}
    impl Sealed for super::FrameHeader {}
    impl Sealed for super::SubFrame {}
    impl Sealed for super::Constant {}
    impl Sealed for super::FixedLpc {}
    impl Sealed for super::Verbatim {}
    impl Sealed for super::Lpc {}
    impl Sealed for super::Residual {}
}

/// FLAC components that can be represented in a bit sequence.
pub trait BitRepr: seal_bit_repr::Sealed {
    /// Counts the number of bits required to store the component.
    fn count_bits(&self) -> usize;

    /// Writes the bit sequence to `BitSink`.
    ///
    /// # Errors
    ///
    /// This function returns error if `self` contains an invalid value that
    /// does not fit to FLAC's bitstream format, or if a `BitSink` method
    /// returned an error.
    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>>;

    /// Test utility for obtaining bits as a [`Vec`] of [`u8`].
    #[cfg(test)]
    fn to_bytes(&self) -> Vec<u8> {
        let mut sink = ByteSink::new();
        self.write(&mut sink).expect("No error expected");
        sink.into_inner()
    }

    /// Test utility for obtaining bits as eight-bit separated `String`.
    #[cfg(test)]
    fn to_bitstring(&self) -> String {
        let mut sink = ByteSink::new();
        self.write(&mut sink).expect("No error expected");
        sink.to_bitstring()
    }

    #[cfg(test)]
    /// Checks if the number of bits actually written equals to the expected number of bits.
    ///
    /// # Errors
    ///
    /// If the check passed i.e. the number of bits actually written is as same as the expected
    /// number, it returns `Ok(bits)`. Otherwise, it returns `Err((expected_bits, actual_bits))`.
    fn verify_bit_counter(&self) -> Result<usize, (usize, usize)> {
        let expected = self.count_bits();
        let mut sink = ByteSink::new();
        self.write(&mut sink).expect("No error expected");
        if expected == sink.len() {
            Ok(expected)
        } else {
            Err((expected, sink.len()))
        }
    }
}

/// Runs `f` with `acc` attached to `dest` and returns the accumulated value.
///
/// The accumulator is detached even when `f` fails.
fn with_accumulator<S, F>(
    dest: &mut S,
    acc: Box<dyn ByteAccumulator>,
    f: F,
) -> Result<u64, OutputError<S>>
where
    S: BitSink,
    F: FnOnce(&mut S) -> Result<(), OutputError<S>>,
{
    dest.push_callback(acc);
    let result = f(dest);
    let acc = dest.pop_callback().expect(panic_msg::DATA_INCONSISTENT);
    result?;
    Ok(acc.value())
}

/// Lookup table for `encode_to_utf8like`.
const UTF8_HEADS: [u8; 7] = [0x80, 0xC0, 0xE0, 0xF0, 0xF8, 0xFC, 0xFE];

/// Encodes the given integer into UTF-8-like byte sequence.
///
/// # Errors
///
/// It returns an error if `val` exceeds 36-bit value.
///
/// # Examples
///
/// ```
/// # use flacore::component::encode_to_utf8like;
/// assert_eq!(encode_to_utf8like(0x56).unwrap().as_slice(), &[0x56]);
/// assert_eq!(encode_to_utf8like(0x1024).unwrap().as_slice(), &[0xE1, 0x80, 0xA4]);
/// assert!(encode_to_utf8like(1 << 36).is_err());
/// ```
#[inline]
pub fn encode_to_utf8like(val: u64) -> Result<heapless::Vec<u8, 7>, RangeError> {
    let code_bits: usize = (u64::BITS - val.leading_zeros()) as usize;
    if code_bits <= 7 {
        let mut ret = heapless::Vec::new();
        ret.push(val as u8).expect(panic_msg::DATA_INCONSISTENT);
        return Ok(ret);
    }
    if code_bits > 36 {
        return Err(RangeError::from_display(
            "input",
            "cannot exceed 36 bits.",
            &val,
        ));
    }
    // A sequence with `n` trailing bytes stores `5n + 6` bits.
    let trailing_bytes: usize = (code_bits - 2) / 5;
    let mut bytes = [0u8; 7];
    let mut rest = val;
    for i in (1..=trailing_bytes).rev() {
        bytes[i] = 0x80 | (rest & 0x3F) as u8;
        rest >>= 6;
    }
    bytes[0] = UTF8_HEADS[trailing_bytes] | rest as u8;
    Ok(heapless::Vec::from_slice(&bytes[..=trailing_bytes]).expect(panic_msg::DATA_INCONSISTENT))
}

/// Computes the number of bytes required for UTF-8-like encoding of `val`.
const fn utf8like_bytesize(val: u64) -> usize {
    let code_bits: usize = (u64::BITS - val.leading_zeros()) as usize;
    if code_bits <= 7 {
        1
    } else {
        1 + (code_bits - 2) / 5
    }
}

/// Writes the stream marker and the `STREAMINFO` metadata block.
///
/// The block is marked as the last metadata block.
///
/// # Errors
///
/// Returns an error if a field of `info` does not fit the format, or if the
/// sink fails.
///
/// # Examples
///
/// ```
/// # use flacore::bitsink::ByteSink;
/// # use flacore::component::*;
/// let info = StreamInfo::new(44100, 2, 16).unwrap();
/// let mut sink = ByteSink::new();
/// write_stream_header(&info, &mut sink).unwrap();
/// assert_eq!(sink.byte_len(), 42);
/// assert_eq!(&sink.as_slice()[..8], b"fLaC\x80\x00\x00\x22");
/// ```
pub fn write_stream_header<S: BitSink>(
    info: &StreamInfo,
    dest: &mut S,
) -> Result<(), OutputError<S>> {
    dest.write_bytes_aligned(&STREAM_MARKER)
        .map_err(OutputError::<S>::from_sink)?;
    dest.write_bits(1, 1)?;
    dest.write_bits(7, u64::from(STREAM_INFO_TYPE))?;
    dest.write_bits(24, STREAM_INFO_SIZE as u64)?;
    info.write(dest)
}

impl BitRepr for StreamInfo {
    #[inline]
    fn count_bits(&self) -> usize {
        STREAM_INFO_SIZE * 8
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        let (min_frame_size, max_frame_size) = self.frame_size_fields();
        dest.write_bits(16, self.min_block_size() as u64)?;
        dest.write_bits(16, self.max_block_size() as u64)?;
        dest.write_bits(24, u64::from(min_frame_size))?;
        dest.write_bits(24, u64::from(max_frame_size))?;
        dest.write_bits(20, self.sample_rate() as u64)?;
        dest.write_bits(3, (self.channels() - 1) as u64)?;
        dest.write_bits(5, (self.bits_per_sample() - 1) as u64)?;
        dest.write_bits(36, self.total_samples())?;
        dest.write_bytes_aligned(self.md5_digest())
            .map_err(OutputError::<S>::from_sink)?;
        Ok(())
    }
}

impl BitRepr for Frame {
    #[inline]
    fn count_bits(&self) -> usize {
        let header = self.header().count_bits();
        let body: usize = self.subframes().iter().map(BitRepr::count_bits).sum();

        let aligned = ((header + body + 7) >> 3) << 3;
        let footer = 16;
        aligned + footer
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        let crc = with_accumulator(dest, Box::new(Crc16::new()), |dest| {
            self.header().write(dest)?;
            for sub in self.subframes() {
                sub.write(dest)?;
            }
            dest.align_to_byte().map_err(OutputError::<S>::from_sink)?;
            Ok(())
        })?;
        dest.write_bits(16, crc)
    }
}

impl BitRepr for FrameHeader {
    #[inline]
    fn count_bits(&self) -> usize {
        let mut ret = 40;
        ret += 8 * utf8like_bytesize(self.frame_number());
        ret += self.block_size_spec().count_extra_bits();
        ret += self.sample_rate_spec().count_extra_bits();
        ret
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        let crc = with_accumulator(dest, Box::new(Crc8::new()), |dest| {
            // sync-code + reserved 1-bit + fixed-blocking indicator
            dest.write_bits(16, 0xFFF8)?;
            dest.write_bits(4, u64::from(self.block_size_spec().tag()))?;
            dest.write_bits(4, u64::from(self.sample_rate_spec().tag()))?;
            dest.write_bits(4, u64::from(self.channel_assignment().tag()))?;
            dest.write_bits(3, u64::from(self.sample_size_spec().into_tag()))?;
            dest.write_bits(1, 0)?;
            for b in encode_to_utf8like(self.frame_number())?.iter() {
                dest.write_bits(8, u64::from(*b))?;
            }
            let (v, width) = self.block_size_spec().extra_field();
            if width > 0 {
                dest.write_bits(width, v)?;
            }
            let (v, width) = self.sample_rate_spec().extra_field();
            if width > 0 {
                dest.write_bits(width, v)?;
            }
            Ok(())
        })?;
        dest.write_bits(8, crc)
    }
}

impl BitRepr for SubFrame {
    #[inline]
    fn count_bits(&self) -> usize {
        match self {
            Self::Verbatim(c) => c.count_bits(),
            Self::Constant(c) => c.count_bits(),
            Self::FixedLpc(c) => c.count_bits(),
            Self::Lpc(c) => c.count_bits(),
        }
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        match self {
            Self::Verbatim(c) => c.write(dest),
            Self::Constant(c) => c.write(dest),
            Self::FixedLpc(c) => c.write(dest),
            Self::Lpc(c) => c.write(dest),
        }
    }
}

/// Writes the zero pad bit, the 6-bit type, and the wasted-bits field.
fn write_subframe_header<S: BitSink>(
    dest: &mut S,
    type_bits: u8,
    wasted_bits: usize,
) -> Result<(), OutputError<S>> {
    let head_byte = (type_bits << 1) | u8::from(wasted_bits > 0);
    dest.write_bits(8, u64::from(head_byte))?;
    if wasted_bits > 0 {
        dest.write_unary(true, wasted_bits - 1)
            .map_err(OutputError::<S>::from_sink)?;
    }
    Ok(())
}

fn write_samples<S: BitSink>(
    dest: &mut S,
    samples: &[i32],
    bits: usize,
) -> Result<(), OutputError<S>> {
    for v in samples {
        dest.write_signed_bits(bits, i64::from(*v))?;
    }
    Ok(())
}

impl BitRepr for Constant {
    #[inline]
    fn count_bits(&self) -> usize {
        8 + self.bits_per_sample()
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        write_subframe_header(dest, 0x00, 0)?;
        dest.write_signed_bits(self.bits_per_sample(), i64::from(self.dc_offset()))
    }
}

impl BitRepr for Verbatim {
    #[inline]
    fn count_bits(&self) -> usize {
        Self::count_bits_from_metadata(
            self.samples().len(),
            self.bits_per_sample(),
            self.wasted_bits(),
        )
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        write_subframe_header(dest, 0x01, self.wasted_bits())?;
        write_samples(
            dest,
            self.samples(),
            self.bits_per_sample() - self.wasted_bits(),
        )
    }
}

impl BitRepr for FixedLpc {
    #[inline]
    fn count_bits(&self) -> usize {
        let sample_bits = self.bits_per_sample() - self.wasted_bits();
        8 + self.wasted_bits() + sample_bits * self.order() + self.residual().count_bits()
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        write_subframe_header(dest, 0x08 | self.order() as u8, self.wasted_bits())?;
        write_samples(
            dest,
            self.warm_up(),
            self.bits_per_sample() - self.wasted_bits(),
        )?;
        self.residual().write(dest)
    }
}

impl BitRepr for Lpc {
    #[inline]
    fn count_bits(&self) -> usize {
        let sample_bits = self.bits_per_sample() - self.wasted_bits();
        8 + self.wasted_bits()
            + sample_bits * self.order()
            + PRECISION_BITS
            + SHIFT_BITS
            + self.parameters().precision() * self.order()
            + self.residual().count_bits()
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        let order = self.order();
        if order == 0 {
            return Err(RangeError::from_display("order", "must be positive", &order).into());
        }
        write_subframe_header(dest, 0x20 | (order - 1) as u8, self.wasted_bits())?;
        write_samples(
            dest,
            self.warm_up(),
            self.bits_per_sample() - self.wasted_bits(),
        )?;

        let params = self.parameters();
        dest.write_bits(PRECISION_BITS, (params.precision() - 1) as u64)?;
        dest.write_signed_bits(SHIFT_BITS, i64::from(params.shift()))?;
        for j in 0..order {
            dest.write_signed_bits(params.precision(), i64::from(params.coef(j)))?;
        }
        self.residual().write(dest)
    }
}

impl BitRepr for Residual {
    #[inline]
    fn count_bits(&self) -> usize {
        2 + 4 + self.code_bits()
    }

    fn write<S: BitSink>(&self, dest: &mut S) -> Result<(), OutputError<S>> {
        let method = self.coding_method();
        let param_bits = 4 + method as usize;
        dest.write_bits(2, u64::from(method))?;
        dest.write_bits(4, self.partition_order() as u64)?;

        let part_len = self.block_size() >> self.partition_order();
        let residuals = self.residuals();
        for (p, rice_p) in self.rice_params().iter().enumerate() {
            let rice_p = *rice_p as usize;
            dest.write_bits(param_bits, rice_p as u64)?;
            let start = max(self.warmup_length(), p * part_len);
            let end = (p + 1) * part_len;
            let mask = (1u64 << rice_p) - 1;
            for r in residuals.iter().take(end).skip(start) {
                let folded = u64::from(encode_signbit(*r));
                dest.write_unary(true, (folded >> rice_p) as usize)
                    .map_err(OutputError::<S>::from_sink)?;
                dest.write_lsbs(folded & mask, rice_p)
                    .map_err(OutputError::<S>::from_sink)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ChannelAssignment;
    use crate::crc::FRAME_CRC;
    use crate::crc::HEADER_CRC;
    use crate::error::Verify;
    use crate::lpc::QuantizedParameters;
    use crate::test_helper::make_random_residual;
    use crate::test_helper::make_verbatim_frame;

    use rstest::rstest;

    #[test]
    fn write_stream_info() {
        let stream_info = StreamInfo::new(44100, 2, 16).expect("`StreamInfo::new` should not fail.");
        let stream_info_bytes = stream_info.to_bytes();
        assert_eq!(
            stream_info_bytes.len() * 8,
            16 + 16 + 24 + 24 + 20 + 3 + 5 + 36 + 128
        );
        assert_eq!(stream_info.count_bits(), stream_info_bytes.len() * 8);
        // frame sizes are unknown before any frame is registered.
        assert_eq!(&stream_info_bytes[4..10], &[0u8; 6]);
        // 44100 Hz, 2 channels, 16 bits.
        assert_eq!(&stream_info_bytes[10..13], &[0x0A, 0xC4, 0x42]);
        assert_eq!(stream_info_bytes[13], 0xF0);
    }

    #[test]
    fn write_frame_header() {
        let header = FrameHeader::new(2304, ChannelAssignment::Independent(2), 16, 192_000, 0)
            .expect("valid header");
        header.to_bytes(); // just checking it doesn't panic.

        // test with canonical frame
        let header = FrameHeader::new(192, ChannelAssignment::Independent(2), 10, 1_000_001, 0)
            .expect("valid header");
        header
            .verify_bit_counter()
            .expect("`FrameHeader::count_bits` should be accurate.");
        assert_eq!(
            header.to_bitstring(),
            concat!(
                "11111111_111110", // sync
                "00_",             // reserved/ blocking strategy (fixed)
                "00010000_",       // block size/ sample_rate (0=header)
                "00010000_",       // channel/ bps (0=header)/ reserved
                "00000000_",       // frame number
                "01111111",        // crc8
            )
        );

        assert_eq!(header.count_bits(), 48);
    }

    #[rstest]
    fn header_crc_covers_extra_fields(
        #[values(16, 192, 1000, 4096, 65535)] block_size: usize,
        #[values(8000, 11025, 12000, 44100, 300_000)] sample_rate: usize,
        #[values(0, 1, 200, 0x1_0000, 0xFFFF_FFFF)] frame_number: u64,
    ) {
        let header = FrameHeader::new(
            block_size,
            ChannelAssignment::MidSide,
            24,
            sample_rate,
            frame_number,
        )
        .expect("valid header");
        let bytes = header.to_bytes();
        assert_eq!(bytes.len() * 8, header.count_bits());
        assert_eq!(HEADER_CRC.checksum(&bytes), 0);
    }

    #[test]
    fn utf8like_encoding() {
        assert_eq!(encode_to_utf8like(0x7F).unwrap().as_slice(), &[0x7F]);
        assert_eq!(encode_to_utf8like(0x80).unwrap().as_slice(), &[0xC2, 0x80]);
        assert_eq!(
            encode_to_utf8like((1 << 36) - 1).unwrap().as_slice(),
            &[0xFE, 0xBF, 0xBF, 0xBF, 0xBF, 0xBF, 0xBF]
        );
        for v in [0u64, 0x7F, 0x80, 0x7FF, 0x800, 0xFFFF, 0x1_0000, 1 << 31, (1 << 36) - 1] {
            assert_eq!(encode_to_utf8like(v).unwrap().len(), utf8like_bytesize(v));
        }
    }

    #[test]
    fn constant_subframe_bits() {
        let sf = Constant::new(64, -3, 12).unwrap();
        assert_eq!(sf.to_bitstring(), "00000000_11111111_1101****");
        sf.verify_bit_counter().unwrap();
    }

    #[test]
    fn verbatim_subframe_with_wasted_bits() {
        let sf = Verbatim::new(&[1, -1], 8, 3).unwrap();
        assert_eq!(sf.to_bitstring(), "00000011_00100001_11111***");
        sf.verify_bit_counter().unwrap();
    }

    #[test]
    fn residual_codes() {
        let residual = Residual::new(0, 4, 0, &[1], &[0, -1, 1, 2]).unwrap();
        assert_eq!(residual.to_bitstring(), "00000000_01101101_00010***");
        assert_eq!(residual.count_bits(), 21);
    }

    #[test]
    fn residual_with_extended_parameters() {
        let residual = Residual::new(0, 2, 0, &[15], &[1, -1]).unwrap();
        assert_eq!(residual.coding_method(), 1);
        let bits = residual.to_bitstring();
        assert!(bits.starts_with("01000001_111"));
        residual.verify_bit_counter().unwrap();
    }

    #[test]
    fn fixed_and_lpc_header_bytes() {
        let residual = Residual::new(0, 8, 2, &[0], &[0; 8]).unwrap();
        let fixed = FixedLpc::new(&[1, 2], residual.clone(), 8, 0).unwrap();
        assert_eq!(fixed.to_bytes()[0], 0x14);
        fixed.verify_bit_counter().unwrap();

        let params = QuantizedParameters::from_parts(&[3, -1], 2, 5);
        let lpc = Lpc::new(&[1, 2], params, residual, 8, 0).unwrap();
        let bytes = lpc.to_bytes();
        assert_eq!(bytes[0], 0x42);
        lpc.verify_bit_counter().unwrap();
        // warm-up (8 + 8), precision - 1 = 4, shift = 2, coefs = 3, -1.
        assert_eq!(
            lpc.to_bitstring()[..47].to_owned(),
            "01000010_00000001_00000010_01000001_00001111_11"
        );
    }

    #[test]
    fn write_verbatim_frame() {
        let nchannels: usize = 3;
        let nsamples: usize = 17;
        let bits_per_sample: usize = 16;
        let stream_info = StreamInfo::new(16000, nchannels, bits_per_sample)
            .expect("`StreamInfo::new` should not return error");
        let framebuf = vec![-1i32; nsamples * nchannels];
        let frame = make_verbatim_frame(&stream_info, &framebuf, 0);
        frame
            .header()
            .verify_bit_counter()
            .expect("`FrameHeader::count_bits` should be accurate.");

        for ch in 0..3 {
            frame
                .subframe(ch)
                .unwrap()
                .verify_bit_counter()
                .expect("`SubFrame::count_bits` should be accurate.");
        }

        frame
            .verify_bit_counter()
            .expect("`Frame::count_bits` should be accurate.");
        let bytes = frame.to_bytes();
        assert_eq!(FRAME_CRC.checksum(&bytes), 0);
        let header_len = frame.header().count_bits() / 8;
        assert_eq!(HEADER_CRC.checksum(&bytes[..header_len]), 0);
    }

    #[test]
    fn frame_write_detaches_accumulators_on_error() {
        // 16-bit dc offset stored in a subframe declared as 8-bit.
        let header = FrameHeader::new(16, ChannelAssignment::Independent(1), 8, 8000, 0).unwrap();
        let bad = Constant::from_parts(16, 1000, 8);
        let frame = Frame::new(header, vec![bad.into()]).unwrap();
        let mut sink = ByteSink::new();
        assert!(frame.write(&mut sink).is_err());
        assert!(sink.pop_callback().is_none());
    }

    #[test]
    fn bit_count_residual() {
        for warmup in [0, 1, 4, 32] {
            let residual = make_random_residual(rand::thread_rng(), warmup);
            residual
                .verify()
                .expect("should construct a valid Residual");
            residual
                .verify_bit_counter()
                .expect("`Residual::count_bits` should be accurate");
        }
    }
}
