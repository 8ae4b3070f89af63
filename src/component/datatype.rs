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
use std::cmp::min;

#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::bitrepr::BitRepr;
use super::verify::verify_block_size;
use crate::constant::fixed::MAX_LPC_ORDER as MAX_FIXED_ORDER;
use crate::constant::qlpc::MAX_ORDER as MAX_LPC_ORDER;
use crate::constant::MAX_CHANNELS;
use crate::error::verify_range;
use crate::error::verify_true;
use crate::error::Verify;
use crate::error::VerifyError;
use crate::lpc::QuantizedParameters;
use crate::rice;

/// [`METADATA_BLOCK_STREAM_INFO`](https://xiph.org/flac/format.html#metadata_block_streaminfo) component.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StreamInfo {
    min_block_size: u16, // 16 bits: Minimum block size in samples.
    max_block_size: u16, // 16 bits: Maximum block size in samples.
    min_frame_size: u32, // 24 bits: Minimum frame size in bytes.
    max_frame_size: u32, // 24 bits: Maximum frame size in bytes.
    sample_rate: u32,    // 20 bits: Sample rate in Hz.
    channels: u8,        // 3 bits: will be written with a bias (-1)
    bits_per_sample: u8, // 5 bits: will be written with a bias (-1)
    total_samples: u64,  // 36 bits: Can be zero (unknown)
    md5: [u8; 16],
}

impl StreamInfo {
    /// Constructs new `StreamInfo`.
    ///
    /// For unspecified fields, the following default values are used:
    ///
    /// -  `min_block_size`: [`u16::MAX`],
    /// -  `max_block_size`: `0`,
    /// -  `min_frame_size`: [`u32::MAX`],
    /// -  `max_frame_size`: `0`,
    /// -  `total_samples`: `0`,
    /// -  `md5_digest`: `[0u8; 16]` (indicating verification disabled.)
    ///
    /// # Errors
    ///
    /// Returns an error if an input argument is out of range.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::component::*;
    /// let info = StreamInfo::new(16000, 2, 16).unwrap();
    /// assert_eq!(info.max_frame_size(), 0);
    /// assert!(StreamInfo::new(16000, 9, 16).is_err());
    /// ```
    pub fn new(
        sample_rate: usize,
        channels: usize,
        bits_per_sample: usize,
    ) -> Result<Self, VerifyError> {
        let ret = Self {
            min_block_size: u16::MAX,
            max_block_size: 0,
            min_frame_size: u32::MAX,
            max_frame_size: 0,
            sample_rate: sample_rate as u32,
            channels: channels as u8,
            bits_per_sample: bits_per_sample as u8,
            total_samples: 0,
            md5: [0; 16],
        };
        verify_range!("channels", channels, 1..=MAX_CHANNELS)?;
        verify_range!("sample_rate", sample_rate, ..=(crate::constant::MAX_SAMPLE_RATE))?;
        ret.verify()?;
        Ok(ret)
    }

    /// Updates frame size bounds and the sample count with the given [`Frame`].
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::component::*;
    /// let mut info = StreamInfo::new(16000, 1, 16).unwrap();
    /// let header = FrameHeader::new(192, ChannelAssignment::Independent(1), 16, 16000, 0).unwrap();
    /// let frame = Frame::new(header, vec![Constant::new(192, 0, 16).unwrap().into()]).unwrap();
    /// info.update_frame_info(&frame);
    /// assert_eq!(info.min_frame_size(), info.max_frame_size());
    /// assert_eq!(info.total_samples(), 192);
    /// ```
    pub fn update_frame_info(&mut self, frame: &Frame) {
        let frame_size_in_bytes = (frame.count_bits() / 8) as u32;
        self.min_frame_size = min(frame_size_in_bytes, self.min_frame_size);
        self.max_frame_size = max(frame_size_in_bytes, self.max_frame_size);
        self.total_samples += frame.block_size() as u64;
    }

    /// Returns the minimum frame size in bytes.
    ///
    /// Returns `u32::MAX` (as `usize`) until a frame is registered.
    #[inline]
    pub fn min_frame_size(&self) -> usize {
        self.min_frame_size as usize
    }

    /// Returns the maximum frame size in bytes.
    #[inline]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size as usize
    }

    /// Returns the minimum block size.
    #[inline]
    pub fn min_block_size(&self) -> usize {
        self.min_block_size as usize
    }

    /// Returns the maximum block size.
    #[inline]
    pub fn max_block_size(&self) -> usize {
        self.max_block_size as usize
    }

    /// Returns the sample rate in Hz.
    #[inline]
    pub fn sample_rate(&self) -> usize {
        self.sample_rate as usize
    }

    /// Returns the number of channels.
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels as usize
    }

    /// Returns bits-per-sample.
    #[inline]
    pub fn bits_per_sample(&self) -> usize {
        self.bits_per_sample as usize
    }

    /// Returns the total number of inter-channel samples (0 means unknown).
    #[inline]
    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    /// Returns MD5 digest of the input signal.
    ///
    /// All zeros means that the digest is not computed.
    #[inline]
    pub fn md5_digest(&self) -> &[u8; 16] {
        &self.md5
    }

    /// Sets the MD5 digest of the input signal.
    #[inline]
    pub fn set_md5_digest(&mut self, digest: &[u8; 16]) {
        self.md5.copy_from_slice(digest);
    }

    /// Resets the minimum/ maximum block sizes.
    ///
    /// # Errors
    ///
    /// Returns error when `min_value` or `max_value` is not a valid block size, or when
    /// `min_value > max_value`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::component::*;
    /// let mut info = StreamInfo::new(16000, 2, 16).unwrap();
    /// info.set_block_sizes(4096, 4096).unwrap();
    /// assert_eq!(info.min_block_size(), 4096);
    /// assert!(info.set_block_sizes(1024, 128).is_err());
    /// ```
    pub fn set_block_sizes(
        &mut self,
        min_value: usize,
        max_value: usize,
    ) -> Result<(), VerifyError> {
        verify_block_size!("min_block_size", min_value)?;
        verify_block_size!("max_block_size", max_value)?;
        verify_true!(
            "min_block_size",
            min_value <= max_value,
            "must be smaller than `max_block_size`"
        )?;
        self.min_block_size = min_value as u16;
        self.max_block_size = max_value as u16;
        Ok(())
    }

    /// Returns the frame size bounds as they are written to the stream.
    ///
    /// Unknown bounds (no frame registered) are reported as `(0, 0)`.
    #[inline]
    pub(crate) fn frame_size_fields(&self) -> (u32, u32) {
        if self.min_frame_size > self.max_frame_size {
            (0, 0)
        } else {
            (self.min_frame_size, self.max_frame_size)
        }
    }
}

/// [`FRAME`](https://xiph.org/flac/format.html#frame) component.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Frame {
    header: FrameHeader,
    subframes: Vec<SubFrame>,
}

impl Frame {
    /// Constructs `Frame` from header and subframes.
    ///
    /// # Errors
    ///
    /// Emits error if the number of channel specified in `header` does not match
    /// to the length of `subframes`, or if a subframe length differs from the
    /// block size.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::component::*;
    /// let chs = ChannelAssignment::Independent(1);
    /// let header = FrameHeader::new(192, chs, 8, 44100, 0).unwrap();
    /// let subframe = Constant::new(192, -1, 8).unwrap();
    /// let frame = Frame::new(header, vec![subframe.into()]).unwrap();
    /// assert_eq!(frame.subframe_count(), 1);
    /// ```
    pub fn new(header: FrameHeader, subframes: Vec<SubFrame>) -> Result<Self, VerifyError> {
        verify_true!(
            "subframes.len()",
            header.channel_assignment().channels() == subframes.len(),
            "must match to the channel specification in the header"
        )?;
        for (ch, sf) in subframes.iter().enumerate() {
            verify_true!(
                "subframes[{ch}].block_size()",
                sf.block_size() == header.block_size(),
                "must match to the block size in the header"
            )?;
        }
        Ok(Self { header, subframes })
    }

    /// Returns a reference to [`FrameHeader`] of this frame.
    #[inline]
    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Returns [`SubFrame`] for the given channel.
    #[inline]
    pub fn subframe(&self, ch: usize) -> Option<&SubFrame> {
        self.subframes.get(ch)
    }

    /// Returns the number of [`SubFrame`]s in this `Frame`.
    #[inline]
    pub fn subframe_count(&self) -> usize {
        self.subframes.len()
    }

    #[inline]
    pub(crate) fn subframes(&self) -> &[SubFrame] {
        &self.subframes
    }

    /// Returns block size of this frame.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.header.block_size()
    }
}

/// Enum for channel assignment in `FRAME_HEADER`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", content = "data"))]
pub enum ChannelAssignment {
    /// Indicates that the frame contains multiple channels independently.
    ///
    /// The `u8` field indicates the number of channels. This is the only
    /// option if the number of channels is not two.
    Independent(u8),
    /// Indicates that the frame contains left and side channels.
    LeftSide,
    /// Indicates that the frame contains right and side channels.
    RightSide,
    /// Indicates that the frame contains mid and side channels.
    MidSide,
}

impl ChannelAssignment {
    /// Constructs `ChannelAssignment` from the tag.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::component::*;
    /// assert_eq!(
    ///     ChannelAssignment::from_tag(5),
    ///     Some(ChannelAssignment::Independent(6)),
    /// );
    /// assert_eq!(
    ///     ChannelAssignment::from_tag(10),
    ///     Some(ChannelAssignment::MidSide),
    /// );
    /// assert_eq!(ChannelAssignment::from_tag(11), None);
    /// ```
    #[inline]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0..=7 => Some(Self::Independent(tag + 1)),
            8 => Some(Self::LeftSide),
            9 => Some(Self::RightSide),
            10 => Some(Self::MidSide),
            _ => None,
        }
    }

    /// Returns the 4-bit tag written in the frame header.
    #[inline]
    pub const fn tag(&self) -> u8 {
        match *self {
            Self::Independent(ch) => ch.saturating_sub(1),
            Self::LeftSide => 8,
            Self::RightSide => 9,
            Self::MidSide => 10,
        }
    }

    /// Returns the number of extra bit required to store the channel samples.
    ///
    /// The side (difference) signal needs one more bit than the input.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::component::*;
    /// let rs = ChannelAssignment::RightSide;
    /// // Right-side coding stores the side signal in channel-0.
    /// assert_eq!(rs.bits_per_sample_offset(0), 1);
    /// assert_eq!(rs.bits_per_sample_offset(1), 0);
    /// ```
    #[inline]
    pub const fn bits_per_sample_offset(&self, ch: usize) -> usize {
        #[allow(clippy::match_same_arms, clippy::bool_to_int_with_if)]
        match *self {
            Self::Independent(_) => 0,
            Self::LeftSide | Self::MidSide => {
                if ch == 1 {
                    1
                } else {
                    0
                }
            }
            Self::RightSide => {
                if ch == 0 {
                    1
                } else {
                    0
                }
            }
        }
    }

    /// Returns the number of channels.
    #[inline]
    pub fn channels(&self) -> usize {
        if let Self::Independent(n) = self {
            *n as usize
        } else {
            2
        }
    }
}

/// Reimplementation of `u32::ilog2` for older rust compilers.
#[inline]
fn ilog2(x: u32) -> u32 {
    31 - x.leading_zeros()
}

/// Enum for block size specifier in [`FrameHeader`].
///
/// Refer [`FRAME_HEADER`](https://xiph.org/flac/format.html#frame_header)
/// specification for details.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum BlockSizeSpec {
    /// Special case when `size = 192`.
    S192,
    /// Size that can be represented as `size = 576 * 2^n` where `n` in `0..=3`.
    Pow2Mul576(u8),
    /// Size that is stored in a byte at the end of [`FrameHeader`].
    ExtraByte(u8),
    /// Size that is stored in two bytes at the end of [`FrameHeader`].
    ExtraTwoBytes(u16),
    /// Size that can be represented as `size = 256 * 2^n` where `n` in `0..=7`.
    Pow2Mul256(u8),
}

impl BlockSizeSpec {
    /// Constructs `BlockSizeSpec` from the block size.
    ///
    /// `size` must be non-zero.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::component::*;
    /// assert_eq!(BlockSizeSpec::from_size(4096).tag(), 12);
    /// assert_eq!(BlockSizeSpec::from_size(1152).tag(), 3);
    /// assert_eq!(BlockSizeSpec::from_size(100), BlockSizeSpec::ExtraByte(99));
    /// assert_eq!(BlockSizeSpec::from_size(1000), BlockSizeSpec::ExtraTwoBytes(999));
    /// ```
    #[inline]
    pub fn from_size(size: u16) -> Self {
        match size {
            192 => Self::S192,
            576 | 1152 | 2304 | 4608 => Self::Pow2Mul576(ilog2(u32::from(size / 576)) as u8),
            256 | 512 | 1024 | 2048 | 4096 | 8192 | 16384 | 32768 => {
                Self::Pow2Mul256(ilog2(u32::from(size / 256)) as u8)
            }
            x if x <= 256 => Self::ExtraByte(x.saturating_sub(1) as u8),
            x => Self::ExtraTwoBytes(x - 1),
        }
    }

    /// Returns the number of extra bits required to store the specification.
    #[inline]
    pub(crate) fn count_extra_bits(self) -> usize {
        match self {
            Self::ExtraByte(_) => 8,
            Self::ExtraTwoBytes(_) => 16,
            Self::S192 | Self::Pow2Mul576(_) | Self::Pow2Mul256(_) => 0,
        }
    }

    /// Returns the block size represented by this specifier.
    #[inline]
    pub fn block_size(self) -> usize {
        match self {
            Self::S192 => 192,
            Self::Pow2Mul576(x) => 576usize << x,
            Self::ExtraByte(x) => x as usize + 1,
            Self::ExtraTwoBytes(x) => x as usize + 1,
            Self::Pow2Mul256(x) => 256usize << x,
        }
    }

    /// Returns 4-bit indicator for the block-size specifier.
    #[inline]
    pub fn tag(self) -> u8 {
        match self {
            Self::S192 => 1,
            Self::Pow2Mul576(x) => 2 + x,
            Self::ExtraByte(_) => 6,
            Self::ExtraTwoBytes(_) => 7,
            Self::Pow2Mul256(x) => 8 + x,
        }
    }

    /// Returns the extra field as `(value, width)`.
    #[inline]
    pub(crate) fn extra_field(self) -> (u64, usize) {
        match self {
            Self::ExtraByte(v) => (u64::from(v), 8),
            Self::ExtraTwoBytes(v) => (u64::from(v), 16),
            Self::S192 | Self::Pow2Mul576(_) | Self::Pow2Mul256(_) => (0, 0),
        }
    }
}

/// Enum for supported sample sizes.
///
/// Refer [`FRAME_HEADER`](https://xiph.org/flac/format.html#frame_header)
/// specification for details.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum SampleSizeSpec {
    /// Instructs decoders to get sample size information from `StreamInfo`.
    Unspecified = 0,
    /// 8 bits-per-sample
    B8 = 1,
    /// 12 bits-per-sample
    B12 = 2,
    /// 16 bits-per-sample
    B16 = 4,
    /// 20 bits-per-sample
    B20 = 5,
    /// 24 bits-per-sample
    B24 = 6,
}

impl SampleSizeSpec {
    /// Returns the tag (an integer in the bitstream) corresponding to `self`.
    #[inline]
    pub const fn into_tag(self) -> u8 {
        self as u8
    }

    /// Constructs `SampleSizeSpec` from the bits-per-sample value.
    ///
    /// Sizes without a dedicated code map to `Unspecified`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::component::*;
    /// assert_eq!(SampleSizeSpec::from_bits(16), SampleSizeSpec::B16);
    /// assert_eq!(SampleSizeSpec::from_bits(10), SampleSizeSpec::Unspecified);
    /// ```
    #[inline]
    pub const fn from_bits(bits: usize) -> Self {
        match bits {
            8 => Self::B8,
            12 => Self::B12,
            16 => Self::B16,
            20 => Self::B20,
            24 => Self::B24,
            _ => Self::Unspecified,
        }
    }

    /// Returns the bits-per-sample value corresponding to `self`.
    #[inline]
    pub const fn into_bits(self) -> Option<usize> {
        match self {
            Self::Unspecified => None,
            Self::B8 => Some(8),
            Self::B12 => Some(12),
            Self::B16 => Some(16),
            Self::B20 => Some(20),
            Self::B24 => Some(24),
        }
    }
}

/// Enum for supported sampling rates.
///
/// Refer [`FRAME_HEADER`](https://xiph.org/flac/format.html#frame_header)
/// specification for details.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum SampleRateSpec {
    /// Instructs decoders to get sample rate information from `StreamInfo`.
    Unspecified,
    /// 88.2kHz.
    R88_2kHz,
    /// 176.4kHz.
    R176_4kHz,
    /// 192kHz.
    R192kHz,
    /// 8kHz.
    R8kHz,
    /// 16kHZ.
    R16kHz,
    /// 22.05kHz.
    R22_05kHz,
    /// 24kHz.
    R24kHz,
    /// 32kHz.
    R32kHz,
    /// 44.1kHz.
    R44_1kHz,
    /// 48kHz.
    R48kHz,
    /// 96kHz.
    R96kHz,
    /// An immediate value specifying kHz up to 255kHz.
    KHz(u8),
    /// An immediate value specifying Hz up to 65535Hz.
    Hz(u16),
    /// An immediate value specifying deca-Hz up to 655.35kHz.
    DaHz(u16),
}

impl SampleRateSpec {
    /// Constructs `SampleRateSpec` from frequency in Hz.
    ///
    /// Non-typical frequencies are represented with `KHz`, `DaHz`, and `Hz`
    /// (tried in this order). Frequencies that none of them can represent
    /// become `Unspecified`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::component::*;
    /// assert_eq!(SampleRateSpec::from_freq(44100), SampleRateSpec::R44_1kHz);
    /// assert_eq!(SampleRateSpec::from_freq(12000), SampleRateSpec::KHz(12));
    /// assert_eq!(SampleRateSpec::from_freq(300_000), SampleRateSpec::DaHz(30000));
    /// assert_eq!(SampleRateSpec::from_freq(11025), SampleRateSpec::Hz(11025));
    /// assert_eq!(SampleRateSpec::from_freq(100_001), SampleRateSpec::Unspecified);
    /// ```
    #[inline]
    pub fn from_freq(freq: u32) -> Self {
        match freq {
            88_200 => Some(Self::R88_2kHz),
            176_400 => Some(Self::R176_4kHz),
            192_000 => Some(Self::R192kHz),
            8_000 => Some(Self::R8kHz),
            16_000 => Some(Self::R16kHz),
            22_050 => Some(Self::R22_05kHz),
            24_000 => Some(Self::R24kHz),
            32_000 => Some(Self::R32kHz),
            44_100 => Some(Self::R44_1kHz),
            48_000 => Some(Self::R48kHz),
            96_000 => Some(Self::R96kHz),
            _ => None,
        }
        .or_else(|| {
            (0 == freq % 1000)
                .then(|| (freq / 1000).try_into().ok().map(Self::KHz))
                .flatten()
        })
        .or_else(|| {
            (0 == freq % 10)
                .then(|| (freq / 10).try_into().ok().map(Self::DaHz))
                .flatten()
        })
        .or_else(|| freq.try_into().ok().map(Self::Hz))
        .unwrap_or(Self::Unspecified)
    }

    /// Returns the number of extra bits required to store the specification.
    #[inline]
    pub(crate) fn count_extra_bits(self) -> usize {
        self.extra_field().1
    }

    /// Returns the extra field as `(value, width)`.
    #[inline]
    pub(crate) fn extra_field(self) -> (u64, usize) {
        match self {
            Self::KHz(v) => (u64::from(v), 8),
            Self::DaHz(v) | Self::Hz(v) => (u64::from(v), 16),
            Self::Unspecified
            | Self::R88_2kHz
            | Self::R176_4kHz
            | Self::R192kHz
            | Self::R8kHz
            | Self::R16kHz
            | Self::R22_05kHz
            | Self::R24kHz
            | Self::R32kHz
            | Self::R44_1kHz
            | Self::R48kHz
            | Self::R96kHz => (0, 0),
        }
    }

    /// Returns 4-bit indicator for the sample-rate specifier.
    #[inline]
    pub fn tag(self) -> u8 {
        match self {
            Self::Unspecified => 0,
            Self::R88_2kHz => 1,
            Self::R176_4kHz => 2,
            Self::R192kHz => 3,
            Self::R8kHz => 4,
            Self::R16kHz => 5,
            Self::R22_05kHz => 6,
            Self::R24kHz => 7,
            Self::R32kHz => 8,
            Self::R44_1kHz => 9,
            Self::R48kHz => 10,
            Self::R96kHz => 11,
            Self::KHz(_) => 12,
            Self::Hz(_) => 13,
            Self::DaHz(_) => 14,
        }
    }
}

/// [`FRAME_HEADER`](https://xiph.org/flac/format.html#frame_header) component.
///
/// Only the fixed-blocking strategy is produced; frames are located by their
/// frame number.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameHeader {
    block_size_spec: BlockSizeSpec,
    channel_assignment: ChannelAssignment,
    sample_size_spec: SampleSizeSpec,
    sample_rate_spec: SampleRateSpec,
    frame_number: u64,
}

impl FrameHeader {
    #[inline]
    pub(crate) const fn from_specs(
        block_size_spec: BlockSizeSpec,
        channel_assignment: ChannelAssignment,
        sample_size_spec: SampleSizeSpec,
        sample_rate_spec: SampleRateSpec,
        frame_number: u64,
    ) -> Self {
        Self {
            block_size_spec,
            channel_assignment,
            sample_size_spec,
            sample_rate_spec,
            frame_number,
        }
    }

    /// Constructs `FrameHeader` from the given metadata.
    ///
    /// # Errors
    ///
    /// Returns error when `block_size`, `channel_assignment`, or
    /// `frame_number` is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::component::*;
    /// # use flacore::bitsink::*;
    /// let header = FrameHeader::new(
    ///     192, ChannelAssignment::Independent(1), 8, 44100, 0x1024
    /// ).unwrap();
    /// let mut sink = ByteSink::new();
    /// header.write(&mut sink).unwrap();
    /// assert_eq!(&sink.as_slice()[..7], &[
    ///     0xFF, 0xF8, // sync-code + fixed blocking
    ///     0x19, 0x02, // block size + rate + channel + sample size + reserved
    ///     0xE1, 0x80, 0xA4, // frame number encoded in utf-8
    /// ]);
    /// ```
    #[inline]
    pub fn new(
        block_size: usize,
        channel_assignment: ChannelAssignment,
        bits_per_sample: usize,
        sample_rate: usize,
        frame_number: u64,
    ) -> Result<Self, VerifyError> {
        verify_block_size!("block_size", block_size)?;
        channel_assignment.verify()?;
        let ret = Self::from_specs(
            BlockSizeSpec::from_size(block_size as u16),
            channel_assignment,
            SampleSizeSpec::from_bits(bits_per_sample),
            SampleRateSpec::from_freq(sample_rate as u32),
            frame_number,
        );
        ret.verify()?;
        Ok(ret)
    }

    /// Returns the frame number.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    #[inline]
    pub(crate) fn sample_rate_spec(&self) -> SampleRateSpec {
        self.sample_rate_spec
    }

    #[inline]
    pub(crate) fn sample_size_spec(&self) -> SampleSizeSpec {
        self.sample_size_spec
    }

    /// Returns block size.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size_spec.block_size()
    }

    /// Returns block size spec.
    #[inline]
    pub(crate) fn block_size_spec(&self) -> BlockSizeSpec {
        self.block_size_spec
    }

    /// Returns bits-per-sample if it is given in the header.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::component::*;
    /// let chs = ChannelAssignment::Independent(1);
    /// let header = FrameHeader::new(192, chs, 12, 44100, 0).unwrap();
    /// assert_eq!(header.bits_per_sample(), Some(12));
    /// let header = FrameHeader::new(192, chs, 10, 44100, 0).unwrap();
    /// assert_eq!(header.bits_per_sample(), None);
    /// ```
    #[inline]
    pub fn bits_per_sample(&self) -> Option<usize> {
        self.sample_size_spec.into_bits()
    }

    /// Returns [`ChannelAssignment`] of this frame.
    #[inline]
    pub fn channel_assignment(&self) -> &ChannelAssignment {
        &self.channel_assignment
    }
}

/// [`SUBFRAME`](https://xiph.org/flac/format.html#subframe) component.
#[derive(Clone, Debug, Eq, PartialEq)]
#[allow(clippy::large_enum_variant)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum SubFrame {
    /// This variant contains [`Constant`] sub-frame.
    Constant(Constant),
    /// This variant contains [`Verbatim`] sub-frame.
    Verbatim(Verbatim),
    /// This variant contains [`FixedLpc`] sub-frame.
    FixedLpc(FixedLpc),
    /// This variant contains [`Lpc`] sub-frame.
    Lpc(Lpc),
}

impl SubFrame {
    /// Returns the number of samples in this subframe.
    pub fn block_size(&self) -> usize {
        match self {
            Self::Constant(c) => c.block_size(),
            Self::Verbatim(c) => c.samples().len(),
            Self::FixedLpc(c) => c.residual().block_size(),
            Self::Lpc(c) => c.residual().block_size(),
        }
    }

    /// Returns the number of wasted bits declared in the subframe header.
    pub fn wasted_bits(&self) -> usize {
        match self {
            Self::Constant(_) => 0,
            Self::Verbatim(c) => c.wasted_bits(),
            Self::FixedLpc(c) => c.wasted_bits(),
            Self::Lpc(c) => c.wasted_bits(),
        }
    }
}

impl From<Constant> for SubFrame {
    fn from(c: Constant) -> Self {
        Self::Constant(c)
    }
}

impl From<Verbatim> for SubFrame {
    fn from(c: Verbatim) -> Self {
        Self::Verbatim(c)
    }
}

impl From<FixedLpc> for SubFrame {
    fn from(c: FixedLpc) -> Self {
        Self::FixedLpc(c)
    }
}

impl From<Lpc> for SubFrame {
    fn from(c: Lpc) -> Self {
        Self::Lpc(c)
    }
}

/// [`SUBFRAME_CONSTANT`](https://xiph.org/flac/format.html#subframe_constant) component.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Constant {
    block_size: usize,
    dc_offset: i32,
    bits_per_sample: u8,
}

impl Constant {
    /// Constructs new `Constant`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if an argument is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::bitsink::*;
    /// # use flacore::component::*;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let subframe = Constant::new(1024, 3, 16)?;
    /// let mut sink = ByteSink::new();
    /// subframe.write(&mut sink)?;
    /// assert_eq!(sink.as_slice(), [
    ///     0x00, /* tag */
    ///     0x00, 0x03,  /* 16bits written from MSB to LSB */
    /// ]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        block_size: usize,
        dc_offset: i32,
        bits_per_sample: usize,
    ) -> Result<Self, VerifyError> {
        let ret = Self::from_parts(block_size, dc_offset, bits_per_sample as u8);
        ret.verify()?;
        Ok(ret)
    }

    /// Constructs new `Constant`. (unverified version)
    #[inline]
    pub(crate) fn from_parts(block_size: usize, dc_offset: i32, bits_per_sample: u8) -> Self {
        Self {
            block_size,
            dc_offset,
            bits_per_sample,
        }
    }

    /// Returns the block size.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the constant value.
    #[inline]
    pub fn dc_offset(&self) -> i32 {
        self.dc_offset
    }

    /// Returns bits-per-sample of this subframe.
    #[inline]
    pub fn bits_per_sample(&self) -> usize {
        self.bits_per_sample as usize
    }
}

/// [`SUBFRAME_VERBATIM`](https://xiph.org/flac/format.html#subframe_verbatim) component.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Verbatim {
    samples: Vec<i32>,
    bits_per_sample: u8,
    wasted_bits: u8,
}

impl Verbatim {
    /// Constructs new `Verbatim`.
    ///
    /// `samples` are the values after removing `wasted_bits` LSBs.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if a sample does not fit in
    /// `bits_per_sample - wasted_bits` bits.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::component::*;
    /// let subframe = Verbatim::new(&[0, -1, 1, 3], 8, 0).unwrap();
    /// assert_eq!(subframe.count_bits(), 8 + 4 * 8);
    /// let subframe = Verbatim::new(&[0, -1, 1, 3], 8, 5).unwrap();
    /// assert_eq!(subframe.count_bits(), 8 + 5 + 4 * 3);
    /// assert!(Verbatim::new(&[4], 8, 5).is_err());
    /// ```
    pub fn new(
        samples: &[i32],
        bits_per_sample: usize,
        wasted_bits: usize,
    ) -> Result<Self, VerifyError> {
        let ret = Self::from_parts(samples.to_owned(), bits_per_sample as u8, wasted_bits as u8);
        ret.verify()?;
        Ok(ret)
    }

    #[inline]
    pub(crate) fn from_parts(samples: Vec<i32>, bits_per_sample: u8, wasted_bits: u8) -> Self {
        Self {
            samples,
            bits_per_sample,
            wasted_bits,
        }
    }

    /// Returns a slice of the stored samples.
    #[inline]
    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    /// Returns bits-per-sample of this subframe (including wasted bits).
    #[inline]
    pub fn bits_per_sample(&self) -> usize {
        self.bits_per_sample as usize
    }

    /// Returns the number of wasted LSBs.
    #[inline]
    pub fn wasted_bits(&self) -> usize {
        self.wasted_bits as usize
    }

    /// Returns the number of bits of a verbatim subframe with the given shape.
    #[inline]
    pub const fn count_bits_from_metadata(
        sample_count: usize,
        bits_per_sample: usize,
        wasted_bits: usize,
    ) -> usize {
        8 + wasted_bits + sample_count * (bits_per_sample - wasted_bits)
    }
}

/// [`SUBFRAME_FIXED`](https://xiph.org/flac/format.html#subframe_fixed) component.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FixedLpc {
    warm_up: heapless::Vec<i32, MAX_FIXED_ORDER>,
    residual: Residual,
    bits_per_sample: u8,
    wasted_bits: u8,
}

impl FixedLpc {
    /// Constructs new `FixedLpc`.
    ///
    /// The order is given by the length of `warm_up`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if the order is larger than 4, if a warm-up
    /// sample is out of range, or if `residual` is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::component::*;
    /// let residual = Residual::new(0, 8, 2, &[1], &[0, 0, 1, -1, 0, 0, 1, 2]).unwrap();
    /// let subframe = FixedLpc::new(&[3, 4], residual, 16, 0).unwrap();
    /// assert_eq!(subframe.order(), 2);
    /// ```
    pub fn new(
        warm_up: &[i32],
        residual: Residual,
        bits_per_sample: usize,
        wasted_bits: usize,
    ) -> Result<Self, VerifyError> {
        verify_range!("order", warm_up.len(), ..=MAX_FIXED_ORDER)?;
        let warm_up = heapless::Vec::from_slice(warm_up)
            .map_err(|()| VerifyError::new("warm_up", "too many warm-up samples"))?;
        let ret = Self {
            warm_up,
            residual,
            bits_per_sample: bits_per_sample as u8,
            wasted_bits: wasted_bits as u8,
        };
        ret.verify()?;
        Ok(ret)
    }

    #[inline]
    pub(crate) fn from_parts(
        warm_up: heapless::Vec<i32, MAX_FIXED_ORDER>,
        residual: Residual,
        bits_per_sample: u8,
        wasted_bits: u8,
    ) -> Self {
        Self {
            warm_up,
            residual,
            bits_per_sample,
            wasted_bits,
        }
    }

    /// Returns the predictor order.
    #[inline]
    pub fn order(&self) -> usize {
        self.warm_up.len()
    }

    /// Returns the warm-up samples.
    #[inline]
    pub fn warm_up(&self) -> &[i32] {
        &self.warm_up
    }

    /// Returns a reference to the internal [`Residual`] component.
    #[inline]
    pub fn residual(&self) -> &Residual {
        &self.residual
    }

    /// Returns bits-per-sample of this subframe (including wasted bits).
    #[inline]
    pub fn bits_per_sample(&self) -> usize {
        self.bits_per_sample as usize
    }

    /// Returns the number of wasted LSBs.
    #[inline]
    pub fn wasted_bits(&self) -> usize {
        self.wasted_bits as usize
    }
}

/// [`SUBFRAME_LPC`](https://xiph.org/flac/format.html#subframe_lpc) component.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Lpc {
    parameters: QuantizedParameters,
    warm_up: heapless::Vec<i32, MAX_LPC_ORDER>,
    residual: Residual,
    bits_per_sample: u8,
    wasted_bits: u8,
}

impl Lpc {
    /// Constructs new `Lpc`.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if the length of `warm_up` differs from the order
    /// of `parameters`, or if a component is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::component::*;
    /// # use flacore::lpc::QuantizedParameters;
    /// let params = QuantizedParameters::from_parts(&[12, -4], 3, 12);
    /// let residual = Residual::new(0, 8, 2, &[1], &[0, 0, 1, -1, 0, 0, 1, 2]).unwrap();
    /// let subframe = Lpc::new(&[3, 4], params, residual, 16, 0).unwrap();
    /// assert_eq!(subframe.order(), 2);
    /// ```
    pub fn new(
        warm_up: &[i32],
        parameters: QuantizedParameters,
        residual: Residual,
        bits_per_sample: usize,
        wasted_bits: usize,
    ) -> Result<Self, VerifyError> {
        verify_true!(
            "warm_up.len()",
            warm_up.len() == parameters.order(),
            "must be the same as the LPC order"
        )?;
        let warm_up = heapless::Vec::from_slice(warm_up)
            .map_err(|()| VerifyError::new("warm_up", "too many warm-up samples"))?;
        let ret = Self {
            parameters,
            warm_up,
            residual,
            bits_per_sample: bits_per_sample as u8,
            wasted_bits: wasted_bits as u8,
        };
        ret.verify()?;
        Ok(ret)
    }

    #[inline]
    pub(crate) fn from_parts(
        warm_up: heapless::Vec<i32, MAX_LPC_ORDER>,
        parameters: QuantizedParameters,
        residual: Residual,
        bits_per_sample: u8,
        wasted_bits: u8,
    ) -> Self {
        Self {
            parameters,
            warm_up,
            residual,
            bits_per_sample,
            wasted_bits,
        }
    }

    /// Returns the predictor order.
    #[inline]
    pub fn order(&self) -> usize {
        self.parameters.order()
    }

    /// Returns the warm-up samples.
    #[inline]
    pub fn warm_up(&self) -> &[i32] {
        &self.warm_up
    }

    /// Returns the quantized predictor.
    #[inline]
    pub fn parameters(&self) -> &QuantizedParameters {
        &self.parameters
    }

    /// Returns a reference to the internal [`Residual`] component.
    #[inline]
    pub fn residual(&self) -> &Residual {
        &self.residual
    }

    /// Returns bits-per-sample of this subframe (including wasted bits).
    #[inline]
    pub fn bits_per_sample(&self) -> usize {
        self.bits_per_sample as usize
    }

    /// Returns the number of wasted LSBs.
    #[inline]
    pub fn wasted_bits(&self) -> usize {
        self.wasted_bits as usize
    }
}

/// [`RESIDUAL`](https://xiph.org/flac/format.html#residual) component.
///
/// Escape codes for unencoded partitions are never produced.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Residual {
    partition_order: u8,
    block_size: usize,
    warmup_length: usize,
    rice_params: Vec<u8>,
    // Full-length; the first `warmup_length` elements are zero.
    residuals: Vec<i32>,
    code_bits: usize,
}

impl Residual {
    /// Constructs `Residual` from residual values and Rice parameters.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError` if an argument is invalid.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::component::*;
    /// let residual = Residual::new(1, 8, 1, &[0, 2], &[0, 1, -1, 0, 3, -4, 2, 1]).unwrap();
    /// assert_eq!(residual.residual(4), 3);
    /// assert_eq!(residual.coding_method(), 0);
    /// assert!(Residual::new(1, 8, 1, &[0], &[0; 8]).is_err());
    /// ```
    pub fn new(
        partition_order: usize,
        block_size: usize,
        warmup_length: usize,
        rice_params: &[u8],
        residuals: &[i32],
    ) -> Result<Self, VerifyError> {
        verify_range!("partition_order", partition_order, ..=(crate::constant::rice::MAX_PARTITION_ORDER))?;
        verify_true!(
            "rice_params.len()",
            rice_params.len() == 1usize << partition_order,
            "must be equal to the number of partitions"
        )?;
        verify_true!(
            "block_size",
            block_size % (1usize << partition_order) == 0 && residuals.len() == block_size,
            "must be divisible into partitions and match to the residual length"
        )?;
        let ret = Self::from_parts(
            partition_order as u8,
            block_size,
            warmup_length,
            rice_params.to_owned(),
            residuals.to_owned(),
        );
        ret.verify()?;
        Ok(ret)
    }

    /// Constructs `Residual` with consuming parts.
    #[inline]
    pub(crate) fn from_parts(
        partition_order: u8,
        block_size: usize,
        warmup_length: usize,
        rice_params: Vec<u8>,
        residuals: Vec<i32>,
    ) -> Self {
        debug_assert!(rice_params.len() == 1usize << partition_order as usize);
        let param_bits = rice::parameter_bits(&rice_params);
        let part_len = block_size >> partition_order;
        let mut code_bits = 0;
        for (p, rice_p) in rice_params.iter().enumerate() {
            let start = max(p * part_len, warmup_length);
            let end = (p + 1) * part_len;
            let start = min(start, end);
            code_bits += param_bits + rice::partition_bits(&residuals[start..end], *rice_p as usize);
        }
        Self {
            partition_order,
            block_size,
            warmup_length,
            rice_params,
            residuals,
            code_bits,
        }
    }

    /// Returns the partition order for the PRC.
    #[inline]
    pub fn partition_order(&self) -> usize {
        self.partition_order as usize
    }

    /// Returns the rice parameter for the `p`-th partition
    #[inline]
    pub fn rice_parameter(&self, p: usize) -> usize {
        self.rice_params[p] as usize
    }

    /// Returns the residual value for the `t`-th sample.
    #[inline]
    pub fn residual(&self, t: usize) -> i32 {
        self.residuals[t]
    }

    /// Returns the residual coding method (0: 4-bit parameters, 1: 5-bit).
    #[inline]
    pub fn coding_method(&self) -> u8 {
        if rice::parameter_bits(&self.rice_params) == 5 {
            1
        } else {
            0
        }
    }

    /// Returns the block size of this `Residual`.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the warmup length of this `Residual`.
    #[inline]
    pub fn warmup_length(&self) -> usize {
        self.warmup_length
    }

    #[inline]
    pub(crate) fn rice_params(&self) -> &[u8] {
        &self.rice_params
    }

    #[inline]
    pub(crate) fn residuals(&self) -> &[i32] {
        &self.residuals
    }

    /// Bits for the parameter fields and the coded residuals.
    #[inline]
    pub(crate) fn code_bits(&self) -> usize {
        self.code_bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_assignment_is_small_enough() {
        let size = std::mem::size_of::<ChannelAssignment>();
        assert_eq!(size, 2);
    }

    #[test]
    fn channel_assignment_tags_round_trip() {
        for tag in 0..=10u8 {
            let ch = ChannelAssignment::from_tag(tag).unwrap();
            assert_eq!(ch.tag(), tag);
        }
    }

    #[test]
    fn block_size_specs_cover_table() {
        for (size, tag) in [
            (192, 1),
            (576, 2),
            (1152, 3),
            (2304, 4),
            (4608, 5),
            (256, 8),
            (512, 9),
            (1024, 10),
            (2048, 11),
            (4096, 12),
            (8192, 13),
            (16384, 14),
            (32768, 15),
            (1, 6),
            (256 - 1, 6),
            (257, 7),
            (65535, 7),
        ] {
            let spec = BlockSizeSpec::from_size(size);
            assert_eq!(spec.tag(), tag, "size={size}");
            assert_eq!(spec.block_size(), size as usize);
        }
    }

    #[test]
    fn sample_rate_specs() {
        assert_eq!(SampleRateSpec::from_freq(255_000), SampleRateSpec::KHz(255));
        assert_eq!(SampleRateSpec::from_freq(256_000), SampleRateSpec::DaHz(25600));
        assert_eq!(SampleRateSpec::from_freq(655_350), SampleRateSpec::DaHz(65535));
        assert_eq!(SampleRateSpec::from_freq(65535), SampleRateSpec::Hz(65535));
        assert_eq!(SampleRateSpec::from_freq(655_351), SampleRateSpec::Unspecified);
        assert_eq!(SampleRateSpec::from_freq(22_050).tag(), 6);
        assert_eq!(SampleRateSpec::from_freq(22_050).count_extra_bits(), 0);
    }

    #[test]
    fn stream_info_reports_unknown_frame_sizes_as_zero() {
        let info = StreamInfo::new(44100, 1, 16).unwrap();
        assert_eq!(info.frame_size_fields(), (0, 0));
    }
}
