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

//! Stream encoder writing a complete FLAC file to an output.

use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;

#[cfg(feature = "log")]
use log::debug;
#[cfg(feature = "log")]
use log::trace;
use md5::Digest;
#[cfg(feature = "serde")]
use serde::Deserialize;
#[cfg(feature = "serde")]
use serde::Serialize;

use super::bitsink::BitWriter;
use super::bitsink::ByteSink;
use super::coding;
use super::component::write_stream_header;
use super::component::BitRepr;
use super::component::StreamInfo;
use super::config::EncodingOptions;
use super::constant::container::STREAM_INFO_OFFSET;
use super::constant::MAX_BITS_PER_SAMPLE;
use super::constant::MAX_CHANNELS;
use super::constant::MAX_FRAME_HEADER_SAMPLE_RATE;
use super::constant::MIN_BITS_PER_SAMPLE;
use super::error::EncodeError;
use super::error::RangeError;
use super::error::Verify;
use super::source::FrameBuf;
use super::source::Source;

/// Output of [`StreamEncoder`].
///
/// The encoder writes the stream front to back and, when finishing, moves
/// back to rewrite STREAMINFO. Every `Write + Seek` type is a `StreamSink`;
/// wrap other writers in [`AppendOnly`].
pub trait StreamSink: Write {
    /// Moves the write position.
    ///
    /// Returns `None` if the sink does not support seeking.
    fn seek_to(&mut self, pos: SeekFrom) -> Option<std::io::Result<u64>>;
}

impl<T: Write + Seek> StreamSink for T {
    fn seek_to(&mut self, pos: SeekFrom) -> Option<std::io::Result<u64>> {
        Some(self.seek(pos))
    }
}

/// Wrapper marking a writer as non-seekable (pipes, sockets, ...).
///
/// Streams written to `AppendOnly` keep the placeholder STREAMINFO, and
/// [`StreamEncoder::finish`] reports [`EncodeError::NonSeekableOutput`].
#[derive(Debug)]
pub struct AppendOnly<W: Write>(pub W);

impl<W: Write> AppendOnly<W> {
    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.0
    }
}

impl<W: Write> Write for AppendOnly<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

impl<W: Write> StreamSink for AppendOnly<W> {
    fn seek_to(&mut self, _pos: SeekFrom) -> Option<std::io::Result<u64>> {
        None
    }
}

/// Position of a frame in the encoded stream.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SeekPoint {
    /// Index of the first inter-channel sample in the frame.
    pub sample_number: u64,
    /// Offset from the first byte of the first frame.
    pub byte_offset: u64,
    /// Number of inter-channel samples in the frame.
    pub frame_samples: u16,
}

/// States of [`StreamEncoder`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EncoderState {
    /// Validating the stream parameters.
    Init,
    /// Writing the stream marker and a placeholder STREAMINFO.
    WritingPlaceholderHeader,
    /// Accepting blocks.
    EncodingFrames,
    /// Rewriting STREAMINFO.
    Finalizing,
    /// Terminal.
    Done,
}

/// Encoder writing a FLAC stream block by block.
///
/// # Examples
///
/// ```
/// # use flacore::config::EncodingOptions;
/// # use flacore::encoder::StreamEncoder;
/// # use flacore::source::FrameBuf;
/// let mut out = std::io::Cursor::new(Vec::new());
/// let opts = EncodingOptions::default();
/// let mut encoder = StreamEncoder::new(opts, 44100, 1, 16, &mut out).unwrap();
///
/// let mut block = FrameBuf::with_size(1, 4096);
/// block.fill_from_interleaved(&[0; 4096]);
/// encoder.encode_block(&block, 4096).unwrap();
/// let seek_points = encoder.finish().unwrap();
///
/// assert_eq!(seek_points.len(), 1);
/// assert_eq!(&out.get_ref()[..4], b"fLaC");
/// ```
pub struct StreamEncoder<W: StreamSink> {
    options: EncodingOptions,
    writer: BitWriter<W>,
    frame_sink: ByteSink,
    stream_info: StreamInfo,
    md5_context: md5::Md5,
    state: EncoderState,
    frame_number: u64,
    stream_offset: u64,
    frames_offset: u64,
    seek_points: Vec<SeekPoint>,
}

impl<W: StreamSink> std::fmt::Debug for StreamEncoder<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEncoder")
            .field("state", &self.state)
            .field("frame_number", &self.frame_number)
            .field("stream_info", &self.stream_info)
            .finish_non_exhaustive()
    }
}

impl<W: StreamSink> StreamEncoder<W> {
    /// Validates the stream parameters and writes the stream header.
    ///
    /// # Errors
    ///
    /// - [`EncodeError::Config`] if `options` is invalid.
    /// - [`EncodeError::InvalidChannelConfiguration`] for an unsupported
    ///   channel count.
    /// - [`EncodeError::Range`] for unsupported sample rates or bit depths.
    /// - [`EncodeError::Io`] if the header cannot be written.
    pub fn new(
        options: EncodingOptions,
        sample_rate: usize,
        channels: usize,
        bits_per_sample: usize,
        sink: W,
    ) -> Result<Self, EncodeError> {
        let mut state = EncoderState::Init;
        options.verify()?;
        if !(1..=MAX_CHANNELS).contains(&channels) {
            return Err(EncodeError::InvalidChannelConfiguration(
                RangeError::from_display("channels", "must be within 1..=8", &channels),
            ));
        }
        if !(MIN_BITS_PER_SAMPLE..=MAX_BITS_PER_SAMPLE).contains(&bits_per_sample) {
            return Err(RangeError::from_display(
                "bits_per_sample",
                "must be within 4..=24",
                &bits_per_sample,
            )
            .into());
        }
        if !(1..=MAX_FRAME_HEADER_SAMPLE_RATE).contains(&sample_rate) {
            return Err(RangeError::from_display(
                "sample_rate",
                "must be within 1..=655350",
                &sample_rate,
            )
            .into());
        }
        let mut stream_info = StreamInfo::new(sample_rate, channels, bits_per_sample)?;
        stream_info.set_block_sizes(options.block_size, options.block_size)?;

        transition(&mut state, EncoderState::WritingPlaceholderHeader);
        let mut writer = BitWriter::new(sink);
        write_stream_header(&stream_info, &mut writer)?;
        let stream_offset = writer.bytes_written();

        transition(&mut state, EncoderState::EncodingFrames);
        Ok(Self {
            frame_sink: ByteSink::with_capacity(options.block_size * channels * 32),
            options,
            writer,
            stream_info,
            md5_context: md5::Md5::new(),
            state,
            frame_number: 0,
            stream_offset,
            frames_offset: 0,
            seek_points: vec![],
        })
    }

    /// Returns the current state.
    pub const fn state(&self) -> EncoderState {
        self.state
    }

    /// Returns STREAMINFO accumulated so far.
    ///
    /// The MD5 digest is filled only after finishing.
    pub const fn stream_info(&self) -> &StreamInfo {
        &self.stream_info
    }

    /// Returns the options used by this encoder.
    pub const fn options(&self) -> &EncodingOptions {
        &self.options
    }

    /// Encodes the first `block_size` samples of `framebuf` as a frame.
    ///
    /// Every block except the last one must have the configured block size.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::Range`] if the encoder does not accept blocks
    /// anymore or if `framebuf` does not match the stream, and propagates
    /// encoding and output errors. Any error leaves the stream unusable.
    pub fn encode_block(&mut self, framebuf: &FrameBuf, block_size: usize) -> Result<(), EncodeError> {
        if self.state != EncoderState::EncodingFrames {
            return Err(RangeError::from_display(
                "state",
                "must be EncodingFrames",
                &format!("{:?}", self.state),
            )
            .into());
        }
        if framebuf.channels() != self.stream_info.channels() {
            return Err(RangeError::from_display(
                "framebuf.channels()",
                "must match the stream",
                &framebuf.channels(),
            )
            .into());
        }
        if block_size == 0 || block_size > self.options.block_size || block_size > framebuf.size() {
            return Err(RangeError::from_display(
                "block_size",
                "must be positive and fit in both the buffer and the configured block size",
                &block_size,
            )
            .into());
        }
        if let Some(last) = self.seek_points.last() {
            if usize::from(last.frame_samples) < self.options.block_size {
                return Err(RangeError::from_display(
                    "block_size",
                    "no block may follow a short block",
                    &block_size,
                )
                .into());
            }
        }

        framebuf.update_md5(
            self.stream_info.bits_per_sample(),
            block_size,
            &mut self.md5_context,
        );
        let frame = coding::encode_frame(
            &self.options,
            framebuf,
            block_size,
            &self.stream_info,
            self.frame_number,
        )?;

        self.frame_sink.clear();
        frame.write(&mut self.frame_sink)?;
        self.frame_sink.copy_to(&mut self.writer)?;

        #[cfg(feature = "log")]
        trace!(
            "frame {}: {} samples, {} bytes, {:?}",
            self.frame_number,
            block_size,
            self.frame_sink.byte_len(),
            frame.header().channel_assignment()
        );

        self.seek_points.push(SeekPoint {
            sample_number: self.stream_info.total_samples(),
            byte_offset: self.frames_offset,
            frame_samples: block_size as u16,
        });
        self.stream_info.update_frame_info(&frame);
        self.frames_offset += self.frame_sink.byte_len() as u64;
        self.frame_number += 1;
        Ok(())
    }

    /// Rewrites STREAMINFO with the final values and returns seek points.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::NonSeekableOutput`] if the sink cannot seek.
    /// All frames are written in that case, and the stream keeps the
    /// placeholder STREAMINFO.
    pub fn finish(mut self) -> Result<Vec<SeekPoint>, EncodeError> {
        transition(&mut self.state, EncoderState::Finalizing);
        let digest: [u8; 16] = self.md5_context.finalize().into();
        self.stream_info.set_md5_digest(&digest);

        let mut info_bytes = ByteSink::new();
        self.stream_info.write(&mut info_bytes)?;

        let mut sink = self.writer.into_inner()?;
        let end = self.stream_offset + self.frames_offset;
        match sink.seek_to(SeekFrom::Current(-(end as i64 - STREAM_INFO_OFFSET as i64))) {
            None => return Err(EncodeError::NonSeekableOutput),
            Some(result) => {
                result?;
            }
        }
        sink.write_all(info_bytes.as_slice())?;
        if let Some(result) = sink.seek_to(SeekFrom::Current(
            end as i64 - STREAM_INFO_OFFSET as i64 - info_bytes.byte_len() as i64,
        )) {
            result?;
        }
        sink.flush()?;

        #[cfg(feature = "log")]
        debug!(
            "finalized stream: {} frames, {} samples, frame size {}..={} bytes",
            self.seek_points.len(),
            self.stream_info.total_samples(),
            self.stream_info.min_frame_size(),
            self.stream_info.max_frame_size()
        );
        transition(&mut self.state, EncoderState::Done);
        Ok(self.seek_points)
    }
}

#[inline]
fn transition(state: &mut EncoderState, next: EncoderState) {
    #[cfg(feature = "log")]
    debug!("stream encoder: {state:?} -> {next:?}");
    *state = next;
}

/// Encodes all samples of `src` with the block size in `options`.
///
/// # Errors
///
/// Propagates errors from the source, the encoder, and the sink. See
/// [`StreamEncoder`].
///
/// # Examples
///
/// ```
/// # use flacore::*;
/// # use flacore::source::MemSource;
/// # use flacore::config::EncodingOptions;
/// let samples: Vec<i32> = (0..2000).map(|t| (t % 100) * 50).collect();
/// let src = MemSource::from_samples(&samples, 2, 16, 16000);
/// let mut opts = EncodingOptions::default();
/// opts.block_size = 256;
/// let mut out = std::io::Cursor::new(Vec::new());
/// let seek_points = encode_with_fixed_block_size(&opts, src, &mut out).unwrap();
/// assert_eq!(seek_points.len(), 4);
/// assert_eq!(seek_points[3].frame_samples, 232);
/// ```
pub fn encode_with_fixed_block_size<T: Source, W: StreamSink>(
    options: &EncodingOptions,
    mut src: T,
    sink: W,
) -> Result<Vec<SeekPoint>, EncodeError> {
    let mut encoder = StreamEncoder::new(
        options.clone(),
        src.sample_rate(),
        src.channels(),
        src.bits_per_sample(),
        sink,
    )?;
    let mut framebuf = FrameBuf::with_size(src.channels(), options.block_size);
    loop {
        let read_samples = src.read_samples(&mut framebuf)?;
        if read_samples == 0 {
            break;
        }
        encoder.encode_block(&framebuf, read_samples)?;
    }
    encoder.finish()
}

#[cfg(test)]
#[allow(clippy::pedantic, clippy::nursery)]
mod tests {
    use super::*;
    use crate::bitsource::BitReader;
    use crate::bitsource::BitSource;
    use crate::source::MemSource;
    use crate::test_helper;

    use std::io::Cursor;

    fn encode_to_vec(opts: &EncodingOptions, src: MemSource) -> (Vec<u8>, Vec<SeekPoint>) {
        let mut out = Cursor::new(Vec::new());
        let seek_points =
            encode_with_fixed_block_size(opts, src, &mut out).expect("encode failed");
        (out.into_inner(), seek_points)
    }

    #[test]
    fn all_zero_mono_stream() {
        let src = MemSource::from_samples(&[0; 4096], 1, 16, 44100);
        let (bytes, seek_points) = encode_to_vec(&EncodingOptions::default(), src);

        assert_eq!(seek_points.len(), 1);
        // STREAMINFO: total samples are the lowest 36 bits of bytes 21..26
        let mut reader = BitReader::new(&bytes[8..42]);
        reader.read_u64(16 + 16 + 24).unwrap();
        reader.read_u64(24 + 20 + 3 + 5).unwrap();
        assert_eq!(reader.read_u64(36).unwrap(), 4096);

        // the first subframe is constant zero.
        let frame = &bytes[42..];
        let mut reader = BitReader::new(frame);
        assert_eq!(reader.read_u64(32).unwrap(), 0xFFF8_C908);
        assert_eq!(reader.read_u64(8).unwrap(), 0); // frame number
        reader.read_u64(8).unwrap(); // CRC-8
        assert_eq!(reader.read_u64(8).unwrap(), 0x00); // constant, no wasted bits
        assert_eq!(reader.read_u64(16).unwrap(), 0);
        // header (6 bytes) + subframe (3 bytes) + footer (2 bytes)
        assert_eq!(frame.len(), 11);
    }

    #[test]
    fn md5_invariance() {
        let channels = 2;
        let signal = test_helper::constant_plus_noise(1024 * channels, 23, 0);
        let src = MemSource::from_samples(&signal, channels, 24, 16000);
        let mut opts = EncodingOptions::default();
        opts.block_size = 128;
        let (bytes, seek_points) = encode_to_vec(&opts, src);
        assert_eq!(seek_points.len(), 8);
        // Reference computed with Python's hashlib.
        assert_eq!(
            &bytes[26..42],
            &[
                0xEE, 0x78, 0x7A, 0x6E, 0x99, 0x01, 0x36, 0x79, 0xA5, 0xBB, 0x6D, 0x5C, 0x10, 0xAF,
                0x0B, 0x87
            ]
        );
    }

    #[test]
    fn seek_points_follow_frames() {
        let signal = test_helper::sinusoid_plus_noise(1000, 30, 2000.0, 30);
        let src = MemSource::from_samples(&signal, 1, 16, 8000);
        let mut opts = EncodingOptions::default();
        opts.block_size = 192;
        let (bytes, seek_points) = encode_to_vec(&opts, src);

        assert_eq!(seek_points.len(), 6);
        assert_eq!(seek_points[0].byte_offset, 0);
        for (i, sp) in seek_points.iter().enumerate() {
            assert_eq!(sp.sample_number, 192 * i as u64);
            let offset = 42 + sp.byte_offset as usize;
            assert_eq!(&bytes[offset..offset + 2], &[0xFF, 0xF8]);
        }
        assert_eq!(seek_points[5].frame_samples, 40);
    }

    #[test]
    fn append_only_output_cannot_be_finalized() {
        let signal = test_helper::sinusoid_plus_noise(3000, 30, 2000.0, 30);
        let src = MemSource::from_samples(&signal, 1, 16, 8000);
        let mut opts = EncodingOptions::default();
        opts.block_size = 1024;
        let mut out = Vec::new();
        let err = encode_with_fixed_block_size(&opts, src, AppendOnly(&mut out)).unwrap_err();
        assert!(matches!(err, EncodeError::NonSeekableOutput));

        // frames are written, but STREAMINFO keeps the placeholder values.
        assert_eq!(&out[..4], b"fLaC");
        assert_eq!(&out[12..18], &[0u8; 6]);
        assert_eq!(&out[26..42], &[0u8; 16]);
        assert!(out.len() > 42);
    }

    #[test]
    fn rejects_unsupported_channel_counts() {
        let out = Cursor::new(Vec::new());
        let err = StreamEncoder::new(EncodingOptions::default(), 44100, 9, 16, out).unwrap_err();
        assert!(matches!(err, EncodeError::InvalidChannelConfiguration(_)));

        let out = Cursor::new(Vec::new());
        let err = StreamEncoder::new(EncodingOptions::default(), 44100, 0, 16, out).unwrap_err();
        assert!(matches!(err, EncodeError::InvalidChannelConfiguration(_)));
    }

    #[test]
    fn rejects_invalid_stream_parameters() {
        let out = Cursor::new(Vec::new());
        let err = StreamEncoder::new(EncodingOptions::default(), 44100, 2, 32, out).unwrap_err();
        assert!(matches!(err, EncodeError::Range(_)));

        let out = Cursor::new(Vec::new());
        let err = StreamEncoder::new(EncodingOptions::default(), 700_000, 2, 16, out).unwrap_err();
        assert!(matches!(err, EncodeError::Range(_)));

        let mut opts = EncodingOptions::default();
        opts.max_lpc_order = 33;
        let out = Cursor::new(Vec::new());
        let err = StreamEncoder::new(opts, 44100, 2, 16, out).unwrap_err();
        assert!(matches!(err, EncodeError::Config(_)));
    }

    #[test]
    fn state_machine_transitions() {
        let mut out = Cursor::new(Vec::new());
        let mut opts = EncodingOptions::default();
        opts.block_size = 64;
        let mut encoder = StreamEncoder::new(opts, 44100, 2, 16, &mut out).unwrap();
        assert_eq!(encoder.state(), EncoderState::EncodingFrames);

        let framebuf = FrameBuf::with_size(2, 128);
        // larger than the configured block size.
        assert!(matches!(
            encoder.encode_block(&framebuf, 128),
            Err(EncodeError::Range(_))
        ));
        let mono = FrameBuf::with_size(1, 64);
        assert!(encoder.encode_block(&mono, 64).is_err());

        encoder.encode_block(&framebuf, 64).unwrap();
        encoder.encode_block(&framebuf, 10).unwrap();
        assert_eq!(encoder.stream_info().total_samples(), 74);
        // the short block must be the last one.
        assert!(encoder.encode_block(&framebuf, 64).is_err());
        let seek_points = encoder.finish().unwrap();
        assert_eq!(seek_points.len(), 2);
    }

    #[test]
    fn empty_source_yields_header_only() {
        let src = MemSource::from_samples(&[], 2, 16, 44100);
        let (bytes, seek_points) = encode_to_vec(&EncodingOptions::default(), src);
        assert!(seek_points.is_empty());
        assert_eq!(bytes.len(), 42);
        // unknown frame sizes are written as zero.
        assert_eq!(&bytes[12..18], &[0u8; 6]);
    }

    #[test]
    fn stream_info_is_rewritten_in_place() {
        let signal = test_helper::sinusoid_plus_noise(4000, 50, 5000.0, 10);
        let src = MemSource::from_samples(&signal, 2, 16, 44100);
        let mut opts = EncodingOptions::default();
        opts.block_size = 1000;
        let (bytes, _) = encode_to_vec(&opts, src);

        let mut reader = BitReader::new(&bytes[8..42]);
        assert_eq!(reader.read_u64(16).unwrap(), 1000);
        assert_eq!(reader.read_u64(16).unwrap(), 1000);
        let min_frame = reader.read_u64(24).unwrap();
        let max_frame = reader.read_u64(24).unwrap();
        assert!(0 < min_frame && min_frame <= max_frame);
        assert_eq!(reader.read_u64(20).unwrap(), 44100);
        assert_eq!(reader.read_u64(3).unwrap(), 1);
        assert_eq!(reader.read_u64(5).unwrap(), 15);
        assert_eq!(reader.read_u64(36).unwrap(), 2000);
        // the first frame starts right after STREAMINFO.
        assert_eq!(&bytes[42..44], &[0xFF, 0xF8]);
    }
}
