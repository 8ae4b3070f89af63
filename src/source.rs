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

//! Module for input source handling.

use md5::Digest;

use super::arrayutils::deinterleave;
use super::error::SourceError;
use super::error::SourceErrorReason;
use super::reusable;
use super::reuse;

/// Reusable buffer for multi-channel framed signals.
///
/// Samples are stored channel-major: `size` samples of channel 0, then
/// channel 1, and so on.
#[derive(Clone, Debug)]
pub struct FrameBuf {
    samples: Vec<i32>,
    channels: usize,
    size: usize,
}

reusable!(MD5_BUFFER: Vec<u8>);

impl FrameBuf {
    /// Constructs `FrameBuf` of the specified size.
    ///
    /// # Examples
    ///
    /// ```
    /// # use flacore::source::FrameBuf;
    /// let fb = FrameBuf::with_size(2, 1024);
    /// assert_eq!(fb.size(), 1024);
    /// assert_eq!(fb.channel_slice(1).len(), 1024);
    /// ```
    pub fn with_size(channels: usize, size: usize) -> Self {
        Self {
            samples: vec![0i32; size * channels],
            channels,
            size,
        }
    }

    /// Returns the size in the number of inter-channel samples.
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Fills first samples from the interleaved slice, and resets rest.
    pub fn fill_from_interleaved(&mut self, interleaved: &[i32]) {
        deinterleave(interleaved, self.channels, self.size, &mut self.samples);
    }

    /// Returns the number of channels
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Returns samples from the given channel.
    pub fn channel_slice(&self, ch: usize) -> &[i32] {
        &self.samples[ch * self.size..(ch + 1) * self.size]
    }

    /// Returns mutable samples from the given channel.
    pub fn channel_slice_mut(&mut self, ch: usize) -> &mut [i32] {
        &mut self.samples[ch * self.size..(ch + 1) * self.size]
    }

    /// Feeds the first `block_size` samples to an MD5 context.
    ///
    /// Samples are hashed interleaved, as little-endian integers of
    /// `ceil(bits_per_sample / 8)` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `bits_per_sample > 32` or `block_size > self.size()`.
    pub fn update_md5(&self, bits_per_sample: usize, block_size: usize, md5_context: &mut md5::Md5) {
        let bytes_per_sample = (bits_per_sample + 7) / 8;
        assert!(bytes_per_sample <= 4);
        assert!(block_size <= self.size);
        reuse!(MD5_BUFFER, |bytes: &mut Vec<u8>| {
            bytes.clear();
            bytes.reserve(block_size * self.channels * bytes_per_sample);
            for t in 0..block_size {
                for ch in 0..self.channels {
                    let sample = self.samples[ch * self.size + t];
                    bytes.extend_from_slice(&sample.to_le_bytes()[..bytes_per_sample]);
                }
            }
            md5_context.update(&bytes[..]);
        });
    }

    /// Returns the internal representation of multichannel signals.
    #[cfg(test)]
    pub fn raw_slice(&self) -> &[i32] {
        &self.samples
    }
}

/// Pull-based PCM input for the encoder.
pub trait Source {
    /// Returns the number of channels.
    fn channels(&self) -> usize;
    /// Returns the number of bits per sample;
    fn bits_per_sample(&self) -> usize;
    /// Returns sampling rate in Hz.
    fn sample_rate(&self) -> usize;
    /// Reads up to `dest.size()` samples to the buffer.
    ///
    /// Returns the number of inter-channel samples read. Zero indicates the
    /// end of the stream.
    #[allow(clippy::missing_errors_doc)]
    fn read_samples(&mut self, dest: &mut FrameBuf) -> Result<usize, SourceError>;
    /// Returns length of source if it's defined.
    fn len_hint(&self) -> Option<usize> {
        None
    }
}

/// Source with preloaded interleaved samples.
///
/// # Examples
///
/// ```
/// # use flacore::source::*;
/// let mut src = MemSource::from_samples(&[1, -1, 2, -2, 3, -3], 2, 16, 8000);
/// let mut fb = FrameBuf::with_size(2, 2);
/// assert_eq!(src.read_samples(&mut fb).unwrap(), 2);
/// assert_eq!(fb.channel_slice(1), &[-1, -2]);
/// assert_eq!(src.read_samples(&mut fb).unwrap(), 1);
/// assert_eq!(src.read_samples(&mut fb).unwrap(), 0);
/// ```
#[derive(Clone, Debug)]
pub struct MemSource {
    channels: usize,
    bits_per_sample: usize,
    sample_rate: usize,
    samples: Vec<i32>,
    read_head: usize,
}

impl MemSource {
    /// Constructs `MemSource` from interleaved samples.
    pub fn from_samples(
        samples: &[i32],
        channels: usize,
        bits_per_sample: usize,
        sample_rate: usize,
    ) -> Self {
        Self {
            channels,
            bits_per_sample,
            sample_rate,
            samples: samples.to_owned(),
            read_head: 0,
        }
    }

    /// Returns sample buffer as a raw slice.
    pub fn as_raw_slice(&self) -> &[i32] {
        &self.samples
    }

    /// Returns the number of inter-channel samples.
    pub fn len(&self) -> usize {
        self.samples.len() / std::cmp::max(self.channels, 1)
    }

    /// Returns `true` if the source contains no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Source for MemSource {
    fn channels(&self) -> usize {
        self.channels
    }

    fn bits_per_sample(&self) -> usize {
        self.bits_per_sample
    }

    fn sample_rate(&self) -> usize {
        self.sample_rate
    }

    fn read_samples(&mut self, dest: &mut FrameBuf) -> Result<usize, SourceError> {
        if dest.channels() != self.channels {
            return Err(SourceError::by_reason(SourceErrorReason::InvalidBuffer));
        }
        let to_read = dest.size() * self.channels;
        let begin = std::cmp::min(self.read_head * self.channels, self.samples.len());
        let end = std::cmp::min(begin + to_read, self.samples.len());
        let src = &self.samples[begin..end];

        dest.fill_from_interleaved(src);
        let read = src.len() / self.channels;
        self.read_head += read;
        Ok(read)
    }

    fn len_hint(&self) -> Option<usize> {
        Some(self.len())
    }
}
